use std::io::{self, Read, Seek};

use noodles_bgzf as bgzf;
use noodles_bgzf::VirtualPosition;

use bamid_sam::header::Header;
use bamid_sam::record::{codec, Record};

pub(crate) const MAGIC: [u8; 4] = [b'B', b'A', b'M', 0x01];

/// A BAM reader over a BGZF-compressed stream.
pub struct Reader<R> {
    inner: bgzf::Reader<R>,
}

impl<R> Reader<R>
where
    R: Read,
{
    /// Creates a BAM reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner: bgzf::Reader::new(inner),
        }
    }

    /// Reads the magic, the header text, and the reference table.
    ///
    /// The binary reference table populates the header's reference info; the header text is
    /// parsed for its typed records.
    pub fn read_header(&mut self) -> io::Result<Header> {
        let mut magic = [0; 4];
        self.inner.read_exact(&mut magic)?;

        if magic != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid BAM magic",
            ));
        }

        let l_text = self.read_i32()?;
        let l_text = usize::try_from(l_text).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, "negative header text length")
        })?;

        let mut text = vec![0; l_text];
        self.inner.read_exact(&mut text)?;

        let mut header = Header::parse_text(&text)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let n_ref = self.read_i32()?;
        let n_ref = usize::try_from(n_ref)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative reference count"))?;

        header.reference_info_mut().clear();

        for _ in 0..n_ref {
            let l_name = self.read_i32()?;
            let l_name = usize::try_from(l_name).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "negative reference name length")
            })?;

            let mut name = vec![0; l_name];
            self.inner.read_exact(&mut name)?;

            if name.pop() != Some(0) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "reference name is not NUL-terminated",
                ));
            }

            let name = String::from_utf8(name).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, e)
            })?;

            let l_ref = self.read_i32()?;

            header.reference_info_mut().add(&name, l_ref);
        }

        Ok(header)
    }

    /// Reads one record, returning `Ok(0)` at end of stream and the block size otherwise.
    ///
    /// End of stream is reported when the 4-byte size prefix cannot be read; truncation inside
    /// a record body is an error.
    pub fn read_record(&mut self, record: &mut Record) -> io::Result<usize> {
        let block_size = match self.read_i32() {
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(0),
            Err(e) => return Err(e),
        };

        let block_size = usize::try_from(block_size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative block size"))?;

        codec::read_body(&mut self.inner, block_size, record)?;

        Ok(block_size)
    }

    /// Returns the current virtual position of the underlying BGZF stream.
    pub fn virtual_position(&self) -> VirtualPosition {
        self.inner.virtual_position()
    }

    fn read_i32(&mut self) -> io::Result<i32> {
        let mut buf = [0; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }
}

impl<R> Reader<R>
where
    R: Read + Seek,
{
    /// Seeks the underlying BGZF stream to the given virtual position.
    pub fn seek(&mut self, pos: VirtualPosition) -> io::Result<VirtualPosition> {
        self.inner.seek(pos)
    }
}

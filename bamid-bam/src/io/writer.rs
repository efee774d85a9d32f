use std::io::{self, Write};

use noodles_bgzf as bgzf;

use bamid_sam::header::Header;
use bamid_sam::record::{codec, Record, ReferenceBaseSource, SequenceTranslation};

use super::reader::MAGIC;

/// A BAM writer over a BGZF-compressed stream.
pub struct Writer<W>
where
    W: Write,
{
    inner: bgzf::Writer<W>,
    translation: SequenceTranslation,
}

impl<W> Writer<W>
where
    W: Write,
{
    /// Creates a BAM writer with the default compression level.
    pub fn new(inner: W) -> Self {
        Self::from_inner(bgzf::Writer::new(inner))
    }

    /// Creates a BAM writer over an existing BGZF writer.
    pub fn from_inner(inner: bgzf::Writer<W>) -> Self {
        Self {
            inner,
            translation: SequenceTranslation::None,
        }
    }

    /// Sets the sequence translation applied to written records.
    pub fn set_sequence_translation(&mut self, translation: SequenceTranslation) {
        self.translation = translation;
    }

    /// Writes the magic, the header text, and the reference table.
    pub fn write_header(&mut self, header: &Header) -> io::Result<()> {
        self.inner.write_all(&MAGIC)?;

        let text = header.to_string();
        self.write_i32(text.len() as i32)?;
        self.inner.write_all(text.as_bytes())?;

        self.write_i32(header.reference_info().len() as i32)?;

        for (name, length) in header.reference_info().iter() {
            self.write_i32(name.len() as i32 + 1)?;
            self.inner.write_all(name.as_bytes())?;
            self.inner.write_all(&[0])?;
            self.write_i32(length)?;
        }

        Ok(())
    }

    /// Writes one record: its 4-byte block size followed by the record body.
    pub fn write_record(
        &mut self,
        record: &mut Record,
        reference: Option<&dyn ReferenceBaseSource>,
    ) -> io::Result<()> {
        let body = codec::encode(record, self.translation, reference)?;
        let block_size = body.len() as i32;

        self.inner.write_all(&block_size.to_le_bytes())?;
        self.inner.write_all(body)
    }

    /// Flushes remaining data and writes the BGZF end-of-file marker.
    pub fn try_finish(&mut self) -> io::Result<()> {
        self.inner.try_finish()
    }

    /// Finishes the stream and returns the underlying writer.
    pub fn finish(self) -> io::Result<W> {
        self.inner.finish()
    }

    fn write_i32(&mut self, n: i32) -> io::Result<()> {
        self.inner.write_all(&n.to_le_bytes())
    }
}

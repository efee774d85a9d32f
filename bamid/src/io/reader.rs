use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bamid_bam::bai::{self, Chunk};
use bamid_sam::header::Header;
use bamid_sam::record::Record;
use noodles_bgzf::VirtualPosition;

use super::sort::{SortOrder, SortValidator};
use crate::error::{Error, Result};

// BGZF streams open with a gzip member.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

enum Inner {
    Sam(bamid_sam::io::Reader<BufReader<File>>),
    SamStdin(bamid_sam::io::Reader<BufReader<io::Stdin>>),
    Bam(bamid_bam::Reader<File>),
    BamStdin(bamid_bam::Reader<io::Stdin>),
}

struct Section {
    reference_sequence_id: i32,
    pending_name: Option<String>,
    start: i32,
    end: i32,
    chunks: Option<VecDeque<Chunk>>,
    current_chunk_end: VirtualPosition,
}

/// A format-sniffing alignment file reader with sort validation and indexed read sections.
///
/// Opening a path inspects the leading bytes: a gzip member selects the BAM codec over a BGZF
/// stream, anything else the SAM text codec. The pseudo-paths `-`, `-.bam`, and `-.ubam` read
/// from standard input.
pub struct AlignmentReader {
    inner: Inner,
    path: Option<PathBuf>,
    header: Option<Header>,
    index: Option<bai::Index>,
    sort: SortValidator,
    section: Option<Section>,
    record_count: u64,
}

impl AlignmentReader {
    /// Opens an alignment file for reading.
    pub fn open<P>(src: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = src.as_ref();

        let inner = match path.to_str() {
            Some("-") => Inner::SamStdin(bamid_sam::io::Reader::new(BufReader::new(io::stdin()))),
            Some("-.bam") | Some("-.ubam") => Inner::BamStdin(bamid_bam::Reader::new(io::stdin())),
            _ => {
                let mut file = File::open(path).map_err(Error::Io)?;

                let mut magic = [0; 2];
                let is_bgzf = match file.read_exact(&mut magic) {
                    Ok(()) => magic == GZIP_MAGIC,
                    Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => false,
                    Err(e) => return Err(Error::Io(e)),
                };

                file.seek(SeekFrom::Start(0)).map_err(Error::Io)?;

                if is_bgzf {
                    Inner::Bam(bamid_bam::Reader::new(file))
                } else {
                    Inner::Sam(bamid_sam::io::Reader::new(BufReader::new(file)))
                }
            }
        };

        Ok(Self {
            inner,
            path: Some(path.to_path_buf()),
            header: None,
            index: None,
            sort: SortValidator::new(SortOrder::Unsorted),
            section: None,
            record_count: 0,
        })
    }

    /// Sets the sort validation mode.
    pub fn set_sort_order(&mut self, order: SortOrder) {
        self.sort.set_policy(order);
    }

    /// Returns whether the underlying file is a BAM.
    pub fn is_bam(&self) -> bool {
        matches!(self.inner, Inner::Bam(_) | Inner::BamStdin(_))
    }

    /// Reads the header.
    pub fn read_header(&mut self) -> Result<&Header> {
        if self.header.is_some() {
            return Err(Error::Order("header has already been read"));
        }

        let header = match &mut self.inner {
            Inner::Sam(reader) => reader.read_header()?,
            Inner::SamStdin(reader) => reader.read_header()?,
            Inner::Bam(reader) => reader.read_header()?,
            Inner::BamStdin(reader) => reader.read_header()?,
        };

        self.header = Some(header);

        Ok(self.header.as_ref().unwrap())
    }

    /// Returns the header, once read.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Loads the BAI index, defaulting to `<input>.bai`.
    pub fn read_bam_index(&mut self, src: Option<&Path>) -> Result<()> {
        if !self.is_bam() || matches!(self.inner, Inner::BamStdin(_)) {
            return Err(Error::Order(
                "an index can only be loaded for a seekable BAM file",
            ));
        }

        let path = match src {
            Some(path) => path.to_path_buf(),
            None => {
                let mut path = self
                    .path
                    .clone()
                    .ok_or(Error::Order("no input path to derive an index name from"))?;
                let mut name = path.file_name().unwrap_or_default().to_os_string();
                name.push(".bai");
                path.set_file_name(name);
                path
            }
        };

        self.index = Some(bai::read(path)?);

        Ok(())
    }

    /// Returns the loaded index.
    pub fn index(&self) -> Option<&bai::Index> {
        self.index.as_ref()
    }

    /// Restricts subsequent reads to records overlapping `[start, end)` on the given
    /// reference.
    ///
    /// `start`/`end` of `-1` leave the region unbounded; a reference id of `-1` selects the
    /// unmapped tail. The previous-record sort state is reset.
    pub fn set_read_section(
        &mut self,
        reference_sequence_id: i32,
        start: i32,
        end: i32,
    ) -> Result<()> {
        self.check_indexed()?;

        self.section = Some(Section {
            reference_sequence_id,
            pending_name: None,
            start,
            end,
            chunks: None,
            current_chunk_end: VirtualPosition::from(0),
        });

        self.sort.reset_positions();

        Ok(())
    }

    /// Like [`Self::set_read_section`], with the reference given by name.
    ///
    /// The name is resolved against the header on the first read; `*` and the empty string
    /// select the unmapped tail.
    pub fn set_read_section_by_name(&mut self, name: &str, start: i32, end: i32) -> Result<()> {
        self.check_indexed()?;

        let pending_name = match name {
            "" | "*" => None,
            _ => Some(name.to_string()),
        };

        self.section = Some(Section {
            reference_sequence_id: bai::UNMAPPED_REFERENCE_ID,
            pending_name,
            start,
            end,
            chunks: None,
            current_chunk_end: VirtualPosition::from(0),
        });

        self.sort.reset_positions();

        Ok(())
    }

    fn check_indexed(&self) -> Result<()> {
        if !matches!(self.inner, Inner::Bam(_)) {
            return Err(Error::Order(
                "read sections require a seekable BAM file",
            ));
        }

        if self.index.is_none() {
            return Err(Error::Order("read sections require a loaded index"));
        }

        if self.header.is_none() {
            return Err(Error::Order("read sections require the header to be read"));
        }

        Ok(())
    }

    /// Reads the next record, returning `Ok(false)` at the end of the stream or section.
    pub fn read_record(&mut self, record: &mut Record) -> Result<bool> {
        if self.header.is_none() {
            return Err(Error::Order("the header has not been read"));
        }

        if self.section.is_some() {
            return self.read_sectioned_record(record);
        }

        let header = self.header.as_ref().unwrap();

        let n = match &mut self.inner {
            Inner::Sam(reader) => reader.read_record(header, record)?,
            Inner::SamStdin(reader) => reader.read_record(header, record)?,
            Inner::Bam(reader) => reader.read_record(record)?,
            Inner::BamStdin(reader) => reader.read_record(record)?,
        };

        if n == 0 {
            return Ok(false);
        }

        self.sort.validate(record, header, self.record_count)?;
        self.record_count += 1;

        Ok(true)
    }

    fn read_sectioned_record(&mut self, record: &mut Record) -> Result<bool> {
        self.resolve_section_chunks()?;

        let header = self.header.as_ref().unwrap();
        let section = self.section.as_mut().unwrap();

        let Inner::Bam(reader) = &mut self.inner else {
            return Err(Error::Order("read sections require a seekable BAM file"));
        };

        loop {
            if reader.virtual_position() >= section.current_chunk_end {
                let chunks = section.chunks.as_mut().unwrap();

                let Some(chunk) = chunks.pop_front() else {
                    return Ok(false);
                };

                if chunk.start() != reader.virtual_position() {
                    reader.seek(chunk.start()).map_err(Error::Io)?;
                }

                section.current_chunk_end = chunk.end();
            }

            if reader.read_record(record)? == 0 {
                section.current_chunk_end = VirtualPosition::from(0);
                continue;
            }

            if record.reference_sequence_id() != section.reference_sequence_id {
                return Ok(false);
            }

            if section.start != -1 && section.end != -1 {
                if record.position() >= section.end {
                    return Ok(false);
                }

                if record.alignment_end() < section.start {
                    continue;
                }
            }

            break;
        }

        self.sort.validate(record, header, self.record_count)?;
        self.record_count += 1;

        Ok(true)
    }

    fn resolve_section_chunks(&mut self) -> Result<()> {
        let header = self.header.as_ref().unwrap();
        let index = self
            .index
            .as_ref()
            .ok_or(Error::Order("read sections require a loaded index"))?;
        let section = self.section.as_mut().unwrap();

        if section.chunks.is_some() {
            return Ok(());
        }

        if let Some(name) = section.pending_name.take() {
            // An unknown name resolves to the unmapped sentinel, like the reference table
            // lookup it replaces.
            section.reference_sequence_id = header
                .reference_id(&name)
                .map(|id| id as i32)
                .unwrap_or(bai::UNMAPPED_REFERENCE_ID);
        }

        let chunks = index.query(section.reference_sequence_id, section.start, section.end)?;
        section.chunks = Some(chunks.into());
        section.current_chunk_end = VirtualPosition::from(0);

        Ok(())
    }

    /// Counts the bases of the record aligned inside the current read section.
    pub fn num_overlaps(&self, record: &Record) -> u32 {
        match &self.section {
            Some(section) => record.num_overlaps(section.start, section.end),
            None => record.num_overlaps(-1, -1),
        }
    }

    /// Returns the number of records surfaced so far.
    pub fn record_count(&self) -> u64 {
        self.record_count
    }
}

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use bamid_sam::header::Header;
use bamid_sam::record::{Record, ReferenceBaseSource, SequenceTranslation};
use noodles_bgzf as bgzf;

use crate::error::{Error, Result};

enum Inner {
    Sam(bamid_sam::io::Writer<Box<dyn Write>>),
    Bam(bamid_bam::Writer<Box<dyn Write>>),
}

/// An alignment file writer selecting its format from the output path.
///
/// `.bam` writes BGZF-compressed BAM, `.ubam` BAM over an uncompressed BGZF stream, anything
/// else SAM text. The pseudo-paths `-`, `-.bam`, and `-.ubam` write to standard output.
pub struct AlignmentWriter {
    inner: Inner,
    header_written: bool,
}

impl AlignmentWriter {
    /// Opens an alignment file for writing.
    pub fn create<P>(dst: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = dst.as_ref();

        let (sink, name): (Box<dyn Write>, &str) = match path.to_str() {
            Some(name @ ("-" | "-.bam" | "-.ubam")) => (Box::new(io::stdout()), name),
            _ => {
                let file = File::create(path).map_err(Error::Io)?;
                let name = path.to_str().unwrap_or_default();
                (Box::new(file), name)
            }
        };

        let inner = if name.ends_with(".bam") {
            Inner::Bam(bamid_bam::Writer::new(sink))
        } else if name.ends_with(".ubam") {
            let bgzf_writer = bgzf::writer::Builder::default()
                .set_compression_level(bgzf::writer::CompressionLevel::none())
                .build_with_writer(sink);
            Inner::Bam(bamid_bam::Writer::from_inner(bgzf_writer))
        } else {
            Inner::Sam(bamid_sam::io::Writer::new(sink))
        };

        Ok(Self {
            inner,
            header_written: false,
        })
    }

    /// Sets the sequence translation applied to written records.
    pub fn set_sequence_translation(&mut self, translation: SequenceTranslation) {
        match &mut self.inner {
            Inner::Sam(writer) => writer.set_sequence_translation(translation),
            Inner::Bam(writer) => writer.set_sequence_translation(translation),
        }
    }

    /// Writes the header. Must be called exactly once, before any record.
    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        if self.header_written {
            return Err(Error::Order("header has already been written"));
        }

        match &mut self.inner {
            Inner::Sam(writer) => writer.write_header(header)?,
            Inner::Bam(writer) => writer.write_header(header)?,
        }

        self.header_written = true;

        Ok(())
    }

    /// Writes one record.
    pub fn write_record(
        &mut self,
        header: &Header,
        record: &mut Record,
        reference: Option<&dyn ReferenceBaseSource>,
    ) -> Result<()> {
        if !self.header_written {
            return Err(Error::Order("the header has not been written"));
        }

        match &mut self.inner {
            Inner::Sam(writer) => writer.write_record(header, record, reference)?,
            Inner::Bam(writer) => writer.write_record(record, reference)?,
        }

        Ok(())
    }

    /// Flushes buffered data; for BAM, writes the BGZF end-of-file marker.
    pub fn finish(&mut self) -> Result<()> {
        match &mut self.inner {
            Inner::Sam(writer) => Ok(writer.flush()?),
            Inner::Bam(writer) => Ok(writer.try_finish()?),
        }
    }
}

use std::io::{self, Write};

use crate::header::Header;
use crate::record::{Record, ReferenceBaseSource, SequenceTranslation};

/// A SAM text writer.
pub struct Writer<W> {
    inner: W,
    translation: SequenceTranslation,
}

impl<W> Writer<W>
where
    W: Write,
{
    /// Creates a SAM writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            translation: SequenceTranslation::None,
        }
    }

    /// Sets the sequence translation applied to written records.
    pub fn set_sequence_translation(&mut self, translation: SequenceTranslation) {
        self.translation = translation;
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    /// Writes the header text.
    pub fn write_header(&mut self, header: &Header) -> io::Result<()> {
        write!(self.inner, "{}", header)
    }

    /// Writes one record as a tab-delimited line.
    pub fn write_record(
        &mut self,
        header: &Header,
        record: &Record,
        reference: Option<&dyn ReferenceBaseSource>,
    ) -> io::Result<()> {
        let qname = if record.read_name().is_empty() {
            &b"*"[..]
        } else {
            record.read_name().as_ref()
        };
        self.inner.write_all(qname)?;

        write!(self.inner, "\t{}", u16::from(record.flags()))?;

        write!(
            self.inner,
            "\t{}",
            reference_name(header, record.reference_sequence_id())?
        )?;

        write!(self.inner, "\t{}", record.position() + 1)?;
        write!(self.inner, "\t{}", record.mapping_quality())?;
        write!(self.inner, "\t{}", record.cigar())?;

        let rnext = if record.mate_reference_sequence_id() == -1 {
            "*"
        } else if record.mate_reference_sequence_id() == record.reference_sequence_id() {
            "="
        } else {
            reference_name(header, record.mate_reference_sequence_id())?
        };
        write!(self.inner, "\t{}", rnext)?;

        write!(self.inner, "\t{}", record.mate_position() + 1)?;
        write!(self.inner, "\t{}", record.template_length())?;

        if record.sequence().is_empty() {
            self.inner.write_all(b"\t*")?;
        } else {
            self.inner.write_all(b"\t")?;
            let bases = record.translated_sequence(self.translation, reference);
            self.inner.write_all(&bases)?;
        }

        if record.quality_scores().is_empty() {
            self.inner.write_all(b"\t*")?;
        } else {
            self.inner.write_all(b"\t")?;
            self.inner.write_all(&record.quality_scores().to_ascii())?;
        }

        for (tag, value) in record.data().iter() {
            write!(
                self.inner,
                "\t{}{}:{}:{}",
                tag[0] as char,
                tag[1] as char,
                value.type_char(),
                value
            )?;
        }

        self.inner.write_all(b"\n")
    }
}

fn reference_name(header: &Header, id: i32) -> io::Result<&str> {
    if id == -1 {
        return Ok("*");
    }

    header
        .reference_info()
        .name(id as usize)
        .or_else(|| {
            header
                .reference_sequences()
                .nth(id as usize)
                .map(|(name, _)| name)
        })
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown reference sequence id: {}", id),
            )
        })
}

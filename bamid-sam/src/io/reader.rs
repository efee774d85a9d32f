use std::io::{self, BufRead};

use bstr::BString;

use crate::header::Header;
use crate::record::data::{Tag, Value};
use crate::record::{QualityScores, Record, Sequence};

/// A SAM text reader.
///
/// The header is consumed line by line; the first non-header line is buffered and delivered on
/// the next record read.
pub struct Reader<R> {
    inner: R,
    pending: Option<String>,
}

impl<R> Reader<R>
where
    R: BufRead,
{
    /// Creates a SAM reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: None,
        }
    }

    /// Reads the header: all leading lines starting with `@`.
    ///
    /// The reference table is generated from the `@SQ` records.
    pub fn read_header(&mut self) -> io::Result<Header> {
        let mut header = Header::new();

        loop {
            let mut line = String::new();

            if self.inner.read_line(&mut line)? == 0 {
                break;
            }

            trim_line(&mut line);

            if line.is_empty() {
                continue;
            }

            if !line.starts_with('@') {
                self.pending = Some(line);
                break;
            }

            header.push_line(&line).map_err(invalid_data)?;
        }

        header.generate_reference_info().map_err(invalid_data)?;

        Ok(header)
    }

    /// Reads one record, returning `Ok(0)` at end of stream.
    pub fn read_record(&mut self, header: &Header, record: &mut Record) -> io::Result<usize> {
        let line = match self.pending.take() {
            Some(line) => line,
            None => {
                let mut line = String::new();

                if self.inner.read_line(&mut line)? == 0 {
                    return Ok(0);
                }

                trim_line(&mut line);
                line
            }
        };

        parse_record(&line, header, record)?;

        Ok(line.len())
    }
}

fn trim_line(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();

        if line.ends_with('\r') {
            line.pop();
        }
    }
}

fn parse_record(line: &str, header: &Header, record: &mut Record) -> io::Result<()> {
    record.reset();

    let mut fields = line.split('\t');

    let qname = next_field(&mut fields, "QNAME")?;
    record.set_read_name(BString::from(qname));

    let flag: u16 = next_field(&mut fields, "FLAG")?
        .parse()
        .map_err(|_| invalid_data("FLAG is not an integer in [0, 65535]"))?;
    record.set_flags(flag.into());

    let rname = next_field(&mut fields, "RNAME")?;
    let reference_sequence_id = parse_reference(rname, header, None)?;
    record.set_reference_sequence_id(reference_sequence_id);

    let pos: i32 = next_field(&mut fields, "POS")?
        .parse()
        .map_err(|_| invalid_data("POS is not a signed 32-bit integer"))?;
    record.set_position(pos - 1);

    let mapq: u8 = next_field(&mut fields, "MAPQ")?
        .parse()
        .map_err(|_| invalid_data("MAPQ is not an integer in [0, 255]"))?;
    record.set_mapping_quality(mapq);

    let cigar = next_field(&mut fields, "CIGAR")?
        .parse()
        .map_err(invalid_data)?;
    record.set_cigar(cigar);

    let rnext = next_field(&mut fields, "RNEXT")?;
    let mate_reference_sequence_id = parse_reference(rnext, header, Some(reference_sequence_id))?;
    record.set_mate_reference_sequence_id(mate_reference_sequence_id);

    let pnext: i32 = next_field(&mut fields, "PNEXT")?
        .parse()
        .map_err(|_| invalid_data("PNEXT is not a signed 32-bit integer"))?;
    record.set_mate_position(pnext - 1);

    let tlen: i32 = next_field(&mut fields, "TLEN")?
        .parse()
        .map_err(|_| invalid_data("TLEN is not a signed 32-bit integer"))?;
    record.set_template_length(tlen);

    let seq = next_field(&mut fields, "SEQ")?;
    if seq != "*" {
        if !seq
            .bytes()
            .all(|b| matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T' | b'N' | b'=' | b'.'))
        {
            return Err(invalid_data("SEQ contains invalid bases"));
        }

        record.set_sequence(Sequence::from_bases(seq.as_bytes().to_vec()));
    }

    let qual = next_field(&mut fields, "QUAL")?;
    if qual != "*" {
        if qual.len() != record.sequence().len() {
            return Err(invalid_data("QUAL length differs from SEQ length"));
        }

        let scores = QualityScores::from_ascii(qual.as_bytes())
            .ok_or_else(|| invalid_data("QUAL contains characters outside [!, ~]"))?;
        record.set_quality_scores(scores);
    }

    for field in fields {
        let (tag, value) = parse_data_field(field)?;
        record.data_mut().push(tag, value);
    }

    Ok(())
}

fn next_field<'a>(fields: &mut std::str::Split<'a, char>, name: &str) -> io::Result<&'a str> {
    fields
        .next()
        .ok_or_else(|| invalid_data(format!("missing {} field", name)))
}

fn parse_reference(name: &str, header: &Header, same_as: Option<i32>) -> io::Result<i32> {
    match name {
        "*" => Ok(-1),
        "=" => same_as.ok_or_else(|| invalid_data("RNAME cannot be =")),
        _ => header
            .reference_id(name)
            .map(|id| id as i32)
            .ok_or_else(|| invalid_data(format!("unknown reference sequence name: {}", name))),
    }
}

fn parse_data_field(s: &str) -> io::Result<(Tag, Value)> {
    let mut parts = s.splitn(3, ':');

    let tag = parts
        .next()
        .filter(|t| t.len() == 2)
        .ok_or_else(|| invalid_data(format!("invalid data field: {}", s)))?;
    let ty = parts
        .next()
        .filter(|t| t.len() == 1)
        .ok_or_else(|| invalid_data(format!("invalid data field: {}", s)))?;
    let raw = parts
        .next()
        .ok_or_else(|| invalid_data(format!("invalid data field: {}", s)))?;

    let value = match ty {
        "A" => {
            let mut chars = raw.bytes();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Value::Character(c),
                _ => return Err(invalid_data("A value is not a single character")),
            }
        }
        "i" => Value::Int(
            raw.parse()
                .map_err(|_| invalid_data(format!("invalid integer value: {}", raw)))?,
        ),
        "f" => Value::Float(
            raw.parse()
                .map_err(|_| invalid_data(format!("invalid float value: {}", raw)))?,
        ),
        "Z" => Value::String(BString::from(raw)),
        _ => return Err(invalid_data(format!("unknown data field type: {}", ty))),
    };

    let tag_bytes = tag.as_bytes();

    Ok(([tag_bytes[0], tag_bytes[1]], value))
}

fn invalid_data<E>(e: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, e)
}

#[cfg(test)]
mod tests {
    use super::*;

    static SAM: &str = "@HD\tVN:1.3\tSO:coordinate\n\
@SQ\tSN:1\tLN:1000\n\
@SQ\tSN:2\tLN:800\n\
r001\t99\t1\t7\t30\t8M\t=\t37\t39\tTTAGATAA\tIIIIIIII\tRG:Z:rg0\tNM:i:1\n\
r002\t0\t2\t9\t30\t3S6M\t*\t0\t0\tAAAAGATAA\t*\n";

    #[test]
    fn test_read_header_and_records() -> io::Result<()> {
        let mut reader = Reader::new(SAM.as_bytes());
        let header = reader.read_header()?;

        assert_eq!(header.reference_sequences().count(), 2);

        let mut record = Record::new();

        assert!(reader.read_record(&header, &mut record)? > 0);
        assert_eq!(record.read_name(), "r001");
        assert_eq!(u16::from(record.flags()), 99);
        assert_eq!(record.reference_sequence_id(), 0);
        assert_eq!(record.position(), 6);
        assert_eq!(record.mate_reference_sequence_id(), 0);
        assert_eq!(record.mate_position(), 36);
        assert_eq!(record.template_length(), 39);
        assert_eq!(record.sequence().as_bytes(), b"TTAGATAA");
        assert_eq!(record.quality_scores().as_slice(), [40; 8]);
        assert_eq!(record.data().get(*b"NM").and_then(|v| v.as_int()), Some(1));

        assert!(reader.read_record(&header, &mut record)? > 0);
        assert_eq!(record.reference_sequence_id(), 1);
        assert_eq!(record.position(), 8);
        assert_eq!(record.mate_reference_sequence_id(), -1);
        assert_eq!(record.mate_position(), -1);
        assert!(record.quality_scores().is_empty());

        assert_eq!(reader.read_record(&header, &mut record)?, 0);

        Ok(())
    }

    #[test]
    fn test_read_record_with_unknown_reference() {
        let sam = "@SQ\tSN:1\tLN:1000\nr1\t0\tchrZ\t1\t0\t4M\t*\t0\t0\tACGT\t*\n";
        let mut reader = Reader::new(sam.as_bytes());
        let header = reader.read_header().unwrap();

        let mut record = Record::new();
        assert!(reader.read_record(&header, &mut record).is_err());
    }

    #[test]
    fn test_read_record_with_invalid_quality_length() {
        let sam = "@SQ\tSN:1\tLN:1000\nr1\t0\t1\t1\t0\t4M\t*\t0\t0\tACGT\tII\n";
        let mut reader = Reader::new(sam.as_bytes());
        let header = reader.read_header().unwrap();

        let mut record = Record::new();
        assert!(reader.read_record(&header, &mut record).is_err());
    }

    #[test]
    fn test_read_record_with_too_few_fields() {
        let sam = "@SQ\tSN:1\tLN:1000\nr1\t0\t1\t1\t0\n";
        let mut reader = Reader::new(sam.as_bytes());
        let header = reader.read_header().unwrap();

        let mut record = Record::new();
        assert!(reader.read_record(&header, &mut record).is_err());
    }

    #[test]
    fn test_unmapped_position_maps_to_negative_one() -> io::Result<()> {
        let sam = "@SQ\tSN:1\tLN:1000\nr1\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\t*\n";
        let mut reader = Reader::new(sam.as_bytes());
        let header = reader.read_header()?;

        let mut record = Record::new();
        reader.read_record(&header, &mut record)?;

        assert_eq!(record.reference_sequence_id(), -1);
        assert_eq!(record.position(), -1);
        assert!(record.cigar().is_empty());

        Ok(())
    }
}

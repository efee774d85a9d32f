//! BAM record body codec: the binary side of the record's dual representation.

use std::io::{self, Read};

use bstr::BString;

use super::{
    quality_scores, Data, Fields, Flags, QualityScores, Record, ReferenceBaseSource, Repr,
    Sequence, SequenceTranslation,
};
use crate::cigar::Cigar;

pub(crate) const REFERENCE_SEQUENCE_ID_OFFSET: usize = 0;
pub(crate) const POSITION_OFFSET: usize = 4;
pub(crate) const READ_NAME_LENGTH_OFFSET: usize = 8;
pub(crate) const MAPPING_QUALITY_OFFSET: usize = 9;
pub(crate) const BIN_OFFSET: usize = 10;
pub(crate) const CIGAR_OP_COUNT_OFFSET: usize = 12;
pub(crate) const FLAGS_OFFSET: usize = 14;
pub(crate) const SEQUENCE_LENGTH_OFFSET: usize = 16;
pub(crate) const MATE_REFERENCE_SEQUENCE_ID_OFFSET: usize = 20;
pub(crate) const MATE_POSITION_OFFSET: usize = 24;
pub(crate) const TEMPLATE_LENGTH_OFFSET: usize = 28;

const FIXED_PREFIX_LEN: usize = 32;

/// Reads a BAM record body of the given size into the record as its buffer representation.
///
/// The body is structurally validated but not decoded; the decoded fields materialize on
/// first access.
pub fn read_body<R>(reader: &mut R, block_size: usize, record: &mut Record) -> io::Result<()>
where
    R: Read,
{
    record.buf.resize(block_size, 0);

    if let Err(e) = reader.read_exact(&mut record.buf) {
        record.reset();
        return Err(e);
    }

    accept_buffer(record)
}

/// Replaces the record contents with the given raw BAM record body, validated but not
/// decoded.
pub fn decode(record: &mut Record, src: &[u8]) -> io::Result<()> {
    record.buf.clear();
    record.buf.extend_from_slice(src);
    accept_buffer(record)
}

fn accept_buffer(record: &mut Record) -> io::Result<()> {
    match validate_body(&record.buf) {
        Ok(()) => {
            record.fields.take();
            record.repr.set(Repr::Buffer);
            Ok(())
        }
        Err(e) => {
            // A rejected body must not be readable through the buffer state; the record
            // comes back reset.
            record.reset();
            Err(e)
        }
    }
}

// Walks the body layout without materializing anything, so that a later decode of the same
// bytes cannot fail.
fn validate_body(buf: &[u8]) -> io::Result<()> {
    if buf.len() < FIXED_PREFIX_LEN {
        return Err(invalid_data("record body shorter than the fixed prefix"));
    }

    let l_read_name = usize::from(buf[READ_NAME_LENGTH_OFFSET]);
    let n_cigar_op = usize::from(get_u16_le(buf, CIGAR_OP_COUNT_OFFSET));

    let l_seq = get_i32_le(buf, SEQUENCE_LENGTH_OFFSET);
    if l_seq < 0 {
        return Err(invalid_data("negative sequence length"));
    }
    let l_seq = l_seq as usize;

    let mut offset = FIXED_PREFIX_LEN;

    let name = section(buf, &mut offset, l_read_name)?;
    if name.last() != Some(&0) {
        return Err(invalid_data("read name is not NUL-terminated"));
    }

    let cigar_bytes = section(buf, &mut offset, n_cigar_op * 4)?;
    for chunk in cigar_bytes.chunks_exact(4) {
        let word = u32::from_le_bytes(chunk.try_into().unwrap());
        crate::cigar::op::Kind::from_op_code(word & 0x0f).map_err(invalid_data)?;
    }

    section(buf, &mut offset, l_seq.div_ceil(2))?;
    section(buf, &mut offset, l_seq)?;

    Data::validate(&buf[offset..]).map_err(invalid_data)?;

    Ok(())
}

// Materializes the decoded fields of a validated body.
pub(crate) fn decode_fields(buf: &[u8]) -> io::Result<Fields> {
    let mut fields = Fields::default();

    fields.reference_sequence_id = get_i32_le(buf, REFERENCE_SEQUENCE_ID_OFFSET);
    fields.position = get_i32_le(buf, POSITION_OFFSET);

    let l_read_name = usize::from(buf[READ_NAME_LENGTH_OFFSET]);
    fields.mapping_quality = buf[MAPPING_QUALITY_OFFSET];
    fields.bin.set(Some(get_u16_le(buf, BIN_OFFSET)));

    let n_cigar_op = usize::from(get_u16_le(buf, CIGAR_OP_COUNT_OFFSET));
    fields.flags = Flags::from(get_u16_le(buf, FLAGS_OFFSET));

    let l_seq = get_i32_le(buf, SEQUENCE_LENGTH_OFFSET);
    if l_seq < 0 {
        return Err(invalid_data("negative sequence length"));
    }
    let l_seq = l_seq as usize;

    fields.mate_reference_sequence_id = get_i32_le(buf, MATE_REFERENCE_SEQUENCE_ID_OFFSET);
    fields.mate_position = get_i32_le(buf, MATE_POSITION_OFFSET);
    fields.template_length = get_i32_le(buf, TEMPLATE_LENGTH_OFFSET);

    let mut offset = FIXED_PREFIX_LEN;

    let name = section(buf, &mut offset, l_read_name)?;
    fields.read_name = match name.split_last() {
        Some((0, rest)) => BString::from(rest),
        _ => return Err(invalid_data("read name is not NUL-terminated")),
    };

    let cigar_bytes = section(buf, &mut offset, n_cigar_op * 4)?;
    let words: Vec<u32> = cigar_bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes(chunk.try_into().unwrap()))
        .collect();
    fields.cigar = Cigar::from_packed(&words).map_err(invalid_data)?;

    let seq_bytes = section(buf, &mut offset, l_seq.div_ceil(2))?;
    fields.sequence = Sequence::from_packed(seq_bytes, l_seq);

    let qual_bytes = section(buf, &mut offset, l_seq)?;
    fields.quality_scores = if qual_bytes.iter().all(|&b| b == quality_scores::MISSING) {
        QualityScores::default()
    } else {
        QualityScores::from_scores(qual_bytes.to_vec())
    };

    fields.data = Data::decode(&buf[offset..]).map_err(invalid_data)?;

    Ok(fields)
}

/// Serializes the record as a BAM record body under the given sequence translation, returning
/// the buffer.
///
/// When the buffer already reflects the requested translation — including an undecoded buffer
/// written back untranslated — it is returned as is, byte for byte.
pub fn encode<'r>(
    record: &'r mut Record,
    translation: SequenceTranslation,
    reference: Option<&dyn ReferenceBaseSource>,
) -> io::Result<&'r [u8]> {
    // Without a reference there is nothing to translate against.
    let translation = if reference.is_some() {
        translation
    } else {
        SequenceTranslation::None
    };

    match record.repr.get() {
        Repr::Both(cached) if cached == translation => return Ok(&record.buf),
        // A raw buffer reflects the file's bases as read.
        Repr::Buffer if translation == SequenceTranslation::None => return Ok(&record.buf),
        _ => {}
    }

    let bin = record.bin();
    let bases = record.translated_sequence(translation, reference);

    // The buffer is invalid until the serialization below completes.
    record.repr.set(Repr::Decoded);

    let mut buf = std::mem::take(&mut record.buf);
    buf.clear();

    let Some(fields) = record.fields.get() else {
        // translated_sequence above forces the decode.
        unreachable!()
    };

    let name_len = fields.read_name.len() + 1;
    let l_read_name =
        u8::try_from(name_len).map_err(|_| invalid_input("read name too long"))?;

    let cigar_words = fields.cigar.to_packed();
    let n_cigar_op =
        u16::try_from(cigar_words.len()).map_err(|_| invalid_input("too many CIGAR operations"))?;

    let l_seq = bases.len();

    if !fields.quality_scores.is_empty() && fields.quality_scores.len() != l_seq {
        return Err(invalid_input(
            "sequence and quality scores have different lengths",
        ));
    }

    let packed_seq = super::sequence::pack_bases(&bases).map_err(invalid_input)?;

    buf.extend_from_slice(&fields.reference_sequence_id.to_le_bytes());
    buf.extend_from_slice(&fields.position.to_le_bytes());
    buf.push(l_read_name);
    buf.push(fields.mapping_quality);
    buf.extend_from_slice(&bin.to_le_bytes());
    buf.extend_from_slice(&n_cigar_op.to_le_bytes());
    buf.extend_from_slice(&u16::from(fields.flags).to_le_bytes());
    buf.extend_from_slice(&(l_seq as i32).to_le_bytes());
    buf.extend_from_slice(&fields.mate_reference_sequence_id.to_le_bytes());
    buf.extend_from_slice(&fields.mate_position.to_le_bytes());
    buf.extend_from_slice(&fields.template_length.to_le_bytes());

    buf.extend_from_slice(&fields.read_name);
    buf.push(0);

    for word in cigar_words {
        buf.extend_from_slice(&word.to_le_bytes());
    }

    buf.extend_from_slice(&packed_seq);

    if fields.quality_scores.is_empty() {
        buf.resize(buf.len() + l_seq, quality_scores::MISSING);
    } else {
        buf.extend_from_slice(fields.quality_scores.as_slice());
    }

    fields.data.encode(&mut buf).map_err(invalid_input)?;

    record.buf = buf;
    record.repr.set(Repr::Both(translation));

    Ok(&record.buf)
}

fn section<'a>(buf: &'a [u8], offset: &mut usize, len: usize) -> io::Result<&'a [u8]> {
    let end = offset
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| invalid_data("record body ends mid-section"))?;

    let section = &buf[*offset..end];
    *offset = end;

    Ok(section)
}

pub(crate) fn get_i32_le(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

pub(crate) fn get_u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(buf[offset..offset + 2].try_into().unwrap())
}

fn invalid_data<E>(e: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, e)
}

fn invalid_input<E>(e: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidInput, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::data::Value;

    fn sample_record() -> Record {
        let mut record = Record::new();
        record.set_reference_sequence_id(1);
        record.set_position(99);
        record.set_mapping_quality(37);
        record.set_flags(Flags::PAIRED | Flags::PROPER_PAIR);
        record.set_mate_reference_sequence_id(1);
        record.set_mate_position(150);
        record.set_template_length(180);
        record.set_read_name(BString::from("read.1"));
        record.set_cigar("2S6M".parse().unwrap());
        record.set_sequence(Sequence::from_bases(b"TTACGTAC".to_vec()));
        record.set_quality_scores(QualityScores::from_scores(vec![30; 8]));
        record
            .data_mut()
            .push(*b"RG", Value::String(BString::from("rg0")));
        record
    }

    #[test]
    fn test_encode_decode_round_trip() -> io::Result<()> {
        let mut record = sample_record();

        let body = encode(&mut record, SequenceTranslation::None, None)?.to_vec();

        let mut decoded = Record::new();
        decode(&mut decoded, &body)?;

        assert_eq!(decoded.reference_sequence_id(), 1);
        assert_eq!(decoded.position(), 99);
        assert_eq!(decoded.mapping_quality(), 37);
        assert_eq!(decoded.flags(), Flags::PAIRED | Flags::PROPER_PAIR);
        assert_eq!(decoded.mate_position(), 150);
        assert_eq!(decoded.template_length(), 180);
        assert_eq!(decoded.read_name(), "read.1");
        assert_eq!(decoded.cigar().to_string(), "2S6M");
        assert_eq!(decoded.sequence().as_bytes(), b"TTACGTAC");
        assert_eq!(decoded.quality_scores().as_slice(), [30; 8]);
        assert_eq!(
            decoded.data().get(*b"RG").and_then(|v| v.as_str()),
            Some(&b"rg0"[..])
        );

        Ok(())
    }

    #[test]
    fn test_fixed_fields_answer_from_an_undecoded_buffer() -> io::Result<()> {
        let mut record = sample_record();
        let body = encode(&mut record, SequenceTranslation::None, None)?.to_vec();

        let mut buffered = Record::new();
        decode(&mut buffered, &body)?;

        // The fixed prefix is served straight from the buffer; nothing decodes.
        assert_eq!(buffered.repr.get(), Repr::Buffer);
        assert_eq!(buffered.reference_sequence_id(), 1);
        assert_eq!(buffered.position(), 99);
        assert_eq!(buffered.mapping_quality(), 37);
        assert_eq!(buffered.flags(), Flags::PAIRED | Flags::PROPER_PAIR);
        assert_eq!(buffered.bin(), record.bin());
        assert!(buffered.fields.get().is_none());
        assert_eq!(buffered.repr.get(), Repr::Buffer);

        // The first variable-length access materializes the fields.
        assert_eq!(buffered.read_name(), "read.1");
        assert!(buffered.fields.get().is_some());
        assert_eq!(buffered.repr.get(), Repr::Both(SequenceTranslation::None));

        Ok(())
    }

    #[test]
    fn test_encode_reuses_an_undecoded_buffer() -> io::Result<()> {
        let mut record = sample_record();
        let body = encode(&mut record, SequenceTranslation::None, None)?.to_vec();

        let mut buffered = Record::new();
        decode(&mut buffered, &body)?;

        // An untouched record writes back as the raw bytes, without ever decoding.
        let rewritten = encode(&mut buffered, SequenceTranslation::None, None)?;
        assert_eq!(rewritten, body);
        assert!(buffered.fields.get().is_none());

        Ok(())
    }

    #[test]
    fn test_mutation_invalidates_the_buffer() -> io::Result<()> {
        let mut record = sample_record();
        let body = encode(&mut record, SequenceTranslation::None, None)?.to_vec();

        let mut buffered = Record::new();
        decode(&mut buffered, &body)?;

        buffered.set_mapping_quality(11);
        assert_eq!(buffered.repr.get(), Repr::Decoded);

        let rewritten = encode(&mut buffered, SequenceTranslation::None, None)?;
        assert_ne!(rewritten, body);

        let mut reread = Record::new();
        decode(&mut reread, &rewritten.to_vec())?;
        assert_eq!(reread.mapping_quality(), 11);

        Ok(())
    }

    #[test]
    fn test_encode_fills_missing_quality_scores() -> io::Result<()> {
        let mut record = sample_record();
        record.set_quality_scores(QualityScores::default());

        let body = encode(&mut record, SequenceTranslation::None, None)?.to_vec();

        let mut decoded = Record::new();
        decode(&mut decoded, &body)?;
        assert!(decoded.quality_scores().is_empty());

        Ok(())
    }

    #[test]
    fn test_encode_rejects_length_mismatch() {
        let mut record = sample_record();
        record.set_quality_scores(QualityScores::from_scores(vec![30; 4]));

        assert!(encode(&mut record, SequenceTranslation::None, None).is_err());
    }

    #[test]
    fn test_decode_rejects_truncated_body() {
        let mut record = sample_record();
        let body = encode(&mut record, SequenceTranslation::None, None)
            .unwrap()
            .to_vec();

        let mut decoded = Record::new();
        assert!(decode(&mut decoded, &body[..FIXED_PREFIX_LEN + 2]).is_err());
        assert!(decode(&mut decoded, &body[..12]).is_err());
    }

    #[test]
    fn test_rejected_buffer_leaves_the_record_reset() -> io::Result<()> {
        let mut record = sample_record();
        let body = encode(&mut record, SequenceTranslation::None, None)?.to_vec();

        let mut target = Record::new();
        decode(&mut target, &body)?;
        assert!(decode(&mut target, &body[..12]).is_err());

        // The failed fill did not install a broken buffer state.
        assert_eq!(target.repr.get(), Repr::Decoded);
        assert_eq!(target.position(), -1);
        assert_eq!(target.read_name(), "*");

        Ok(())
    }

    #[test]
    fn test_decoded_bin_is_kept_until_mutation() -> io::Result<()> {
        let mut record = sample_record();
        let expected = record.bin();

        let body = encode(&mut record, SequenceTranslation::None, None)?.to_vec();

        let mut decoded = Record::new();
        decode(&mut decoded, &body)?;
        assert_eq!(decoded.bin(), expected);

        decoded.set_position(1 << 20);
        assert_ne!(decoded.bin(), expected);

        Ok(())
    }
}

//! SAM record model with a lazily synchronized binary (BAM body) representation.

pub mod codec;
pub mod data;
pub mod flags;
pub mod quality_scores;
pub mod sequence;

pub use self::data::Data;
pub use self::flags::Flags;
pub use self::quality_scores::QualityScores;
pub use self::sequence::Sequence;

use std::cell::{Cell, OnceCell};

use bstr::{BStr, BString, ByteSlice};

use crate::cigar::Cigar;

/// How record sequences are rewritten against the reference on output.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SequenceTranslation {
    /// Bases are written as stored.
    #[default]
    None,
    /// Bases matching the reference are written as `=`.
    Equal,
    /// `=` bases are expanded to the reference base.
    Bases,
}

/// Resolves reference bases for sequence translation.
///
/// The provider is borrowed read-only and must outlive any record using it.
pub trait ReferenceBaseSource {
    /// Returns the uppercase base at a 0-based position of the given reference sequence.
    fn base(&self, reference_sequence_id: usize, position: u32) -> Option<u8>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Repr {
    // Only the raw buffer is valid; the decoded fields materialize on first access.
    Buffer,
    // Only the decoded fields are valid.
    Decoded,
    // The decoded fields and the binary buffer agree; the buffer reflects the given
    // sequence translation.
    Both(SequenceTranslation),
}

#[derive(Clone, Debug)]
pub(crate) struct Fields {
    pub(crate) reference_sequence_id: i32,
    pub(crate) position: i32,
    pub(crate) mapping_quality: u8,
    pub(crate) flags: Flags,
    pub(crate) mate_reference_sequence_id: i32,
    pub(crate) mate_position: i32,
    pub(crate) template_length: i32,
    pub(crate) read_name: BString,
    pub(crate) cigar: Cigar,
    pub(crate) sequence: Sequence,
    pub(crate) quality_scores: QualityScores,
    pub(crate) data: Data,
    pub(crate) bin: Cell<Option<u16>>,
}

impl Default for Fields {
    fn default() -> Self {
        Self {
            reference_sequence_id: -1,
            position: -1,
            mapping_quality: 0,
            flags: Flags::default(),
            mate_reference_sequence_id: -1,
            mate_position: -1,
            template_length: 0,
            read_name: BString::from("*"),
            cigar: Cigar::new(),
            sequence: Sequence::default(),
            quality_scores: QualityScores::default(),
            data: Data::default(),
            bin: Cell::new(None),
        }
    }
}

/// A SAM/BAM alignment record.
///
/// The record keeps its raw BAM body and its decoded fields side by side as a tagged state:
/// a freshly read record holds only the (structurally validated) buffer, fixed-prefix
/// accessors answer straight from it, and the first variable-length access decodes the body
/// into the fields. Mutators invalidate the buffer; [`codec::encode`] rebuilds it on demand
/// and remembers which sequence translation the buffer reflects, so an untouched record
/// written back out moves as raw bytes.
#[derive(Clone, Debug)]
pub struct Record {
    pub(crate) buf: Vec<u8>,
    pub(crate) fields: OnceCell<Fields>,
    pub(crate) repr: Cell<Repr>,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            buf: Vec::new(),
            fields: OnceCell::from(Fields::default()),
            repr: Cell::new(Repr::Decoded),
        }
    }
}

impl Record {
    /// Creates an empty, unmapped record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the record to its default state, keeping the buffer allocation.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.fields = OnceCell::from(Fields::default());
        self.repr.set(Repr::Decoded);
    }

    // Reads a fixed-prefix field: from the decoded fields when they exist, otherwise
    // straight from the validated buffer.
    fn fixed<T>(&self, from_fields: impl Fn(&Fields) -> T, buffer_offset: usize) -> T
    where
        T: FixedField,
    {
        match self.fields.get() {
            Some(fields) => from_fields(fields),
            None => T::get(&self.buf, buffer_offset),
        }
    }

    // Decodes the buffer into the fields if that has not happened yet.
    fn decoded_fields(&self) -> &Fields {
        let fields = self.fields.get_or_init(|| {
            // The buffer was validated when it was set, so decoding cannot fail.
            codec::decode_fields(&self.buf).expect("validated record buffer")
        });

        if self.repr.get() == Repr::Buffer {
            self.repr.set(Repr::Both(SequenceTranslation::None));
        }

        fields
    }

    // Decodes if necessary and invalidates the buffer for mutation.
    fn fields_mut(&mut self) -> &mut Fields {
        self.decoded_fields();
        self.repr.set(Repr::Decoded);

        match self.fields.get_mut() {
            Some(fields) => fields,
            None => unreachable!(),
        }
    }

    /// Returns the reference sequence id, `-1` when unmapped.
    pub fn reference_sequence_id(&self) -> i32 {
        self.fixed(|f| f.reference_sequence_id, codec::REFERENCE_SEQUENCE_ID_OFFSET)
    }

    /// Returns the 0-based leftmost position, `-1` when unmapped.
    pub fn position(&self) -> i32 {
        self.fixed(|f| f.position, codec::POSITION_OFFSET)
    }

    /// Returns the mapping quality.
    pub fn mapping_quality(&self) -> u8 {
        self.fixed(|f| f.mapping_quality, codec::MAPPING_QUALITY_OFFSET)
    }

    /// Returns the flags.
    pub fn flags(&self) -> Flags {
        Flags::from(self.fixed(|f| u16::from(f.flags), codec::FLAGS_OFFSET))
    }

    /// Returns the mate reference sequence id, `-1` when the mate is unmapped.
    pub fn mate_reference_sequence_id(&self) -> i32 {
        self.fixed(
            |f| f.mate_reference_sequence_id,
            codec::MATE_REFERENCE_SEQUENCE_ID_OFFSET,
        )
    }

    /// Returns the 0-based mate position, `-1` when the mate is unmapped.
    pub fn mate_position(&self) -> i32 {
        self.fixed(|f| f.mate_position, codec::MATE_POSITION_OFFSET)
    }

    /// Returns the template length.
    pub fn template_length(&self) -> i32 {
        self.fixed(|f| f.template_length, codec::TEMPLATE_LENGTH_OFFSET)
    }

    /// Returns the read name.
    pub fn read_name(&self) -> &BStr {
        self.decoded_fields().read_name.as_bstr()
    }

    /// Returns the CIGAR.
    pub fn cigar(&self) -> &Cigar {
        &self.decoded_fields().cigar
    }

    /// Returns the sequence.
    pub fn sequence(&self) -> &Sequence {
        &self.decoded_fields().sequence
    }

    /// Returns the per-base quality scores.
    pub fn quality_scores(&self) -> &QualityScores {
        &self.decoded_fields().quality_scores
    }

    /// Returns the data fields.
    pub fn data(&self) -> &Data {
        &self.decoded_fields().data
    }

    /// Returns the data fields mutably, invalidating the binary buffer.
    pub fn data_mut(&mut self) -> &mut Data {
        &mut self.fields_mut().data
    }

    /// Returns the record bin, recomputing it from the position and alignment end when stale.
    pub fn bin(&self) -> u16 {
        let Some(fields) = self.fields.get() else {
            // An undecoded buffer carries the bin the file stored.
            return codec::get_u16_le(&self.buf, codec::BIN_OFFSET);
        };

        if let Some(bin) = fields.bin.get() {
            return bin;
        }

        let bin = region_to_bin(fields.position, self.alignment_end());
        fields.bin.set(Some(bin));

        bin
    }

    /// Returns the 0-based inclusive alignment end: `position + reference_len - 1`, or the
    /// position itself when the CIGAR spans no reference positions.
    pub fn alignment_end(&self) -> i32 {
        let len = self.cigar().reference_len() as i32;

        if len == 0 {
            self.position()
        } else {
            self.position() + len - 1
        }
    }

    /// Returns the 0-based start with begin clips undone.
    pub fn unclipped_start(&self) -> i32 {
        self.position() - self.cigar().num_begin_clips() as i32
    }

    /// Returns the 0-based inclusive end with end clips undone.
    pub fn unclipped_end(&self) -> i32 {
        self.alignment_end() + self.cigar().num_end_clips() as i32
    }

    /// Counts the bases of this record aligned inside `[start, end)`; `-1` endpoints are
    /// unbounded.
    pub fn num_overlaps(&self, start: i32, end: i32) -> u32 {
        let position = self.position();
        self.cigar().num_overlaps(start, end, position)
    }

    /// Sets the reference sequence id.
    pub fn set_reference_sequence_id(&mut self, reference_sequence_id: i32) {
        self.fields_mut().reference_sequence_id = reference_sequence_id;
    }

    /// Sets the 0-based position, invalidating the cached bin.
    pub fn set_position(&mut self, position: i32) {
        let fields = self.fields_mut();
        fields.position = position;
        fields.bin.set(None);
    }

    /// Sets the mapping quality.
    pub fn set_mapping_quality(&mut self, mapping_quality: u8) {
        self.fields_mut().mapping_quality = mapping_quality;
    }

    /// Sets the flags.
    pub fn set_flags(&mut self, flags: Flags) {
        self.fields_mut().flags = flags;
    }

    /// Sets the mate reference sequence id.
    pub fn set_mate_reference_sequence_id(&mut self, mate_reference_sequence_id: i32) {
        self.fields_mut().mate_reference_sequence_id = mate_reference_sequence_id;
    }

    /// Sets the 0-based mate position.
    pub fn set_mate_position(&mut self, mate_position: i32) {
        self.fields_mut().mate_position = mate_position;
    }

    /// Sets the template length.
    pub fn set_template_length(&mut self, template_length: i32) {
        self.fields_mut().template_length = template_length;
    }

    /// Sets the read name.
    pub fn set_read_name(&mut self, read_name: BString) {
        self.fields_mut().read_name = read_name;
    }

    /// Sets the CIGAR, invalidating the cached bin.
    pub fn set_cigar(&mut self, cigar: Cigar) {
        let fields = self.fields_mut();
        fields.cigar = cigar;
        fields.bin.set(None);
    }

    /// Sets the sequence.
    pub fn set_sequence(&mut self, sequence: Sequence) {
        self.fields_mut().sequence = sequence;
    }

    /// Sets the quality scores.
    pub fn set_quality_scores(&mut self, quality_scores: QualityScores) {
        self.fields_mut().quality_scores = quality_scores;
    }

    /// Marks the record unmapped: clears the reference id, position, and proper-pair flag,
    /// and sets the unmapped flag.
    pub fn mark_unmapped(&mut self) {
        let flags = (self.flags() | Flags::UNMAPPED) - Flags::PROPER_PAIR;
        self.set_flags(flags);
        self.set_reference_sequence_id(-1);
        self.set_position(-1);
        self.set_cigar(Cigar::new());
        self.set_mapping_quality(0);
    }

    /// Returns the sequence bases rewritten under the given translation.
    ///
    /// Without a reference base source, translation degrades to [`SequenceTranslation::None`].
    pub fn translated_sequence(
        &self,
        translation: SequenceTranslation,
        source: Option<&dyn ReferenceBaseSource>,
    ) -> Vec<u8> {
        let fields = self.decoded_fields();
        let mut bases = fields.sequence.as_bytes().to_vec();

        let Some(source) = source else {
            return bases;
        };

        if translation == SequenceTranslation::None
            || fields.reference_sequence_id < 0
            || fields.position < 0
        {
            return bases;
        }

        let reference_sequence_id = fields.reference_sequence_id as usize;

        for (query_index, base) in bases.iter_mut().enumerate() {
            let ref_offset = fields.cigar.ref_offset(query_index as i32);

            if ref_offset == crate::cigar::INDEX_NA {
                continue;
            }

            let position = (fields.position + ref_offset) as u32;

            let Some(reference_base) = source.base(reference_sequence_id, position) else {
                continue;
            };

            match translation {
                SequenceTranslation::Equal => {
                    if base.eq_ignore_ascii_case(&reference_base) {
                        *base = b'=';
                    }
                }
                SequenceTranslation::Bases => {
                    if *base == b'=' {
                        *base = reference_base;
                    }
                }
                SequenceTranslation::None => {}
            }
        }

        bases
    }
}

// Fixed-prefix field access straight from a validated record buffer.
trait FixedField {
    fn get(buf: &[u8], offset: usize) -> Self;
}

impl FixedField for i32 {
    fn get(buf: &[u8], offset: usize) -> Self {
        codec::get_i32_le(buf, offset)
    }
}

impl FixedField for u16 {
    fn get(buf: &[u8], offset: usize) -> Self {
        codec::get_u16_le(buf, offset)
    }
}

impl FixedField for u8 {
    fn get(buf: &[u8], offset: usize) -> Self {
        buf[offset]
    }
}

// The UCSC binning scheme over 0-based [start, end] (end inclusive).
pub(crate) fn region_to_bin(start: i32, end: i32) -> u16 {
    let bin = if start >> 14 == end >> 14 {
        4681 + (start >> 14)
    } else if start >> 17 == end >> 17 {
        585 + (start >> 17)
    } else if start >> 20 == end >> 20 {
        73 + (start >> 20)
    } else if start >> 23 == end >> 23 {
        9 + (start >> 23)
    } else if start >> 26 == end >> 26 {
        1 + (start >> 26)
    } else {
        0
    };

    bin as u16
}

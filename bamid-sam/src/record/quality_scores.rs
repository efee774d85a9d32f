/// The value stored in every quality byte of a BAM record that has no qualities.
pub const MISSING: u8 = 0xff;

// SAM qualities are printable ASCII in [!, ~], i.e. Phred + 33.
const OFFSET: u8 = b'!';
const MAX_PRINTABLE: u8 = b'~';

/// Per-base quality scores stored as raw Phred values.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct QualityScores(Vec<u8>);

impl QualityScores {
    /// Creates quality scores from raw Phred values.
    pub fn from_scores(scores: Vec<u8>) -> Self {
        Self(scores)
    }

    /// Creates quality scores from printable SAM characters.
    ///
    /// Returns `None` when a character is outside `[!, ~]`.
    pub fn from_ascii(src: &[u8]) -> Option<Self> {
        let mut scores = Vec::with_capacity(src.len());

        for &b in src {
            if !(OFFSET..=MAX_PRINTABLE).contains(&b) {
                return None;
            }

            scores.push(b - OFFSET);
        }

        Some(Self(scores))
    }

    /// Returns the raw Phred values.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Returns the Phred value at the given index.
    pub fn get(&self, i: usize) -> Option<u8> {
        self.0.get(i).copied()
    }

    /// Returns the number of scores.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether there are any scores (`*` in SAM).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Removes all scores.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Renders the scores as printable SAM characters.
    pub fn to_ascii(&self) -> Vec<u8> {
        self.0.iter().map(|&q| q.saturating_add(OFFSET)).collect()
    }
}

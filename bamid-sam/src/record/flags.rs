use bitflags::bitflags;

bitflags! {
    /// SAM record flags.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Flags: u16 {
        /// The record is paired (`0x01`).
        const PAIRED = 0x01;
        /// Each segment is properly aligned (`0x02`).
        const PROPER_PAIR = 0x02;
        /// The record is unmapped (`0x04`).
        const UNMAPPED = 0x04;
        /// The mate is unmapped (`0x08`).
        const MATE_UNMAPPED = 0x08;
        /// The sequence is reverse complemented (`0x10`).
        const REVERSE_COMPLEMENTED = 0x10;
        /// The mate sequence is reverse complemented (`0x20`).
        const MATE_REVERSE_COMPLEMENTED = 0x20;
        /// The record is the first segment in the template (`0x40`).
        const FIRST_SEGMENT = 0x40;
        /// The record is the last segment in the template (`0x80`).
        const LAST_SEGMENT = 0x80;
        /// The record is a secondary alignment (`0x100`).
        const SECONDARY = 0x100;
        /// The record failed quality checks (`0x200`).
        const QC_FAIL = 0x200;
        /// The record is a PCR or optical duplicate (`0x400`).
        const DUPLICATE = 0x400;
        /// The record is a supplementary alignment (`0x800`).
        const SUPPLEMENTARY = 0x800;
    }
}

impl Flags {
    /// Returns whether the record is paired.
    pub fn is_paired(self) -> bool {
        self.contains(Self::PAIRED)
    }

    /// Returns whether the record is unmapped.
    pub fn is_unmapped(self) -> bool {
        self.contains(Self::UNMAPPED)
    }

    /// Returns whether the mate is unmapped.
    pub fn is_mate_unmapped(self) -> bool {
        self.contains(Self::MATE_UNMAPPED)
    }

    /// Returns whether the sequence is reverse complemented.
    pub fn is_reverse_complemented(self) -> bool {
        self.contains(Self::REVERSE_COMPLEMENTED)
    }

    /// Returns whether the mate sequence is reverse complemented.
    pub fn is_mate_reverse_complemented(self) -> bool {
        self.contains(Self::MATE_REVERSE_COMPLEMENTED)
    }
}

impl From<u16> for Flags {
    fn from(value: u16) -> Self {
        Self::from_bits_retain(value)
    }
}

impl From<Flags> for u16 {
    fn from(flags: Flags) -> Self {
        flags.bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u16() {
        let flags = Flags::from(0x93);
        assert!(flags.is_paired());
        assert!(flags.contains(Flags::PROPER_PAIR));
        assert!(flags.is_reverse_complemented());
        assert!(flags.contains(Flags::LAST_SEGMENT));
        assert!(!flags.is_unmapped());
        assert_eq!(u16::from(flags), 0x93);
    }
}

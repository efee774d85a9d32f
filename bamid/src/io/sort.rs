use bamid_sam::header::Header;
use bamid_sam::record::Record;
use bstr::{BString, ByteSlice};

use crate::error::{Error, Result};

/// The sort validation mode of an alignment file.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortOrder {
    /// No validation.
    #[default]
    Unsorted,
    /// Read names must be lexicographically non-decreasing.
    QueryName,
    /// Reference ids then positions must be non-decreasing; unmapped records sort last.
    Coordinate,
    /// Resolved once from the header's `SO` tag on the first record.
    FromHeader,
}

// Compares each record against the previous one under the configured order. `FromHeader`
// resolves to a concrete order exactly once.
#[derive(Debug, Default)]
pub(crate) struct SortValidator {
    policy: SortOrder,
    resolved: Option<SortOrder>,
    prev_read_name: BString,
    prev_reference_sequence_id: i32,
    prev_position: i32,
}

impl SortValidator {
    pub(crate) fn new(policy: SortOrder) -> Self {
        Self {
            policy,
            resolved: None,
            prev_read_name: BString::default(),
            prev_reference_sequence_id: 0,
            prev_position: -1,
        }
    }

    pub(crate) fn set_policy(&mut self, policy: SortOrder) {
        self.policy = policy;
        self.resolved = None;
        self.reset_positions();
    }

    // Forgets the previous record, e.g. when jumping to a new read section.
    pub(crate) fn reset_positions(&mut self) {
        self.prev_read_name.clear();
        self.prev_reference_sequence_id = 0;
        self.prev_position = -1;
    }

    pub(crate) fn validate(
        &mut self,
        record: &Record,
        header: &Header,
        record_count: u64,
    ) -> Result<()> {
        let order = match self.policy {
            SortOrder::FromHeader => *self
                .resolved
                .get_or_insert_with(|| order_from_header(header)),
            order => order,
        };

        match order {
            SortOrder::Unsorted | SortOrder::FromHeader => Ok(()),
            SortOrder::QueryName => self.validate_query_name(record, record_count),
            SortOrder::Coordinate => self.validate_coordinate(record, record_count),
        }
    }

    fn validate_query_name(&mut self, record: &Record, record_count: u64) -> Result<()> {
        let read_name = record.read_name();

        if self.prev_read_name.as_bstr() > read_name {
            return Err(not_sorted(record_count));
        }

        self.prev_read_name = read_name.to_owned();

        Ok(())
    }

    fn validate_coordinate(&mut self, record: &Record, record_count: u64) -> Result<()> {
        let reference_sequence_id = record.reference_sequence_id();
        let position = record.position();

        if reference_sequence_id == -1 {
            // Unmapped records sort after everything else.
            self.prev_reference_sequence_id = reference_sequence_id;
            self.prev_position = position;
            return Ok(());
        }

        if self.prev_reference_sequence_id == -1 {
            // A mapped record after the unmapped tail.
            return Err(not_sorted(record_count));
        }

        if reference_sequence_id < self.prev_reference_sequence_id {
            return Err(not_sorted(record_count));
        }

        if reference_sequence_id > self.prev_reference_sequence_id {
            self.prev_position = -1;
        }

        if position < self.prev_position {
            return Err(not_sorted(record_count));
        }

        self.prev_reference_sequence_id = reference_sequence_id;
        self.prev_position = position;

        Ok(())
    }
}

fn order_from_header(header: &Header) -> SortOrder {
    match header.sort_order() {
        Some("queryname") => SortOrder::QueryName,
        Some("coordinate") => SortOrder::Coordinate,
        _ => SortOrder::Unsorted,
    }
}

fn not_sorted(record_count: u64) -> Error {
    Error::InvalidSort(format!("file is not sorted at record {}", record_count + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapped(reference_sequence_id: i32, position: i32) -> Record {
        let mut record = Record::new();
        record.set_reference_sequence_id(reference_sequence_id);
        record.set_position(position);
        record
    }

    fn named(name: &str) -> Record {
        let mut record = Record::new();
        record.set_read_name(name.into());
        record
    }

    #[test]
    fn test_coordinate_order() {
        let header = Header::new();
        let mut validator = SortValidator::new(SortOrder::Coordinate);

        assert!(validator.validate(&mapped(0, 10), &header, 0).is_ok());
        assert!(validator.validate(&mapped(0, 10), &header, 1).is_ok());
        assert!(validator.validate(&mapped(1, 0), &header, 2).is_ok());
        assert!(validator.validate(&mapped(1, 5), &header, 3).is_ok());
        assert!(validator.validate(&mapped(1, 4), &header, 4).is_err());
    }

    #[test]
    fn test_coordinate_order_with_unmapped_tail() {
        let header = Header::new();
        let mut validator = SortValidator::new(SortOrder::Coordinate);

        assert!(validator.validate(&mapped(2, 10), &header, 0).is_ok());
        assert!(validator.validate(&mapped(-1, -1), &header, 1).is_ok());
        assert!(validator.validate(&mapped(-1, -1), &header, 2).is_ok());
        assert!(validator.validate(&mapped(0, 0), &header, 3).is_err());
    }

    #[test]
    fn test_coordinate_order_regressing_reference() {
        let header = Header::new();
        let mut validator = SortValidator::new(SortOrder::Coordinate);

        assert!(validator.validate(&mapped(1, 10), &header, 0).is_ok());
        assert!(validator.validate(&mapped(0, 20), &header, 1).is_err());
    }

    #[test]
    fn test_query_name_order() {
        let header = Header::new();
        let mut validator = SortValidator::new(SortOrder::QueryName);

        assert!(validator.validate(&named("a.1"), &header, 0).is_ok());
        assert!(validator.validate(&named("a.2"), &header, 1).is_ok());
        assert!(validator.validate(&named("a.11"), &header, 2).is_err());
    }

    #[test]
    fn test_from_header_resolves_once() {
        let header: Header = "@HD\tVN:1.3\tSO:coordinate\n".parse().unwrap();
        let mut validator = SortValidator::new(SortOrder::FromHeader);

        assert!(validator.validate(&mapped(1, 10), &header, 0).is_ok());

        // Changing the header afterwards has no effect: the order is already resolved.
        let unsorted_header = Header::new();
        assert!(validator
            .validate(&mapped(0, 0), &unsorted_header, 1)
            .is_err());
    }

    #[test]
    fn test_unsorted_accepts_anything() {
        let header = Header::new();
        let mut validator = SortValidator::new(SortOrder::Unsorted);

        assert!(validator.validate(&mapped(5, 10), &header, 0).is_ok());
        assert!(validator.validate(&mapped(0, 0), &header, 1).is_ok());
    }
}

//! **bamid-sam** models SAM alignment records and handles SAM text I/O.
//!
//! The record keeps its decoded fields and its binary BAM body in a lazily synchronized dual
//! representation; see [`record::Record`]. The BAM container framing itself lives in
//! `bamid-bam`.

pub mod cigar;
pub mod header;
pub mod io;
pub mod record;

pub use self::cigar::Cigar;
pub use self::header::Header;
pub use self::record::{Record, ReferenceBaseSource, SequenceTranslation};

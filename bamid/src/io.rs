//! The alignment file façade: open/close, header gating, sort validation, and indexed read
//! sections over SAM and BAM inputs.

mod reader;
mod sort;
mod writer;

pub use self::reader::AlignmentReader;
pub use self::sort::SortOrder;
pub use self::writer::AlignmentWriter;

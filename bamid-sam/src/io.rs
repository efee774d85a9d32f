//! SAM text reading and writing.

mod reader;
mod writer;

pub use self::reader::Reader;
pub use self::writer::Writer;

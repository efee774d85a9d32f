//! **bamid-bam** reads and writes BAM over BGZF and answers region queries through the BAI
//! bin/linear index.
//!
//! Record bodies move between the stream and `bamid-sam` records as raw buffers, so a
//! read-through-write pipeline copies bytes without re-encoding.

pub mod bai;
pub mod io;

pub use self::io::{Reader, Writer};

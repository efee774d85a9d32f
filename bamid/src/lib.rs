//! **bamid** verifies sample identity and contamination in sequence alignment files.
//!
//! The crate layers an alignment file façade (format sniffing, sort validation, indexed read
//! sections) over `bamid-sam`/`bamid-bam`, and drives it with a per-site statistical engine
//! that scores aligned bases against a known variant genotype panel.

pub mod error;
pub mod io;
pub mod overlap;
pub mod panel;
pub mod reference;
pub mod verify;

pub use self::error::{Error, Result};

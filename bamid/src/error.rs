use std::{error, fmt, io};

/// The error kinds surfaced by alignment file operations.
///
/// `Parse`, `InvalidSort`, and `Invalid` are recoverable: the caller may continue with the
/// next record. `Io` and `Order` terminate the current iteration. End of stream is not an
/// error; reads report it as `Ok(false)`.
#[derive(Debug)]
pub enum Error {
    /// The underlying byte stream failed.
    Io(io::Error),
    /// Malformed header, record, tag, CIGAR, or index content.
    Parse(String),
    /// API misuse, e.g. reading records before the header or querying a region on a
    /// non-indexed file.
    Order(&'static str),
    /// A record violates the declared sort order.
    InvalidSort(String),
    /// A record violates structural invariants.
    Invalid(String),
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Parse(msg) => write!(f, "parse error: {}", msg),
            Self::Order(msg) => write!(f, "invalid operation order: {}", msg),
            Self::InvalidSort(msg) => write!(f, "invalid sort order: {}", msg),
            Self::Invalid(msg) => write!(f, "invalid record: {}", msg),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::InvalidData => Self::Parse(e.to_string()),
            io::ErrorKind::InvalidInput => Self::Invalid(e.to_string()),
            _ => Self::Io(e),
        }
    }
}

/// A specialized result type for alignment file operations.
pub type Result<T> = std::result::Result<T, Error>;

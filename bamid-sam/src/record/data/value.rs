use std::{error, fmt};

use bstr::{BString, ByteSlice};

/// A record data field value.
///
/// All integer widths decode to [`Value::Int`] and report type `i`; on encode the smallest
/// signed variant is chosen for negative values and the smallest unsigned variant otherwise.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A character (`A`).
    Character(u8),
    /// An integer (`c`/`C`/`s`/`S`/`i`/`I`, reported as `i`).
    Int(i64),
    /// A single-precision float (`f`).
    Float(f32),
    /// A NUL-terminated string (`Z`).
    String(BString),
}

impl Value {
    /// Returns the SAM type character of the value.
    pub fn type_char(&self) -> char {
        match self {
            Self::Character(_) => 'A',
            Self::Int(_) => 'i',
            Self::Float(_) => 'f',
            Self::String(_) => 'Z',
        }
    }

    /// Returns the value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as a byte string, if it is one.
    pub fn as_str(&self) -> Option<&[u8]> {
        match self {
            Self::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

/// An error returned when a data field value fails to encode.
#[derive(Debug, Eq, PartialEq)]
pub enum EncodeError {
    /// The integer does not fit any BAM integer type.
    IntOutOfRange(i64),
}

impl error::Error for EncodeError {}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntOutOfRange(n) => write!(f, "integer out of range: {}", n),
        }
    }
}

impl Value {
    /// Encodes the value in its BAM form, type character first.
    pub fn encode(&self, dst: &mut Vec<u8>) -> Result<(), EncodeError> {
        match self {
            Self::Character(c) => {
                dst.push(b'A');
                dst.push(*c);
            }
            Self::Int(n) => encode_int(*n, dst)?,
            Self::Float(v) => {
                dst.push(b'f');
                dst.extend_from_slice(&v.to_le_bytes());
            }
            Self::String(s) => {
                dst.push(b'Z');
                dst.extend_from_slice(s.as_bytes());
                dst.push(0);
            }
        }

        Ok(())
    }
}

fn encode_int(n: i64, dst: &mut Vec<u8>) -> Result<(), EncodeError> {
    if n < 0 {
        if let Ok(v) = i8::try_from(n) {
            dst.push(b'c');
            dst.extend_from_slice(&v.to_le_bytes());
        } else if let Ok(v) = i16::try_from(n) {
            dst.push(b's');
            dst.extend_from_slice(&v.to_le_bytes());
        } else if let Ok(v) = i32::try_from(n) {
            dst.push(b'i');
            dst.extend_from_slice(&v.to_le_bytes());
        } else {
            return Err(EncodeError::IntOutOfRange(n));
        }
    } else if let Ok(v) = u8::try_from(n) {
        dst.push(b'C');
        dst.extend_from_slice(&v.to_le_bytes());
    } else if let Ok(v) = u16::try_from(n) {
        dst.push(b'S');
        dst.extend_from_slice(&v.to_le_bytes());
    } else if let Ok(v) = u32::try_from(n) {
        dst.push(b'I');
        dst.extend_from_slice(&v.to_le_bytes());
    } else {
        return Err(EncodeError::IntOutOfRange(n));
    }

    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Character(c) => write!(f, "{}", *c as char),
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(v) => write!(f, "{:.6}", v),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: &Value) -> Vec<u8> {
        let mut dst = Vec::new();
        value.encode(&mut dst).unwrap();
        dst
    }

    #[test]
    fn test_encode_int_picks_smallest_type() {
        assert_eq!(encoded(&Value::Int(5)), [b'C', 0x05]);
        assert_eq!(encoded(&Value::Int(-5)), [b'c', 0xfb]);
        assert_eq!(encoded(&Value::Int(300)), [b'S', 0x2c, 0x01]);
        assert_eq!(encoded(&Value::Int(-300)), [b's', 0xd4, 0xfe]);
        assert_eq!(encoded(&Value::Int(70000)), [b'I', 0x70, 0x11, 0x01, 0x00]);
        assert_eq!(encoded(&Value::Int(-70000)), [b'i', 0x90, 0xee, 0xfe, 0xff]);

        let mut dst = Vec::new();
        assert!(Value::Int(1 << 40).encode(&mut dst).is_err());
    }

    #[test]
    fn test_encode_string_is_nul_terminated() {
        assert_eq!(
            encoded(&Value::String(BString::from("rg0"))),
            [b'Z', b'r', b'g', b'0', 0x00]
        );
    }

    #[test]
    fn test_fmt() {
        assert_eq!(Value::Character(b'Q').to_string(), "Q");
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::Float(3.14).to_string(), "3.140000");
        assert_eq!(Value::String(BString::from("hello")).to_string(), "hello");
    }
}

pub mod value;

pub use self::value::Value;

use std::{error, fmt};

use bstr::BString;

/// A two-character data field tag, e.g. `RG`.
pub type Tag = [u8; 2];

/// The record data fields: an append-only table of typed tag-value pairs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Data {
    fields: Vec<(Tag, Value)>,
}

impl Data {
    /// Returns the value of the first field with the given tag.
    pub fn get(&self, tag: Tag) -> Option<&Value> {
        self.fields.iter().find(|(t, _)| *t == tag).map(|(_, v)| v)
    }

    /// Appends a field.
    pub fn push(&mut self, tag: Tag, value: Value) {
        self.fields.push((tag, value));
    }

    /// Removes the first field with the given tag, returning whether one was removed.
    pub fn remove(&mut self, tag: Tag) -> bool {
        match self.fields.iter().position(|(t, _)| *t == tag) {
            Some(i) => {
                self.fields.remove(i);
                true
            }
            None => false,
        }
    }

    /// Returns an iterator over the fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Tag, &Value)> {
        self.fields.iter().map(|(t, v)| (*t, v))
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns whether there are any fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Removes all fields.
    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Decodes BAM data fields from the tail of a record body.
    pub fn decode(mut src: &[u8]) -> Result<Self, DecodeError> {
        let mut data = Self::default();

        while !src.is_empty() {
            if src.len() < 3 {
                return Err(DecodeError::UnexpectedEof);
            }

            let tag = [src[0], src[1]];
            let ty = src[2];
            src = &src[3..];

            let value = match ty {
                b'A' => {
                    let (b, rest) = split_first(src)?;
                    src = rest;
                    Value::Character(b)
                }
                b'c' => decode_int::<1>(&mut src, |b| i64::from(b[0] as i8))?,
                b'C' => decode_int::<1>(&mut src, |b| i64::from(b[0]))?,
                b's' => decode_int::<2>(&mut src, |b| i64::from(i16::from_le_bytes(*b)))?,
                b'S' => decode_int::<2>(&mut src, |b| i64::from(u16::from_le_bytes(*b)))?,
                b'i' => decode_int::<4>(&mut src, |b| i64::from(i32::from_le_bytes(*b)))?,
                b'I' => decode_int::<4>(&mut src, |b| i64::from(u32::from_le_bytes(*b)))?,
                b'f' => {
                    if src.len() < 4 {
                        return Err(DecodeError::UnexpectedEof);
                    }
                    let (buf, rest) = src.split_at(4);
                    src = rest;
                    Value::Float(f32::from_le_bytes(buf.try_into().unwrap()))
                }
                b'Z' => {
                    let nul =
                        src.iter().position(|&b| b == 0).ok_or(DecodeError::UnexpectedEof)?;
                    let value = Value::String(BString::from(&src[..nul]));
                    src = &src[nul + 1..];
                    value
                }
                _ => return Err(DecodeError::InvalidType(tag, ty)),
            };

            data.push(tag, value);
        }

        Ok(data)
    }

    /// Encodes the fields in their BAM form.
    pub fn encode(&self, dst: &mut Vec<u8>) -> Result<(), value::EncodeError> {
        for (tag, value) in &self.fields {
            dst.extend_from_slice(tag);
            value.encode(dst)?;
        }

        Ok(())
    }

    /// Checks that a BAM data section is well formed, without materializing any values.
    pub fn validate(mut src: &[u8]) -> Result<(), DecodeError> {
        while !src.is_empty() {
            if src.len() < 3 {
                return Err(DecodeError::UnexpectedEof);
            }

            let tag = [src[0], src[1]];
            let ty = src[2];
            src = &src[3..];

            let len = match ty {
                b'A' | b'c' | b'C' => 1,
                b's' | b'S' => 2,
                b'i' | b'I' | b'f' => 4,
                b'Z' => {
                    src.iter().position(|&b| b == 0).ok_or(DecodeError::UnexpectedEof)? + 1
                }
                _ => return Err(DecodeError::InvalidType(tag, ty)),
            };

            if src.len() < len {
                return Err(DecodeError::UnexpectedEof);
            }

            src = &src[len..];
        }

        Ok(())
    }
}

fn split_first(src: &[u8]) -> Result<(u8, &[u8]), DecodeError> {
    match src.split_first() {
        Some((&b, rest)) => Ok((b, rest)),
        None => Err(DecodeError::UnexpectedEof),
    }
}

fn decode_int<const N: usize>(
    src: &mut &[u8],
    f: impl Fn(&[u8; N]) -> i64,
) -> Result<Value, DecodeError> {
    if src.len() < N {
        return Err(DecodeError::UnexpectedEof);
    }

    let (buf, rest) = src.split_at(N);
    *src = rest;

    Ok(Value::Int(f(buf.try_into().unwrap())))
}

/// An error returned when BAM data fields fail to decode.
#[derive(Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// The data section ended mid-field.
    UnexpectedEof,
    /// A field has an unknown type character.
    InvalidType(Tag, u8),
}

impl error::Error for DecodeError {}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => f.write_str("unexpected end of data fields"),
            Self::InvalidType(tag, ty) => write!(
                f,
                "invalid type {:?} for tag {}{}",
                *ty as char, tag[0] as char, tag[1] as char
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode() {
        let src = [
            b'R', b'G', b'Z', b'r', b'g', b'0', 0x00, // RG:Z:rg0
            b'N', b'M', b'c', 0xff, // NM:c:-1
            b'X', b'F', b'f', 0x00, 0x00, 0x80, 0x3f, // XF:f:1.0
        ];

        let data = Data::decode(&src).unwrap();

        assert_eq!(data.len(), 3);
        assert_eq!(data.get(*b"RG").and_then(|v| v.as_str()), Some(&b"rg0"[..]));
        assert_eq!(data.get(*b"NM").and_then(|v| v.as_int()), Some(-1));
        assert_eq!(data.get(*b"XF"), Some(&Value::Float(1.0)));
        assert_eq!(data.get(*b"ZZ"), None);
    }

    #[test]
    fn test_decode_reports_all_int_widths_as_int() {
        let src = [
            b'x', b'a', b'C', 0x05, //
            b'x', b'b', b'S', 0x2c, 0x01, //
            b'x', b'c', b'I', 0x70, 0x11, 0x01, 0x00, //
            b'x', b'd', b'i', 0x90, 0xee, 0xfe, 0xff, //
        ];

        let data = Data::decode(&src).unwrap();

        assert_eq!(data.get(*b"xa"), Some(&Value::Int(5)));
        assert_eq!(data.get(*b"xb"), Some(&Value::Int(300)));
        assert_eq!(data.get(*b"xc"), Some(&Value::Int(70000)));
        assert_eq!(data.get(*b"xd"), Some(&Value::Int(-70000)));
    }

    #[test]
    fn test_decode_with_invalid_type() {
        let src = [b'X', b'Y', b'B', 0x00];
        assert_eq!(
            Data::decode(&src),
            Err(DecodeError::InvalidType(*b"XY", b'B'))
        );
    }

    #[test]
    fn test_decode_with_truncated_field() {
        let src = [b'N', b'M', b'i', 0x01, 0x02];
        assert_eq!(Data::decode(&src), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let mut data = Data::default();
        data.push(*b"RG", Value::String(BString::from("grp.1")));
        data.push(*b"XC", Value::Character(b'='));
        data.push(*b"NM", Value::Int(3));

        let mut dst = Vec::new();
        data.encode(&mut dst).unwrap();

        assert_eq!(Data::decode(&dst).unwrap(), data);
    }

    #[test]
    fn test_remove() {
        let mut data = Data::default();
        data.push(*b"NM", Value::Int(3));

        assert!(data.remove(*b"NM"));
        assert!(!data.remove(*b"NM"));
        assert!(data.is_empty());
    }

    #[test]
    fn test_validate_agrees_with_decode() {
        let good = [
            b'R', b'G', b'Z', b'r', b'g', b'0', 0x00, //
            b'N', b'M', b'c', 0xff, //
            b'X', b'F', b'f', 0x00, 0x00, 0x80, 0x3f, //
        ];
        assert_eq!(Data::validate(&good), Ok(()));
        assert!(Data::decode(&good).is_ok());

        let truncated = [b'N', b'M', b'i', 0x01, 0x02];
        assert_eq!(Data::validate(&truncated), Err(DecodeError::UnexpectedEof));

        let unterminated = [b'R', b'G', b'Z', b'r', b'g'];
        assert_eq!(Data::validate(&unterminated), Err(DecodeError::UnexpectedEof));

        let unknown = [b'X', b'Y', b'B', 0x00];
        assert_eq!(
            Data::validate(&unknown),
            Err(DecodeError::InvalidType(*b"XY", b'B'))
        );
    }
}

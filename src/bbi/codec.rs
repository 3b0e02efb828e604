//! Generic decoding of fixed-layout binary records.
//!
//! Every on-disk structure in a bigWig file is described by a declarative
//! field layout (see [`models`][super::models]) and decoded by the single
//! routine in this module. Field widths follow the format's conventions:
//! a positive width of 1, 2, 4 or 8 is an unsigned integer, a negative
//! width is an IEEE float of `abs(width)` bytes, width 0 is a
//! NUL-terminated string, and any other positive width is a fixed-length,
//! NUL-padded string. Endianness is decided once per file from the header
//! magic and passed down to every decode call.

use byteordered::Endianness;
use thiserror::Error;

/// Errors produced while decoding a binary structure.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("buffer too short: needed {needed} bytes, had {available}")]
    ShortBuffer { needed: usize, available: usize },
    #[error("field `{0}` is not part of this layout")]
    UnknownField(&'static str),
    #[error("field `{field}` does not hold a {requested}")]
    WrongType {
        field: &'static str,
        requested: &'static str,
    },
    #[error("field `{0}` is not valid UTF-8")]
    InvalidUtf8(&'static str),
    #[error("invalid magic {0:#010x} (likely not a bigWig file)")]
    BadMagic(u32),
    #[error("the file was invalid: {0}")]
    InvalidFile(String),
}

/// One field of a binary layout. `width` uses the sign conventions
/// described in the module docs.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Field {
    pub name: &'static str,
    pub width: i32,
}

pub(crate) const fn field(name: &'static str, width: i32) -> Field {
    Field { name, width }
}

/// Total on-disk size of a layout. Variable-length (NUL-terminated)
/// fields contribute nothing, matching the format's own size accounting.
pub(crate) fn layout_size(fields: &[Field]) -> usize {
    fields.iter().map(|f| f.width.unsigned_abs() as usize).sum()
}

/// A decoded field value. Unsigned integers are widened to `u64` so that
/// 8-byte file offsets keep full precision; floats are widened to `f64`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum FieldValue {
    UInt(u64),
    Float(f64),
    Str(String),
}

/// The decoded form of one structure: field values in layout order,
/// accessed by name through the typed getters.
#[derive(Clone, Debug)]
pub(crate) struct Fields {
    values: Vec<(&'static str, FieldValue)>,
}

impl Fields {
    fn get(&self, name: &'static str) -> Result<&FieldValue, DecodeError> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .ok_or(DecodeError::UnknownField(name))
    }

    pub fn uint(&self, name: &'static str) -> Result<u64, DecodeError> {
        match self.get(name)? {
            FieldValue::UInt(v) => Ok(*v),
            _ => Err(DecodeError::WrongType {
                field: name,
                requested: "unsigned integer",
            }),
        }
    }

    pub fn u32(&self, name: &'static str) -> Result<u32, DecodeError> {
        Ok(self.uint(name)? as u32)
    }

    pub fn u16(&self, name: &'static str) -> Result<u16, DecodeError> {
        Ok(self.uint(name)? as u16)
    }

    pub fn u8(&self, name: &'static str) -> Result<u8, DecodeError> {
        Ok(self.uint(name)? as u8)
    }

    pub fn float(&self, name: &'static str) -> Result<f64, DecodeError> {
        match self.get(name)? {
            FieldValue::Float(v) => Ok(*v),
            _ => Err(DecodeError::WrongType {
                field: name,
                requested: "float",
            }),
        }
    }

    pub fn string(&self, name: &'static str) -> Result<&str, DecodeError> {
        match self.get(name)? {
            FieldValue::Str(v) => Ok(v),
            _ => Err(DecodeError::WrongType {
                field: name,
                requested: "string",
            }),
        }
    }
}

/// Decodes one structure from the front of `data`. Multi-byte fields all
/// honor `endianness`; the buffer must hold at least [`layout_size`]
/// bytes plus the length of any NUL-terminated fields.
pub(crate) fn decode(
    fields: &[Field],
    data: &[u8],
    endianness: Endianness,
) -> Result<Fields, DecodeError> {
    let needed = layout_size(fields);
    if data.len() < needed {
        return Err(DecodeError::ShortBuffer {
            needed,
            available: data.len(),
        });
    }

    let mut values = Vec::with_capacity(fields.len());
    let mut offset = 0usize;
    for f in fields {
        let value = match f.width {
            1 | 2 | 4 | 8 => {
                let width = f.width as usize;
                let raw = take(data, offset, width)?;
                offset += width;
                FieldValue::UInt(read_uint(raw, endianness))
            }
            -4 => {
                let raw = take(data, offset, 4)?;
                offset += 4;
                let bits = read_uint(raw, endianness) as u32;
                FieldValue::Float(f64::from(f32::from_bits(bits)))
            }
            -8 => {
                let raw = take(data, offset, 8)?;
                offset += 8;
                FieldValue::Float(f64::from_bits(read_uint(raw, endianness)))
            }
            0 => {
                let rest = &data[offset..];
                let len = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
                let s = str_from(&rest[..len], f)?;
                offset += (len + 1).min(rest.len());
                FieldValue::Str(s)
            }
            w if w > 0 => {
                let width = w as usize;
                let raw = take(data, offset, width)?;
                offset += width;
                let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                FieldValue::Str(str_from(&raw[..len], f)?)
            }
            w => {
                return Err(DecodeError::InvalidFile(format!(
                    "field `{}` declares unsupported width {}",
                    f.name, w
                )))
            }
        };
        values.push((f.name, value));
    }

    Ok(Fields { values })
}

fn take(data: &[u8], offset: usize, width: usize) -> Result<&[u8], DecodeError> {
    data.get(offset..offset + width).ok_or(DecodeError::ShortBuffer {
        needed: offset + width,
        available: data.len(),
    })
}

fn str_from(raw: &[u8], f: &Field) -> Result<String, DecodeError> {
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidUtf8(f.name))
}

fn read_uint(raw: &[u8], endianness: Endianness) -> u64 {
    let mut out = [0u8; 8];
    match endianness {
        Endianness::Big => out[8 - raw.len()..].copy_from_slice(raw),
        Endianness::Little => out[..raw.len()].copy_from_slice(raw),
    }
    match endianness {
        Endianness::Big => u64::from_be_bytes(out),
        Endianness::Little => u64::from_le_bytes(out),
    }
}

#[cfg(test)]
pub(crate) fn encode(fields: &[(Field, FieldValue)], endianness: Endianness) -> Vec<u8> {
    let mut out = Vec::new();
    for (f, v) in fields {
        match (f.width, v) {
            (1 | 2 | 4 | 8, FieldValue::UInt(u)) => {
                let width = f.width as usize;
                let bytes = match endianness {
                    Endianness::Big => u.to_be_bytes()[8 - width..].to_vec(),
                    Endianness::Little => u.to_le_bytes()[..width].to_vec(),
                };
                out.extend_from_slice(&bytes);
            }
            (-4, FieldValue::Float(x)) => {
                let bits = (*x as f32).to_bits();
                out.extend_from_slice(&match endianness {
                    Endianness::Big => bits.to_be_bytes(),
                    Endianness::Little => bits.to_le_bytes(),
                });
            }
            (-8, FieldValue::Float(x)) => {
                let bits = x.to_bits();
                out.extend_from_slice(&match endianness {
                    Endianness::Big => bits.to_be_bytes(),
                    Endianness::Little => bits.to_le_bytes(),
                });
            }
            (0, FieldValue::Str(s)) => {
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            (w, FieldValue::Str(s)) if w > 0 => {
                let mut raw = s.as_bytes().to_vec();
                raw.resize(w as usize, 0);
                out.extend_from_slice(&raw);
            }
            _ => panic!("field `{}` and value do not match", f.name),
        }
    }
    out
}

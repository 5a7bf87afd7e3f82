// ========================================================================================
//
//                          The index store write surface
//
// ========================================================================================
//
// One row per variant locus, one column write per non-empty column. Every value is
// checked against the type the registry declares before it is laid out in bytes:
//
//     string-set    [count: u32] ([len: u32] [utf-8 bytes])*     elements in sorted order
//     integer-set   [count: u32] [value: u32]*                   ascending
//     double-list   [count: u32] [ordered f64]*                  list order kept
//     double        [ordered f64]
//     text          [utf-8 bytes]
//
// All integers are big-endian. An "ordered f64" flips the sign bit of non-negative
// values and every bit of negative values, so byte order matches numeric order.

use crate::registry::{ColumnId, ColumnRegistry, ScalarType, ValueType};
use crate::shared::error::EncodingError;
use crate::types::{ColumnValue, IndexRow};
use std::collections::BTreeSet;

const SIGN_MASK: u64 = 1u64 << 63;

/// A single typed column write destined for the index store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnWrite {
    pub id: ColumnId,
    pub name: String,
    pub bytes: Vec<u8>,
}

fn encode_f64_ordered(value: f64) -> [u8; 8] {
    let bits = value.to_bits();
    let ordered = if bits & SIGN_MASK == 0 {
        bits ^ SIGN_MASK
    } else {
        !bits
    };
    ordered.to_be_bytes()
}

fn decode_f64_ordered(bytes: [u8; 8]) -> f64 {
    let ordered = u64::from_be_bytes(bytes);
    let bits = if ordered & SIGN_MASK != 0 {
        ordered ^ SIGN_MASK
    } else {
        !ordered
    };
    f64::from_bits(bits)
}

fn push_count(buffer: &mut Vec<u8>, count: usize, column: &str) -> Result<(), EncodingError> {
    let count = u32::try_from(count).map_err(|_| EncodingError::MalformedColumn {
        column: column.to_string(),
        message: format!("{count} elements exceed the 32-bit element count"),
    })?;
    buffer.extend_from_slice(&count.to_be_bytes());
    Ok(())
}

/// Lays out one value in the byte encoding of its declared type.
pub fn encode_value(
    column: &str,
    declared: ValueType,
    value: &ColumnValue,
) -> Result<Vec<u8>, EncodingError> {
    let mut bytes = Vec::new();
    match (declared, value) {
        (ValueType::StringSet, ColumnValue::Strings(values)) => {
            push_count(&mut bytes, values.len(), column)?;
            for value in values {
                push_count(&mut bytes, value.len(), column)?;
                bytes.extend_from_slice(value.as_bytes());
            }
        }
        (ValueType::IntegerSet, ColumnValue::Integers(values)) => {
            push_count(&mut bytes, values.len(), column)?;
            for value in values {
                bytes.extend_from_slice(&value.to_be_bytes());
            }
        }
        (ValueType::DoubleList, ColumnValue::Doubles(values)) => {
            push_count(&mut bytes, values.len(), column)?;
            for &value in values {
                bytes.extend_from_slice(&encode_f64_ordered(value));
            }
        }
        (ValueType::Scalar(ScalarType::Double), ColumnValue::Double(value)) => {
            bytes.extend_from_slice(&encode_f64_ordered(*value));
        }
        (ValueType::Scalar(ScalarType::Text), ColumnValue::Text(value)) => {
            bytes.extend_from_slice(value.as_bytes());
        }
        (declared, found) => {
            return Err(EncodingError::TypeMismatch {
                column: column.to_string(),
                declared: declared.to_string(),
                found: found.kind().to_string(),
            });
        }
    }
    Ok(bytes)
}

/// A forward-only reader over column bytes.
struct Cursor<'a> {
    column: &'a str,
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn fail(&self, message: impl Into<String>) -> EncodingError {
        EncodingError::MalformedColumn {
            column: self.column.to_string(),
            message: message.into(),
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], EncodingError> {
        let (head, rest) = self
            .bytes
            .split_first_chunk::<N>()
            .ok_or_else(|| self.fail(format!("expected {N} more bytes")))?;
        self.bytes = rest;
        Ok(*head)
    }

    fn take_slice(&mut self, len: usize) -> Result<&'a [u8], EncodingError> {
        if self.bytes.len() < len {
            return Err(self.fail(format!(
                "element of {len} bytes overruns the remaining {}",
                self.bytes.len()
            )));
        }
        let (head, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Ok(head)
    }

    fn count(&mut self) -> Result<usize, EncodingError> {
        Ok(u32::from_be_bytes(self.take::<4>()?) as usize)
    }

    fn finish(self, value: ColumnValue) -> Result<ColumnValue, EncodingError> {
        if self.bytes.is_empty() {
            Ok(value)
        } else {
            Err(self.fail(format!("{} trailing bytes", self.bytes.len())))
        }
    }
}

fn utf8(cursor: &Cursor<'_>, bytes: &[u8]) -> Result<String, EncodingError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| cursor.fail("string is not valid UTF-8"))
}

/// Reads a column value back from its byte encoding.
pub fn decode_column(
    column: &str,
    declared: ValueType,
    bytes: &[u8],
) -> Result<ColumnValue, EncodingError> {
    let mut cursor = Cursor { column, bytes };
    let value = match declared {
        ValueType::StringSet => {
            let count = cursor.count()?;
            let mut values = BTreeSet::new();
            for _ in 0..count {
                let len = cursor.count()?;
                let raw = cursor.take_slice(len)?;
                values.insert(utf8(&cursor, raw)?);
            }
            ColumnValue::Strings(values)
        }
        ValueType::IntegerSet => {
            let count = cursor.count()?;
            let mut values = BTreeSet::new();
            for _ in 0..count {
                values.insert(u32::from_be_bytes(cursor.take::<4>()?));
            }
            ColumnValue::Integers(values)
        }
        ValueType::DoubleList => {
            let count = cursor.count()?;
            let mut values = Vec::with_capacity(count.min(cursor.bytes.len() / 8));
            for _ in 0..count {
                values.push(decode_f64_ordered(cursor.take::<8>()?));
            }
            ColumnValue::Doubles(values)
        }
        ValueType::Scalar(ScalarType::Double) => {
            ColumnValue::Double(decode_f64_ordered(cursor.take::<8>()?))
        }
        ValueType::Scalar(ScalarType::Text) => {
            let raw = cursor.take_slice(cursor.bytes.len())?;
            ColumnValue::Text(utf8(&cursor, raw)?)
        }
    };
    cursor.finish(value)
}

impl IndexRow {
    /// Produces the store writes for this row: one per non-empty column, in column order.
    pub fn column_writes(&self, registry: &ColumnRegistry) -> Result<Vec<ColumnWrite>, EncodingError> {
        let mut writes = Vec::with_capacity(self.columns.len());
        for (&id, value) in &self.columns {
            if value.is_empty() {
                continue;
            }
            let spec = registry
                .spec(id)
                .ok_or_else(|| EncodingError::MalformedColumn {
                    column: format!("{id:?}"),
                    message: "column is not declared by the registry".to_string(),
                })?;
            writes.push(ColumnWrite {
                id,
                name: spec.name.clone(),
                bytes: encode_value(&spec.name, spec.value_type, value)?,
            });
        }
        Ok(writes)
    }
}

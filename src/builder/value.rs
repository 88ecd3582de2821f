//! Value codec for trace operand and result fields.
//!
//! Scalar values appear in the trace as decimal text (integer or
//! floating-point); vector values (wider than 64 bits) appear as hex strings
//! with an optional `0x` prefix. The codec classifies a value from its
//! textual width and shape, then decodes it into the raw bits a
//! [`MemAccess`](crate::program::MemAccess) carries.

use crate::error::ErrorKind;

/// How a textual value is to be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Float,
    Vector,
}

/// Classify a value from its bit width and textual form: wider than 64 bits
/// is a vector, otherwise the presence of a decimal point marks a float.
pub fn classify(size_bits: u32, text: &str) -> ValueKind {
    if size_bits > 64 {
        ValueKind::Vector
    } else if text.contains('.') {
        ValueKind::Float
    } else {
        ValueKind::Integer
    }
}

/// Parse a scalar field as a floating-point literal. Unparseable text decodes
/// to zero, matching the permissive C scanner the trace was designed for.
pub fn parse_scalar(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or(0.0)
}

/// Convert a parsed scalar to its stored bit pattern.
///
/// Floats are reinterpreted at the requested IEEE-754 width; integers take a
/// truncating cast.
pub fn scalar_to_bits(value: f64, size_bytes: usize, is_float: bool) -> u64 {
    if is_float {
        if size_bytes == 4 {
            (value as f32).to_bits() as u64
        } else {
            value.to_bits()
        }
    } else {
        value as i64 as u64
    }
}

/// Decode a textual scalar straight to its bit pattern.
pub fn decode_scalar(text: &str, size_bytes: usize, is_float: bool) -> u64 {
    scalar_to_bits(parse_scalar(text), size_bytes, is_float)
}

/// Decode a hex vector value into its byte buffer, high nibble first.
///
/// The optional `0x` prefix is stripped. Odd-length or non-hex input fails
/// with [`ErrorKind::MalformedHex`].
pub fn decode_vector(text: &str) -> Result<Vec<u8>, ErrorKind> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    hex::decode(digits).map_err(|e| ErrorKind::MalformedHex {
        reason: e.to_string(),
    })
}

/// Format a byte buffer as a `0x`-prefixed hex string, optionally separated
/// with `_` every four bytes for readability.
pub fn encode_bytes_hex(bytes: &[u8], separate32: bool) -> String {
    if !separate32 {
        return format!("0x{}", hex::encode(bytes));
    }
    let mut out = String::from("0x");
    for (i, chunk) in bytes.chunks(4).enumerate() {
        if i > 0 {
            out.push('_');
        }
        out.push_str(&hex::encode(chunk));
    }
    out
}

//! Primitive byte-stream decoding (`spec.md` §4.3 "Parser").
//!
//! These functions decode one grammar element at a time from a cursor
//! position and report how many bytes were consumed; they do not recurse
//! into sub-terms themselves (the `exec` state machine drives that).

use crate::{name_object::AmlName, opcode, AmlError};
use alloc::string::String;

/// A decoded package-length prefix: the *total* number of bytes the
/// pkg-length encoding plus the following body occupies, and how many bytes
/// the encoding itself took.
#[derive(Clone, Copy, Debug)]
pub struct PkgLength {
    /// Offset (relative to the start of the encoding) of the first byte
    /// after the package, i.e. `encoded_len + body_len`.
    pub end: usize,
    pub encoded_len: usize,
}

/// Decodes a `PkgLength` at `bytes[0]` (`spec.md` §4.3 "PkgSize").
pub fn pkg_length(bytes: &[u8]) -> Result<PkgLength, AmlError> {
    if bytes.is_empty() {
        return Err(AmlError::UnexpectedEndOfStream);
    }
    let lead = bytes[0];
    let following_bytes = (lead >> 6) as usize;
    let encoded_len = 1 + following_bytes;
    if bytes.len() < encoded_len {
        return Err(AmlError::UnexpectedEndOfStream);
    }

    let total = if following_bytes == 0 {
        (lead & 0x3F) as u32
    } else {
        let mut value = (lead & 0x0F) as u32;
        for (i, &b) in bytes[1..encoded_len].iter().enumerate() {
            value |= (b as u32) << (4 + 8 * i);
        }
        value
    };

    if (total as usize) < encoded_len {
        return Err(AmlError::InvalidPkgLength);
    }
    if total as usize > bytes.len() {
        return Err(AmlError::InvalidPkgLength);
    }

    Ok(PkgLength { end: total as usize, encoded_len })
}

/// Decodes one of the integer-literal prefixes `0x0A/0x0B/0x0C/0x0E`
/// (`spec.md` §4.3 "Integer prefix"). Returns the value and total bytes
/// consumed (prefix included).
pub fn integer_prefix(bytes: &[u8]) -> Result<(u64, usize), AmlError> {
    if bytes.is_empty() {
        return Err(AmlError::UnexpectedEndOfStream);
    }
    let (width, skip_prefix) = match bytes[0] {
        opcode::BYTE_PREFIX => (1usize, 1usize),
        opcode::WORD_PREFIX => (2, 1),
        opcode::DWORD_PREFIX => (4, 1),
        opcode::QWORD_PREFIX => (8, 1),
        _ => return Err(AmlError::WrongParser),
    };
    if bytes.len() < skip_prefix + width {
        return Err(AmlError::UnexpectedEndOfStream);
    }
    let mut value: u64 = 0;
    for (i, &b) in bytes[skip_prefix..skip_prefix + width].iter().enumerate() {
        value |= (b as u64) << (8 * i);
    }
    Ok((value, skip_prefix + width))
}

/// Decodes a `StringPrefix` (`0x0D`) followed by null-terminated ASCII
/// (`spec.md` §4.3 "String prefix"). `bytes[0]` must be the prefix byte.
pub fn string_literal(bytes: &[u8]) -> Result<(String, usize), AmlError> {
    if bytes.is_empty() || bytes[0] != opcode::STRING_PREFIX {
        return Err(AmlError::WrongParser);
    }
    let body = &bytes[1..];
    let nul = body.iter().position(|&b| b == 0).ok_or(AmlError::UnterminatedStringConstant)?;
    let s = core::str::from_utf8(&body[..nul]).map_err(|_| AmlError::InvalidStringConstant)?;
    Ok((String::from(s), 1 + nul + 1))
}

/// Decodes a `NameString` at `bytes[0]` if the byte can start one
/// (`spec.md` §4.3 "Name"). Returns `None` if `bytes[0]` is not a name
/// start character, so callers can fall through to opcode dispatch.
pub fn name_string(bytes: &[u8]) -> Result<Option<(AmlName, usize)>, AmlError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    if !opcode::is_name_start(bytes[0]) {
        return Ok(None);
    }
    let (name, len) = AmlName::parse(bytes)?;
    Ok(Some((name, len)))
}

/// One decoded opcode: either a single byte, or the two-byte pair starting
/// with the extension prefix `0x5B` (`spec.md` §4.3 "Opcode").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedOpcode {
    pub byte: u8,
    pub ext: Option<u8>,
    pub len: usize,
}

pub fn opcode(bytes: &[u8]) -> Result<DecodedOpcode, AmlError> {
    if bytes.is_empty() {
        return Err(AmlError::UnexpectedEndOfStream);
    }
    if bytes[0] == opcode::EXT_OP_PREFIX {
        if bytes.len() < 2 {
            // An extension prefix on the block's final byte is a fatal parse error.
            return Err(AmlError::UnexpectedEndOfStream);
        }
        Ok(DecodedOpcode { byte: bytes[0], ext: Some(bytes[1]), len: 2 })
    } else {
        Ok(DecodedOpcode { byte: bytes[0], ext: None, len: 1 })
    }
}

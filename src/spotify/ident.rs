//! Identifier bridge: remote base-62 ids to the local 128-bit id space.
//!
//! Remote ids are base-62 strings (digits `0-9A-Za-z`) decoded as big-endian
//! arbitrary-precision integers. The local id space is 128 bits, which is
//! smaller than the 22-character remote id space, so the mapping is lossy at
//! the top end:
//!
//! - 16 decoded bytes are used directly
//! - fewer than 16 are left-padded with zero bytes
//! - 17 drop the most-significant byte (collisions are accepted; identity is
//!   preserved through the item's external reference)
//! - anything else is an error
//!
//! The mapping is deterministic and side-effect free.

use uuid::Uuid;

/// Errors from the identifier bridge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentError {
    #[error("empty remote id")]
    Empty,

    #[error("invalid base-62 character {0:?}")]
    InvalidCharacter(char),

    #[error("remote id decodes to {0} bytes, expected at most 17")]
    UnexpectedLength(usize),
}

/// Derive the local 128-bit id for a remote base-62 id.
pub fn derive_item_id(remote_id: &str) -> Result<Uuid, IdentError> {
    let bytes = decode_base62(remote_id)?;

    let mut id = [0u8; 16];
    match bytes.len() {
        len @ 0..=16 => id[16 - len..].copy_from_slice(&bytes),
        17 => id.copy_from_slice(&bytes[1..]),
        len => return Err(IdentError::UnexpectedLength(len)),
    }
    Ok(Uuid::from_bytes(id))
}

/// Decode a base-62 string into big-endian bytes with no leading zeros
/// (a zero value decodes to a single zero byte).
fn decode_base62(s: &str) -> Result<Vec<u8>, IdentError> {
    if s.is_empty() {
        return Err(IdentError::Empty);
    }

    // Big-endian schoolbook multiply-add; 22 characters decode to at most
    // 17 bytes so the accumulator stays tiny.
    let mut bytes: Vec<u8> = vec![0];
    for c in s.chars() {
        let digit = digit_value(c).ok_or(IdentError::InvalidCharacter(c))?;
        let mut carry = digit as u32;
        for b in bytes.iter_mut().rev() {
            let v = *b as u32 * 62 + carry;
            *b = (v & 0xff) as u8;
            carry = v >> 8;
        }
        while carry > 0 {
            bytes.insert(0, (carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let first = bytes
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(bytes.len() - 1);
    Ok(bytes[first..].to_vec())
}

fn digit_value(c: char) -> Option<u8> {
    match c {
        '0'..='9' => Some(c as u8 - b'0'),
        'A'..='Z' => Some(c as u8 - b'A' + 10),
        'a'..='z' => Some(c as u8 - b'a' + 36),
        _ => None,
    }
}

/* src/server/sourcemap/rust/src/vlq.rs */

// Base64 VLQ decoding for the `mappings` field of a v3 source map.
// Each digit carries 5 value bits plus a continuation bit; the lowest bit
// of the assembled value is the sign.

const CONTINUATION: u32 = 0b10_0000;
const VALUE_MASK: u32 = 0b01_1111;
const MAX_SHIFT: u32 = 55;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VlqError {
  InvalidDigit(char),
  Unterminated,
  Overflow,
}

fn base64_digit(b: u8) -> Option<u32> {
  match b {
    b'A'..=b'Z' => Some(u32::from(b - b'A')),
    b'a'..=b'z' => Some(u32::from(b - b'a') + 26),
    b'0'..=b'9' => Some(u32::from(b - b'0') + 52),
    b'+' => Some(62),
    b'/' => Some(63),
    _ => None,
  }
}

/// Decode every value in one comma-free segment, appending to `out`.
pub(crate) fn decode_segment(segment: &str, out: &mut Vec<i64>) -> Result<(), VlqError> {
  let mut value: i64 = 0;
  let mut shift: u32 = 0;
  let mut pending = false;

  for b in segment.bytes() {
    let digit = base64_digit(b).ok_or(VlqError::InvalidDigit(char::from(b)))?;
    if shift > MAX_SHIFT {
      return Err(VlqError::Overflow);
    }
    value += i64::from(digit & VALUE_MASK) << shift;
    if digit & CONTINUATION != 0 {
      shift += 5;
      pending = true;
      continue;
    }
    let magnitude = value >> 1;
    out.push(if value & 1 == 1 { -magnitude } else { magnitude });
    value = 0;
    shift = 0;
    pending = false;
  }

  if pending {
    return Err(VlqError::Unterminated);
  }
  Ok(())
}

#[cfg(test)]
pub(crate) fn encode_value(value: i64, out: &mut String) {
  const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
  let mut rest = if value < 0 { ((-value) << 1) | 1 } else { value << 1 };
  loop {
    let mut digit = (rest & i64::from(VALUE_MASK)) as usize;
    rest >>= 5;
    if rest > 0 {
      digit |= CONTINUATION as usize;
    }
    out.push(char::from(ALPHABET[digit]));
    if rest == 0 {
      break;
    }
  }
}

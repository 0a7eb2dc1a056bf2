/* src/cli/ssr-build/src/fnv.rs */

use std::path::Path;

const FNV_OFFSET: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// FNV-1a 32-bit.
pub(crate) fn fnv1a_32(input: &[u8]) -> u32 {
  let mut hash = FNV_OFFSET;
  for byte in input {
    hash ^= u32::from(*byte);
    hash = hash.wrapping_mul(FNV_PRIME);
  }
  hash
}

/// Page path -> 8 hex chars. Separators are normalized so the same page
/// hashes the same on every platform.
pub(crate) fn path_hash(path: &Path) -> String {
  let normalized = path.to_string_lossy().replace('\\', "/");
  format!("{:08x}", fnv1a_32(normalized.as_bytes()))
}

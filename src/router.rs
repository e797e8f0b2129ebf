//! Object identifier → backend index.
//!
//! The hash is 32-bit FNV-1a over the identifier's UTF-8 bytes, reduced modulo the
//! backend count. This choice is part of the on-disk layout of every deployment:
//! changing it moves objects to backends that do not hold them.
//!
//! Routing depends on the backend *count*, so any membership change reassigns most
//! identifiers. Existing objects are not migrated when that happens.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Index of the backend responsible for `id` among `backend_count` backends.
///
/// Callers must check for an empty backend set first; `backend_count` must be non-zero.
pub fn resolve(id: &str, backend_count: usize) -> usize {
    debug_assert!(backend_count > 0, "resolve called with no backends");
    fnv1a_32(id.as_bytes()) as usize % backend_count
}

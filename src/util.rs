//! Small helpers for binary data processing.

// =============================================================================
// Strings
// =============================================================================

/// Finds the position of the first null byte in a slice.
#[inline(always)]
pub fn memchr_null(data: &[u8]) -> usize {
    memchr::memchr(0, data).unwrap_or(data.len())
}

/// Decodes a string field up to its first null byte (or the end of the slice).
///
/// Invalid UTF-8 is replaced rather than rejected; load command paths are
/// compared, never interpreted.
pub fn cstr_until_null(data: &[u8]) -> String {
    String::from_utf8_lossy(&data[..memchr_null(data)]).into_owned()
}

// =============================================================================
// Alignment Utilities
// =============================================================================

/// Aligns a value up to the given power-of-two alignment.
///
/// # Panics
///
/// Debug assertion fails if `alignment` is not a power of 2.
#[inline(always)]
pub const fn align_up(value: u32, alignment: u32) -> u32 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

#![allow(dead_code)] // Per-target declarations, not all referenced on every target

#[cfg(has_sentinel)]
extern "C" {
    /// Integrity canary from `asm/sentinel.S`.
    /// Occupies its own page. It is inspected and repaired, never called.
    pub fn integrity_sentinel();
}

#[cfg(target_vendor = "apple")]
extern "C" {
    /// Number of images currently loaded by dyld.
    pub fn _dyld_image_count() -> u32;

    /// Path of the image at `image_index`, or NULL when out of range.
    pub fn _dyld_get_image_name(image_index: u32) -> *const libc::c_char;

    /// `mach_header` of the image at `image_index`. Index 0 is the main
    /// executable.
    pub fn _dyld_get_image_header(image_index: u32) -> *const libc::c_void;
}

/// Maximum length of a system property value, terminator included.
#[cfg(target_os = "android")]
pub const PROP_VALUE_MAX: usize = 92;

#[cfg(target_os = "android")]
extern "C" {
    /// Copies the value of `name` into `value`, returns its length
    /// (0 when unset).
    pub fn __system_property_get(name: *const libc::c_char, value: *mut libc::c_char)
        -> libc::c_int;
}

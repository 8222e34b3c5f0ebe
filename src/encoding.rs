//! Encoding Utilities
//!
//! Single-byte XOR obfuscation for detection fingerprints and a reflected
//! CRC32 for payload checksums.
//!
//! Fingerprints are declared with the [`signature!`] macro, which XORs the
//! literal during constant evaluation. Only the encoded bytes end up in the
//! binary, so a `strings` pass over the library finds no framework names.

use std::borrow::Cow;
use std::fmt;

/// Key used by [`signature!`] when none is given.
pub const SIGNATURE_KEY: u8 = 0xAA;

/// Reflected IEEE 802.3 polynomial.
const CRC32_POLYNOMIAL: u32 = 0xEDB8_8320;

const CRC32_TABLE: [u32; 256] = build_crc32_table();

/// Declares an obfuscated [`Signature`] from a byte-string literal.
///
/// ```
/// use security_core::{encoding::Signature, signature};
///
/// const MARKER: Signature = signature!(b"gum-js-loop");
/// assert_eq!(MARKER.reveal_str(), "gum-js-loop");
/// ```
#[macro_export]
macro_rules! signature {
    ($plain:literal) => {
        $crate::signature!($plain, $crate::encoding::SIGNATURE_KEY)
    };
    ($plain:literal, $key:expr) => {{
        const PLAIN: &[u8] = $plain;
        const ENCODED: [u8; PLAIN.len()] = $crate::encoding::xor_array(PLAIN, $key);
        $crate::encoding::Signature::new(&ENCODED, $key)
    }};
}

/// An XOR-encoded fingerprint together with its key.
///
/// The plaintext only exists transiently, in the owned buffer returned by
/// [`Signature::reveal`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    encoded: &'static [u8],
    key: u8,
}

impl Signature {
    pub const fn new(encoded: &'static [u8], key: u8) -> Self {
        Self { encoded, key }
    }

    pub fn encoded(&self) -> &'static [u8] {
        self.encoded
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    /// Decodes into a fresh buffer.
    pub fn reveal(&self) -> Vec<u8> {
        decode(self.encoded, self.key)
    }

    pub fn reveal_str(&self) -> String {
        decode_to_string(self.encoded, self.key)
    }

    /// Returns true if `haystack` contains the decoded fingerprint.
    pub fn found_in(&self, haystack: &str) -> bool {
        haystack.contains(self.reveal_str().as_str())
    }
}

impl fmt::Debug for Signature {
    // Never print the plaintext.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("len", &self.encoded.len())
            .field("key", &format_args!("{:#04x}", self.key))
            .finish()
    }
}

/// XORs every byte of `input` with `key`.
///
/// The output buffer is sized to the input, whatever its length. Applying
/// the function twice with the same key yields the original bytes.
pub fn decode(input: &[u8], key: u8) -> Vec<u8> {
    input.iter().map(|byte| byte ^ key).collect()
}

/// [`decode`] followed by a lossy UTF-8 conversion.
pub fn decode_to_string(input: &[u8], key: u8) -> String {
    let bytes = decode(input, key);
    match String::from_utf8_lossy(&bytes) {
        Cow::Borrowed(text) => text.to_owned(),
        Cow::Owned(text) => text,
    }
}

/// Const counterpart of [`decode`] used by [`signature!`].
pub const fn xor_array<const N: usize>(input: &[u8], key: u8) -> [u8; N] {
    let mut out = [0u8; N];
    let mut i = 0;
    while i < N && i < input.len() {
        out[i] = input[i] ^ key;
        i += 1;
    }
    out
}

/// Standard CRC32 (reflected, init `0xFFFFFFFF`, final complement).
///
/// Matches zlib's `crc32()` and the IEEE 802.3 frame check sequence.
pub fn checksum(bytes: &[u8]) -> u32 {
    let crc = bytes.iter().fold(0xFFFF_FFFFu32, |crc, &byte| {
        CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8)
    });
    !crc
}

const fn build_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut crc = n as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32_POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[n] = crc;
        n += 1;
    }
    table
}

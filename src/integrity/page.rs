//! Privileged code patching.
//!
//! This is the only place in the crate that changes page protections. The
//! contract is narrow:
//!
//! 1. the span is rounded out to whole pages and kept as small as possible;
//! 2. pages go `R+W+X` only for the duration of the copy;
//! 3. `R+X` is restored on every exit path, including errors, by a guard.
//!
//! The instruction cache is not synchronised: patched code must not be
//! executing, and callers on ARM must not jump into it afterwards.
//! Platforms that enforce W^X on code (iOS, hardened Android builds) refuse
//! the protection change, which surfaces as [`ShieldError::PageProtection`].

use std::io;

use tracing::warn;

use crate::error::{Result, ShieldError};

const FALLBACK_PAGE_SIZE: usize = 4096;

pub fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        FALLBACK_PAGE_SIZE
    }
}

/// A page-aligned address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    pub start: usize,
    pub len: usize,
}

impl PageSpan {
    /// Smallest run of whole pages covering `addr..addr + len`.
    /// `page_size` must be a power of two.
    pub fn covering(addr: usize, len: usize, page_size: usize) -> Self {
        let mask = !(page_size - 1);
        let start = addr & mask;
        let end = addr
            .saturating_add(len.max(1))
            .saturating_add(page_size - 1)
            & mask;
        Self {
            start,
            len: end - start,
        }
    }

    /// # Safety
    /// The span must be mapped in this process.
    unsafe fn protect(&self, prot: libc::c_int) -> Result<()> {
        if libc::mprotect(self.start as *mut libc::c_void, self.len, prot) != 0 {
            return Err(ShieldError::PageProtection {
                address: self.start,
                len: self.len,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

/// Puts a span back to `R+X` when dropped.
struct RestoreExec {
    span: PageSpan,
}

impl Drop for RestoreExec {
    fn drop(&mut self) {
        // SAFETY: the span was successfully protected moments ago, so it is mapped.
        if let Err(err) = unsafe { self.span.protect(libc::PROT_READ | libc::PROT_EXEC) } {
            warn!("[PAGE] failed to restore R+X: {}", err);
        }
    }
}

/// Copies `bytes` over code at `target`.
///
/// # Safety
/// `target..target + bytes.len()` must be mapped code of this process that
/// no thread is executing, and no other thread may change the protection of
/// the same pages concurrently.
pub unsafe fn patch_code(target: *mut u8, bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }

    let span = PageSpan::covering(target as usize, bytes.len(), page_size());
    span.protect(libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC)?;
    let _restore = RestoreExec { span };

    std::ptr::copy_nonoverlapping(bytes.as_ptr(), target, bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_single_page() {
        let span = PageSpan::covering(0x1000 + 0x10, 3, 0x1000);
        assert_eq!(span, PageSpan { start: 0x1000, len: 0x1000 });
    }

    #[test]
    fn test_span_crossing_boundary() {
        let span = PageSpan::covering(0x1FFE, 4, 0x1000);
        assert_eq!(span, PageSpan { start: 0x1000, len: 0x2000 });
    }

    #[test]
    fn test_span_zero_length_still_covers_a_page() {
        let span = PageSpan::covering(0x3000, 0, 0x1000);
        assert_eq!(span, PageSpan { start: 0x3000, len: 0x1000 });
    }

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(page_size().is_power_of_two());
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_patch_code_on_executable_mapping() {
        let size = page_size();
        unsafe {
            let page = libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            assert_ne!(page, libc::MAP_FAILED);
            let base = page as *mut u8;
            std::ptr::write_bytes(base, 0x90, 16);
            assert_eq!(libc::mprotect(page, size, libc::PROT_READ | libc::PROT_EXEC), 0);

            patch_code(base.add(4), &[0xCC, 0xCC]).unwrap();

            let patched = std::slice::from_raw_parts(base, 8);
            assert_eq!(patched, &[0x90, 0x90, 0x90, 0x90, 0xCC, 0xCC, 0x90, 0x90]);
            libc::munmap(page, size);
        }
    }
}

//! Code Integrity Monitor
//!
//! Compares the live bytes of `integrity_sentinel` (a page-aligned routine
//! from `asm/sentinel.S`) against the bytes it was assembled from, and
//! writes them back when they differ.
//!
//! Patching tools overwrite function prologues. A routine whose exact
//! bytes are known at build time gives a cheap tamper oracle without a full
//! code-signing check.
//!
//! ## State machine
//!
//! `Idle -> Armed -> Monitoring -> Stopped`, driven by [`watchdog::Watchdog`].
//!
//! ## Locking
//!
//! Every read and write of the sentinel page goes through one process-wide
//! mutex, so `verify`/`heal` may be called from any thread while the
//! watchdog is running.

pub mod page;
pub mod watchdog;

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{error, info, warn};

use crate::error::{Result, ShieldError};

/// `nop; nop; ret`
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub const SENTINEL_REFERENCE: &[u8] = &[0x90, 0x90, 0xC3];

/// `nop; nop; ret`
#[cfg(target_arch = "aarch64")]
pub const SENTINEL_REFERENCE: &[u8] = &[
    0x1F, 0x20, 0x03, 0xD5, //
    0x1F, 0x20, 0x03, 0xD5, //
    0xC0, 0x03, 0x5F, 0xD6,
];

/// `nop; nop; bx lr` (ARM state)
#[cfg(target_arch = "arm")]
pub const SENTINEL_REFERENCE: &[u8] = &[
    0x00, 0xF0, 0x20, 0xE3, //
    0x00, 0xF0, 0x20, 0xE3, //
    0x1E, 0xFF, 0x2F, 0xE1,
];

#[cfg(not(any(
    target_arch = "x86",
    target_arch = "x86_64",
    target_arch = "aarch64",
    target_arch = "arm"
)))]
pub const SENTINEL_REFERENCE: &[u8] = &[];

static PAGE_GUARD: Mutex<()> = Mutex::new(());

/// Expected bytes of the sentinel. Fixed at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    expected: &'static [u8],
}

impl Snapshot {
    pub fn bytes(&self) -> &'static [u8] {
        self.expected
    }

    pub fn len(&self) -> usize {
        self.expected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }
}

/// Outcome of one [`heal`] call.
#[derive(Debug)]
pub enum HealOutcome {
    /// Nothing to repair.
    Intact,
    /// The sentinel was tampered and has been restored; re-verified.
    Healed,
    /// The repair could not be written, or did not stick.
    Failed(ShieldError),
}

impl HealOutcome {
    /// True when the sentinel matches its reference after the call.
    pub fn is_intact(&self) -> bool {
        !matches!(self, HealOutcome::Failed(_))
    }
}

pub fn capture_reference() -> Snapshot {
    Snapshot {
        expected: SENTINEL_REFERENCE,
    }
}

pub fn sentinel_available() -> bool {
    cfg!(has_sentinel)
}

/// True when the live sentinel matches the reference.
///
/// Targets without a sentinel have nothing to check and report intact.
pub fn verify() -> bool {
    let _guard = lock_page();
    verify_locked()
}

/// Restores the sentinel if it was tampered, then re-verifies.
pub fn heal() -> HealOutcome {
    heal_with(write_sentinel)
}

/// [`heal`] with the page writer supplied by the caller.
pub(crate) fn heal_with<W>(write: W) -> HealOutcome
where
    W: FnOnce(&[u8]) -> Result<()>,
{
    let _guard = lock_page();
    if verify_locked() {
        return HealOutcome::Intact;
    }

    warn!("[INTEGRITY] sentinel tampered, restoring reference bytes");
    if let Err(err) = write(capture_reference().bytes()) {
        error!("[INTEGRITY] heal failed: {}", err);
        return HealOutcome::Failed(err);
    }

    if verify_locked() {
        info!("[INTEGRITY] sentinel restored");
        HealOutcome::Healed
    } else {
        error!("[INTEGRITY] sentinel still differs after heal");
        HealOutcome::Failed(ShieldError::HealNotPersisted)
    }
}

/// Overwrites the sentinel with `bytes`.
///
/// This is the tamper simulation hook used by tests and the self-heal drill
/// of the demo binary. `bytes` must have the sentinel's length.
pub fn overwrite_sentinel(bytes: &[u8]) -> Result<()> {
    let _guard = lock_page();
    write_sentinel(bytes)
}

/// Current sentinel bytes, `None` when the target has no sentinel.
pub fn live_bytes() -> Option<Vec<u8>> {
    let _guard = lock_page();
    read_live()
}

fn lock_page() -> MutexGuard<'static, ()> {
    PAGE_GUARD.lock().unwrap_or_else(PoisonError::into_inner)
}

fn verify_locked() -> bool {
    match read_live() {
        Some(live) => live == SENTINEL_REFERENCE,
        None => true,
    }
}

#[cfg(has_sentinel)]
fn sentinel_address() -> *mut u8 {
    crate::ffi::integrity_sentinel as *const () as *mut u8
}

#[cfg(has_sentinel)]
fn read_live() -> Option<Vec<u8>> {
    let base = sentinel_address();
    let live = (0..SENTINEL_REFERENCE.len())
        // SAFETY: the sentinel is mapped readable for the process lifetime
        // and is SENTINEL_REFERENCE.len() bytes long.
        .map(|offset| unsafe { std::ptr::read_volatile(base.add(offset)) })
        .collect();
    Some(live)
}

#[cfg(not(has_sentinel))]
fn read_live() -> Option<Vec<u8>> {
    None
}

#[cfg(has_sentinel)]
fn write_sentinel(bytes: &[u8]) -> Result<()> {
    if bytes.len() != SENTINEL_REFERENCE.len() {
        return Err(ShieldError::PatchLength {
            len: bytes.len(),
            expected: SENTINEL_REFERENCE.len(),
        });
    }
    // SAFETY: the sentinel sits alone on its page and is never executed.
    unsafe { page::patch_code(sentinel_address(), bytes) }
}

#[cfg(not(has_sentinel))]
fn write_sentinel(_bytes: &[u8]) -> Result<()> {
    Err(ShieldError::SentinelUnavailable)
}

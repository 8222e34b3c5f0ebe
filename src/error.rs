use std::io;

use thiserror::Error;

/// Errors raised by the fallible internals of the protection engine.
///
/// None of these cross a probe boundary: every public probe converts them
/// into its conservative default and logs them. They are surfaced directly
/// only by the integrity primitives and the watchdog, where callers may want
/// to distinguish "could not heal" from "nothing to heal".
#[derive(Debug, Error)]
pub enum ShieldError {
    /// `mprotect` refused to change the protection of a code page.
    #[error("page protection change failed at {address:#x} (+{len} bytes): {source}")]
    PageProtection {
        address: usize,
        len: usize,
        #[source]
        source: io::Error,
    },

    /// The target architecture has no integrity sentinel compiled in.
    #[error("integrity sentinel is not available on this target")]
    SentinelUnavailable,

    /// A patch did not have the length of the region it replaces.
    #[error("patch of {len} bytes does not fit the {expected}-byte sentinel")]
    PatchLength { len: usize, expected: usize },

    /// The sentinel still differs from its reference right after a heal.
    #[error("sentinel bytes still differ from the reference after healing")]
    HealNotPersisted,

    /// A loaded image header could not be walked.
    #[error("malformed image: {0}")]
    MalformedImage(String),

    /// The platform lacks the mechanism a probe relies on.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    /// The watchdog thread could not be started.
    #[error("failed to spawn watchdog thread: {0}")]
    Spawn(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ShieldError>;

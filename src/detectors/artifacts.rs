//! Filesystem artifact probe.
//!
//! Existence-only checks: nothing is opened or read. A path that cannot be
//! stat'ed for any reason other than a clean hit counts as absent.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::detectors::ProbeResult;

/// Instrumentation framework drops on either platform.
pub const INSTRUMENTATION_FILES: &[&str] = &[
    "/usr/lib/frida",
    "/usr/lib/frida-gadget.dylib",
    "/usr/lib/frida-agent.dylib",
    "/var/root/frida",
    "/data/local/tmp/frida-server",
    "/data/local/tmp/fd-server",
];

/// Default location of a pushed Frida server on Android.
pub const INSTRUMENTATION_SERVER_PATH: &str = "/data/local/tmp/frida-server";

/// `su` binaries and Superuser leftovers.
pub const ANDROID_ROOT_BINARIES: &[&str] = &[
    "/system/xbin/su",
    "/system/bin/su",
    "/sbin/su",
    "/system/app/Superuser.apk",
    "/system/bin/.ext/.su",
    "/system/usr/we-need-root/su.backup",
    "/system/xbin/mu",
];

/// Root-management apps, checked through their data directories.
pub const ROOT_MANAGER_PACKAGES: &[&str] = &[
    "com.noshufou.android.su",
    "eu.chainfire.supersu",
    "com.koushikdutta.superuser",
    "com.zachspong.temprootremovejb",
    "com.ramdroid.appquarantine",
];

pub const ANDROID_PACKAGE_DATA_DIR: &str = "/data/data";

pub const JAILBREAK_ARTIFACTS: &[&str] = &[
    "/Applications/Cydia.app",
    "/Library/MobileSubstrate/MobileSubstrate.dylib",
    "/bin/bash",
    "/usr/sbin/sshd",
    "/etc/apt",
    "/private/var/lib/apt/",
];

/// True if any of `paths` exists as a file or directory.
pub fn detect_artifacts<I, P>(paths: I) -> ProbeResult
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    for path in paths {
        let path = path.as_ref();
        match std::fs::metadata(path) {
            Ok(_) => {
                debug!("[ARTIFACT] present: {}", path.display());
                return ProbeResult::detected(format!("artifact present: {}", path.display()));
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                debug!("[ARTIFACT] unable to stat {}: {}", path.display(), err);
            }
        }
    }
    ProbeResult::clear()
}

/// Data directories of the known root managers under `data_dir`.
pub fn package_paths(data_dir: &Path, packages: &[&str]) -> Vec<PathBuf> {
    packages.iter().map(|package| data_dir.join(package)).collect()
}

pub fn detect_instrumentation_files() -> ProbeResult {
    detect_artifacts(INSTRUMENTATION_FILES)
}

pub fn detect_root_binaries() -> ProbeResult {
    detect_artifacts(ANDROID_ROOT_BINARIES)
}

pub fn detect_root_packages() -> ProbeResult {
    detect_artifacts(package_paths(
        Path::new(ANDROID_PACKAGE_DATA_DIR),
        ROOT_MANAGER_PACKAGES,
    ))
}

pub fn detect_jailbreak_artifacts() -> ProbeResult {
    detect_artifacts(JAILBREAK_ARTIFACTS)
}

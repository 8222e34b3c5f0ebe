//! Process introspection through the proc pseudo-filesystem.
//!
//! Each probe takes the path it reads so the parsing can be exercised
//! against fixture trees. The `*_self` wrappers point them at
//! `/proc/self`.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::detectors::ProbeResult;
use crate::encoding::Signature;

pub const PROC_SELF_TASK: &str = "/proc/self/task";
pub const PROC_SELF_MAPS: &str = "/proc/self/maps";
pub const PROC_SELF_CMDLINE: &str = "/proc/self/cmdline";
pub const PROC_MOUNTS: &str = "/proc/mounts";

/// True when this process exposes a proc filesystem we can read.
pub fn procfs_available() -> bool {
    Path::new(PROC_SELF_MAPS).exists()
}

/// Scans `<task_dir>/<tid>/comm` for a thread name containing `marker`.
///
/// Threads may exit while the directory is walked; entries that vanish or
/// cannot be read are skipped.
pub fn scan_thread_names(task_dir: &Path, marker: &Signature) -> ProbeResult {
    let entries = match fs::read_dir(task_dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("[PROCFS] cannot list {}: {}", task_dir.display(), err);
            return ProbeResult::clear();
        }
    };

    let needle = marker.reveal_str();
    for entry in entries.flatten() {
        let comm_path = entry.path().join("comm");
        let Ok(raw) = fs::read(&comm_path) else {
            continue;
        };
        let name = String::from_utf8_lossy(&raw);
        let name = name.trim_end();
        if name.contains(needle.as_str()) {
            return ProbeResult::detected(format!(
                "thread {} runs as '{}'",
                entry.file_name().to_string_lossy(),
                name
            ));
        }
    }
    ProbeResult::clear()
}

pub fn detect_injected_thread(marker: &Signature) -> ProbeResult {
    scan_thread_names(Path::new(PROC_SELF_TASK), marker)
}

/// Searches a maps listing for a mapping whose line contains `marker`.
///
/// An unreadable listing means the platform is not introspectable, which
/// is reported as nothing found.
pub fn scan_mappings(maps_path: &Path, marker: &Signature) -> ProbeResult {
    let file = match File::open(maps_path) {
        Ok(file) => file,
        Err(err) => {
            debug!("[PROCFS] cannot open {}: {}", maps_path.display(), err);
            return ProbeResult::clear();
        }
    };

    let needle = marker.reveal_str();
    let reader = BufReader::new(file);
    for raw in reader.split(b'\n') {
        let raw = match raw {
            Ok(raw) => raw,
            Err(err) => {
                debug!("[PROCFS] read of {} stopped: {}", maps_path.display(), err);
                break;
            }
        };
        // Backing file names are arbitrary bytes.
        let line = String::from_utf8_lossy(&raw);
        if line.contains(needle.as_str()) {
            let region = line.split_whitespace().next().unwrap_or_default();
            let backing = line.split_whitespace().nth(5).unwrap_or("[anon]");
            return ProbeResult::detected(format!(
                "suspicious mapping {} backed by {}",
                region, backing
            ));
        }
    }
    ProbeResult::clear()
}

pub fn detect_suspicious_mappings(marker: &Signature) -> ProbeResult {
    scan_mappings(Path::new(PROC_SELF_MAPS), marker)
}

/// First NUL-terminated argument of a raw cmdline, i.e. the process name.
pub fn process_name(cmdline: &[u8]) -> String {
    let first = cmdline.split(|&b| b == 0).next().unwrap_or_default();
    String::from_utf8_lossy(first).into_owned()
}

/// Compares the process name against the trusted identifier.
///
/// `detected` means the identity is NOT trusted: either it does not
/// contain `trusted`, or it could not be read at all.
pub fn check_identity(cmdline_path: &Path, trusted: &str) -> ProbeResult {
    let raw = match fs::read(cmdline_path) {
        Ok(raw) => raw,
        Err(err) => {
            return ProbeResult::detected(format!(
                "process identity unreadable ({}): {}",
                cmdline_path.display(),
                err
            ));
        }
    };

    let name = process_name(&raw);
    if !trusted.is_empty() && name.contains(trusted) {
        ProbeResult::clear()
    } else {
        ProbeResult::detected(format!(
            "process identity '{}' does not match '{}'",
            name, trusted
        ))
    }
}

pub fn check_identity_self(trusted: &str) -> ProbeResult {
    check_identity(Path::new(PROC_SELF_CMDLINE), trusted)
}

/// Returns the first rw mount entry that holds the system image: `/system`,
/// `/system_root`, or `/` on system-as-root devices. A ramdisk root
/// (`rootfs`, `tmpfs`) is always writable and is not reported.
pub fn writable_system_mount(mounts: &str) -> Option<&str> {
    mounts.lines().find(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (Some(mount_point), Some(fs_type), Some(options)) =
            (fields.get(1), fields.get(2), fields.get(3))
        else {
            return false;
        };
        let is_system = match *mount_point {
            "/system" | "/system_root" => true,
            "/" => !matches!(*fs_type, "rootfs" | "tmpfs"),
            _ => false,
        };
        is_system && options.split(',').any(|opt| opt == "rw")
    })
}

pub fn detect_writable_system(mounts_path: &Path) -> ProbeResult {
    let mounts = match fs::read(mounts_path) {
        Ok(raw) => String::from_utf8_lossy(&raw).into_owned(),
        Err(err) => {
            debug!("[PROCFS] cannot read {}: {}", mounts_path.display(), err);
            return ProbeResult::clear();
        }
    };
    match writable_system_mount(&mounts) {
        Some(line) => ProbeResult::detected(format!("system partition mounted rw: {}", line)),
        None => ProbeResult::clear(),
    }
}

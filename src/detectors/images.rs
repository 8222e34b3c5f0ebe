//! Binary image and symbol probes.
//!
//! - Loaded images: `dl_iterate_phdr` on Linux/Android, dyld on Apple.
//! - Exported symbols: `dlsym` in the global scope of the process.
//! - Segments: the load commands of the main Mach-O image (Apple only).
//!
//! Platforms without a mechanism report nothing found. That is a coverage
//! gap, not evidence of a clean process; `EnvironmentState` lists it.

use tracing::debug;

use crate::detectors::ProbeResult;
use crate::encoding::Signature;
use crate::error::{Result, ShieldError};

pub const LIBRARY_MARKERS: [Signature; 3] = [
    crate::signature!(b"frida"),
    crate::signature!(b"gum"),
    crate::signature!(b"gjs"),
];

pub const SYMBOL_MARKERS: [Signature; 3] = [
    crate::signature!(b"frida_agent_main"),
    crate::signature!(b"gum_init"),
    crate::signature!(b"gjs_context_eval"),
];

pub const SEGMENT_MARKERS: [Signature; 2] =
    [crate::signature!(b"frida"), crate::signature!(b"gum")];

pub const MH_MAGIC_64: u32 = 0xFEED_FACF;
pub const LC_SEGMENT_64: u32 = 0x19;
pub const MACH_HEADER_64_SIZE: usize = 32;
const SEGNAME_OFFSET: usize = 8;
const SEGNAME_LEN: usize = 16;

/// Returns the first name containing any of `markers`.
pub fn find_marked<'a, I>(names: I, markers: &[Signature]) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let needles: Vec<String> = markers.iter().map(Signature::reveal_str).collect();
    names
        .into_iter()
        .find(|name| needles.iter().any(|needle| name.contains(needle.as_str())))
}

pub fn detect_loaded_libraries() -> ProbeResult {
    let names = match loaded_image_names() {
        Ok(names) => names,
        Err(err) => {
            debug!("[IMAGES] image enumeration unavailable: {}", err);
            return ProbeResult::clear();
        }
    };
    match find_marked(names.iter().map(String::as_str), &LIBRARY_MARKERS) {
        Some(name) => ProbeResult::detected(format!("instrumentation image loaded: {}", name)),
        None => ProbeResult::clear(),
    }
}

pub fn detect_exported_symbols() -> ProbeResult {
    for marker in &SYMBOL_MARKERS {
        let symbol = marker.reveal_str();
        if resolve_global_symbol(&symbol) {
            return ProbeResult::detected(format!("instrumentation symbol exported: {}", symbol));
        }
    }
    ProbeResult::clear()
}

pub fn detect_injected_segments() -> ProbeResult {
    let names = match main_image_segment_names() {
        Ok(names) => names,
        Err(err) => {
            debug!("[IMAGES] segment walk unavailable: {}", err);
            return ProbeResult::clear();
        }
    };
    match find_marked(names.iter().map(String::as_str), &SEGMENT_MARKERS) {
        Some(name) => ProbeResult::detected(format!("injected segment in main image: {}", name)),
        None => ProbeResult::clear(),
    }
}

/// True when loaded images can be listed on this platform.
pub fn image_enumeration_available() -> bool {
    cfg!(any(
        target_os = "linux",
        target_os = "android",
        target_vendor = "apple"
    ))
}

/// True when the main image's segments can be walked on this platform.
pub fn segment_walk_available() -> bool {
    cfg!(target_vendor = "apple")
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn loaded_image_names() -> Result<Vec<String>> {
    use std::ffi::CStr;

    unsafe extern "C" fn collect(
        info: *mut libc::dl_phdr_info,
        _size: libc::size_t,
        data: *mut libc::c_void,
    ) -> libc::c_int {
        // SAFETY: `data` is the Vec passed below, `info` is valid for the
        // duration of the callback.
        let names = &mut *(data as *mut Vec<String>);
        let name = (*info).dlpi_name;
        if !name.is_null() {
            let name = CStr::from_ptr(name).to_string_lossy();
            if !name.is_empty() {
                names.push(name.into_owned());
            }
        }
        0
    }

    let mut names: Vec<String> = Vec::new();
    // SAFETY: the callback only touches `names`, which outlives the call.
    unsafe {
        libc::dl_iterate_phdr(
            Some(collect),
            &mut names as *mut Vec<String> as *mut libc::c_void,
        );
    }
    Ok(names)
}

#[cfg(target_vendor = "apple")]
pub fn loaded_image_names() -> Result<Vec<String>> {
    use std::ffi::CStr;

    use crate::ffi::{_dyld_get_image_name, _dyld_image_count};

    // SAFETY: dyld returns NUL-terminated names owned by the loader.
    let names = unsafe {
        (0.._dyld_image_count())
            .filter_map(|index| {
                let name = _dyld_get_image_name(index);
                (!name.is_null()).then(|| CStr::from_ptr(name).to_string_lossy().into_owned())
            })
            .collect()
    };
    Ok(names)
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_vendor = "apple")))]
pub fn loaded_image_names() -> Result<Vec<String>> {
    Err(ShieldError::Unsupported("loaded image enumeration"))
}

/// Looks `name` up in the global symbol scope of the process.
#[cfg(unix)]
pub fn resolve_global_symbol(name: &str) -> bool {
    let Ok(c_name) = std::ffi::CString::new(name) else {
        return false;
    };
    // SAFETY: dlopen(NULL) returns a handle to the main program; it is
    // closed before returning.
    unsafe {
        let handle = libc::dlopen(std::ptr::null(), libc::RTLD_NOW);
        if handle.is_null() {
            return false;
        }
        let found = !libc::dlsym(handle, c_name.as_ptr()).is_null();
        libc::dlclose(handle);
        found
    }
}

#[cfg(not(unix))]
pub fn resolve_global_symbol(_name: &str) -> bool {
    false
}

#[cfg(target_vendor = "apple")]
pub fn main_image_segment_names() -> Result<Vec<String>> {
    use crate::ffi::_dyld_get_image_header;

    // SAFETY: image 0 is the main executable, mapped for the process
    // lifetime. Only the header and its load commands are read.
    unsafe {
        let header = _dyld_get_image_header(0) as *const u8;
        if header.is_null() {
            return Err(ShieldError::MalformedImage("no main image header".into()));
        }
        let fixed = std::slice::from_raw_parts(header, MACH_HEADER_64_SIZE);
        if read_u32(fixed, 0)? != MH_MAGIC_64 {
            return Err(ShieldError::Unsupported("non 64-bit Mach-O main image"));
        }
        let sizeofcmds = read_u32(fixed, 20)? as usize;
        let image = std::slice::from_raw_parts(header, MACH_HEADER_64_SIZE + sizeofcmds);
        macho_segment_names(image)
    }
}

#[cfg(not(target_vendor = "apple"))]
pub fn main_image_segment_names() -> Result<Vec<String>> {
    Err(ShieldError::Unsupported("Mach-O segment walking"))
}

/// Lists `LC_SEGMENT_64` names from a 64-bit Mach-O header and the load
/// commands that follow it.
///
/// `image` must start at the `mach_header_64` and cover at least
/// `sizeofcmds` bytes past it.
pub fn macho_segment_names(image: &[u8]) -> Result<Vec<String>> {
    if read_u32(image, 0)? != MH_MAGIC_64 {
        return Err(ShieldError::MalformedImage("bad Mach-O magic".into()));
    }
    let ncmds = read_u32(image, 16)?;
    let sizeofcmds = read_u32(image, 20)? as usize;
    let end = MACH_HEADER_64_SIZE
        .checked_add(sizeofcmds)
        .filter(|&end| end <= image.len())
        .ok_or_else(|| ShieldError::MalformedImage("load commands exceed image".into()))?;

    let mut names = Vec::new();
    let mut offset = MACH_HEADER_64_SIZE;
    for index in 0..ncmds {
        if offset.checked_add(8).map_or(true, |header_end| header_end > end) {
            return Err(ShieldError::MalformedImage(format!(
                "load command {} starts past the command area",
                index
            )));
        }
        let cmd = read_u32(image, offset)?;
        let cmdsize = read_u32(image, offset + 4)? as usize;
        let Some(cmd_end) = offset
            .checked_add(cmdsize)
            .filter(|&cmd_end| cmdsize >= 8 && cmd_end <= end)
        else {
            return Err(ShieldError::MalformedImage(format!(
                "load command {} has invalid size {}",
                index, cmdsize
            )));
        };

        if cmd == LC_SEGMENT_64 && cmdsize >= SEGNAME_OFFSET + SEGNAME_LEN {
            let start = offset + SEGNAME_OFFSET;
            let raw = &image[start..start + SEGNAME_LEN];
            let len = raw.iter().position(|&b| b == 0).unwrap_or(SEGNAME_LEN);
            names.push(String::from_utf8_lossy(&raw[..len]).into_owned());
        }
        offset = cmd_end;
    }
    Ok(names)
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .and_then(|raw| raw.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| ShieldError::MalformedImage(format!("truncated at offset {}", offset)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment_command(name: &str) -> Vec<u8> {
        // segment_command_64 is 72 bytes.
        let mut cmd = vec![0u8; 72];
        cmd[0..4].copy_from_slice(&LC_SEGMENT_64.to_le_bytes());
        cmd[4..8].copy_from_slice(&72u32.to_le_bytes());
        cmd[8..8 + name.len()].copy_from_slice(name.as_bytes());
        cmd
    }

    fn other_command() -> Vec<u8> {
        let mut cmd = vec![0u8; 24];
        cmd[0..4].copy_from_slice(&0x0Cu32.to_le_bytes()); // LC_LOAD_DYLIB
        cmd[4..8].copy_from_slice(&24u32.to_le_bytes());
        cmd
    }

    fn image(commands: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = commands.concat();
        let mut header = vec![0u8; MACH_HEADER_64_SIZE];
        header[0..4].copy_from_slice(&MH_MAGIC_64.to_le_bytes());
        header[16..20].copy_from_slice(&(commands.len() as u32).to_le_bytes());
        header[20..24].copy_from_slice(&(body.len() as u32).to_le_bytes());
        header.extend(body);
        header
    }

    #[test]
    fn test_segment_walk() {
        let bytes = image(&[
            segment_command("__PAGEZERO"),
            segment_command("__TEXT"),
            other_command(),
            segment_command("__DATA"),
        ]);
        let names = macho_segment_names(&bytes).unwrap();
        assert_eq!(names, ["__PAGEZERO", "__TEXT", "__DATA"]);
        assert!(find_marked(names.iter().map(String::as_str), &SEGMENT_MARKERS).is_none());
    }

    #[test]
    fn test_segment_walk_flags_injected_segment() {
        let bytes = image(&[segment_command("__TEXT"), segment_command("__frida_rt")]);
        let names = macho_segment_names(&bytes).unwrap();
        assert_eq!(
            find_marked(names.iter().map(String::as_str), &SEGMENT_MARKERS),
            Some("__frida_rt")
        );
    }

    #[test]
    fn test_segment_name_fills_all_sixteen_bytes() {
        let bytes = image(&[segment_command("__ABCDEFGHIJKLMN")]);
        assert_eq!(macho_segment_names(&bytes).unwrap(), ["__ABCDEFGHIJKLMN"]);
    }

    #[test]
    fn test_segment_walk_rejects_malformed_images() {
        assert!(macho_segment_names(&[0u8; 8]).is_err());

        let mut bad_magic = image(&[segment_command("__TEXT")]);
        bad_magic[0] = 0;
        assert!(macho_segment_names(&bad_magic).is_err());

        let mut truncated = image(&[segment_command("__TEXT")]);
        truncated.truncate(MACH_HEADER_64_SIZE + 40);
        assert!(macho_segment_names(&truncated).is_err());

        let mut zero_size = image(&[segment_command("__TEXT")]);
        zero_size[MACH_HEADER_64_SIZE + 4..MACH_HEADER_64_SIZE + 8]
            .copy_from_slice(&0u32.to_le_bytes());
        assert!(macho_segment_names(&zero_size).is_err());
    }

    #[test]
    fn test_segment_walk_rejects_huge_command_size() {
        let mut bytes = image(&[segment_command("__TEXT")]);
        bytes[MACH_HEADER_64_SIZE + 4..MACH_HEADER_64_SIZE + 8]
            .copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            macho_segment_names(&bytes),
            Err(ShieldError::MalformedImage(_))
        ));
    }

    #[test]
    fn test_library_markers() {
        let libs = [
            "/system/lib64/libc.so",
            "/data/app/~~x/lib/arm64/libgadget-gjs.so",
        ];
        assert_eq!(
            find_marked(libs.iter().copied(), &LIBRARY_MARKERS),
            Some("/data/app/~~x/lib/arm64/libgadget-gjs.so")
        );
        assert!(find_marked(libs[..1].iter().copied(), &LIBRARY_MARKERS).is_none());
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_loaded_images_include_libc() {
        let names = loaded_image_names().unwrap();
        assert!(names.iter().any(|name| name.contains("libc")));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_global_symbol() {
        assert!(resolve_global_symbol("malloc"));
        assert!(!resolve_global_symbol("security_core_no_such_symbol"));
        assert!(!resolve_global_symbol("nul\0inside"));
    }

    #[test]
    fn test_symbol_probe_is_clean_in_test_process() {
        assert!(!detect_exported_symbols().detected);
    }
}

//! Plugin library discovery
//!
//! Search order: explicit path, `RENDERSTREAM_LIBRARY`, the production
//! suite's registry entry (Windows), then the platform search path.

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Base name of the plugin library
pub const LIBRARY_NAME: &str = "d3renderstream";

/// Environment override for the library location
pub const LIBRARY_ENV: &str = "RENDERSTREAM_LIBRARY";

#[cfg(windows)]
const REGISTRY_SUBKEY: &str = r"Software\d3 Technologies\d3 Production Suite";
#[cfg(windows)]
const REGISTRY_VALUE: &str = "exe path";

/// Find the plugin library to load
pub fn locate_library(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(LIBRARY_ENV) {
        if !path.is_empty() {
            log::debug!("Using {} from {}", LIBRARY_NAME, LIBRARY_ENV);
            return Ok(PathBuf::from(path));
        }
    }

    locate_installed()
}

#[cfg(windows)]
fn locate_installed() -> Result<PathBuf> {
    use crate::error::RenderStreamError;

    let exe_path = registry_exe_path().ok_or_else(|| RenderStreamError::LibraryNotFound {
        library: libloading::library_filename(LIBRARY_NAME)
            .to_string_lossy()
            .into_owned(),
        reason: "d3 not installed?".into(),
    })?;
    let dir = library_dir_from_exe_path(&exe_path);
    Ok(dir.join(libloading::library_filename(LIBRARY_NAME)))
}

#[cfg(not(windows))]
fn locate_installed() -> Result<PathBuf> {
    // Let the dynamic loader search its usual paths
    Ok(PathBuf::from(libloading::library_filename(LIBRARY_NAME)))
}

/// Directory prefix of the host executable path stored in the registry.
///
/// Doubled backslashes are collapsed first; the result keeps everything up
/// to and including the last separator.
pub fn library_dir_from_exe_path(exe_path: &str) -> PathBuf {
    let normalized = exe_path.replace(r"\\", r"\");
    match normalized.rfind(['\\', '/']) {
        Some(end) => PathBuf::from(&normalized[..=end]),
        None => PathBuf::new(),
    }
}

#[cfg(windows)]
fn registry_exe_path() -> Option<String> {
    use windows_sys::Win32::Foundation::ERROR_SUCCESS;
    use windows_sys::Win32::System::Registry::{RegGetValueW, HKEY_CURRENT_USER, RRF_RT_REG_SZ};

    fn wide(value: &str) -> Vec<u16> {
        value.encode_utf16().chain(std::iter::once(0)).collect()
    }

    let subkey = wide(REGISTRY_SUBKEY);
    let value = wide(REGISTRY_VALUE);

    let mut size: u32 = 0;
    // Safety: null data pointer queries the size only
    let status = unsafe {
        RegGetValueW(
            HKEY_CURRENT_USER,
            subkey.as_ptr(),
            value.as_ptr(),
            RRF_RT_REG_SZ,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            &mut size,
        )
    };
    if status != ERROR_SUCCESS || size == 0 {
        return None;
    }

    let mut buffer = vec![0u16; (size as usize).div_ceil(2)];
    // Safety: buffer holds `size` bytes
    let status = unsafe {
        RegGetValueW(
            HKEY_CURRENT_USER,
            subkey.as_ptr(),
            value.as_ptr(),
            RRF_RT_REG_SZ,
            std::ptr::null_mut(),
            buffer.as_mut_ptr().cast(),
            &mut size,
        )
    };
    if status != ERROR_SUCCESS {
        return None;
    }

    let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    Some(String::from_utf16_lossy(&buffer[..len]))
}

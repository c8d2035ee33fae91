//! Platform-specific free-space queries.

use std::path::Path;

/// Get available disk space for a given path.
///
/// Uses platform-specific APIs to query filesystem statistics:
/// - Unix: `statvfs`
/// - Windows: `GetDiskFreeSpaceExW`
///
/// Returns the space available to unprivileged users in bytes.
///
/// # Errors
///
/// Returns the underlying OS error when the query fails (e.g. the path does
/// not exist).
pub fn available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid null-terminated C string, stat is zeroed
        // before the call, and the struct is only read after a successful
        // return.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &raw mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail is blocks available to unprivileged users; f_frsize is
            // the fragment size (preferred over f_bsize).
            #[allow(clippy::unnecessary_cast)]
            Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is a valid null-terminated wide string and the
        // output pointers reference properly aligned u64 locals that are only
        // read after a successful return.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut total_bytes: u64 = 0;
            let mut total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                std::ptr::from_mut(&mut free_bytes_available).cast(),
                std::ptr::from_mut(&mut total_bytes).cast(),
                std::ptr::from_mut(&mut total_free_bytes).cast(),
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }
}

use std::io;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

#[cfg(unix)]
const CROSS_DEVICE: i32 = 18; // EXDEV
#[cfg(windows)]
const CROSS_DEVICE: i32 = 17; // ERROR_NOT_SAME_DEVICE

#[cfg(any(unix, windows))]
fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(CROSS_DEVICE)
}

#[cfg(not(any(unix, windows)))]
fn is_cross_device(_err: &io::Error) -> bool {
    false
}

/// Move a directory, copying and deleting when `src` and `dst` are on
/// different file systems.
pub fn move_dir(src: &Path, dst: &Path) -> io::Result<()> {
    match std::fs::rename(src, dst) {
        Err(e) if is_cross_device(&e) => {
            debug!("{} is on another device, copying", src.display());
            copy_then_remove(src, dst)
        }
        result => result,
    }
}

fn copy_then_remove(src: &Path, dst: &Path) -> io::Result<()> {
    copy_dir_all(src, dst)?;
    std::fs::remove_dir_all(src)
}

/// Recursively copy the contents of `src` into `dst`.
pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry?;
        let rel_path = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let new_path = dst.join(rel_path);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&new_path)?;
        } else {
            std::fs::copy(entry.path(), &new_path)?;
        }
    }

    Ok(())
}

/// Returns `true` if `dir` has no entries.
pub fn is_dir_empty(dir: &Path) -> io::Result<bool> {
    Ok(std::fs::read_dir(dir)?.next().is_none())
}

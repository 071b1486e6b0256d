//! File ownership, permission and content comparison for staged files.

use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::{chown, MetadataExt, PermissionsExt};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Permission bits kept when comparing modes (type bits are ignored).
const PERMISSION_MASK: u32 = 0o7777;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    /// Hex SHA-256 of the file content.
    pub hash: String,
}

impl FileMetadata {
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(Self {
            uid: metadata.uid(),
            gid: metadata.gid(),
            mode: metadata.mode() & PERMISSION_MASK,
            hash: hash_file(path)?,
        })
    }
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Reports whether `dest` already matches `staged` in owner, group, mode and
/// content. A missing destination is never in sync.
pub fn same_config(staged: &Path, dest: &Path) -> io::Result<bool> {
    if !dest.exists() {
        return Ok(false);
    }

    let current = FileMetadata::from_path(dest)?;
    let wanted = FileMetadata::from_path(staged)?;
    let target = dest.display();

    let mut same = true;
    if current.uid != wanted.uid {
        log::info!("{} has uid {} should be {}", target, current.uid, wanted.uid);
        same = false;
    }
    if current.gid != wanted.gid {
        log::info!("{} has gid {} should be {}", target, current.gid, wanted.gid);
        same = false;
    }
    if current.mode != wanted.mode {
        log::info!("{} has mode {:o} should be {:o}", target, current.mode, wanted.mode);
        same = false;
    }
    if current.hash != wanted.hash {
        log::info!("{} has sha256 {} should be {}", target, current.hash, wanted.hash);
        same = false;
    }
    Ok(same)
}

/// Effective uid and gid of this process.
pub fn effective_ids() -> (u32, u32) {
    // SAFETY: geteuid/getegid take no arguments, cannot fail and touch no memory.
    unsafe { (libc::geteuid(), libc::getegid()) }
}

/// Applies permission bits and ownership to `path`.
pub fn apply_attributes(path: &Path, mode: u32, uid: u32, gid: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    chown(path, Some(uid), Some(gid))
}

/// Moves `staged` over `dest` with `rename`.
///
/// When the rename fails because `dest` is a busy mount point or lives on
/// another device, the staged bytes are written into `dest` in place and the
/// attributes re-applied. That path is not atomic.
pub fn replace_file<F>(
    staged: &Path,
    dest: &Path,
    mode: u32,
    uid: u32,
    gid: u32,
    rename: F,
) -> io::Result<()>
where
    F: FnOnce(&Path, &Path) -> io::Result<()>,
{
    match rename(staged, dest) {
        Ok(()) => Ok(()),
        Err(e) if is_busy_or_cross_device(&e) => {
            log::debug!(
                "Rename of {} failed ({}), overwriting in place",
                dest.display(),
                e
            );
            let content = fs::read(staged)?;
            fs::write(dest, content)?;
            apply_attributes(dest, mode, uid, gid)
        }
        Err(e) => Err(e),
    }
}

fn is_busy_or_cross_device(error: &io::Error) -> bool {
    matches!(error.raw_os_error(), Some(libc::EBUSY) | Some(libc::EXDEV))
}

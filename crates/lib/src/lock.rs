//! Advisory lock serializing writers of one context.
//!
//! A reconciliation transaction holds a [`ContextLock`] from the moment it
//! reads the manifest until the broker configuration is written back. The
//! lock file names the holder so a second `meshctl` can say who is busy.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const LOCK_FILENAME: &str = ".lock";

/// Who holds a context, as recorded in its lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
  pub context: String,
  pub operation: String,
  pub pid: u32,
  pub acquired_at_unix: u64,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error(
    "Context {} is busy: {} (PID {}, since Unix timestamp {})\n\
     If no meshctl process is running, remove the lock file:\n  {}",
    .holder.context, .holder.operation, .holder.pid, .holder.acquired_at_unix, .lock_path.display()
  )]
  Busy { holder: LockHolder, lock_path: PathBuf },

  #[error(
    "Context is busy and its lock file names no holder\n\
     If no meshctl process is running, remove the lock file:\n  {}",
    .lock_path.display()
  )]
  BusyUnknown { lock_path: PathBuf },

  #[error("Failed to prepare lock file {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Exclusive hold on a context directory, released on drop.
#[derive(Debug)]
pub struct ContextLock {
  _file: File,
}

impl ContextLock {
  /// Lock the context stored in `dir` for `operation`, failing fast when
  /// another process holds it.
  pub fn acquire(dir: &Path, operation: &str) -> Result<Self, LockError> {
    let lock_path = dir.join(LOCK_FILENAME);
    let io_err = |source| LockError::Io {
      path: lock_path.clone(),
      source,
    };

    fs::create_dir_all(dir).map_err(io_err)?;
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(io_err)?;

    match try_lock_exclusive(&file) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
        return Err(match holder(dir) {
          Some(holder) => LockError::Busy { holder, lock_path },
          None => LockError::BusyUnknown { lock_path },
        });
      }
      Err(e) => return Err(io_err(e)),
    }

    let holder = LockHolder {
      context: context_name(dir),
      operation: operation.to_string(),
      pid: std::process::id(),
      acquired_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    };
    record(&file, &holder).map_err(io_err)?;
    Ok(Self { _file: file })
  }
}

/// The holder recorded in `dir`'s lock file, if it can be read.
///
/// A released lock keeps naming its last holder.
pub fn holder(dir: &Path) -> Option<LockHolder> {
  let contents = fs::read_to_string(dir.join(LOCK_FILENAME)).ok()?;
  serde_json::from_str(&contents).ok()
}

fn context_name(dir: &Path) -> String {
  dir
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| dir.display().to_string())
}

fn record(file: &File, holder: &LockHolder) -> io::Result<()> {
  file.set_len(0)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer(&mut writer, holder).map_err(io::Error::other)?;
  writer.flush()
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;

  // SAFETY: the handle is open for the lifetime of `file` and a zeroed
  // OVERLAPPED locks from offset 0.
  let locked = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(
      handle,
      LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
      0,
      1,
      0,
      &mut overlapped,
    )
  };
  if locked != 0 {
    return Ok(());
  }
  let err = io::Error::last_os_error();
  if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) {
    return Err(io::ErrorKind::WouldBlock.into());
  }
  Err(err)
}

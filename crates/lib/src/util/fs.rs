//! File helpers.

use std::io;
use std::path::Path;

/// Write `content` to `path` through a sibling temp file and a rename, so
/// readers never observe a partially written file.
pub fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }

  let mut temp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  temp_name.push(".tmp");
  let temp_path = path.with_file_name(temp_name);

  std::fs::write(&temp_path, content)?;
  std::fs::rename(&temp_path, path)
}

// Small file helpers shared by the index, the chunk manifest and history records

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write `bytes` to a sibling temp file, then rename it over `path`.
///
/// Readers see either the old file or the new one, never a partial write.
/// Parent directories are created as needed.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

use std::path::{Path, PathBuf};

/// Default working directory: `~/.boot2docker/`
pub fn default_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".boot2docker")
}

/// Default boot ISO location inside the working directory.
pub fn iso_path(dir: &Path) -> PathBuf {
    dir.join("boot2docker.iso")
}

/// Default backing disk location inside the working directory.
pub fn disk_path(dir: &Path) -> PathBuf {
    dir.join("boot2docker.vmdk")
}

/// Raw staging image converted into the disk at `disk`.
///
/// Never equal to `disk`, whatever extension the disk carries.
pub fn staging_raw_path(disk: &Path) -> PathBuf {
    with_suffix(disk, ".seed.raw")
}

/// In-progress download target for `dest`, renamed into place on success.
pub fn partial_path(dest: &Path) -> PathBuf {
    with_suffix(dest, ".part")
}

/// `path` with `suffix` appended to its full file name.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

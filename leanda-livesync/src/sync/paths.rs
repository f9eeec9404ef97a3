use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Leading characters that mark a local file as hidden or temporary.
pub const RESERVED_PREFIXES: [char; 2] = ['.', '_'];

#[derive(Debug, Error)]
pub enum PathError {
    #[error("remote name is empty")]
    Empty,
    #[error("remote name {0:?} is not a single path component")]
    UnsupportedComponent(String),
}

pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIXES)
}

/// Maps a remote entry name onto a child of `dir`. Remote names come from the
/// server, so anything that would escape `dir` is rejected.
pub fn local_child_path(dir: &Path, remote_name: &str) -> Result<PathBuf, PathError> {
    if remote_name.is_empty() {
        return Err(PathError::Empty);
    }
    if remote_name.contains(['/', '\\']) {
        return Err(PathError::UnsupportedComponent(remote_name.to_string()));
    }
    let mut components = Path::new(remote_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => Ok(dir.join(part)),
        _ => Err(PathError::UnsupportedComponent(remote_name.to_string())),
    }
}

/// Hidden sibling a download is streamed into before being renamed into place.
pub fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.partial"))
}

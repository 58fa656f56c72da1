use crate::error::CacheError;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    io::{self, Write},
    path::Path,
};

pub(crate) const TMP_MARKER: &str = ".tmp.";

pub(crate) fn remove_file_best_effort(path: &Path, reason: &'static str) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            tracing::debug!(
                target = "qsync.cache",
                path = %path.display(),
                reason,
                error = %err,
                "failed to remove cache file"
            );
            false
        }
    }
}

/// Replace `path` with `bytes` so that readers never observe a partial file.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    replace_with(path, |file| file.write_all(bytes))
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|err| CacheError::Json {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    atomic_write(path, &bytes)
}

/// Read a JSON file; `Ok(None)` when it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CacheError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|err| CacheError::Json {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

/// Copy a build output into the cache. The cached file appears under `dest` only once it is
/// complete, so a cancelled or failed copy never leaves a truncated artifact behind.
pub(crate) fn copy_atomic(src: &Path, dest: &Path) -> Result<(), CacheError> {
    let mut input = fs::File::open(src)?;
    replace_with(dest, |file| io::copy(&mut input, file).map(drop))
}

/// Write into a temp file next to `path` and rename it over `path`.
///
/// Temp files carry [`TMP_MARKER`] in their name; directory listings skip and clean them up.
fn replace_with(
    path: &Path,
    write: impl FnOnce(&mut fs::File) -> io::Result<()>,
) -> Result<(), CacheError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => return Err(io::Error::other("path has no parent").into()),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("path has no file name"))?;
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!("{}{TMP_MARKER}", file_name.to_string_lossy()))
        .tempfile_in(parent)?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    // On failure the returned temp file is dropped, which deletes it.
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

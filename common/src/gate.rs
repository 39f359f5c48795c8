use std::path::{Path, PathBuf};

/// Returns every required path that does not exist, in the order given.
///
/// Only presence is checked. The files belong to the job and are never
/// opened here.
pub fn missing_artifacts<P: AsRef<Path>>(paths: &[P]) -> Vec<PathBuf> {
    paths
        .iter()
        .map(|p| p.as_ref())
        .filter(|p| !p.exists())
        .map(Path::to_path_buf)
        .collect()
}

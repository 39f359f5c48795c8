use crate::error::{Result, SupervisorError};
use std::path::PathBuf;

/// Refuses to go any further unless every required file is present.
pub fn require_artifacts(paths: &[PathBuf]) -> Result<()> {
    let missing = common::missing_artifacts(paths);
    if !missing.is_empty() {
        return Err(SupervisorError::ConfigMissing { paths: missing });
    }

    for path in paths {
        log::debug!("Found required file {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_blocks_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.yaml");
        let words = dir.path().join("frequency_words.txt");
        fs::write(&config, "app: {}\n").unwrap();

        match require_artifacts(&[config.clone(), words.clone()]) {
            Err(SupervisorError::ConfigMissing { paths }) => assert_eq!(paths, vec![words.clone()]),
            other => panic!("expected ConfigMissing, got {:?}", other),
        }

        fs::write(&words, "").unwrap();
        assert!(require_artifacts(&[config, words]).is_ok());
    }
}

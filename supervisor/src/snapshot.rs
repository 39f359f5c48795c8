use std::ffi::{OsStr, OsString};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// The environment as it was when the supervisor started.
///
/// Captured once. Every process the supervisor starts gets exactly these
/// variables, and they are appended to the snapshot file so that processes
/// started outside our tree (cron children, `docker exec` shells sourcing
/// `/etc/environment`) can see them too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: Vec<(OsString, OsString)>,
}

impl EnvSnapshot {
    pub fn capture() -> Self {
        Self::from_vars(std::env::vars_os())
    }

    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        Self {
            vars: vars.into_iter().collect(),
        }
    }

    pub fn vars(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Appends one `KEY=VALUE` line per variable, creating the file if
    /// needed. Returns how many variables were written; entries containing
    /// a newline cannot be represented and are skipped.
    pub fn append_to(&self, path: &Path) -> io::Result<usize> {
        let mut buf = Vec::new();
        let mut written = 0;

        for (key, value) in self.vars() {
            if key.as_bytes().contains(&b'\n') || value.as_bytes().contains(&b'\n') {
                log::warn!("Not snapshotting {:?}: value spans multiple lines", key);
                continue;
            }
            buf.extend_from_slice(key.as_bytes());
            buf.push(b'=');
            buf.extend_from_slice(value.as_bytes());
            buf.push(b'\n');
            written += 1;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(&buf)?;
        file.flush()?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn snapshot(pairs: &[(&str, &str)]) -> EnvSnapshot {
        EnvSnapshot::from_vars(pairs.iter().map(|(k, v)| (OsString::from(k), OsString::from(v))))
    }

    #[test]
    fn test_append_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("environment");

        let env = snapshot(&[("TZ", "Asia/Shanghai"), ("CRON_SCHEDULE", "*/30 * * * *")]);
        assert_eq!(env.append_to(&path).unwrap(), 2);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "TZ=Asia/Shanghai\nCRON_SCHEDULE=*/30 * * * *\n"
        );
    }

    #[test]
    fn test_append_keeps_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("environment");
        fs::write(&path, "PATH=/usr/bin\n").unwrap();

        snapshot(&[("RUN_MODE", "cron")]).append_to(&path).unwrap();
        snapshot(&[("RUN_MODE", "once")]).append_to(&path).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "PATH=/usr/bin\nRUN_MODE=cron\nRUN_MODE=once\n"
        );
    }

    #[test]
    fn test_multiline_values_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("environment");

        let env = snapshot(&[("CERT", "-----BEGIN\nabc\n-----END"), ("A", "1")]);
        assert_eq!(env.append_to(&path).unwrap(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "A=1\n");
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("environment");
        assert!(snapshot(&[("A", "1")]).append_to(&path).is_err());
    }

    #[test]
    fn test_capture_sees_process_environment() {
        let env = EnvSnapshot::capture();
        assert_eq!(env.len(), std::env::vars_os().count());
    }
}

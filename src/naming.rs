use crate::{Result, TallyError};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Upper bound on `name(N).ext` candidates tried before giving up.
pub const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// `base_name` for index 0, otherwise `(index)` inserted before the extension.
pub fn candidate_name(base_name: &str, index: u32) -> String {
    if index == 0 {
        return base_name.to_string();
    }
    // A leading dot marks a hidden file, not an extension
    match base_name.rfind('.').filter(|&pos| pos > 0) {
        Some(pos) => format!("{}({}){}", &base_name[..pos], index, &base_name[pos..]),
        None => format!("{}({})", base_name, index),
    }
}

/// Create a new file in `dir` whose name does not collide with anything there.
///
/// Uses exclusive creation, so the returned file never replaces an existing
/// one even if another process races for the same name. Any error other than
/// "already exists" fails immediately.
pub fn create_unique(dir: &Path, base_name: &str) -> Result<(PathBuf, File)> {
    create_unique_bounded(dir, base_name, MAX_NAME_ATTEMPTS)
}

/// [`create_unique`] with a caller-chosen cap on the number of candidates.
pub fn create_unique_bounded(dir: &Path, base_name: &str, max_attempts: u32) -> Result<(PathBuf, File)> {
    for index in 0..max_attempts {
        let path = dir.join(candidate_name(base_name, index));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                if index > 0 {
                    tracing::info!(base = base_name, path = %path.display(), "Output name taken, using next free name");
                }
                return Ok((path, file));
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(TallyError::ArtifactCreate { path, source }),
        }
    }
    Err(TallyError::NamingExhaustion {
        base_name: base_name.to_string(),
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_candidate_names() {
        assert_eq!(candidate_name("out.csv", 0), "out.csv");
        assert_eq!(candidate_name("out.csv", 1), "out(1).csv");
        assert_eq!(candidate_name("out.csv", 12), "out(12).csv");
        assert_eq!(candidate_name("out", 2), "out(2)");
        assert_eq!(candidate_name(".hidden", 1), ".hidden(1)");
        assert_eq!(candidate_name("run.tar.gz", 1), "run.tar(1).gz");
    }

    #[test]
    fn test_free_base_name_used_directly() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _) = create_unique(dir.path(), "out.csv").unwrap();
        assert_eq!(path, dir.path().join("out.csv"));
    }

    #[test]
    fn test_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("out.csv"), "old").unwrap();
        fs::write(dir.path().join("out(1).csv"), "older").unwrap();
        let (path, _) = create_unique(dir.path(), "out.csv").unwrap();
        assert_eq!(path, dir.path().join("out(2).csv"));
        assert_eq!(fs::read_to_string(dir.path().join("out.csv")).unwrap(), "old");
    }

    #[test]
    fn test_repeated_calls_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let names: Vec<_> = (0..5)
            .map(|_| create_unique(dir.path(), "out.csv").unwrap().0)
            .collect();
        let mut deduped = names.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), names.len());
    }

    #[test]
    fn test_exhausted_candidates_fail() {
        let dir = tempfile::tempdir().unwrap();
        for index in 0..3 {
            fs::write(dir.path().join(candidate_name("out.csv", index)), "taken").unwrap();
        }
        let err = create_unique_bounded(dir.path(), "out.csv", 3).unwrap_err();
        match err {
            TallyError::NamingExhaustion { base_name, attempts } => {
                assert_eq!(base_name, "out.csv");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!dir.path().join("out(3).csv").exists());

        let (path, _) = create_unique_bounded(dir.path(), "out.csv", 4).unwrap();
        assert_eq!(path, dir.path().join("out(3).csv"));
    }

    #[test]
    fn test_missing_directory_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = create_unique(&missing, "out.csv").unwrap_err();
        assert!(matches!(err, TallyError::ArtifactCreate { .. }));
    }
}

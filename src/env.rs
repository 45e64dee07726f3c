//! Environment abstraction for testability.
//!
//! Provides the [`Environment`] trait to abstract env vars and filesystem
//! reads, enabling fully sandboxed testing of configuration loading and
//! SSH auth-mode detection.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// Abstracts all interaction with the operating system.
///
/// The real application uses [`RealEnvironment`]; tests inject
/// [`MockEnvironment`] so that nothing touches the real system.
pub trait Environment: Send + Sync {
    /// Read an environment variable.
    fn var(&self, key: &str) -> Option<String>;

    /// Check if a path exists (file or directory).
    fn path_exists(&self, path: &Path) -> bool;

    /// Get the user's home directory.
    fn home_dir(&self) -> Option<PathBuf>;

    /// Read a file's contents.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    fn read_file(&self, path: &Path) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Real implementation (used in production)
// ---------------------------------------------------------------------------

/// Production [`Environment`] backed by the real OS.
pub struct RealEnvironment;

impl Environment for RealEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }
}

// ---------------------------------------------------------------------------
// Mock implementation (used in tests — zero real I/O)
// ---------------------------------------------------------------------------

/// A fully in-memory [`Environment`] for sandboxed testing.
///
/// Every field is public so tests can construct scenarios declaratively.
#[derive(Debug, Clone, Default)]
pub struct MockEnvironment {
    pub env_vars: HashMap<String, String>,
    pub existing_paths: HashSet<PathBuf>,
    pub home: Option<PathBuf>,
    /// Virtual filesystem: path → file contents.
    pub files: HashMap<PathBuf, String>,
}

impl Environment for MockEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        self.env_vars.get(key).cloned()
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.existing_paths.contains(path) || self.files.contains_key(path)
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home.clone()
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("mock file not found: {}", path.display()),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_env_vars() {
        let mut env = MockEnvironment::default();
        env.env_vars
            .insert("FLEETGATE_USER".into(), "observer".into());
        assert_eq!(env.var("FLEETGATE_USER"), Some("observer".into()));
        assert_eq!(env.var("MISSING"), None);
    }

    #[test]
    fn test_mock_files_exist() {
        let mut env = MockEnvironment::default();
        env.files
            .insert(PathBuf::from("/etc/keys/reader.key"), "---".into());
        assert!(env.path_exists(Path::new("/etc/keys/reader.key")));
        assert!(!env.path_exists(Path::new("/etc/keys/other.key")));
        assert!(env.read_file(Path::new("/etc/keys/reader.key")).is_ok());
        assert!(env.read_file(Path::new("/etc/keys/other.key")).is_err());
    }
}

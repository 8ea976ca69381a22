//! XDG-compliant path resolution for shelfscout.
//!
//! Configuration lives under `$XDG_CONFIG_HOME/shelfscout/`, the search
//! result cache under `$XDG_CACHE_HOME/shelfscout/`.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(scout::paths::no_home),
        help("Set the HOME environment variable, or pass --config and --cache-dir explicitly.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(scout::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// File name of the durable search cache.
pub const CACHE_FILE_NAME: &str = "search-cache.json";

/// Global XDG-compliant directories for shelfscout.
#[derive(Debug, Clone)]
pub struct ScoutPaths {
    /// `$XDG_CONFIG_HOME/shelfscout/`
    pub config_dir: PathBuf,
    /// `$XDG_CACHE_HOME/shelfscout/`
    pub cache_dir: PathBuf,
}

impl ScoutPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("shelfscout");

        let cache_dir = std::env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".cache"))
            .join("shelfscout");

        Ok(Self {
            config_dir,
            cache_dir,
        })
    }

    /// Override the cache directory (e.g. from `--cache-dir`).
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = dir;
        self
    }

    /// Create all base directories. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [&self.config_dir, &self.cache_dir] {
            std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Path to the config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Path to the durable search cache.
    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_paths_use_xdg_layout() {
        let paths = ScoutPaths::resolve().unwrap();
        assert!(
            paths.config_dir.to_string_lossy().contains("shelfscout"),
            "config_dir should contain 'shelfscout': {}",
            paths.config_dir.display()
        );
        assert!(paths.cache_file().starts_with(&paths.cache_dir));
    }

    #[test]
    fn files_derive_from_dirs() {
        let paths = ScoutPaths {
            config_dir: PathBuf::from("/cfg/shelfscout"),
            cache_dir: PathBuf::from("/cache/shelfscout"),
        };
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/cfg/shelfscout/config.toml")
        );
        assert_eq!(
            paths.cache_file(),
            PathBuf::from("/cache/shelfscout/search-cache.json")
        );

        let moved = paths.with_cache_dir(PathBuf::from("/tmp/elsewhere"));
        assert_eq!(
            moved.cache_file(),
            PathBuf::from("/tmp/elsewhere/search-cache.json")
        );
    }

    #[test]
    fn ensure_dirs_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = ScoutPaths {
            config_dir: dir.path().join("cfg"),
            cache_dir: dir.path().join("cache"),
        };
        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();
        assert!(paths.config_dir.is_dir());
        assert!(paths.cache_dir.is_dir());
    }
}

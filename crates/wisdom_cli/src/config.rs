//! Environment configuration.
//!
//! | Variable | Default |
//! |---|---|
//! | `WISDOM_DATA_DIR` | `./data` |
//! | `WISDOM_DB_PATH` | `<data>/wisdom.db` |
//! | `WISDOM_CONTENT_ROOT` | `<data>/content` |
//! | `WISDOM_PULL_BATCH` | `100` |
//! | `WISDOM_ADAPTERS` | none beyond `markdown` |
//!
//! Blank values count as unset. Command-line flags win over the
//! environment.

use crate::error::{CliError, CliResult};
use std::path::{Component, Path, PathBuf};
use wisdom_core::StoreConfig;

/// Default number of events per pull.
pub const DEFAULT_PULL_BATCH: u32 = 100;

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `--data-dir`.
    pub data_dir: Option<PathBuf>,
    /// `--db`.
    pub db_path: Option<PathBuf>,
    /// `--content-root`.
    pub content_root: Option<PathBuf>,
}

/// Resolved CLI configuration. Every path is absolute and cleaned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WisdomConfig {
    /// Directory holding the database and content by default.
    pub data_dir: PathBuf,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Directory that relative document paths resolve against.
    pub content_root: PathBuf,
    /// Events per pull for `mirror-sync`.
    pub pull_batch: u32,
    /// Adapters registered in addition to the default one.
    pub adapters: Vec<String>,
}

impl WisdomConfig {
    /// Loads from the process environment.
    pub fn from_env(overrides: &Overrides) -> CliResult<Self> {
        Self::load(|key| std::env::var(key).ok(), overrides)
    }

    /// Loads from an arbitrary variable lookup.
    pub fn load(lookup: impl Fn(&str) -> Option<String>, overrides: &Overrides) -> CliResult<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let flag = |value: &Option<PathBuf>| {
            value.as_ref().map(|p| p.to_string_lossy().into_owned())
        };

        let data_dir = flag(&overrides.data_dir)
            .or_else(|| var("WISDOM_DATA_DIR"))
            .unwrap_or_else(|| "./data".to_string());
        let data_dir = normalize_path("WISDOM_DATA_DIR", &data_dir)?;

        let db_path = match flag(&overrides.db_path).or_else(|| var("WISDOM_DB_PATH")) {
            Some(raw) => normalize_path("WISDOM_DB_PATH", &raw)?,
            None => data_dir.join("wisdom.db"),
        };
        let content_root =
            match flag(&overrides.content_root).or_else(|| var("WISDOM_CONTENT_ROOT")) {
                Some(raw) => normalize_path("WISDOM_CONTENT_ROOT", &raw)?,
                None => data_dir.join("content"),
            };

        let pull_batch = match var("WISDOM_PULL_BATCH") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(CliError::config(
                        "WISDOM_PULL_BATCH",
                        format!("{raw:?} is not a positive integer"),
                    ))
                }
            },
            None => DEFAULT_PULL_BATCH,
        };

        let adapters = var("WISDOM_ADAPTERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            data_dir,
            db_path,
            content_root,
            pull_batch,
            adapters,
        })
    }

    /// Store configuration with the configured adapters registered.
    pub fn store_config(&self) -> StoreConfig {
        self.adapters
            .iter()
            .fold(StoreConfig::new(), |config, adapter| config.with_adapter(adapter.as_str()))
    }

    /// Default client mirror location.
    pub fn mirror_path(&self) -> PathBuf {
        self.data_dir.join("mirror.db")
    }
}

/// Trims, cleans and absolutizes a configured path.
pub fn normalize_path(key: &'static str, raw: &str) -> CliResult<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::config(key, "path is empty"));
    }

    let path = Path::new(trimmed);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| CliError::io("resolve working directory", e))?
            .join(path)
    };
    Ok(clean(&absolute))
}

/// Lexically removes `.` and resolves `..` components.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)], overrides: &Overrides) -> CliResult<WisdomConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WisdomConfig::load(|key| vars.get(key).cloned(), overrides)
    }

    #[test]
    fn defaults_hang_off_the_data_dir() {
        let config = load(&[("WISDOM_DATA_DIR", "/srv/wisdom/")], &Overrides::default()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/wisdom"));
        assert_eq!(config.db_path, PathBuf::from("/srv/wisdom/wisdom.db"));
        assert_eq!(config.content_root, PathBuf::from("/srv/wisdom/content"));
        assert_eq!(config.pull_batch, DEFAULT_PULL_BATCH);
        assert!(config.adapters.is_empty());
    }

    #[test]
    fn relative_paths_become_absolute() {
        let config = load(&[], &Overrides::default()).unwrap();
        assert!(config.data_dir.is_absolute());
        assert!(config.data_dir.ends_with("data"));
    }

    #[test]
    fn blank_values_fall_back() {
        let config = load(
            &[("WISDOM_DATA_DIR", "/srv/w"), ("WISDOM_DB_PATH", "   ")],
            &Overrides::default(),
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/srv/w/wisdom.db"));
    }

    #[test]
    fn paths_are_cleaned() {
        let config = load(
            &[
                ("WISDOM_DATA_DIR", "/srv/w"),
                ("WISDOM_CONTENT_ROOT", " /srv/./notes/../content "),
            ],
            &Overrides::default(),
        )
        .unwrap();
        assert_eq!(config.content_root, PathBuf::from("/srv/content"));
    }

    #[test]
    fn flags_override_environment() {
        let overrides = Overrides {
            db_path: Some(PathBuf::from("/tmp/other.db")),
            ..Overrides::default()
        };
        let config = load(&[("WISDOM_DB_PATH", "/srv/w/wisdom.db")], &overrides).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/other.db"));
    }

    #[test]
    fn bad_pull_batch_is_rejected() {
        for raw in ["0", "-3", "many"] {
            let err = load(&[("WISDOM_PULL_BATCH", raw)], &Overrides::default()).unwrap_err();
            assert!(err.to_string().contains("WISDOM_PULL_BATCH"));
        }
        let config = load(&[("WISDOM_PULL_BATCH", "25")], &Overrides::default()).unwrap();
        assert_eq!(config.pull_batch, 25);
    }

    #[test]
    fn adapters_register_with_store() {
        let config = load(&[("WISDOM_ADAPTERS", "pdf, docx,,")], &Overrides::default()).unwrap();
        assert_eq!(config.adapters, vec!["pdf", "docx"]);

        let store = config.store_config();
        assert!(store.knows_adapter("pdf"));
        assert!(store.knows_adapter("markdown"));
    }

    #[test]
    fn empty_path_is_an_error() {
        assert!(normalize_path("WISDOM_DB_PATH", "  ").is_err());
    }
}

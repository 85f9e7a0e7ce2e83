mod file_config;

pub use file_config::{BenchConfig, FileConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;

pub const DEFAULT_TRIALS: usize = 10;

/// CLI arguments that can be used for config resolution.
/// TOML values take precedence over these.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub source_dir: Option<PathBuf>,
    pub relational_db: Option<PathBuf>,
    pub document_db: Option<PathBuf>,
    pub trials: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source_dir: Option<PathBuf>,
    pub relational_db: PathBuf,
    pub document_db: PathBuf,
    pub trials: usize,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let source_dir = file
            .source_dir
            .map(PathBuf::from)
            .or_else(|| cli.source_dir.clone());
        if let Some(dir) = &source_dir {
            if !dir.is_dir() {
                bail!("Source directory does not exist: {:?}", dir);
            }
        }

        let relational_db = file
            .relational_db
            .map(PathBuf::from)
            .or_else(|| cli.relational_db.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "relational_db must be specified via --relational-db or in config file"
                )
            })?;

        // The document file sits next to the relational database unless named.
        let document_db = file
            .document_db
            .map(PathBuf::from)
            .or_else(|| cli.document_db.clone())
            .unwrap_or_else(|| relational_db.with_extension("json"));

        let trials = file
            .bench
            .and_then(|bench| bench.trials)
            .or(cli.trials)
            .unwrap_or(DEFAULT_TRIALS);
        if trials == 0 {
            bail!("trials must be at least 1");
        }

        Ok(Self {
            source_dir,
            relational_db,
            document_db,
            trials,
        })
    }

    /// The source directory, required by imports.
    pub fn require_source_dir(&self) -> Result<&PathBuf> {
        self.source_dir.as_ref().ok_or_else(|| {
            anyhow::anyhow!("source_dir must be specified via --source-dir or in config file")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            source_dir: Some(temp_dir.path().to_path_buf()),
            relational_db: Some(PathBuf::from("/data/catalog.db")),
            document_db: Some(PathBuf::from("/data/documents.json")),
            trials: Some(3),
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.source_dir.as_deref(), Some(temp_dir.path()));
        assert_eq!(config.relational_db, PathBuf::from("/data/catalog.db"));
        assert_eq!(config.document_db, PathBuf::from("/data/documents.json"));
        assert_eq!(config.trials, 3);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let cli = CliConfig {
            relational_db: Some(PathBuf::from("/cli/catalog.db")),
            document_db: Some(PathBuf::from("/cli/catalog.json")),
            trials: Some(3),
            ..Default::default()
        };

        let file_config = FileConfig {
            relational_db: Some("/toml/catalog.db".to_string()),
            bench: Some(BenchConfig { trials: Some(50) }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.relational_db, PathBuf::from("/toml/catalog.db"));
        assert_eq!(config.trials, 50);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.document_db, PathBuf::from("/cli/catalog.json"));
    }

    #[test]
    fn test_resolve_defaults() {
        let cli = CliConfig {
            relational_db: Some(PathBuf::from("/data/catalog.db")),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.document_db, PathBuf::from("/data/catalog.json"));
        assert_eq!(config.trials, DEFAULT_TRIALS);
        assert!(config.source_dir.is_none());
        assert!(config.require_source_dir().is_err());
    }

    #[test]
    fn test_resolve_missing_relational_db_error() {
        let result = AppConfig::resolve(&CliConfig::default(), None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("relational_db must be specified"));
    }

    #[test]
    fn test_resolve_nonexistent_source_dir_error() {
        let cli = CliConfig {
            source_dir: Some(PathBuf::from("/nonexistent/path/that/should/not/exist")),
            relational_db: Some(PathBuf::from("/data/catalog.db")),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolve_zero_trials_error() {
        let cli = CliConfig {
            relational_db: Some(PathBuf::from("/data/catalog.db")),
            trials: Some(0),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("at least 1"));
    }
}

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use composer_core::{OrchestratorConfig, ProviderKind};
use composer_engine::{AtomicFileWriter, PersistError, ProviderSettings, QuotaSettings};
use engine_logging::{engine_info, engine_warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] ron::Error),
    #[error(transparent)]
    Write(#[from] PersistError),
    #[error("{0}")]
    UnknownProvider(String),
}

/// Everything `composer_host` reads from its RON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub orchestrator: OrchestratorConfig,
    /// Keyed by provider name, e.g. `"image-provider-A"`.
    pub providers: BTreeMap<String, ProviderSettings>,
    pub quota: QuotaSettings,
    pub probe_timeout_ms: u64,
    pub document_dir: PathBuf,
    pub title: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            providers: BTreeMap::new(),
            quota: QuotaSettings::default(),
            probe_timeout_ms: 5_000,
            document_dir: PathBuf::from("documents"),
            title: "Untitled".to_string(),
        }
    }
}

impl AppConfig {
    pub fn provider_settings(&self) -> Result<BTreeMap<ProviderKind, ProviderSettings>, ConfigError> {
        self.providers
            .iter()
            .map(|(name, settings)| {
                let kind = name.parse::<ProviderKind>().map_err(ConfigError::UnknownProvider)?;
                Ok((kind, settings.clone()))
            })
            .collect()
    }
}

/// Loads the configuration; a missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            engine_warn!("No configuration at {:?}; using defaults", path);
            return Ok(AppConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let config = parse_config(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    engine_info!(
        "Loaded configuration from {:?} ({} providers)",
        path,
        config.providers.len()
    );
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<AppConfig, ron::error::SpannedError> {
    ron::from_str(content)
}

/// Writes `config` as pretty RON next to where it will be loaded from.
pub fn write_config(path: &Path, config: &AppConfig) -> Result<PathBuf, ConfigError> {
    let content = ron::ser::to_string_pretty(config, ron::ser::PrettyConfig::new())?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "composer.ron".to_string());
    Ok(AtomicFileWriter::new(dir).write(&filename, &content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = load_config(&temp.path().join("absent.ron")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config = parse_config(
            r#"(
                title: "Field notes",
                orchestrator: (poll_interval_ms: 3000),
                providers: {
                    "image-provider-A": (base_url: "https://images.example.com", min_poll_delay_ms: 5000),
                },
                quota: Credits(25),
            )"#,
        )
        .unwrap();
        assert_eq!(config.title, "Field notes");
        assert_eq!(config.orchestrator.poll_interval_ms, 3000);
        assert_eq!(config.orchestrator.attempt_ceilings.audio, 150);
        assert_eq!(config.quota, QuotaSettings::Credits(25));
        let providers = config.provider_settings().unwrap();
        let image = &providers[&ProviderKind::ImageProviderA];
        assert_eq!(image.base_url, "https://images.example.com");
        assert_eq!(image.min_poll_delay_ms, 5000);
        assert!(!image.probe_results);
    }

    #[test]
    fn written_config_loads_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("composer.ron");
        let mut config = AppConfig::default();
        config
            .providers
            .insert("video-provider".into(), ProviderSettings::new("https://video.example.com"));
        write_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn unknown_provider_name_is_rejected() {
        let mut config = AppConfig::default();
        config
            .providers
            .insert("image-provider-Z".into(), ProviderSettings::default());
        assert!(matches!(
            config.provider_settings(),
            Err(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.ron");
        fs::write(&path, "(title: ").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
    }
}

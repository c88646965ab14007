use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rollcall_core::{
    MatchPolicy, DEFAULT_AMBIGUITY_MARGIN, DEFAULT_EMBEDDING_DIM, DEFAULT_SIMILARITY_THRESHOLD,
};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "/etc/rollcall/rollcalld.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Which message bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bus {
    System,
    Session,
}

impl FromStr for Bus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Bus::System),
            "session" => Ok(Bus::Session),
            _ => Err(()),
        }
    }
}

/// Daemon configuration: defaults, then the TOML file, then `ROLLCALL_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    pub bus: Bus,
    /// Cosine similarity threshold (τ) for a positive match.
    pub similarity_threshold: f32,
    /// Score gap (ε) under which two above-threshold people are ambiguous.
    pub ambiguity_margin: f32,
    /// Expected embedding dimension.
    pub embedding_dim: usize,
    /// Upper bound on one embedding extraction, in milliseconds.
    pub detection_timeout_ms: u64,
    /// Name of the administrator to provision on first start, if none exists.
    pub admin_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        Self {
            db_path: data_dir.join("rollcall.db"),
            bus: Bus::System,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            ambiguity_margin: DEFAULT_AMBIGUITY_MARGIN,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            detection_timeout_ms: 5_000,
            admin_name: None,
        }
    }
}

impl Config {
    /// Load from `ROLLCALL_CONFIG` (or the default path) and the environment.
    ///
    /// A missing file at the default path is fine; a missing file named
    /// explicitly is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("ROLLCALL_CONFIG").ok();
        let path = PathBuf::from(explicit.as_deref().unwrap_or(DEFAULT_CONFIG_PATH));

        let mut config = if explicit.is_some() || path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `ROLLCALL_*` overrides read through `var`.
    pub fn apply_overrides(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = var("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        override_from(&var, "ROLLCALL_BUS", &mut self.bus)?;
        override_from(&var, "ROLLCALL_SIMILARITY_THRESHOLD", &mut self.similarity_threshold)?;
        override_from(&var, "ROLLCALL_AMBIGUITY_MARGIN", &mut self.ambiguity_margin)?;
        override_from(&var, "ROLLCALL_EMBEDDING_DIM", &mut self.embedding_dim)?;
        override_from(&var, "ROLLCALL_DETECTION_TIMEOUT_MS", &mut self.detection_timeout_ms)?;
        if let Some(name) = var("ROLLCALL_ADMIN_NAME").filter(|n| !n.trim().is_empty()) {
            self.admin_name = Some(name);
        }
        self.validate()
    }

    /// Range checks on the matcher and engine settings. Runs after every
    /// override, so file values and environment values are both covered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key, value: String| Err(ConfigError::Invalid { key, value });

        let threshold = self.similarity_threshold;
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            return invalid("similarity_threshold", threshold.to_string());
        }
        let margin = self.ambiguity_margin;
        if !margin.is_finite() || margin < 0.0 {
            return invalid("ambiguity_margin", margin.to_string());
        }
        if self.embedding_dim == 0 {
            return invalid("embedding_dim", "0".into());
        }
        if self.detection_timeout_ms == 0 {
            return invalid("detection_timeout_ms", "0".into());
        }
        Ok(())
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            threshold: self.similarity_threshold,
            ambiguity_margin: self.ambiguity_margin,
        }
    }

    pub fn detection_timeout(&self) -> Duration {
        Duration::from_millis(self.detection_timeout_ms)
    }
}

fn override_from<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = var(key) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bus, Bus::System);
        assert_eq!(config.match_policy(), MatchPolicy::default());
        assert_eq!(config.embedding_dim, 512);
        assert!(config.db_path.ends_with("rollcall/rollcall.db"));
    }

    #[test]
    fn test_toml_then_env() {
        let mut config = Config::from_toml(
            r#"
            db_path = "/var/lib/rollcall/rollcall.db"
            bus = "session"
            similarity_threshold = 0.6
            "#,
        )
        .unwrap();
        assert_eq!(config.bus, Bus::Session);
        assert_eq!(config.ambiguity_margin, DEFAULT_AMBIGUITY_MARGIN);

        config
            .apply_overrides(env(&[
                ("ROLLCALL_SIMILARITY_THRESHOLD", "0.8"),
                ("ROLLCALL_DETECTION_TIMEOUT_MS", "250"),
                ("ROLLCALL_ADMIN_NAME", "root"),
            ]))
            .unwrap();
        assert_eq!(config.similarity_threshold, 0.8);
        assert_eq!(config.detection_timeout(), Duration::from_millis(250));
        assert_eq!(config.admin_name.as_deref(), Some("root"));
        assert_eq!(config.db_path, PathBuf::from("/var/lib/rollcall/rollcall.db"));
    }

    #[test]
    fn test_bad_override_is_an_error() {
        let mut config = Config::default();
        assert!(matches!(
            config.apply_overrides(env(&[("ROLLCALL_BUS", "tcp")])),
            Err(ConfigError::Invalid { key: "ROLLCALL_BUS", .. })
        ));
    }

    #[test]
    fn test_nan_and_negative_values_rejected() {
        for (key, value) in [
            ("ROLLCALL_SIMILARITY_THRESHOLD", "NaN"),
            ("ROLLCALL_SIMILARITY_THRESHOLD", "1.5"),
            ("ROLLCALL_AMBIGUITY_MARGIN", "-1"),
            ("ROLLCALL_AMBIGUITY_MARGIN", "inf"),
            ("ROLLCALL_EMBEDDING_DIM", "0"),
            ("ROLLCALL_DETECTION_TIMEOUT_MS", "0"),
        ] {
            let mut config = Config::default();
            assert!(
                matches!(
                    config.apply_overrides(env(&[(key, value)])),
                    Err(ConfigError::Invalid { .. })
                ),
                "{key}={value} accepted"
            );
        }
    }

    #[test]
    fn test_invalid_file_values_rejected() {
        let mut config = Config::from_toml(
            r#"
            similarity_threshold = nan
            ambiguity_margin = -0.5
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.apply_overrides(env(&[])),
            Err(ConfigError::Invalid { key: "similarity_threshold", .. })
        ));

        config.similarity_threshold = 0.4;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "ambiguity_margin", .. })
        ));
        config.ambiguity_margin = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::from_toml("camera_device = \"/dev/video0\"").is_err());
    }
}

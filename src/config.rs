//! Configuration management for bucketgate.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BucketgateError, Result, ValidationError};
use crate::ratelimit::TimeUnit;
use crate::store::{NullStore, Store};

/// Window shape used to build a fresh [`crate::ratelimit::Window`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    /// Unit of time covered by one bucket
    pub unit: TimeUnit,
    /// Number of buckets in the window
    pub size: usize,
    /// Units per bucket
    #[serde(default = "default_width")]
    pub width: u32,
}

pub(crate) fn default_width() -> u32 {
    1
}

impl WindowConfig {
    /// Shape of `size` buckets, each `width` units of `unit` long.
    pub fn new(unit: TimeUnit, size: usize, width: u32) -> Self {
        Self { unit, size, width }
    }

    /// Reject a zero size or width.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.size == 0 {
            return Err(ValidationError::InvalidSize);
        }
        if self.width == 0 {
            return Err(ValidationError::InvalidWidth);
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    /// Twenty three-second buckets.
    fn default() -> Self {
        Self::new(TimeUnit::Second, 20, 3)
    }
}

/// Everything needed to construct a [`crate::ratelimit::RateLimiter`].
///
/// The store is never read from configuration files; it must be injected
/// with [`LimiterConfig::with_store`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimiterConfig {
    /// Unique key for the limiter's persisted state
    pub name: String,
    /// Ceiling on the window aggregate
    pub max: f64,
    /// Window shape
    #[serde(default)]
    pub window: Option<WindowConfig>,
    /// Persistence capability
    #[serde(skip)]
    pub store: Option<Arc<dyn Store>>,
}

impl LimiterConfig {
    pub fn new(name: impl Into<String>, max: f64, window: WindowConfig) -> Self {
        Self {
            name: name.into(),
            max,
            window: Some(window),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Check every field, returning the first problem found.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if !self.max.is_finite() || self.max <= 0.0 {
            return Err(ValidationError::InvalidMax(self.max));
        }
        if self.store.is_none() {
            return Err(ValidationError::MissingStore);
        }
        match &self.window {
            Some(window) => window.validate(),
            None => Err(ValidationError::MissingWindow),
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self::new("request-rate-per-minute-max10", 10.0, WindowConfig::default())
            .with_store(Arc::new(NullStore))
    }
}

impl fmt::Debug for LimiterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimiterConfig")
            .field("name", &self.name)
            .field("max", &self.max)
            .field("window", &self.window)
            .field("store", &self.store.as_ref().map(|_| "<store>"))
            .finish()
    }
}

/// A set of limiter definitions loaded from YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitersFile {
    #[serde(default)]
    pub limiters: Vec<LimiterConfig>,
}

impl LimitersFile {
    /// Load limiter definitions from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load limiter definitions from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| BucketgateError::Config(format!("Failed to parse limiter config: {}", e)))
    }

    /// Find a limiter definition by name.
    pub fn get(&self, name: &str) -> Option<&LimiterConfig> {
        self.limiters.iter().find(|l| l.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LimiterConfig::default();

        assert_eq!(config.name, "request-rate-per-minute-max10");
        assert_eq!(config.max, 10.0);
        assert_eq!(config.window, Some(WindowConfig::new(TimeUnit::Second, 20, 3)));
        assert!(config.store.is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_named_failures() {
        let mut config = LimiterConfig::default();
        config.name.clear();
        assert_eq!(config.validate(), Err(ValidationError::EmptyName));

        let mut config = LimiterConfig::default();
        config.max = 0.0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidMax(0.0)));

        let mut config = LimiterConfig::default();
        config.store = None;
        assert_eq!(config.validate(), Err(ValidationError::MissingStore));

        let mut config = LimiterConfig::default();
        config.window = None;
        assert_eq!(config.validate(), Err(ValidationError::MissingWindow));

        let mut config = LimiterConfig::default();
        config.window = Some(WindowConfig::new(TimeUnit::Hour, 0, 1));
        assert_eq!(config.validate(), Err(ValidationError::InvalidSize));

        let mut config = LimiterConfig::default();
        config.window = Some(WindowConfig::new(TimeUnit::Hour, 4, 0));
        assert_eq!(config.validate(), Err(ValidationError::InvalidWidth));
    }

    #[test]
    fn test_parse_limiters_file() {
        let yaml = r#"
limiters:
  - name: login-attempts
    max: 5
    window:
      unit: minute
      size: 15
  - name: upload-bytes
    max: 1048576
    window:
      unit: hour
      size: 24
      width: 2
"#;
        let file = LimitersFile::from_yaml(yaml).unwrap();
        assert_eq!(file.limiters.len(), 2);

        let login = file.get("login-attempts").unwrap();
        assert_eq!(login.max, 5.0);
        assert_eq!(login.window, Some(WindowConfig::new(TimeUnit::Minute, 15, 1)));
        assert!(login.store.is_none());

        let upload = file.get("upload-bytes").unwrap();
        assert_eq!(upload.window.as_ref().unwrap().width, 2);
        assert!(file.get("missing").is_none());
    }

    #[test]
    fn test_parse_rejects_unknown_unit() {
        let yaml = r#"
limiters:
  - name: bad
    max: 1
    window:
      unit: fortnight
      size: 2
"#;
        let err = LimitersFile::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, BucketgateError::Config(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        let yaml = r#"
limiters:
  - name: typo
    max: 1
    windw:
      unit: second
      size: 2
"#;
        assert!(LimitersFile::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_parse_rejects_misspelled_top_level_key() {
        let err = LimitersFile::from_yaml("limitters: []").unwrap_err();
        assert!(matches!(err, BucketgateError::Config(_)));

        let yaml = r#"
limitters:
  - name: a
    max: 1
"#;
        let err = LimitersFile::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, BucketgateError::Config(_)));
    }

    #[test]
    fn test_parse_missing_window_fails_validation() {
        let yaml = r#"
limiters:
  - name: no-window
    max: 3
"#;
        let file = LimitersFile::from_yaml(yaml).unwrap();
        let config = file.limiters[0].clone().with_store(Arc::new(NullStore));
        assert_eq!(config.validate(), Err(ValidationError::MissingWindow));
    }
}

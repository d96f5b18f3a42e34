//! Service configuration
//!
//! Configuration is layered: built-in defaults, then the embedded
//! `spendwise.toml`, then an override file from `SPENDWISE_CONFIG` or
//! `~/.local/share/spendwise/config/spendwise.toml`. Keys missing from a file
//! keep their defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::classify::{CategoryClassifier, ClassifierPolicy, KeywordLexicon, ModelClient};
use crate::error::{Error, Result};
use crate::models::{Category, ReceiptGranularity};

/// Embedded default configuration
const DEFAULT_CONFIG: &str = include_str!("../../../config/spendwise.toml");

/// Environment variable pointing at a configuration file
pub const CONFIG_ENV: &str = "SPENDWISE_CONFIG";

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendwise").join("config").join("spendwise.toml"))
}

/// Default directory for stored receipt images
pub fn default_images_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("spendwise")
        .join("images")
}

/// Receipt processing settings
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptConfig {
    pub granularity: ReceiptGranularity,
    pub ocr_timeout: Duration,
    pub images_dir: PathBuf,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            granularity: ReceiptGranularity::Total,
            ocr_timeout: Duration::from_secs(60),
            images_dir: default_images_dir(),
        }
    }
}

/// Retention sweep defaults
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionConfig {
    pub days_to_keep: i64,
    pub keep_successful_only: bool,
    pub failed_days: i64,
    pub archive_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days_to_keep: 90,
            keep_successful_only: true,
            failed_days: 7,
            archive_days: 365,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpendwiseConfig {
    pub classifier: ClassifierPolicy,
    pub keywords_path: Option<PathBuf>,
    pub receipts: ReceiptConfig,
    pub retention: RetentionConfig,
}

impl SpendwiseConfig {
    /// Load configuration: explicit path, then `SPENDWISE_CONFIG`, then the
    /// default override location, then the embedded default
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let candidates = path
            .map(Path::to_path_buf)
            .into_iter()
            .chain(env_path)
            .chain(default_config_path());

        for candidate in candidates {
            if candidate.exists() {
                let content = fs::read_to_string(&candidate)
                    .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;
                info!("Loaded configuration from {}", candidate.display());
                return Self::parse(&content);
            }
        }

        Self::parse(DEFAULT_CONFIG)
    }

    /// Parse configuration from TOML content
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

        let mut config = Self::default();

        if let Some(c) = raw.classifier {
            let policy = &mut config.classifier;
            if let Some(v) = c.model_threshold {
                policy.model_threshold = unit_interval("model_threshold", v)?;
            }
            if let Some(v) = c.item_threshold {
                policy.item_threshold = unit_interval("item_threshold", v)?;
            }
            if let Some(v) = c.store_threshold {
                policy.store_threshold = unit_interval("store_threshold", v)?;
            }
            if let Some(v) = c.model_fallback_threshold {
                policy.model_fallback_threshold = unit_interval("model_fallback_threshold", v)?;
            }
            if let Some(v) = c.item_confidence {
                policy.item_confidence = unit_interval("item_confidence", v)?;
            }
            if let Some(v) = c.store_confidence {
                policy.store_confidence = unit_interval("store_confidence", v)?;
            }
            if let Some(v) = c.large_amount_threshold {
                policy.large_amount_threshold = v;
            }
            if let Some(v) = c.large_amount_category {
                policy.large_amount_category = v.parse::<Category>().map_err(Error::Config)?;
            }
            if let Some(v) = c.large_amount_confidence {
                policy.large_amount_confidence = unit_interval("large_amount_confidence", v)?;
            }
            config.keywords_path = c.keywords_path;
        }

        if let Some(r) = raw.receipts {
            if let Some(g) = r.granularity {
                config.receipts.granularity = g.parse().map_err(Error::Config)?;
            }
            if let Some(secs) = r.ocr_timeout_secs {
                config.receipts.ocr_timeout = Duration::from_secs(secs);
            }
            if let Some(dir) = r.images_dir {
                config.receipts.images_dir = dir;
            }
        }

        if let Some(r) = raw.retention {
            let retention = &mut config.retention;
            if let Some(v) = r.days_to_keep {
                retention.days_to_keep = retention_days("days_to_keep", v)?;
            }
            if let Some(v) = r.keep_successful_only {
                retention.keep_successful_only = v;
            }
            if let Some(v) = r.failed_days {
                retention.failed_days = retention_days("failed_days", v)?;
            }
            if let Some(v) = r.archive_days {
                retention.archive_days = retention_days("archive_days", v)?;
            }
        }

        Ok(config)
    }

    /// Build the classifier described by this configuration, with the
    /// category model taken from the environment
    pub fn build_classifier(&self) -> Result<CategoryClassifier> {
        let lexicon = KeywordLexicon::load(self.keywords_path.as_deref())?;
        Ok(CategoryClassifier::new(lexicon, self.classifier.clone()).with_model(ModelClient::from_env()))
    }
}

fn unit_interval(key: &str, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::Config(format!(
            "{} must be between 0 and 1, got {}",
            key, value
        )))
    }
}

/// Longest retention period accepted from configuration (100 years)
pub const MAX_RETENTION_DAYS: i64 = 36_500;

fn retention_days(key: &str, value: i64) -> Result<i64> {
    if (0..=MAX_RETENTION_DAYS).contains(&value) {
        Ok(value)
    } else {
        Err(Error::Config(format!(
            "retention.{} must be between 0 and {} days, got {}",
            key, MAX_RETENTION_DAYS, value
        )))
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    classifier: Option<RawClassifier>,
    receipts: Option<RawReceipts>,
    retention: Option<RawRetention>,
}

#[derive(Debug, Deserialize)]
struct RawClassifier {
    model_threshold: Option<f64>,
    item_threshold: Option<f64>,
    store_threshold: Option<f64>,
    model_fallback_threshold: Option<f64>,
    item_confidence: Option<f64>,
    store_confidence: Option<f64>,
    large_amount_threshold: Option<f64>,
    large_amount_category: Option<String>,
    large_amount_confidence: Option<f64>,
    keywords_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawReceipts {
    granularity: Option<String>,
    ocr_timeout_secs: Option<u64>,
    images_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawRetention {
    days_to_keep: Option<i64>,
    keep_successful_only: Option<bool>,
    failed_days: Option<i64>,
    archive_days: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_config() {
        let config = SpendwiseConfig::parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.classifier, ClassifierPolicy::default());
        assert_eq!(config.receipts.granularity, ReceiptGranularity::Total);
        assert_eq!(config.receipts.ocr_timeout, Duration::from_secs(60));
        assert_eq!(config.retention, RetentionConfig::default());
        assert!(config.keywords_path.is_none());
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = SpendwiseConfig::parse(
            r#"
            [classifier]
            large_amount_threshold = 50000
            large_amount_category = "회식"

            [receipts]
            granularity = "item"
            images_dir = "/srv/receipts"
            "#,
        )
        .unwrap();

        assert_eq!(config.classifier.large_amount_threshold, 50000.0);
        assert_eq!(config.classifier.large_amount_category, Category::DiningOut);
        assert_eq!(config.classifier.item_confidence, 0.9);
        assert_eq!(config.receipts.granularity, ReceiptGranularity::Item);
        assert_eq!(config.receipts.images_dir, PathBuf::from("/srv/receipts"));
        assert_eq!(config.retention.days_to_keep, 90);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(SpendwiseConfig::parse("[classifier]\nitem_confidence = 1.5").is_err());
        assert!(SpendwiseConfig::parse("[classifier]\nlarge_amount_category = \"yachts\"").is_err());
        assert!(SpendwiseConfig::parse("[receipts]\ngranularity = \"weekly\"").is_err());
        assert!(SpendwiseConfig::parse("not toml [").is_err());
    }

    #[test]
    fn test_retention_days_are_validated() {
        assert!(SpendwiseConfig::parse("[retention]\ndays_to_keep = -1").is_err());
        assert!(SpendwiseConfig::parse("[retention]\nfailed_days = -7").is_err());
        assert!(SpendwiseConfig::parse("[retention]\narchive_days = 200000000000").is_err());

        let config = SpendwiseConfig::parse("[retention]\ndays_to_keep = 0").unwrap();
        assert_eq!(config.retention.days_to_keep, 0);
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spendwise.toml");
        std::fs::write(&path, "[retention]\nfailed_days = 3\n").unwrap();

        let config = SpendwiseConfig::load(Some(&path)).unwrap();
        assert_eq!(config.retention.failed_days, 3);
        assert_eq!(config.retention.archive_days, 365);
    }
}

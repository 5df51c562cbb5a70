use std::fs;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::UrlTemplate;
use crate::error::HbnError;
use crate::layout::DatasetLayout;
use crate::lookup::LookupSource;

pub const DEFAULT_CONFIG_FILE: &str = "hbnssi-fetch.json";
pub const DEFAULT_MASK_URL: &str = "https://osf.io/kp6m9/download";

/// On-disk overrides. Every field is optional; mirrors are the main use.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FetcherConfig {
    #[serde(default)]
    pub data_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub participants_url: Option<String>,
    #[serde(default)]
    pub mask_url: Option<String>,
    #[serde(default)]
    pub artifact_url_template: Option<String>,
    #[serde(default)]
    pub lookup_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub resume: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: Utf8PathBuf,
    pub participants_url: Option<String>,
    pub mask_url: String,
    pub artifact_url_template: UrlTemplate,
    pub lookup: LookupSource,
    pub resume: bool,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// A missing default file means defaults; a missing explicit file is an error.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HbnError> {
        let config_path = Utf8PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));

        if path.is_none() && !config_path.as_std_path().exists() {
            return Self::resolve_config(FetcherConfig::default());
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| HbnError::ConfigRead(config_path.clone()))?;
        let config: FetcherConfig = serde_json::from_str(&content)
            .map_err(|err| HbnError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: FetcherConfig) -> Result<ResolvedConfig, HbnError> {
        let data_dir = match config.data_dir {
            Some(dir) => dir,
            None => DatasetLayout::default_root()?,
        };
        let artifact_url_template = match config.artifact_url_template {
            Some(template) => template.parse()?,
            None => UrlTemplate::default(),
        };
        let lookup = config
            .lookup_path
            .map(LookupSource::File)
            .unwrap_or_default();

        Ok(ResolvedConfig {
            data_dir,
            participants_url: config.participants_url,
            mask_url: config
                .mask_url
                .unwrap_or_else(|| DEFAULT_MASK_URL.to_string()),
            artifact_url_template,
            lookup,
            resume: config.resume.unwrap_or(true),
        })
    }
}

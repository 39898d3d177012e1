// src/config.rs

use crate::time_index::{parse_bucket, Granularity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Number of namespaces at which a filter is described as "all"
const ALL_NAMESPACES: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Contents of the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub directories: DirectoryConfig,
    #[serde(default)]
    pub roles: RoleConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Two letter code of the wiki being analyzed
    #[serde(default = "default_language")]
    pub language: String,
    /// First month of the analysis, "YYYYMM"
    #[serde(default = "default_start")]
    pub start: String,
    /// Last month of the analysis, "YYYYMM"
    #[serde(default = "default_end")]
    pub end: String,
    #[serde(default)]
    pub filter_bots: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_file: Option<PathBuf>,
    /// JSON-lines file with the aggregated revision rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_source: Option<PathBuf>,
    /// Namespaces whose edits are counted; absent means all of them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<Vec<String>>,
    #[serde(default = "default_activation_min")]
    pub activation_min: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_max: Option<i64>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            start: default_start(),
            end: default_end(),
            filter_bots: false,
            bot_file: None,
            row_source: None,
            namespaces: None,
            activation_min: default_activation_min(),
            activation_max: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_data_dir")]
    pub data: PathBuf,
    #[serde(default = "default_wikipride_dir")]
    pub wikipride: PathBuf,
    #[serde(default = "default_report_dir")]
    pub report: PathBuf,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self { data: default_data_dir(), wikipride: default_wikipride_dir(), report: default_report_dir() }
    }
}

/// Id lists backing the editor-role cohorts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RoleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrators: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bots: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Colors in the discretized colormap; defaults to one per cohort
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ncolors: Option<usize>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { width: default_width(), height: default_height(), ncolors: None }
    }
}

fn default_language() -> String {
    "en".to_owned()
}

fn default_start() -> String {
    "200101".to_owned()
}

fn default_end() -> String {
    "201012".to_owned()
}

fn default_activation_min() -> i64 {
    1
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_wikipride_dir() -> PathBuf {
    PathBuf::from("wikipride")
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("report")
}

fn default_width() -> u32 {
    1600
}

fn default_height() -> u32 {
    900
}

pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let raw = fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&raw)?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    let general = &settings.general;
    if general.language.chars().count() != 2 {
        return Err(ConfigError::Invalid(format!(
            "language code should be two characters ({})",
            general.language
        )));
    }
    for key in [&general.start, &general.end] {
        match parse_bucket(key) {
            Ok(bucket) if bucket.granularity() == Granularity::Month => {}
            Ok(_) => return Err(ConfigError::Invalid(format!("{key} is not a YYYYMM month"))),
            Err(e) => return Err(ConfigError::Invalid(e.to_string())),
        }
    }
    if let Some(max) = general.activation_max {
        if max <= general.activation_min {
            return Err(ConfigError::Invalid(format!(
                "activation_max ({max}) must exceed activation_min ({})",
                general.activation_min
            )));
        }
    }
    Ok(())
}

impl Settings {
    pub fn engine_config(&self) -> EngineConfig {
        let general = &self.general;
        EngineConfig {
            language: general.language.clone(),
            time_range_start: general.start.clone(),
            time_range_end: general.end.clone(),
            filter_bots: general.filter_bots,
            namespaces: general.namespaces.as_ref().map(|ns| ns.iter().cloned().collect()),
            activation_min: general.activation_min,
            activation_max: general.activation_max,
        }
    }
}

/// Per-instance engine configuration, passed by value to every cohort engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub language: String,
    pub time_range_start: String,
    pub time_range_end: String,
    pub filter_bots: bool,
    /// `None` counts every namespace
    pub namespaces: Option<BTreeSet<String>>,
    pub activation_min: i64,
    pub activation_max: Option<i64>,
}

impl EngineConfig {
    pub fn new(time_range_start: &str, time_range_end: &str) -> Self {
        Self {
            language: default_language(),
            time_range_start: time_range_start.to_owned(),
            time_range_end: time_range_end.to_owned(),
            filter_bots: false,
            namespaces: None,
            activation_min: default_activation_min(),
            activation_max: None,
        }
    }

    pub fn with_namespaces<S: Into<String>>(mut self, namespaces: impl IntoIterator<Item = S>) -> Self {
        self.namespaces = Some(namespaces.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_activation(mut self, min: i64, max: Option<i64>) -> Self {
        self.activation_min = min;
        self.activation_max = max;
        self
    }

    pub fn with_bot_filter(mut self, enabled: bool) -> Self {
        self.filter_bots = enabled;
        self
    }

    /// Rows without a namespace are pre-aggregated over all namespaces and always count
    pub fn counts_namespace(&self, namespace: Option<&str>) -> bool {
        match (&self.namespaces, namespace) {
            (Some(set), Some(ns)) => set.contains(ns),
            _ => true,
        }
    }

    /// Whether an edit count lies within `[activation_min, activation_max)`
    pub fn qualifies(&self, edits: i64) -> bool {
        edits >= self.activation_min && self.activation_max.map_or(true, |max| edits < max)
    }

    pub fn namespace_label(&self) -> String {
        match &self.namespaces {
            Some(set) if set.len() < ALL_NAMESPACES => set.iter().cloned().collect::<Vec<_>>().join(","),
            _ => "all".to_owned(),
        }
    }
}

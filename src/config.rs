use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::usecase::services::dispatcher::DispatchSettings;
use crate::usecase::services::table_config::DEFAULT_PAGE_SIZE_OPTIONS;

pub const ENV_PREFIX: &str = "SQLGRID_";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub default_page_size: i64,
    pub page_size_options: Vec<i64>,
    pub datetime_format: String,
    /// `UTC` or `localtime`.
    pub timezone: String,
    /// Treats every caller as privileged: error envelopes carry messages and traces.
    pub expose_traces: bool,
    pub log_filter: String,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            db_path: default_db_path().unwrap_or_else(|_| PathBuf::from("sqlgrid.sqlite")),
            default_page_size: 50,
            page_size_options: DEFAULT_PAGE_SIZE_OPTIONS.to_vec(),
            datetime_format: "%d.%m.%Y %H:%M".to_string(),
            timezone: "UTC".to_string(),
            expose_traces: false,
            log_filter: "sqlgrid=info,tower_http=info".to_string(),
        }
    }
}

impl GridConfig {
    /// Defaults, then an optional JSON file named by `SQLGRID_CONFIG`, then `SQLGRID_*`
    /// variables. A `.env` file in the working directory is loaded first.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match std::env::var(format!("{ENV_PREFIX}CONFIG")) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// `lookup` receives full variable names such as `SQLGRID_BIND_ADDR`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty());

        if let Some(value) = var("BIND_ADDR") {
            self.bind_addr = value;
        }
        if let Some(value) = var("DB_PATH") {
            self.db_path = PathBuf::from(value);
        }
        if let Some(value) = var("DEFAULT_PAGE_SIZE") {
            self.default_page_size = value
                .trim()
                .parse()
                .with_context(|| format!("invalid {ENV_PREFIX}DEFAULT_PAGE_SIZE: {value}"))?;
        }
        if let Some(value) = var("PAGE_SIZE_OPTIONS") {
            self.page_size_options = value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| {
                    item.parse::<i64>()
                        .with_context(|| format!("invalid {ENV_PREFIX}PAGE_SIZE_OPTIONS entry: {item}"))
                })
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(value) = var("DATETIME_FORMAT") {
            self.datetime_format = value;
        }
        if let Some(value) = var("TIMEZONE") {
            self.timezone = value;
        }
        if let Some(value) = var("EXPOSE_TRACES") {
            self.expose_traces = parse_flag(&value)
                .ok_or_else(|| anyhow!("invalid {ENV_PREFIX}EXPOSE_TRACES: {value}"))?;
        }
        if let Some(value) = var("LOG") {
            self.log_filter = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_page_size <= 0 {
            bail!("default_page_size must be greater than zero");
        }
        if self.page_size_options.iter().any(|size| *size <= 0) {
            bail!("page_size_options must be greater than zero");
        }
        if !self.timezone.eq_ignore_ascii_case("utc") && !self.timezone.eq_ignore_ascii_case("localtime") {
            bail!("timezone must be UTC or localtime, got {}", self.timezone);
        }
        Ok(())
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            datetime_format: self.datetime_format.clone(),
            timezone: self.timezone.clone(),
            page_size_options: self.page_size_options.clone(),
        }
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("org", "sqlgrid", "sqlgrid")
        .ok_or_else(|| anyhow!("unable to resolve data directory"))?;
    Ok(project_dirs.data_local_dir().join("sqlgrid.sqlite"))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn env_overrides_defaults() {
        let mut config = GridConfig::default();
        config
            .apply_env(lookup(&[
                ("SQLGRID_BIND_ADDR", "0.0.0.0:8080"),
                ("SQLGRID_PAGE_SIZE_OPTIONS", "5, 25"),
                ("SQLGRID_EXPOSE_TRACES", "yes"),
                ("SQLGRID_TIMEZONE", ""),
            ]))
            .expect("env should apply");

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.page_size_options, vec![5, 25]);
        assert!(config.expose_traces);
        assert_eq!(config.timezone, "UTC", "blank variables are ignored");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = GridConfig::default();
        let result = config.apply_env(lookup(&[("SQLGRID_DEFAULT_PAGE_SIZE", "many")]));
        assert!(result.is_err(), "non-numeric page size should fail");

        config.timezone = "Europe/Vienna".to_string();
        assert!(config.validate().is_err(), "named zones are not supported");
    }

    #[test]
    fn file_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("sqlgrid.json");
        std::fs::write(&path, r#"{ "default_page_size": 20, "db_path": "/tmp/grid.sqlite" }"#)
            .expect("should write config");

        let config = GridConfig::from_file(&path).expect("config should load");

        assert_eq!(config.default_page_size, 20);
        assert_eq!(config.db_path, PathBuf::from("/tmp/grid.sqlite"));
        assert_eq!(config.datetime_format, "%d.%m.%Y %H:%M");
    }

    #[test]
    fn default_db_path_uses_sqlgrid_directory() {
        let db_path = default_db_path().expect("default db path should resolve");
        assert_eq!(
            db_path.file_name().and_then(|name| name.to_str()),
            Some("sqlgrid.sqlite")
        );
    }
}

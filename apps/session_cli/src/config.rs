use std::{fs, path::Path, time::Duration};

use client_core::DEFAULT_PROFILE_PATH;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub profile_path: String,
    pub cache_database_url: String,
    /// Zero disables the client-side timeout.
    pub request_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080/api".into(),
            profile_path: DEFAULT_PROFILE_PATH.into(),
            cache_database_url: "sqlite://./data/session_cache.db".into(),
            request_timeout_seconds: 10,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_seconds > 0).then(|| Duration::from_secs(self.request_timeout_seconds))
    }
}

pub fn load_settings(config_path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(config_path) {
        apply_file_overrides(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());

    settings.cache_database_url = normalize_database_url(&settings.cache_database_url);
    settings
}

fn apply_file_overrides(settings: &mut Settings, raw: &str) {
    let file_cfg = match raw.parse::<toml::Table>() {
        Ok(table) => table,
        Err(err) => {
            warn!("config: ignoring unreadable config file err={err}");
            return;
        }
    };

    if let Some(v) = file_cfg.get("api_base_url").and_then(|v| v.as_str()) {
        settings.api_base_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("profile_path").and_then(|v| v.as_str()) {
        settings.profile_path = v.to_string();
    }
    if let Some(v) = file_cfg.get("cache_database_url").and_then(|v| v.as_str()) {
        settings.cache_database_url = v.to_string();
    }
    if let Some(v) = file_cfg
        .get("request_timeout_seconds")
        .and_then(|v| v.as_integer())
        .and_then(|v| u64::try_from(v).ok())
    {
        settings.request_timeout_seconds = v;
    }
}

fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = lookup("APP__PROFILE_PATH") {
        settings.profile_path = v;
    }

    if let Some(v) = lookup("CACHE_DATABASE_URL") {
        settings.cache_database_url = v;
    }
    if let Some(v) = lookup("APP__CACHE_DATABASE_URL") {
        settings.cache_database_url = v;
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECONDS") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.request_timeout_seconds = parsed,
            Err(_) => warn!("config: ignoring APP__REQUEST_TIMEOUT_SECONDS={v}"),
        }
    }
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().cache_database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

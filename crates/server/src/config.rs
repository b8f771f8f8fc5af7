use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub upload_root: Option<String>,
    pub max_upload_bytes: usize,
    pub session_idle_ttl_seconds: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8000".into(),
            upload_root: None,
            max_upload_bytes: 5 * 1024 * 1024,
            session_idle_ttl_seconds: 3600,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        apply_file_config(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| env::var(key).ok());

    settings
}

fn apply_file_config(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
        tracing::warn!("ignoring server.toml: expected flat string keys");
        return;
    };

    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("upload_root") {
        settings.upload_root = Some(v.clone());
    }
    if let Some(parsed) = file_cfg
        .get("max_upload_bytes")
        .and_then(|v| v.parse::<usize>().ok())
    {
        settings.max_upload_bytes = parsed;
    }
    if let Some(parsed) = file_cfg
        .get("session_idle_ttl_seconds")
        .and_then(|v| v.parse::<i64>().ok())
    {
        settings.session_idle_ttl_seconds = parsed;
    }
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = lookup("APP__UPLOAD_ROOT") {
        settings.upload_root = Some(v);
    }

    if let Some(parsed) = lookup("APP__MAX_UPLOAD_BYTES").and_then(|v| v.parse::<usize>().ok()) {
        settings.max_upload_bytes = parsed;
    }

    if let Some(parsed) =
        lookup("APP__SESSION_IDLE_TTL_SECONDS").and_then(|v| v.parse::<i64>().ok())
    {
        settings.session_idle_ttl_seconds = parsed;
    }
}

/// Resolves the directory that holds per-session upload folders and makes
/// sure it exists.
pub fn prepare_upload_root(raw_upload_root: Option<&str>) -> anyhow::Result<PathBuf> {
    let upload_root = normalize_upload_root(raw_upload_root);
    fs::create_dir_all(&upload_root)
        .with_context(|| format!("failed to create upload root '{}'", upload_root.display()))?;
    Ok(upload_root)
}

fn normalize_upload_root(raw_upload_root: Option<&str>) -> PathBuf {
    match raw_upload_root.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => Path::new(raw).to_path_buf(),
        None => default_upload_root(),
    }
}

fn default_upload_root() -> PathBuf {
    env::temp_dir().join("csv-uploader")
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

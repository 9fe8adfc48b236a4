// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_CLIENT_TIMEOUT: &str = "10s";
const DEFAULT_DEBOUNCE: &str = "300ms";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub client: Client,
    #[serde(default)]
    pub ui: Ui,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            storage: Storage::default(),
            server: Server::default(),
            client: Client::default(),
            ui: Ui::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub listen: Option<String>,
    pub workers: Option<usize>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            listen: Some(DEFAULT_LISTEN.to_owned()),
            workers: Some(DEFAULT_WORKERS),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Client {
    pub base_url: Option<String>,
    pub timeout: Option<String>,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            base_url: Some(DEFAULT_BASE_URL.to_owned()),
            timeout: Some(DEFAULT_CLIENT_TIMEOUT.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ui {
    pub debounce: Option<String>,
}

impl Default for Ui {
    fn default() -> Self {
        Self {
            debounce: Some(DEFAULT_DEBOUNCE.to_owned()),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("KTOVET_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set KTOVET_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(ktovet_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no version; add `version = 1` at the top",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(db_path) = &self.storage.db_path {
            ktovet_db::validate_db_path(db_path)?;
        }

        if let Some(listen) = &self.server.listen
            && listen.trim().is_empty()
        {
            bail!(
                "server.listen in {} must not be empty; use host:port such as {DEFAULT_LISTEN}",
                path.display()
            );
        }

        if let Some(workers) = self.server.workers
            && !(1..=ktovet_server::MAX_WORKERS).contains(&workers)
        {
            bail!(
                "server.workers in {} must be between 1 and {}, got {}",
                path.display(),
                ktovet_server::MAX_WORKERS,
                workers
            );
        }

        if let Some(timeout) = &self.client.timeout
            && parse_duration(timeout)? <= Duration::ZERO
        {
            bail!(
                "client.timeout in {} must be positive, got {}",
                path.display(),
                timeout
            );
        }

        if let Some(debounce) = &self.ui.debounce
            && parse_duration(debounce)? <= Duration::ZERO
        {
            bail!(
                "ui.debounce in {} must be positive, got {}; try 300ms",
                path.display(),
                debounce
            );
        }

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => ktovet_db::default_db_path(),
        }
    }

    pub fn listen(&self) -> &str {
        self.server.listen.as_deref().unwrap_or(DEFAULT_LISTEN)
    }

    pub fn workers(&self) -> usize {
        self.server.workers.unwrap_or(DEFAULT_WORKERS)
    }

    pub fn client_base_url(&self) -> &str {
        self.client
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn client_timeout(&self) -> Result<Duration> {
        parse_duration(
            self.client
                .timeout
                .as_deref()
                .unwrap_or(DEFAULT_CLIENT_TIMEOUT),
        )
    }

    pub fn debounce(&self) -> Result<Duration> {
        parse_duration(self.ui.debounce.as_deref().unwrap_or(DEFAULT_DEBOUNCE))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# ktovet config\n# Place this file at: {}\n\nversion = 1\n\n[storage]\n# Optional. Default is the platform data dir (for example ~/.local/share/ktovet/ktovet.db)\n# db_path = \"/absolute/path/to/ktovet.db\"\n\n[server]\nlisten = \"{}\"\nworkers = {}\n\n[client]\n# Used by --remote\nbase_url = \"{}\"\ntimeout = \"{}\"\n\n[ui]\n# Idle time after the last keystroke before a search is sent\ndebounce = \"{}\"\n",
            path.display(),
            DEFAULT_LISTEN,
            DEFAULT_WORKERS,
            DEFAULT_BASE_URL,
            DEFAULT_CLIENT_TIMEOUT,
            DEFAULT_DEBOUNCE,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 300ms or 10s)")
}

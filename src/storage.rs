use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{
    AuthKind, ContentKind, DEFAULT_SSH_PORT, FormState, HostKeyMode, TransferDirection,
};

const APP_DIR: &str = "scp-courier";

/// Form values remembered between runs. Passwords never land here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct Settings {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) user: String,
    pub(crate) auth_kind: AuthKind,
    pub(crate) key_path: String,
    pub(crate) direction: TransferDirection,
    pub(crate) content: ContentKind,
    pub(crate) local_path: String,
    pub(crate) remote_path: String,
    pub(crate) host_key_mode: HostKeyMode,
    pub(crate) known_hosts: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_SSH_PORT,
            user: String::new(),
            auth_kind: AuthKind::Password,
            key_path: String::new(),
            direction: TransferDirection::Upload,
            content: ContentKind::File,
            local_path: String::new(),
            remote_path: "~/".to_string(),
            host_key_mode: HostKeyMode::TrustOnFirstUse,
            known_hosts: None,
        }
    }
}

impl Settings {
    pub(crate) fn to_form(&self) -> FormState {
        FormState {
            host: self.host.clone(),
            port: self.port.to_string(),
            user: self.user.clone(),
            auth_kind: self.auth_kind,
            key_path: self.key_path.clone(),
            direction: self.direction,
            content: self.content,
            local_path: self.local_path.clone(),
            remote_path: self.remote_path.clone(),
            host_keys: self.host_key_mode,
            ..FormState::default()
        }
    }

    /// Copies the form back, keeping the stored port if the field does not parse.
    pub(crate) fn update_from_form(&mut self, form: &FormState) {
        self.host = form.host.trim().to_string();
        if let Ok(port) = form.port.trim().parse::<u16>() {
            if port > 0 {
                self.port = port;
            }
        }
        self.user = form.user.trim().to_string();
        self.auth_kind = form.auth_kind;
        self.key_path = form.key_path.trim().to_string();
        self.direction = form.direction;
        self.content = form.content;
        self.local_path = form.local_path.trim().to_string();
        self.remote_path = form.remote_path.trim().to_string();
        self.host_key_mode = form.host_keys;
    }
}

pub(crate) fn config_path() -> Result<PathBuf> {
    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_DIR);
        dir.push("settings.json");
        return Ok(dir);
    }
    let mut fallback = std::env::current_dir().context("current dir")?;
    fallback.push("scp-courier-settings.json");
    Ok(fallback)
}

pub(crate) fn log_path() -> Result<PathBuf> {
    if let Some(mut dir) = dirs::data_local_dir() {
        dir.push(APP_DIR);
        dir.push("scpc.log");
        return Ok(dir);
    }
    let mut fallback = std::env::current_dir().context("current dir")?;
    fallback.push("scpc.log");
    Ok(fallback)
}

pub(crate) fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = fs::read_to_string(path).context("read settings file")?;
    let settings = serde_json::from_str(&content).context("parse settings file")?;
    Ok(settings)
}

pub(crate) fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create config dir")?;
    }
    let content = serde_json::to_string_pretty(settings).context("serialize settings")?;
    fs::write(path, content).context("write settings file")?;
    Ok(())
}

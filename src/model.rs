use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransferError;
use crate::transfer::paths::expand_tilde;

pub(crate) const DEFAULT_SSH_PORT: u16 = 22;
pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, PartialEq, Eq)]
pub(crate) enum Credential {
    Password {
        password: String,
    },
    PrivateKey {
        path: String,
        passphrase: Option<String>,
    },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password { .. } => f.write_str("Password { .. }"),
            Credential::PrivateKey { path, passphrase } => f
                .debug_struct("PrivateKey")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| ".."))
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConnectionParams {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) user: String,
    pub(crate) credential: Credential,
    pub(crate) timeout: Duration,
}

impl ConnectionParams {
    #[cfg(test)]
    pub(crate) fn with_password(host: &str, user: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port: DEFAULT_SSH_PORT,
            user: user.to_string(),
            credential: Credential::Password {
                password: password.to_string(),
            },
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), TransferError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(TransferError::InvalidInput("host is empty".to_string()));
        }
        if host.chars().any(char::is_whitespace) {
            return Err(TransferError::InvalidInput(format!(
                "host '{host}' contains whitespace"
            )));
        }
        if self.port == 0 {
            return Err(TransferError::InvalidInput(
                "port must be between 1 and 65535".to_string(),
            ));
        }
        if self.user.trim().is_empty() {
            return Err(TransferError::InvalidInput("username is empty".to_string()));
        }
        if let Credential::PrivateKey { path, .. } = &self.credential {
            if path.trim().is_empty() {
                return Err(TransferError::InvalidInput(
                    "private key path is empty".to_string(),
                ));
            }
            let expanded = expand_tilde(path.trim());
            if !expanded.is_file() {
                return Err(TransferError::InvalidInput(format!(
                    "private key not found at {}",
                    expanded.display()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum TransferDirection {
    Upload,
    Download,
}

impl TransferDirection {
    pub(crate) fn label(self) -> &'static str {
        match self {
            TransferDirection::Upload => "Upload (send to remote)",
            TransferDirection::Download => "Download (get from remote)",
        }
    }

    pub(crate) fn toggled(self) -> Self {
        match self {
            TransferDirection::Upload => TransferDirection::Download,
            TransferDirection::Download => TransferDirection::Upload,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ContentKind {
    File,
    Directory,
}

impl ContentKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            ContentKind::File => "Single file",
            ContentKind::Directory => "Folder",
        }
    }

    pub(crate) fn toggled(self) -> Self {
        match self {
            ContentKind::File => ContentKind::Directory,
            ContentKind::Directory => ContentKind::File,
        }
    }

    pub(crate) fn is_recursive(self) -> bool {
        matches!(self, ContentKind::Directory)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TransferRequest {
    pub(crate) direction: TransferDirection,
    pub(crate) content: ContentKind,
    pub(crate) local_path: String,
    pub(crate) remote_path: String,
}

impl TransferRequest {
    pub(crate) fn validate(&self) -> Result<(), TransferError> {
        if self.local_path.trim().is_empty() {
            return Err(TransferError::InvalidInput("local path is empty".to_string()));
        }
        if self.remote_path.trim().is_empty() {
            return Err(TransferError::InvalidInput(
                "remote path is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TransferProgress {
    pub(crate) item_name: String,
    pub(crate) total_bytes: u64,
    pub(crate) sent_bytes: u64,
}

impl TransferProgress {
    /// `None` for empty items, where a percentage has no meaning.
    pub(crate) fn percent(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        let sent = self.sent_bytes.min(self.total_bytes);
        Some((sent as f64 / self.total_bytes as f64 * 100.0).clamp(0.0, 100.0))
    }

    pub(crate) fn ratio(&self) -> f64 {
        self.percent().unwrap_or(0.0) / 100.0
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.sent_bytes >= self.total_bytes
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TransferSummary {
    pub(crate) item_count: usize,
    pub(crate) total_bytes: u64,
    pub(crate) elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OrchestratorState {
    Idle,
    Connecting,
    Authenticating,
    Transferring,
    Closing,
    Completed,
    Failed,
    Cancelled,
}

impl OrchestratorState {
    pub(crate) fn label(self) -> &'static str {
        match self {
            OrchestratorState::Idle => "Ready",
            OrchestratorState::Connecting => "Connecting",
            OrchestratorState::Authenticating => "Authenticating",
            OrchestratorState::Transferring => "Transferring",
            OrchestratorState::Closing => "Closing",
            OrchestratorState::Completed => "Transfer complete",
            OrchestratorState::Failed => "Failed",
            OrchestratorState::Cancelled => "Cancelled",
        }
    }

    pub(crate) fn is_terminal(self) -> bool {
        matches!(
            self,
            OrchestratorState::Completed | OrchestratorState::Failed | OrchestratorState::Cancelled
        )
    }
}

/// Everything a running transfer reports to its front end.
#[derive(Debug)]
pub(crate) enum TransferEvent {
    Log(String),
    Progress(TransferProgress),
    Status(OrchestratorState),
    Finished(Result<TransferSummary, TransferError>),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub(crate) enum HostKeyMode {
    #[default]
    TrustOnFirstUse,
    StrictKnownHosts,
}

impl HostKeyMode {
    pub(crate) fn label(self) -> &'static str {
        match self {
            HostKeyMode::TrustOnFirstUse => "Trust on first use",
            HostKeyMode::StrictKnownHosts => "Strict known_hosts",
        }
    }

    pub(crate) fn toggled(self) -> Self {
        match self {
            HostKeyMode::TrustOnFirstUse => HostKeyMode::StrictKnownHosts,
            HostKeyMode::StrictKnownHosts => HostKeyMode::TrustOnFirstUse,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub(crate) enum AuthKind {
    #[default]
    Password,
    PrivateKey,
}

impl AuthKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            AuthKind::Password => "Password",
            AuthKind::PrivateKey => "Private key",
        }
    }

    pub(crate) fn toggled(self) -> Self {
        match self {
            AuthKind::Password => AuthKind::PrivateKey,
            AuthKind::PrivateKey => AuthKind::Password,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Field {
    Host,
    Port,
    User,
    AuthType,
    Password,
    KeyPath,
    Direction,
    Content,
    LocalPath,
    RemotePath,
    HostKeys,
    ActionStart,
}

impl Field {
    pub(crate) fn is_choice(self) -> bool {
        matches!(
            self,
            Field::AuthType | Field::Direction | Field::Content | Field::HostKeys
        )
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FormState {
    pub(crate) host: String,
    pub(crate) port: String,
    pub(crate) user: String,
    pub(crate) auth_kind: AuthKind,
    pub(crate) password: String,
    pub(crate) key_path: String,
    pub(crate) direction: TransferDirection,
    pub(crate) content: ContentKind,
    pub(crate) local_path: String,
    pub(crate) remote_path: String,
    pub(crate) host_keys: HostKeyMode,
    pub(crate) active_field: Field,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_SSH_PORT.to_string(),
            user: String::new(),
            auth_kind: AuthKind::Password,
            password: String::new(),
            key_path: String::new(),
            direction: TransferDirection::Upload,
            content: ContentKind::File,
            local_path: String::new(),
            remote_path: "~/".to_string(),
            host_keys: HostKeyMode::TrustOnFirstUse,
            active_field: Field::Host,
        }
    }
}

impl FormState {
    pub(crate) fn active_fields(&self) -> Vec<Field> {
        let mut fields = vec![Field::Host, Field::Port, Field::User, Field::AuthType];
        match self.auth_kind {
            AuthKind::Password => fields.push(Field::Password),
            AuthKind::PrivateKey => {
                fields.push(Field::KeyPath);
                fields.push(Field::Password);
            }
        }
        fields.extend([
            Field::Direction,
            Field::Content,
            Field::LocalPath,
            Field::RemotePath,
            Field::HostKeys,
            Field::ActionStart,
        ]);
        fields
    }

    pub(crate) fn text_mut(&mut self, field: Field) -> Option<&mut String> {
        match field {
            Field::Host => Some(&mut self.host),
            Field::Port => Some(&mut self.port),
            Field::User => Some(&mut self.user),
            Field::Password => Some(&mut self.password),
            Field::KeyPath => Some(&mut self.key_path),
            Field::LocalPath => Some(&mut self.local_path),
            Field::RemotePath => Some(&mut self.remote_path),
            _ => None,
        }
    }

    pub(crate) fn toggle(&mut self, field: Field) {
        match field {
            Field::AuthType => self.auth_kind = self.auth_kind.toggled(),
            Field::Direction => self.direction = self.direction.toggled(),
            Field::Content => self.content = self.content.toggled(),
            Field::HostKeys => self.host_keys = self.host_keys.toggled(),
            _ => {}
        }
    }

    /// Checks the form the way the start action requires and builds the
    /// values handed to the orchestrator.
    pub(crate) fn to_transfer(&self) -> Result<(ConnectionParams, TransferRequest), String> {
        let credential = match self.auth_kind {
            AuthKind::Password => {
                if self.password.is_empty() {
                    return Err("Please fill in Host, Username, and Password.".to_string());
                }
                Credential::Password {
                    password: self.password.clone(),
                }
            }
            AuthKind::PrivateKey => {
                if self.key_path.trim().is_empty() {
                    return Err("Please fill in Host, Username, and Key path.".to_string());
                }
                Credential::PrivateKey {
                    path: self.key_path.trim().to_string(),
                    passphrase: (!self.password.is_empty()).then(|| self.password.clone()),
                }
            }
        };
        if self.host.trim().is_empty() || self.user.trim().is_empty() {
            return Err("Please fill in Host, Username, and Password.".to_string());
        }
        if self.local_path.trim().is_empty() || self.remote_path.trim().is_empty() {
            return Err("Please specify both local and remote paths.".to_string());
        }
        let port = parse_port(&self.port)?;
        let params = ConnectionParams {
            host: self.host.trim().to_string(),
            port,
            user: self.user.trim().to_string(),
            credential,
            timeout: DEFAULT_CONNECT_TIMEOUT,
        };
        let request = TransferRequest {
            direction: self.direction,
            content: self.content,
            local_path: self.local_path.trim().to_string(),
            remote_path: self.remote_path.trim().to_string(),
        };
        Ok((params, request))
    }
}

pub(crate) fn parse_port(value: &str) -> Result<u16, String> {
    match value.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(format!(
            "Port must be a number between 1 and 65535, got '{}'",
            value.trim()
        )),
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Notice {
    pub(crate) title: String,
    pub(crate) message: String,
}

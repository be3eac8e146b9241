use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use ssh2::{CheckResult, HashType, KnownHostFileKind, Session};
use tracing::{info, warn};

use crate::error::TransferError;
use crate::model::{DEFAULT_SSH_PORT, HostKeyMode};

/// Caller supplied decision for a presented host key.
pub(crate) trait HostKeyVerifier: Send + Sync {
    fn verify(&self, host: &str, port: u16, fingerprint: &str) -> bool;
}

/// Accepts exactly one `SHA256:` fingerprint, whatever known_hosts says.
#[derive(Debug, Clone)]
pub(crate) struct PinnedFingerprint(String);

impl PinnedFingerprint {
    pub(crate) fn new(fingerprint: &str) -> Self {
        let fingerprint = fingerprint.trim();
        if fingerprint.starts_with("SHA256:") {
            Self(fingerprint.to_string())
        } else {
            Self(format!("SHA256:{fingerprint}"))
        }
    }
}

impl HostKeyVerifier for PinnedFingerprint {
    fn verify(&self, _host: &str, _port: u16, fingerprint: &str) -> bool {
        fingerprint.trim_end_matches('=') == self.0.trim_end_matches('=')
    }
}

#[derive(Clone)]
pub(crate) enum HostKeyPolicy {
    /// Unknown hosts are recorded, changed keys are refused.
    TrustOnFirstUse { known_hosts: PathBuf },
    /// Only hosts already present in `known_hosts` are accepted.
    StrictKnownHosts { known_hosts: PathBuf },
    CustomVerifier(Arc<dyn HostKeyVerifier>),
}

impl fmt::Debug for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKeyPolicy::TrustOnFirstUse { known_hosts } => f
                .debug_struct("TrustOnFirstUse")
                .field("known_hosts", known_hosts)
                .finish(),
            HostKeyPolicy::StrictKnownHosts { known_hosts } => f
                .debug_struct("StrictKnownHosts")
                .field("known_hosts", known_hosts)
                .finish(),
            HostKeyPolicy::CustomVerifier(_) => f.write_str("CustomVerifier(..)"),
        }
    }
}

impl Default for HostKeyPolicy {
    fn default() -> Self {
        HostKeyPolicy::TrustOnFirstUse {
            known_hosts: default_known_hosts(),
        }
    }
}

impl HostKeyPolicy {
    pub(crate) fn from_mode(mode: HostKeyMode, known_hosts: Option<PathBuf>) -> Self {
        let known_hosts = known_hosts.unwrap_or_else(default_known_hosts);
        match mode {
            HostKeyMode::TrustOnFirstUse => HostKeyPolicy::TrustOnFirstUse { known_hosts },
            HostKeyMode::StrictKnownHosts => HostKeyPolicy::StrictKnownHosts { known_hosts },
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            HostKeyPolicy::TrustOnFirstUse { .. } => HostKeyMode::TrustOnFirstUse.label(),
            HostKeyPolicy::StrictKnownHosts { .. } => HostKeyMode::StrictKnownHosts.label(),
            HostKeyPolicy::CustomVerifier(_) => "Custom verifier",
        }
    }
}

pub(crate) fn default_known_hosts() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ssh")
        .join("known_hosts")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KnownHostsCheck {
    Match,
    Mismatch,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Accept,
    Record,
    Reject,
}

pub(crate) fn decide(strict: bool, check: KnownHostsCheck) -> Decision {
    match (check, strict) {
        (KnownHostsCheck::Match, _) => Decision::Accept,
        (KnownHostsCheck::Mismatch, _) => Decision::Reject,
        (KnownHostsCheck::NotFound, true) => Decision::Reject,
        (KnownHostsCheck::NotFound, false) => Decision::Record,
    }
}

/// Host column used in `known_hosts`: bare for port 22, `[host]:port` otherwise.
pub(crate) fn known_hosts_entry(host: &str, port: u16) -> String {
    if port == DEFAULT_SSH_PORT {
        host.to_string()
    } else {
        format!("[{host}]:{port}")
    }
}

pub(crate) fn format_fingerprint(hash: &[u8]) -> String {
    format!("SHA256:{}", STANDARD_NO_PAD.encode(hash))
}

/// Applies `policy` to a presented key. `lookup` is only consulted for the
/// known_hosts based policies and reports what the file says about the key.
/// Returns `Accept` or `Record`; a rejection is the error.
pub(crate) fn assess(
    policy: &HostKeyPolicy,
    host: &str,
    port: u16,
    fingerprint: &str,
    lookup: impl FnOnce(&Path) -> Result<KnownHostsCheck, TransferError>,
) -> Result<Decision, TransferError> {
    let (known_hosts, strict) = match policy {
        HostKeyPolicy::CustomVerifier(verifier) => {
            if verifier.verify(host, port, fingerprint) {
                return Ok(Decision::Accept);
            }
            warn!(host, port, %fingerprint, "host key refused by verifier");
            return Err(TransferError::ConnectionFailed(format!(
                "host key {fingerprint} for {host} was not accepted"
            )));
        }
        HostKeyPolicy::TrustOnFirstUse { known_hosts } => (known_hosts, false),
        HostKeyPolicy::StrictKnownHosts { known_hosts } => (known_hosts, true),
    };
    let check = lookup(known_hosts)?;
    match decide(strict, check) {
        Decision::Reject => {
            warn!(host, port, %fingerprint, ?check, "host key rejected");
            let reason = match check {
                KnownHostsCheck::Mismatch => "does not match the recorded key",
                _ => "is not in known_hosts",
            };
            Err(TransferError::ConnectionFailed(format!(
                "host key {fingerprint} for {} {reason}",
                known_hosts_entry(host, port)
            )))
        }
        decision => Ok(decision),
    }
}

/// Applies `policy` to the key the server presented during the handshake.
pub(crate) fn verify_host_key(
    session: &Session,
    host: &str,
    port: u16,
    policy: &HostKeyPolicy,
) -> Result<(), TransferError> {
    let fingerprint = session
        .host_key_hash(HashType::Sha256)
        .map(format_fingerprint)
        .ok_or_else(|| TransferError::ConnectionFailed("server sent no host key".to_string()))?;
    let (key, key_type) = session
        .host_key()
        .ok_or_else(|| TransferError::ConnectionFailed("server sent no host key".to_string()))?;

    let mut loaded = None;
    let decision = assess(policy, host, port, &fingerprint, |known_hosts| {
        let mut store = session
            .known_hosts()
            .map_err(|err| TransferError::ConnectionFailed(format!("known_hosts: {err}")))?;
        if known_hosts.exists() {
            store
                .read_file(known_hosts, KnownHostFileKind::OpenSSH)
                .map_err(|err| {
                    TransferError::ConnectionFailed(format!(
                        "read {}: {err}",
                        known_hosts.display()
                    ))
                })?;
        }
        let check = match store.check_port(host, port, key) {
            CheckResult::Match => KnownHostsCheck::Match,
            CheckResult::Mismatch => KnownHostsCheck::Mismatch,
            CheckResult::NotFound => KnownHostsCheck::NotFound,
            CheckResult::Failure => {
                return Err(TransferError::ConnectionFailed(format!(
                    "could not check host key for {host}"
                )));
            }
        };
        loaded = Some((store, known_hosts.to_path_buf()));
        Ok(check)
    })?;

    if let (Decision::Record, Some((mut store, known_hosts))) = (decision, loaded) {
        let entry = known_hosts_entry(host, port);
        store
            .add(&entry, key, "", key_type.into())
            .map_err(|err| TransferError::ConnectionFailed(format!("known_hosts: {err}")))?;
        if let Err(err) = write_known_hosts(&store, &known_hosts) {
            warn!(path = %known_hosts.display(), error = %err, "could not save host key");
        } else {
            info!(host = %entry, %fingerprint, "recorded new host key");
        }
    }
    Ok(())
}

fn write_known_hosts(store: &ssh2::KnownHosts, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| err.to_string())?;
    }
    store
        .write_file(path, KnownHostFileKind::OpenSSH)
        .map_err(|err| err.to_string())
}

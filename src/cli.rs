use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rpassword::prompt_password;
use tracing::info;

use crate::host_keys::{HostKeyPolicy, PinnedFingerprint};
use crate::model::{
    ConnectionParams, ContentKind, Credential, DEFAULT_SSH_PORT, HostKeyMode, TransferDirection,
    TransferEvent, TransferProgress, TransferRequest,
};
use crate::ssh::SshConnector;
use crate::transfer::observer::{CancelToken, ChannelObserver};
use crate::transfer::orchestrator::TransferOrchestrator;
use crate::ui::helpers::format_bytes;

pub(crate) const PASSWORD_ENV_VAR: &str = "SCPC_PASSWORD";

/// Copy files and folders to and from SSH hosts.
///
/// Without a subcommand an interactive form opens.
#[derive(Debug, Parser)]
#[command(name = "scpc", version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Upload SOURCE (local) to DESTINATION (remote, default `~/`)
    Put(TransferArgs),
    /// Download SOURCE (remote) to DESTINATION (local, default `.`)
    Get(TransferArgs),
}

#[derive(Debug, Args)]
pub(crate) struct TransferArgs {
    #[arg(long)]
    host: String,
    #[arg(long, short = 'P', default_value_t = DEFAULT_SSH_PORT)]
    port: u16,
    #[arg(long, short = 'u')]
    user: String,
    /// Private key file; password auth is used when absent
    #[arg(long, short = 'i')]
    key: Option<PathBuf>,
    /// Ask for the private key passphrase
    #[arg(long, requires = "key")]
    passphrase_prompt: bool,
    /// Copy a whole folder
    #[arg(long, short = 'r')]
    dir: bool,
    /// Connect timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,
    /// Refuse hosts that are not already in known_hosts
    #[arg(long)]
    strict_host_keys: bool,
    #[arg(long)]
    known_hosts: Option<PathBuf>,
    /// Accept only this SHA256 host key fingerprint; known_hosts is not used
    #[arg(long, conflicts_with_all = ["strict_host_keys", "known_hosts"])]
    fingerprint: Option<String>,
    #[arg(long, env = PASSWORD_ENV_VAR, hide = true, hide_env_values = true)]
    password: Option<String>,
    source: String,
    destination: Option<String>,
}

impl TransferArgs {
    fn request(&self, direction: TransferDirection) -> TransferRequest {
        let (local_path, remote_path) = match direction {
            TransferDirection::Upload => (
                self.source.clone(),
                self.destination.clone().unwrap_or_else(|| "~/".to_string()),
            ),
            TransferDirection::Download => (
                self.destination.clone().unwrap_or_else(|| ".".to_string()),
                self.source.clone(),
            ),
        };
        TransferRequest {
            direction,
            content: if self.dir {
                ContentKind::Directory
            } else {
                ContentKind::File
            },
            local_path,
            remote_path,
        }
    }

    fn host_key_policy(&self) -> HostKeyPolicy {
        if let Some(fingerprint) = &self.fingerprint {
            return HostKeyPolicy::CustomVerifier(Arc::new(PinnedFingerprint::new(fingerprint)));
        }
        let mode = if self.strict_host_keys {
            HostKeyMode::StrictKnownHosts
        } else {
            HostKeyMode::TrustOnFirstUse
        };
        HostKeyPolicy::from_mode(mode, self.known_hosts.clone())
    }

    fn credential(&self) -> Result<Credential> {
        if let Some(path) = &self.key {
            let passphrase = if self.passphrase_prompt {
                Some(prompt_password("Key passphrase: ").context("read passphrase")?)
            } else {
                None
            };
            return Ok(Credential::PrivateKey {
                path: path.to_string_lossy().into_owned(),
                passphrase,
            });
        }
        let password = match &self.password {
            Some(password) => password.clone(),
            None => prompt_password(format!("{}@{}'s password: ", self.user, self.host))
                .context("read password")?,
        };
        Ok(Credential::Password { password })
    }

    fn connection_params(&self) -> Result<ConnectionParams> {
        Ok(ConnectionParams {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            credential: self.credential()?,
            timeout: Duration::from_secs(self.timeout.max(1)),
        })
    }
}

/// Runs one transfer on a worker thread and reports to stderr.
pub(crate) fn run(command: Command) -> Result<ExitCode> {
    let (direction, args) = match command {
        Command::Put(args) => (TransferDirection::Upload, args),
        Command::Get(args) => (TransferDirection::Download, args),
    };
    let request = args.request(direction);
    let params = args.connection_params()?;
    let orchestrator = TransferOrchestrator::new(Arc::new(SshConnector), args.host_key_policy());
    info!(direction = ?direction, host = %params.host, "headless transfer");

    let (tx, rx) = mpsc::channel();
    let worker = std::thread::spawn(move || {
        let observer = ChannelObserver::new(tx);
        orchestrator.execute(&params, &request, &observer, &CancelToken::new())
    });

    let mut reporter = ProgressReporter::default();
    for event in rx {
        match event {
            TransferEvent::Log(line) => eprintln!("{line}"),
            TransferEvent::Progress(progress) => {
                if let Some(line) = reporter.line(&progress) {
                    eprintln!("{line}");
                }
            }
            TransferEvent::Status(_) | TransferEvent::Finished(_) => {}
        }
    }
    let result = worker
        .join()
        .map_err(|_| anyhow::anyhow!("transfer worker panicked"))?;

    match result {
        Ok(summary) => {
            println!(
                "{} item(s), {} in {:.1}s",
                summary.item_count,
                format_bytes(summary.total_bytes),
                summary.elapsed.as_secs_f64()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{}: {}", err.kind().title(), err.detail());
            Ok(ExitCode::from(err.kind().exit_code()))
        }
    }
}

/// Throttles per-chunk progress to quarter steps per item.
#[derive(Debug, Default)]
struct ProgressReporter {
    item: String,
    last_step: Option<u8>,
}

impl ProgressReporter {
    fn line(&mut self, progress: &TransferProgress) -> Option<String> {
        if progress.item_name != self.item {
            self.item = progress.item_name.clone();
            self.last_step = None;
        }
        let step = match progress.percent() {
            Some(percent) => (percent / 25.0).floor() as u8,
            None => 4,
        };
        if self.last_step.is_some_and(|last| last >= step) {
            return None;
        }
        if step == 0 && !progress.is_complete() && self.last_step.is_none() {
            self.last_step = Some(0);
            return None;
        }
        self.last_step = Some(step);
        Some(format!(
            "  {} {:>3}% ({} / {})",
            progress.item_name,
            progress.percent().unwrap_or(100.0).round() as u64,
            format_bytes(progress.sent_bytes),
            format_bytes(progress.total_bytes)
        ))
    }
}

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;

use ssh2::{Channel, ErrorCode, Session, Sftp};
use tracing::{debug, info, warn};

use crate::error::TransferError;
use crate::host_keys::{HostKeyPolicy, verify_host_key};
use crate::model::{ConnectionParams, Credential};
use crate::transfer::backend::{
    Connector, DownloadSource, EntryKind, RemoteSession, RemoteStat, TreeEntry, UploadSink,
};
use crate::transfer::paths::{expand_tilde, join_remote};

// libssh2 session codes that mean the transport died, not the credential.
const LIBSSH2_ERROR_SOCKET_SEND: i32 = -7;
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_SOCKET_DISCONNECT: i32 = -13;
const LIBSSH2_ERROR_SOCKET_RECV: i32 = -43;
const LIBSSH2_FX_NO_SUCH_FILE: i32 = 2;

const NEW_DIR_MODE: i32 = 0o755;

/// Opens real sessions with libssh2.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SshConnector;

impl Connector for SshConnector {
    fn connect(
        &self,
        params: &ConnectionParams,
        host_keys: &HostKeyPolicy,
    ) -> Result<Box<dyn RemoteSession>, TransferError> {
        let session = connect_ssh(params, host_keys)?;
        Ok(Box::new(SshSession {
            session,
            sftp: None,
        }))
    }
}

fn connect_ssh(
    params: &ConnectionParams,
    host_keys: &HostKeyPolicy,
) -> Result<Session, TransferError> {
    let host = params.host.trim();
    let address = (host, params.port);
    let mut last_err = None;
    let mut tcp = None;
    let addrs = address
        .to_socket_addrs()
        .map_err(|err| TransferError::ConnectionFailed(format!("resolve {host}: {err}")))?;
    for addr in addrs {
        debug!(%addr, "trying address");
        match TcpStream::connect_timeout(&addr, params.timeout) {
            Ok(stream) => {
                tcp = Some(stream);
                break;
            }
            Err(err) => last_err = Some(err),
        }
    }
    let tcp = tcp.ok_or_else(|| {
        let err = last_err
            .map(|err| err.to_string())
            .unwrap_or_else(|| format!("no address found for {host}"));
        TransferError::ConnectionFailed(format!("connect tcp failed: {err}"))
    })?;
    tcp.set_read_timeout(Some(params.timeout)).ok();
    tcp.set_write_timeout(Some(params.timeout)).ok();

    let mut session = Session::new()
        .map_err(|err| TransferError::ConnectionFailed(format!("create session: {err}")))?;
    session.set_timeout(params.timeout.as_millis().min(u128::from(u32::MAX)) as u32);
    session.set_tcp_stream(tcp);
    let setup = session
        .handshake()
        .map_err(|err| TransferError::ConnectionFailed(format!("ssh handshake: {err}")))
        .and_then(|()| verify_host_key(&session, host, params.port, host_keys));
    if let Err(err) = setup {
        return Err(abandon(err, || {
            session.disconnect(None, "connection setup failed", None)
        }));
    }
    info!(host, port = params.port, "ssh handshake complete");
    Ok(session)
}

/// Disconnects a session that never reached the orchestrator. `err` stays the result.
fn abandon(
    err: TransferError,
    disconnect: impl FnOnce() -> Result<(), ssh2::Error>,
) -> TransferError {
    if let Err(close_err) = disconnect() {
        warn!(error = %close_err, "disconnect after failed setup");
    } else {
        debug!("session disconnected after failed setup");
    }
    err
}

fn auth_error(context: &str, err: ssh2::Error) -> TransferError {
    match err.code() {
        ErrorCode::Session(
            LIBSSH2_ERROR_SOCKET_SEND
            | LIBSSH2_ERROR_TIMEOUT
            | LIBSSH2_ERROR_SOCKET_DISCONNECT
            | LIBSSH2_ERROR_SOCKET_RECV,
        ) => TransferError::ConnectionFailed(format!("{context}: {err}")),
        _ => TransferError::AuthenticationFailed(format!("{context}: {err}")),
    }
}

fn remote_error(context: impl std::fmt::Display, err: ssh2::Error) -> TransferError {
    TransferError::TransferIo(format!("{context}: {err}"))
}

fn is_missing(err: &ssh2::Error) -> bool {
    matches!(err.code(), ErrorCode::SFTP(LIBSSH2_FX_NO_SUCH_FILE))
}

struct SshSession {
    session: Session,
    sftp: Option<Sftp>,
}

impl SshSession {
    /// SFTP is only used for metadata; file bytes travel over SCP channels.
    fn sftp(&mut self) -> Result<&Sftp, TransferError> {
        if self.sftp.is_none() {
            let sftp = self
                .session
                .sftp()
                .map_err(|err| remote_error("open sftp", err))?;
            self.sftp = Some(sftp);
        }
        self.sftp
            .as_ref()
            .ok_or_else(|| TransferError::TransferIo("sftp subsystem unavailable".to_string()))
    }
}

impl RemoteSession for SshSession {
    fn authenticate(&mut self, user: &str, credential: &Credential) -> Result<(), TransferError> {
        match credential {
            Credential::Password { password } => self
                .session
                .userauth_password(user, password)
                .map_err(|err| auth_error("password auth", err))?,
            Credential::PrivateKey { path, passphrase } => {
                let path = expand_tilde(path);
                self.session
                    .userauth_pubkey_file(user, None, &path, passphrase.as_deref())
                    .map_err(|err| auth_error("private key auth", err))?;
            }
        }
        if !self.session.authenticated() {
            return Err(TransferError::AuthenticationFailed(
                "Authentication failed".to_string(),
            ));
        }
        Ok(())
    }

    fn home_dir(&mut self) -> Result<String, TransferError> {
        let home = self
            .sftp()?
            .realpath(Path::new("."))
            .map_err(|err| remote_error("resolve remote home", err))?;
        Ok(home.to_string_lossy().into_owned())
    }

    fn stat(&mut self, path: &str) -> Result<Option<RemoteStat>, TransferError> {
        match self.sftp()?.stat(Path::new(path)) {
            Ok(stat) => Ok(Some(RemoteStat {
                is_dir: stat.is_dir(),
            })),
            Err(err) if is_missing(&err) => Ok(None),
            Err(err) => Err(remote_error(format!("stat {path}"), err)),
        }
    }

    fn list_tree(&mut self, root: &str) -> Result<Vec<TreeEntry>, TransferError> {
        fn walk(
            sftp: &Sftp,
            dir: &str,
            prefix: &str,
            out: &mut Vec<TreeEntry>,
        ) -> Result<(), TransferError> {
            let mut children = sftp
                .readdir(Path::new(dir))
                .map_err(|err| remote_error(format!("read remote dir {dir}"), err))?;
            children.sort_by(|a, b| a.0.cmp(&b.0));
            for (path, stat) in children {
                let Some(name) = path.file_name().map(|s| s.to_string_lossy().into_owned())
                else {
                    continue;
                };
                if name == "." || name == ".." {
                    continue;
                }
                let relative = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}/{name}")
                };
                let file_type = stat.file_type();
                let kind = if file_type.is_dir() {
                    EntryKind::Directory
                } else if file_type.is_file() {
                    EntryKind::File
                } else {
                    EntryKind::Other
                };
                out.push(TreeEntry {
                    relative: relative.clone(),
                    kind,
                    size: stat.size.unwrap_or(0),
                });
                if kind == EntryKind::Directory {
                    walk(sftp, &join_remote(dir, &name), &relative, out)?;
                }
            }
            Ok(())
        }

        let mut entries = Vec::new();
        walk(self.sftp()?, root, "", &mut entries)?;
        Ok(entries)
    }

    fn create_dir(&mut self, path: &str) -> Result<(), TransferError> {
        let sftp = self.sftp()?;
        match sftp.mkdir(Path::new(path), NEW_DIR_MODE) {
            Ok(()) => Ok(()),
            Err(err) => match sftp.stat(Path::new(path)) {
                Ok(stat) if stat.is_dir() => Ok(()),
                _ => Err(remote_error(format!("create remote dir {path}"), err)),
            },
        }
    }

    fn send_file(
        &mut self,
        path: &str,
        size: u64,
        mode: i32,
    ) -> Result<Box<dyn UploadSink>, TransferError> {
        let channel = self
            .session
            .scp_send(Path::new(path), mode, size, None)
            .map_err(|err| remote_error(format!("scp send {path}"), err))?;
        Ok(Box::new(ScpChannel { channel }))
    }

    fn recv_file(&mut self, path: &str) -> Result<(Box<dyn DownloadSource>, u64), TransferError> {
        let (channel, stat) = self
            .session
            .scp_recv(Path::new(path))
            .map_err(|err| remote_error(format!("scp recv {path}"), err))?;
        Ok((Box::new(ScpChannel { channel }), stat.size()))
    }

    fn close(&mut self) -> Result<(), TransferError> {
        self.sftp = None;
        self.session
            .disconnect(None, "transfer finished", None)
            .map_err(|err| {
                warn!(error = %err, "ssh disconnect failed");
                TransferError::ConnectionFailed(format!("disconnect: {err}"))
            })
    }
}

struct ScpChannel {
    channel: Channel,
}

impl ScpChannel {
    fn shutdown(mut self) -> io::Result<()> {
        self.channel.send_eof()?;
        self.channel.wait_eof()?;
        self.channel.close()?;
        self.channel.wait_close()?;
        Ok(())
    }
}

impl Read for ScpChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.channel.read(buf)
    }
}

impl Write for ScpChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.channel.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.channel.flush()
    }
}

impl UploadSink for ScpChannel {
    fn finish(self: Box<Self>) -> io::Result<()> {
        self.shutdown()
    }
}

impl DownloadSource for ScpChannel {
    fn finish(self: Box<Self>) -> io::Result<()> {
        self.shutdown()
    }
}

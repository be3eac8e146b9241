//! In-process stand-in for an SSH server, backed by a temp directory that
//! plays the remote filesystem root.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::TransferError;
use crate::host_keys::HostKeyPolicy;
use crate::model::{ConnectionParams, Credential};
use crate::transfer::backend::{
    Connector, DownloadSource, RemoteSession, RemoteStat, TreeEntry, UploadSink,
};
use crate::transfer::paths::{join_relative, walk_local};

pub(crate) const FAKE_HOME: &str = "/home/bob";
pub(crate) const FAKE_PASSWORD: &str = "x";

#[derive(Clone)]
pub(crate) struct FakeConnector {
    root: PathBuf,
    refuse_connect: bool,
    fail_close: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub(crate) fn new(tag: &str) -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let root = std::env::temp_dir().join(format!("scpc-fake-{tag}-{nanos}"));
        fs::create_dir_all(join_relative(&root, FAKE_HOME)).unwrap();
        fs::create_dir_all(root.join("local")).unwrap();
        Self {
            root,
            refuse_connect: false,
            fail_close: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn refusing_connections(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    pub(crate) fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Where the remote home directory lives on the local disk.
    pub(crate) fn home(&self) -> PathBuf {
        join_relative(&self.root, FAKE_HOME)
    }

    /// Local working area that is not part of the remote filesystem.
    pub(crate) fn scratch(&self) -> PathBuf {
        self.root.join("local")
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn local(&self, remote: &str) -> PathBuf {
        join_relative(&self.root, remote)
    }
}

impl Connector for FakeConnector {
    fn connect(
        &self,
        _params: &ConnectionParams,
        _host_keys: &HostKeyPolicy,
    ) -> Result<Box<dyn RemoteSession>, TransferError> {
        self.record("connect");
        if self.refuse_connect {
            return Err(TransferError::ConnectionFailed(
                "connect tcp failed: connection refused".to_string(),
            ));
        }
        Ok(Box::new(FakeSession {
            remote: self.clone(),
            authenticated: false,
        }))
    }
}

struct FakeSession {
    remote: FakeConnector,
    authenticated: bool,
}

impl FakeSession {
    fn require_auth(&self) -> Result<(), TransferError> {
        if self.authenticated {
            Ok(())
        } else {
            Err(TransferError::TransferIo("session is not authenticated".to_string()))
        }
    }
}

fn remote_io(path: &str, err: io::Error) -> TransferError {
    TransferError::io(format!("remote {path}"), err)
}

impl RemoteSession for FakeSession {
    fn authenticate(&mut self, _user: &str, credential: &Credential) -> Result<(), TransferError> {
        self.remote.record("authenticate");
        match credential {
            Credential::Password { password } if password == FAKE_PASSWORD => {
                self.authenticated = true;
                Ok(())
            }
            Credential::Password { .. } => Err(TransferError::AuthenticationFailed(
                "password auth: Authentication failed".to_string(),
            )),
            Credential::PrivateKey { .. } => Err(TransferError::AuthenticationFailed(
                "private key auth: Authentication failed".to_string(),
            )),
        }
    }

    fn home_dir(&mut self) -> Result<String, TransferError> {
        self.require_auth()?;
        Ok(FAKE_HOME.to_string())
    }

    fn stat(&mut self, path: &str) -> Result<Option<RemoteStat>, TransferError> {
        self.require_auth()?;
        match fs::metadata(self.remote.local(path)) {
            Ok(meta) => Ok(Some(RemoteStat {
                is_dir: meta.is_dir(),
            })),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(remote_io(path, err)),
        }
    }

    fn list_tree(&mut self, root: &str) -> Result<Vec<TreeEntry>, TransferError> {
        self.require_auth()?;
        walk_local(&self.remote.local(root))
    }

    fn create_dir(&mut self, path: &str) -> Result<(), TransferError> {
        self.require_auth()?;
        let local = self.remote.local(path);
        match fs::create_dir(&local) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists && local.is_dir() => Ok(()),
            Err(err) => Err(remote_io(path, err)),
        }
    }

    fn send_file(
        &mut self,
        path: &str,
        _size: u64,
        _mode: i32,
    ) -> Result<Box<dyn UploadSink>, TransferError> {
        self.require_auth()?;
        let file = File::create(self.remote.local(path)).map_err(|err| remote_io(path, err))?;
        Ok(Box::new(FakeFile(file)))
    }

    fn recv_file(&mut self, path: &str) -> Result<(Box<dyn DownloadSource>, u64), TransferError> {
        self.require_auth()?;
        let file = File::open(self.remote.local(path)).map_err(|err| remote_io(path, err))?;
        let size = file
            .metadata()
            .map_err(|err| remote_io(path, err))?
            .len();
        Ok((Box::new(FakeFile(file)), size))
    }

    fn close(&mut self) -> Result<(), TransferError> {
        self.remote.record("close");
        if self.remote.fail_close {
            return Err(TransferError::ConnectionFailed(
                "disconnect: socket already closed".to_string(),
            ));
        }
        Ok(())
    }
}

struct FakeFile(File);

impl Read for FakeFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for FakeFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl UploadSink for FakeFile {
    fn finish(self: Box<Self>) -> io::Result<()> {
        self.0.sync_all()
    }
}

impl DownloadSource for FakeFile {
    fn finish(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

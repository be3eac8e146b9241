use std::io::{self, Read, Write};

use crate::error::TransferError;
use crate::host_keys::HostKeyPolicy;
use crate::model::{ConnectionParams, Credential};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    File,
    Directory,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TreeEntry {
    pub(crate) relative: String,
    pub(crate) kind: EntryKind,
    pub(crate) size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RemoteStat {
    pub(crate) is_dir: bool,
}

/// Write side of one remote file. `finish` flushes the end of the stream
/// and waits for the peer to acknowledge it.
pub(crate) trait UploadSink: Write {
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Read side of one remote file, bounded by the size announced on open.
pub(crate) trait DownloadSource: Read {
    fn finish(self: Box<Self>) -> io::Result<()>;
}

pub(crate) trait Connector: Send + Sync {
    /// Opens the transport, runs the key exchange and applies the host key
    /// policy. The returned session is not authenticated yet.
    fn connect(
        &self,
        params: &ConnectionParams,
        host_keys: &HostKeyPolicy,
    ) -> Result<Box<dyn RemoteSession>, TransferError>;
}

pub(crate) trait RemoteSession {
    fn authenticate(&mut self, user: &str, credential: &Credential) -> Result<(), TransferError>;
    fn home_dir(&mut self) -> Result<String, TransferError>;
    /// `Ok(None)` when the path does not exist.
    fn stat(&mut self, path: &str) -> Result<Option<RemoteStat>, TransferError>;
    fn list_tree(&mut self, root: &str) -> Result<Vec<TreeEntry>, TransferError>;
    /// Succeeds when the directory already exists.
    fn create_dir(&mut self, path: &str) -> Result<(), TransferError>;
    fn send_file(
        &mut self,
        path: &str,
        size: u64,
        mode: i32,
    ) -> Result<Box<dyn UploadSink>, TransferError>;
    fn recv_file(&mut self, path: &str) -> Result<(Box<dyn DownloadSource>, u64), TransferError>;
    fn close(&mut self) -> Result<(), TransferError>;
}

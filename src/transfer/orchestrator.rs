use std::cmp;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::TransferError;
use crate::host_keys::HostKeyPolicy;
use crate::model::{
    ConnectionParams, ContentKind, OrchestratorState, TransferDirection, TransferProgress,
    TransferRequest, TransferSummary,
};
use crate::transfer::backend::{Connector, EntryKind, RemoteSession, TreeEntry};
use crate::transfer::observer::{CancelToken, TransferObserver};
use crate::transfer::paths::{
    expand_remote_home, expand_tilde, file_mode, join_relative, join_remote, local_base_name,
    local_destination, needs_remote_home, remote_base_name, remote_destination, walk_local,
};

pub(crate) const TRANSFER_CHUNK_BYTES: usize = 8192;

/// Runs one upload or download at a time over a fresh session.
pub(crate) struct TransferOrchestrator {
    connector: Arc<dyn Connector>,
    host_keys: HostKeyPolicy,
    chunk_size: usize,
    active: AtomicBool,
}

impl TransferOrchestrator {
    pub(crate) fn new(connector: Arc<dyn Connector>, host_keys: HostKeyPolicy) -> Self {
        Self {
            connector,
            host_keys,
            chunk_size: TRANSFER_CHUNK_BYTES,
            active: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub(crate) fn host_keys(&self) -> &HostKeyPolicy {
        &self.host_keys
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Connects, authenticates, transfers and always closes, in that order.
    /// A second call while one is in flight returns [`TransferError::Busy`]
    /// without touching the running one.
    pub(crate) fn execute(
        &self,
        params: &ConnectionParams,
        request: &TransferRequest,
        observer: &dyn TransferObserver,
        cancel: &CancelToken,
    ) -> Result<TransferSummary, TransferError> {
        let Some(_active) = ActiveGuard::acquire(&self.active) else {
            warn!("transfer requested while another one is running");
            return Err(TransferError::Busy);
        };
        let started = Instant::now();
        let mut run = Run {
            observer,
            cancel,
            chunk_size: self.chunk_size,
            items: 0,
            bytes: 0,
        };

        if let Err(err) = params.validate().and_then(|()| request.validate()) {
            run.log(&format!("Error: {err}"));
            run.set_state(OrchestratorState::Failed);
            return Err(err);
        }

        let mut session = None;
        let outcome = self.connect_and_transfer(&mut run, params, request, &mut session);

        run.set_state(OrchestratorState::Closing);
        if let Some(mut session) = session {
            match session.close() {
                Ok(()) => debug!("session closed"),
                Err(err) => {
                    warn!(error = %err, "failed to close session");
                    run.log(&format!("Warning: failed to close session: {err}"));
                }
            }
        }

        let summary = TransferSummary {
            item_count: run.items,
            total_bytes: run.bytes,
            elapsed: started.elapsed(),
        };
        match outcome {
            Ok(()) => {
                info!(
                    items = summary.item_count,
                    bytes = summary.total_bytes,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    "transfer complete"
                );
                run.log(&format!(
                    "Transfer complete: {} item(s), {} bytes.",
                    summary.item_count, summary.total_bytes
                ));
                run.set_state(OrchestratorState::Completed);
                Ok(summary)
            }
            Err(Halt::Cancelled) => {
                info!(items = summary.item_count, "transfer cancelled");
                run.log(&format!(
                    "Transfer cancelled after {} item(s).",
                    summary.item_count
                ));
                run.set_state(OrchestratorState::Cancelled);
                Err(TransferError::Cancelled { completed: summary })
            }
            Err(Halt::Failed(err)) => {
                warn!(kind = %err.kind(), error = %err, "transfer failed");
                run.log(&format!("Error: {err}"));
                run.set_state(OrchestratorState::Failed);
                Err(err)
            }
        }
    }

    fn connect_and_transfer(
        &self,
        run: &mut Run<'_>,
        params: &ConnectionParams,
        request: &TransferRequest,
        slot: &mut Option<Box<dyn RemoteSession>>,
    ) -> Result<(), Halt> {
        run.checkpoint()?;
        run.set_state(OrchestratorState::Connecting);
        run.log(&format!(
            "Connecting to {}:{}...",
            params.host.trim(),
            params.port
        ));
        let session = slot.insert(self.connector.connect(params, &self.host_keys)?);
        run.log("SSH connection successful.");

        run.checkpoint()?;
        run.set_state(OrchestratorState::Authenticating);
        session.authenticate(params.user.trim(), &params.credential)?;
        run.log(&format!("Authenticated as {}.", params.user.trim()));

        run.checkpoint()?;
        run.set_state(OrchestratorState::Transferring);
        match request.direction {
            TransferDirection::Upload => run.upload(session.as_mut(), request),
            TransferDirection::Download => run.download(session.as_mut(), request),
        }
    }
}

struct ActiveGuard<'a>(&'a AtomicBool);

impl<'a> ActiveGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Halt {
    Cancelled,
    Failed(TransferError),
}

impl From<TransferError> for Halt {
    fn from(err: TransferError) -> Self {
        Halt::Failed(err)
    }
}

/// Per-invocation bookkeeping: observer plumbing plus completed items.
struct Run<'a> {
    observer: &'a dyn TransferObserver,
    cancel: &'a CancelToken,
    chunk_size: usize,
    items: usize,
    bytes: u64,
}

impl Run<'_> {
    fn set_state(&self, state: OrchestratorState) {
        debug!(state = state.label(), "state change");
        self.observer.on_status_change(state);
    }

    fn log(&self, line: &str) {
        self.observer.on_log(line);
    }

    fn checkpoint(&self) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        Ok(())
    }

    fn progress(&self, item: &str, sent: u64, total: u64) {
        self.observer.on_progress(&TransferProgress {
            item_name: item.to_string(),
            total_bytes: total,
            sent_bytes: sent,
        });
    }

    fn complete_item(&mut self, item: &str, bytes: u64) {
        self.items += 1;
        self.bytes = self.bytes.saturating_add(bytes);
        debug!(item, bytes, "item transferred");
    }

    fn skip(&self, item: &str) {
        warn!(item, "skipping entry that is not a regular file or directory");
        self.log(&format!("Skipping {item}: not a regular file"));
    }

    fn log_tree_size(&self, entries: &[TreeEntry]) {
        let (files, bytes) = entries
            .iter()
            .filter(|entry| entry.kind == EntryKind::File)
            .fold((0usize, 0u64), |(files, bytes), entry| {
                (files + 1, bytes + entry.size)
            });
        self.log(&format!("Found {files} file(s), {bytes} bytes"));
    }

    fn resolve_remote(
        &self,
        session: &mut dyn RemoteSession,
        raw: &str,
    ) -> Result<String, TransferError> {
        if !needs_remote_home(raw) {
            return Ok(raw.to_string());
        }
        let home = session.home_dir()?;
        let resolved = expand_remote_home(raw, &home);
        debug!(raw, resolved = %resolved, "expanded remote home");
        Ok(resolved)
    }

    fn upload(
        &mut self,
        session: &mut dyn RemoteSession,
        request: &TransferRequest,
    ) -> Result<(), Halt> {
        let local = expand_tilde(request.local_path.trim());
        let meta = fs::metadata(&local)
            .map_err(|err| TransferError::io(format!("local path {}", local.display()), err))?;
        match (request.content, meta.is_dir()) {
            (ContentKind::File, true) => {
                return Err(TransferError::TransferIo(format!(
                    "{} is a directory, not a single file",
                    local.display()
                ))
                .into());
            }
            (ContentKind::Directory, false) => {
                return Err(TransferError::TransferIo(format!(
                    "{} is not a directory",
                    local.display()
                ))
                .into());
            }
            _ => {}
        }
        let name = local_base_name(&local)
            .or_else(|| {
                fs::canonicalize(&local)
                    .ok()
                    .and_then(|path| local_base_name(&path))
            })
            .ok_or_else(|| {
                TransferError::TransferIo(format!("cannot name the source {}", local.display()))
            })?;

        let target = self.resolve_remote(session, request.remote_path.trim())?;
        let target_is_dir = session.stat(&target)?.is_some_and(|stat| stat.is_dir);
        let dest = remote_destination(&target, &name, target_is_dir);
        self.log(&format!("Uploading {} -> {}", local.display(), dest));

        if !request.content.is_recursive() {
            return self.upload_file(session, &local, &dest, &name, &meta);
        }

        session.create_dir(&dest)?;
        let entries = walk_local(&local)?;
        self.log_tree_size(&entries);
        for entry in entries {
            self.checkpoint()?;
            let remote = join_remote(&dest, &entry.relative);
            let item = format!("{name}/{}", entry.relative);
            match entry.kind {
                EntryKind::Directory => session.create_dir(&remote)?,
                EntryKind::File => {
                    let path = join_relative(&local, &entry.relative);
                    let meta = fs::metadata(&path).map_err(|err| {
                        TransferError::io(format!("stat {}", path.display()), err)
                    })?;
                    self.upload_file(session, &path, &remote, &item, &meta)?;
                }
                EntryKind::Other => self.skip(&item),
            }
        }
        Ok(())
    }

    fn upload_file(
        &mut self,
        session: &mut dyn RemoteSession,
        local: &Path,
        remote: &str,
        item: &str,
        meta: &fs::Metadata,
    ) -> Result<(), Halt> {
        let total = meta.len();
        let mut source = File::open(local).map_err(|err| {
            TransferError::io(format!("open local file {}", local.display()), err)
        })?;
        let mut sink = session.send_file(remote, total, file_mode(meta))?;
        self.copy(
            &mut source,
            &mut *sink,
            item,
            total,
            ("read local file", "write remote file"),
        )?;
        sink.finish()
            .map_err(|err| TransferError::io(format!("finish upload of {item}"), err))?;
        self.complete_item(item, total);
        Ok(())
    }

    fn download(
        &mut self,
        session: &mut dyn RemoteSession,
        request: &TransferRequest,
    ) -> Result<(), Halt> {
        let source = self.resolve_remote(session, request.remote_path.trim())?;
        let stat = session.stat(&source)?.ok_or_else(|| {
            TransferError::TransferIo(format!("remote path {source} does not exist"))
        })?;
        match (request.content, stat.is_dir) {
            (ContentKind::File, true) => {
                return Err(TransferError::TransferIo(format!(
                    "remote path {source} is a directory, not a single file"
                ))
                .into());
            }
            (ContentKind::Directory, false) => {
                return Err(TransferError::TransferIo(format!(
                    "remote path {source} is not a directory"
                ))
                .into());
            }
            _ => {}
        }
        let name = remote_base_name(&source).ok_or_else(|| {
            TransferError::TransferIo(format!("cannot name the remote source {source}"))
        })?;
        let dest = local_destination(request.local_path.trim(), &name);
        self.log(&format!("Downloading {source} -> {}", dest.display()));

        if !request.content.is_recursive() {
            return self.download_file(session, &source, &dest, &name);
        }

        fs::create_dir_all(&dest)
            .map_err(|err| TransferError::io(format!("create local dir {}", dest.display()), err))?;
        let entries = session.list_tree(&source)?;
        self.log_tree_size(&entries);
        for entry in entries {
            self.checkpoint()?;
            let local = join_relative(&dest, &entry.relative);
            let item = format!("{name}/{}", entry.relative);
            match entry.kind {
                EntryKind::Directory => fs::create_dir_all(&local).map_err(|err| {
                    TransferError::io(format!("create local dir {}", local.display()), err)
                })?,
                EntryKind::File => {
                    let remote = join_remote(&source, &entry.relative);
                    self.download_file(session, &remote, &local, &item)?;
                }
                EntryKind::Other => self.skip(&item),
            }
        }
        Ok(())
    }

    fn download_file(
        &mut self,
        session: &mut dyn RemoteSession,
        remote: &str,
        local: &Path,
        item: &str,
    ) -> Result<(), Halt> {
        let (mut source, total) = session.recv_file(remote)?;
        let mut file = File::create(local).map_err(|err| {
            TransferError::io(format!("create local file {}", local.display()), err)
        })?;
        self.copy(
            &mut *source,
            &mut file,
            item,
            total,
            ("read remote file", "write local file"),
        )?;
        source
            .finish()
            .map_err(|err| TransferError::io(format!("finish download of {item}"), err))?;
        self.complete_item(item, total);
        Ok(())
    }

    /// Moves exactly `total` bytes, reporting after every chunk. Cancellation
    /// is checked before each chunk is read, so once the last chunk is written
    /// the item always runs to completion.
    fn copy<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        item: &str,
        total: u64,
        (reading, writing): (&str, &str),
    ) -> Result<(), Halt>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let mut buffer = vec![0u8; self.chunk_size];
        let mut sent = 0u64;
        self.progress(item, sent, total);
        while sent < total {
            self.checkpoint()?;
            let want = cmp::min(buffer.len() as u64, total - sent) as usize;
            let read = match reader.read(&mut buffer[..want]) {
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransferError::io(format!("{reading} {item}"), err).into()),
            };
            if read == 0 {
                return Err(TransferError::TransferIo(format!(
                    "{item}: source ended after {sent} of {total} bytes"
                ))
                .into());
            }
            writer
                .write_all(&buffer[..read])
                .map_err(|err| TransferError::io(format!("{writing} {item}"), err))?;
            sent += read as u64;
            self.progress(item, sent, total);
        }
        writer
            .flush()
            .map_err(|err| TransferError::io(format!("{writing} {item}"), err))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::Mutex;

    use crate::error::ErrorKind;
    use crate::transfer::fake::FakeConnector;

    #[derive(Default)]
    struct RecordingObserver {
        states: Mutex<Vec<OrchestratorState>>,
        progress: Mutex<Vec<TransferProgress>>,
        logs: Mutex<Vec<String>>,
        cancel_after_items: Option<(CancelToken, usize)>,
        cancel_at_bytes: Option<(CancelToken, u64)>,
        hold_transfer: Option<(Mutex<Sender<()>>, Mutex<Receiver<()>>)>,
    }

    impl RecordingObserver {
        fn states(&self) -> Vec<OrchestratorState> {
            self.states.lock().unwrap().clone()
        }

        fn progress(&self) -> Vec<TransferProgress> {
            self.progress.lock().unwrap().clone()
        }

        fn logs(&self) -> Vec<String> {
            self.logs.lock().unwrap().clone()
        }

        fn item_names(&self) -> Vec<String> {
            let mut names: Vec<String> = self
                .progress()
                .into_iter()
                .filter(|p| p.is_complete())
                .map(|p| p.item_name)
                .collect();
            names.dedup();
            names
        }
    }

    impl TransferObserver for RecordingObserver {
        fn on_log(&self, line: &str) {
            self.logs.lock().unwrap().push(line.to_string());
        }

        fn on_progress(&self, progress: &TransferProgress) {
            let mut seen = self.progress.lock().unwrap();
            seen.push(progress.clone());
            if let Some((token, at)) = &self.cancel_at_bytes {
                if progress.sent_bytes >= *at {
                    token.cancel();
                }
            }
            if let Some((token, after)) = &self.cancel_after_items {
                let completed = seen
                    .iter()
                    .filter(|p| p.is_complete())
                    .map(|p| p.item_name.as_str())
                    .collect::<std::collections::BTreeSet<_>>()
                    .len();
                if completed >= *after {
                    token.cancel();
                }
            }
        }

        fn on_status_change(&self, state: OrchestratorState) {
            self.states.lock().unwrap().push(state);
            if state == OrchestratorState::Transferring {
                if let Some((started, release)) = &self.hold_transfer {
                    started.lock().unwrap().send(()).unwrap();
                    release.lock().unwrap().recv().unwrap();
                }
            }
        }
    }

    fn orchestrator(remote: &FakeConnector) -> TransferOrchestrator {
        TransferOrchestrator::new(
            Arc::new(remote.clone()),
            HostKeyPolicy::StrictKnownHosts {
                known_hosts: remote.root().join("known_hosts"),
            },
        )
    }

    fn params(password: &str) -> ConnectionParams {
        ConnectionParams::with_password("10.0.0.5", "bob", password)
    }

    fn request(
        direction: TransferDirection,
        content: ContentKind,
        local: &Path,
        remote: &str,
    ) -> TransferRequest {
        TransferRequest {
            direction,
            content,
            local_path: local.to_string_lossy().into_owned(),
            remote_path: remote.to_string(),
        }
    }

    fn seed_logs(remote: &FakeConnector) {
        let logs = remote.home().join("logs");
        fs::create_dir_all(&logs).unwrap();
        fs::write(logs.join("a.log"), vec![b'a'; 300]).unwrap();
        fs::write(logs.join("b.log"), vec![b'b'; 300]).unwrap();
        fs::write(logs.join("c.log"), vec![b'c'; 300]).unwrap();
    }

    const FULL_RUN: [OrchestratorState; 5] = [
        OrchestratorState::Connecting,
        OrchestratorState::Authenticating,
        OrchestratorState::Transferring,
        OrchestratorState::Closing,
        OrchestratorState::Completed,
    ];

    #[test]
    fn uploads_single_file_into_remote_home() {
        let remote = FakeConnector::new("upload-file");
        let local = remote.scratch().join("a.txt");
        fs::write(&local, b"hello").unwrap();
        let observer = RecordingObserver::default();

        let summary = orchestrator(&remote)
            .execute(
                &params("x"),
                &request(TransferDirection::Upload, ContentKind::File, &local, "~/a.txt"),
                &observer,
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(summary.item_count, 1);
        assert_eq!(summary.total_bytes, 5);
        assert_eq!(fs::read(remote.home().join("a.txt")).unwrap(), b"hello");
        assert_eq!(observer.states(), FULL_RUN);
        assert_eq!(observer.item_names(), vec!["a.txt".to_string()]);
        assert_eq!(remote.calls(), vec!["connect", "authenticate", "close"]);
    }

    #[test]
    fn downloads_remote_directory_tree() {
        let remote = FakeConnector::new("download-dir");
        seed_logs(&remote);
        let out = remote.scratch().join("out");
        fs::create_dir_all(&out).unwrap();
        let observer = RecordingObserver::default();

        let summary = orchestrator(&remote)
            .execute(
                &params("x"),
                &request(TransferDirection::Download, ContentKind::Directory, &out, "~/logs"),
                &observer,
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(summary.item_count, 3);
        assert_eq!(summary.total_bytes, 900);
        assert_eq!(
            observer.item_names(),
            vec!["logs/a.log", "logs/b.log", "logs/c.log"]
        );
        assert_eq!(fs::read(out.join("logs").join("b.log")).unwrap(), vec![b'b'; 300]);
        assert_eq!(observer.states(), FULL_RUN);
        assert!(observer.logs().contains(&"Found 3 file(s), 900 bytes".to_string()));
    }

    #[test]
    fn wrong_password_never_transfers() {
        let remote = FakeConnector::new("bad-password");
        let local = remote.scratch().join("a.txt");
        fs::write(&local, b"hello").unwrap();
        let observer = RecordingObserver::default();

        let err = orchestrator(&remote)
            .execute(
                &params("wrong"),
                &request(TransferDirection::Upload, ContentKind::File, &local, "~/"),
                &observer,
                &CancelToken::new(),
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        assert_eq!(
            observer.states(),
            vec![
                OrchestratorState::Connecting,
                OrchestratorState::Authenticating,
                OrchestratorState::Closing,
                OrchestratorState::Failed,
            ]
        );
        assert_eq!(remote.calls(), vec!["connect", "authenticate", "close"]);
        assert!(!remote.home().join("a.txt").exists());
    }

    #[test]
    fn second_execute_while_transferring_is_busy() {
        let remote = FakeConnector::new("busy");
        let local = remote.scratch().join("a.txt");
        fs::write(&local, b"hello").unwrap();
        let orchestrator = Arc::new(orchestrator(&remote));
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let observer = Arc::new(RecordingObserver {
            hold_transfer: Some((Mutex::new(started_tx), Mutex::new(release_rx))),
            ..RecordingObserver::default()
        });
        let req = request(TransferDirection::Upload, ContentKind::File, &local, "~/a.txt");

        let worker = {
            let orchestrator = Arc::clone(&orchestrator);
            let observer = Arc::clone(&observer);
            let req = req.clone();
            std::thread::spawn(move || {
                orchestrator.execute(&params("x"), &req, observer.as_ref(), &CancelToken::new())
            })
        };
        started_rx.recv().unwrap();
        assert!(orchestrator.is_busy());

        let second = RecordingObserver::default();
        let err = orchestrator
            .execute(&params("x"), &req, &second, &CancelToken::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert!(second.states().is_empty());

        release_tx.send(()).unwrap();
        let summary = worker.join().unwrap().unwrap();
        assert_eq!(summary.item_count, 1);
        assert!(!orchestrator.is_busy());
        assert_eq!(remote.calls(), vec!["connect", "authenticate", "close"]);
    }

    #[test]
    fn cancel_after_first_item_keeps_completed_artifact() {
        let remote = FakeConnector::new("cancel");
        seed_logs(&remote);
        let out = remote.scratch().join("out");
        fs::create_dir_all(&out).unwrap();
        let cancel = CancelToken::new();
        let observer = RecordingObserver {
            cancel_after_items: Some((cancel.clone(), 1)),
            ..RecordingObserver::default()
        };

        let err = orchestrator(&remote)
            .with_chunk_size(64)
            .execute(
                &params("x"),
                &request(TransferDirection::Download, ContentKind::Directory, &out, "~/logs"),
                &observer,
                &cancel,
            )
            .unwrap_err();

        let TransferError::Cancelled { completed } = &err else {
            panic!("expected cancellation, got {err:?}");
        };
        assert_eq!(completed.item_count, 1);
        assert_eq!(completed.total_bytes, 300);
        assert_eq!(fs::read(out.join("logs").join("a.log")).unwrap(), vec![b'a'; 300]);
        assert!(!out.join("logs").join("b.log").exists());
        assert!(!out.join("logs").join("c.log").exists());
        assert_eq!(
            observer.states().last(),
            Some(&OrchestratorState::Cancelled)
        );
        assert!(observer.states().contains(&OrchestratorState::Closing));
        assert_eq!(remote.calls().last().map(String::as_str), Some("close"));
    }

    #[test]
    fn cancel_mid_item_counts_only_finished_items() {
        let remote = FakeConnector::new("cancel-mid");
        seed_logs(&remote);
        let out = remote.scratch().join("out");
        fs::create_dir_all(&out).unwrap();
        let cancel = CancelToken::new();
        let observer = RecordingObserver {
            cancel_at_bytes: Some((cancel.clone(), 200)),
            ..RecordingObserver::default()
        };

        let err = orchestrator(&remote)
            .with_chunk_size(100)
            .execute(
                &params("x"),
                &request(TransferDirection::Download, ContentKind::Directory, &out, "~/logs"),
                &observer,
                &cancel,
            )
            .unwrap_err();

        let TransferError::Cancelled { completed } = &err else {
            panic!("expected cancellation, got {err:?}");
        };
        assert_eq!(completed.item_count, 0);
        assert_eq!(completed.total_bytes, 0);
        let partial = fs::read(out.join("logs").join("a.log")).unwrap();
        assert_eq!(partial.len(), 200);
        assert!(!out.join("logs").join("b.log").exists());
        let last = observer.progress().last().cloned().unwrap();
        assert_eq!((last.sent_bytes, last.total_bytes), (200, 300));
        assert!(observer.item_names().is_empty());
    }

    #[test]
    fn cancel_on_last_chunk_still_completes_the_item() {
        let remote = FakeConnector::new("cancel-last-chunk");
        seed_logs(&remote);
        let out = remote.scratch().join("out");
        fs::create_dir_all(&out).unwrap();
        let cancel = CancelToken::new();
        let observer = RecordingObserver {
            cancel_at_bytes: Some((cancel.clone(), 300)),
            ..RecordingObserver::default()
        };

        let err = orchestrator(&remote)
            .with_chunk_size(100)
            .execute(
                &params("x"),
                &request(TransferDirection::Download, ContentKind::Directory, &out, "~/logs"),
                &observer,
                &cancel,
            )
            .unwrap_err();

        let TransferError::Cancelled { completed } = &err else {
            panic!("expected cancellation, got {err:?}");
        };
        assert_eq!(completed.item_count, 1);
        assert_eq!(completed.total_bytes, 300);
        assert_eq!(fs::read(out.join("logs").join("a.log")).unwrap(), vec![b'a'; 300]);
        assert!(!out.join("logs").join("b.log").exists());
    }

    #[test]
    fn cancelled_before_start_never_connects() {
        let remote = FakeConnector::new("cancel-early");
        let local = remote.scratch().join("a.txt");
        fs::write(&local, b"hello").unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let observer = RecordingObserver::default();

        let err = orchestrator(&remote)
            .execute(
                &params("x"),
                &request(TransferDirection::Upload, ContentKind::File, &local, "~/"),
                &observer,
                &cancel,
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(remote.calls().is_empty());
        assert_eq!(
            observer.states(),
            vec![OrchestratorState::Closing, OrchestratorState::Cancelled]
        );
    }

    #[test]
    fn connect_failure_still_closes_out() {
        let remote = FakeConnector::new("refused").refusing_connections();
        let local = remote.scratch().join("a.txt");
        fs::write(&local, b"hello").unwrap();
        let observer = RecordingObserver::default();

        let err = orchestrator(&remote)
            .execute(
                &params("x"),
                &request(TransferDirection::Upload, ContentKind::File, &local, "~/"),
                &observer,
                &CancelToken::new(),
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
        assert_eq!(
            observer.states(),
            vec![
                OrchestratorState::Connecting,
                OrchestratorState::Closing,
                OrchestratorState::Failed,
            ]
        );
        assert_eq!(remote.calls(), vec!["connect"]);
    }

    #[test]
    fn close_failure_is_only_a_warning() {
        let remote = FakeConnector::new("close-fails").failing_close();
        let local = remote.scratch().join("a.txt");
        fs::write(&local, b"hello").unwrap();
        let observer = RecordingObserver::default();

        let summary = orchestrator(&remote)
            .execute(
                &params("x"),
                &request(TransferDirection::Upload, ContentKind::File, &local, "~/"),
                &observer,
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(summary.item_count, 1);
        assert!(observer.logs().iter().any(|line| line.starts_with("Warning")));
        assert_eq!(observer.states().last(), Some(&OrchestratorState::Completed));
    }

    #[test]
    fn close_failure_does_not_replace_primary_error() {
        let remote = FakeConnector::new("close-fails-auth").failing_close();
        let local = remote.scratch().join("a.txt");
        fs::write(&local, b"hello").unwrap();

        let err = orchestrator(&remote)
            .execute(
                &params("wrong"),
                &request(TransferDirection::Upload, ContentKind::File, &local, "~/"),
                &RecordingObserver::default(),
                &CancelToken::new(),
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    }

    #[test]
    fn invalid_input_fails_before_network() {
        let remote = FakeConnector::new("invalid");
        let observer = RecordingObserver::default();
        let err = orchestrator(&remote)
            .execute(
                &ConnectionParams::with_password(" ", "bob", "x"),
                &request(
                    TransferDirection::Upload,
                    ContentKind::File,
                    Path::new("/tmp/a.txt"),
                    "~/",
                ),
                &observer,
                &CancelToken::new(),
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(remote.calls().is_empty());
        assert_eq!(observer.states(), vec![OrchestratorState::Failed]);
    }

    #[test]
    fn repeated_upload_overwrites_destination() {
        let remote = FakeConnector::new("repeat");
        let local = remote.scratch().join("a.txt");
        fs::write(&local, b"first").unwrap();
        let orchestrator = orchestrator(&remote);
        let req = request(TransferDirection::Upload, ContentKind::File, &local, "~/a.txt");

        for _ in 0..2 {
            orchestrator
                .execute(&params("x"), &req, &RecordingObserver::default(), &CancelToken::new())
                .unwrap();
        }
        assert_eq!(fs::read(remote.home().join("a.txt")).unwrap(), b"first");
    }

    #[test]
    fn upload_then_download_round_trips_bytes() {
        let remote = FakeConnector::new("round-trip");
        let original: Vec<u8> = (0..=255u8).cycle().take(1337).collect();
        let local = remote.scratch().join("blob.bin");
        fs::write(&local, &original).unwrap();
        let orchestrator = orchestrator(&remote).with_chunk_size(100);
        let observer = RecordingObserver::default();

        orchestrator
            .execute(
                &params("x"),
                &request(TransferDirection::Upload, ContentKind::File, &local, "~/"),
                &observer,
                &CancelToken::new(),
            )
            .unwrap();
        let back = remote.scratch().join("back.bin");
        orchestrator
            .execute(
                &params("x"),
                &request(TransferDirection::Download, ContentKind::File, &back, "~/blob.bin"),
                &observer,
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(fs::read(&back).unwrap(), original);
        let mut last_sent: BTreeMap<(usize, String), u64> = BTreeMap::new();
        let mut run = 0usize;
        for progress in observer.progress() {
            if progress.sent_bytes == 0 {
                run += 1;
            }
            let key = (run, progress.item_name.clone());
            let previous = last_sent.insert(key, progress.sent_bytes).unwrap_or(0);
            assert!(progress.sent_bytes >= previous);
            assert!(progress.sent_bytes <= progress.total_bytes);
        }
        assert!(last_sent.values().all(|sent| *sent == 1337));
    }

    #[test]
    fn directory_upload_reports_every_file_once() {
        let remote = FakeConnector::new("upload-dir");
        let site = remote.scratch().join("site");
        fs::create_dir_all(site.join("css")).unwrap();
        fs::create_dir_all(site.join("empty")).unwrap();
        fs::write(site.join("index.html"), b"<html>").unwrap();
        fs::write(site.join("css").join("main.css"), b"body{}").unwrap();
        fs::write(site.join("blank.txt"), b"").unwrap();
        let observer = RecordingObserver::default();

        let summary = orchestrator(&remote)
            .execute(
                &params("x"),
                &request(TransferDirection::Upload, ContentKind::Directory, &site, "~"),
                &observer,
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(summary.item_count, 3);
        assert_eq!(summary.total_bytes, 12);
        assert_eq!(
            observer.item_names(),
            vec!["site/blank.txt", "site/css/main.css", "site/index.html"]
        );
        let uploaded = remote.home().join("site");
        assert!(uploaded.join("empty").is_dir());
        assert_eq!(fs::read(uploaded.join("css").join("main.css")).unwrap(), b"body{}");
        let blank = observer
            .progress()
            .into_iter()
            .find(|p| p.item_name == "site/blank.txt")
            .unwrap();
        assert_eq!(blank.percent(), None);
        assert!(observer.logs().contains(&"Found 3 file(s), 12 bytes".to_string()));
    }

    #[test]
    fn file_request_for_directory_is_io_error() {
        let remote = FakeConnector::new("kind-mismatch");
        let dir = remote.scratch().join("folder");
        fs::create_dir_all(&dir).unwrap();
        let observer = RecordingObserver::default();

        let err = orchestrator(&remote)
            .execute(
                &params("x"),
                &request(TransferDirection::Upload, ContentKind::File, &dir, "~/"),
                &observer,
                &CancelToken::new(),
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TransferIo);
        assert!(observer.states().contains(&OrchestratorState::Closing));
    }

    #[test]
    fn missing_remote_source_is_io_error() {
        let remote = FakeConnector::new("missing-remote");
        let out = remote.scratch().join("out.txt");
        let err = orchestrator(&remote)
            .execute(
                &params("x"),
                &request(TransferDirection::Download, ContentKind::File, &out, "~/nope.txt"),
                &RecordingObserver::default(),
                &CancelToken::new(),
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TransferIo);
        assert!(err.detail().contains("does not exist"));
        assert!(!out.exists());
    }
}

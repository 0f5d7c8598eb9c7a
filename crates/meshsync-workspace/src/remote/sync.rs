//! Binding a workspace to a remote store.

use super::pending::PendingRequests;
use super::stream::{RemoteEvent, RemoteStream};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{BoxStream, Connector, TransportError};
use crate::workspace::Workspace;
use futures::StreamExt;
use meshsync_state::{apply_patch, diff, Reference, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Lifecycle of a [`RemoteSync`] binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// Opening a connection or waiting for the initial full state.
    Connecting,
    /// In sync; local edits are sent as they happen.
    Live,
    /// A commit failed, timed out or raced a remote edit; waiting for the
    /// full state.
    Reconciling,
    /// The transport was lost; a reconnect is scheduled.
    Disconnected,
    /// Reconnect attempts are exhausted.
    Failed,
    /// The binding was disposed.
    Closed,
}

/// A running two-way binding between a workspace and a remote reference.
///
/// The remote is authoritative: a full-state notification overwrites the
/// local value. Local edits are diffed against the last state known to be
/// on the remote and sent as patch change requests; values that arrived
/// from the remote are never sent back.
///
/// Reconciliation: a rejected or timed-out request, or a remote change that
/// conflicts with an unacknowledged local edit, makes the binding
/// re-subscribe. The remote answers with the full state, so local state is
/// never left diverged.
///
/// The binding stops when disposed, when its handle is dropped, or when the
/// workspace is disposed.
pub struct RemoteSync {
    reference: Reference,
    max_attempts: u32,
    cancel: CancellationToken,
    status: watch::Receiver<SyncStatus>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteSync {
    /// Start syncing `workspace` with `reference` on the remote.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(
        workspace: Workspace,
        reference: Reference,
        connector: Arc<dyn Connector>,
        config: SyncConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(SyncStatus::Connecting);
        let dirty = Arc::new(Notify::new());

        let local = {
            let dirty = dirty.clone();
            workspace.subscribe(move |_| dirty.notify_one())
        };
        workspace.attach(cancel.clone().drop_guard());
        let max_attempts = config.max_reconnect_attempts;

        let driver = Driver {
            workspace,
            reference: reference.clone(),
            connector,
            config,
            cancel: cancel.clone(),
            status: status_tx,
            dirty,
            synced: None,
            pending: PendingRequests::default(),
            flush_at: None,
            full_deadline: None,
        };
        let task = tokio::spawn(async move {
            let _local = local;
            driver.run().await;
        });

        Self {
            reference,
            max_attempts,
            cancel,
            status: status_rx,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Watch the binding status.
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    pub fn current_status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Wait until the binding reaches `wanted`. Returns `false` if the
    /// binding stopped first.
    pub async fn wait_for(&self, wanted: SyncStatus) -> bool {
        let mut status = self.status.clone();
        let ok = status.wait_for(|s| *s == wanted).await.is_ok();
        ok
    }

    /// Wait for the first full state.
    ///
    /// Fails when the binding gives up reconnecting or is closed first.
    pub async fn ready(&self) -> SyncResult<()> {
        let mut status = self.status.clone();
        let reached = status
            .wait_for(|s| {
                matches!(
                    s,
                    SyncStatus::Live | SyncStatus::Failed | SyncStatus::Closed
                )
            })
            .await
            .map(|s| *s);
        match reached {
            Ok(SyncStatus::Live) => Ok(()),
            Ok(SyncStatus::Failed) => Err(SyncError::Unreachable {
                attempts: self.max_attempts.saturating_add(1),
            }),
            _ => Err(SyncError::Closed),
        }
    }

    /// Stop the binding. Idempotent.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    /// Stop the binding and wait for it to unsubscribe.
    pub async fn shutdown(&self) {
        self.dispose();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "remote sync task failed");
            }
        }
    }
}

impl Drop for RemoteSync {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum SessionEnd {
    Cancelled,
    Lost { reached_live: bool },
}

struct Driver {
    workspace: Workspace,
    reference: Reference,
    connector: Arc<dyn Connector>,
    config: SyncConfig,
    cancel: CancellationToken,
    status: watch::Sender<SyncStatus>,
    dirty: Arc<Notify>,
    /// The remote's value as last known, including local edits already sent.
    /// `None` until a full state arrives.
    synced: Option<Value>,
    pending: PendingRequests,
    flush_at: Option<Instant>,
    full_deadline: Option<Instant>,
}

impl Driver {
    async fn run(mut self) {
        let mut failures: u32 = 0;
        loop {
            self.set_status(SyncStatus::Connecting);

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => None,
                connected = self.connect() => Some(connected),
            };
            let end = match connected {
                None => SessionEnd::Cancelled,
                Some(Ok((remote, events))) => {
                    let end = self.session(&remote, events).await;
                    if matches!(end, SessionEnd::Cancelled) {
                        remote.close().await;
                    }
                    end
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, reference = %self.reference, "connect failed");
                    SessionEnd::Lost {
                        reached_live: false,
                    }
                }
            };

            match end {
                SessionEnd::Cancelled => {
                    self.set_status(SyncStatus::Closed);
                    return;
                }
                SessionEnd::Lost { reached_live } => {
                    if reached_live {
                        failures = 0;
                    }
                    failures += 1;
                    if failures > self.config.max_reconnect_attempts {
                        tracing::error!(
                            reference = %self.reference,
                            attempts = failures,
                            "remote unreachable, giving up"
                        );
                        self.set_status(SyncStatus::Failed);
                        return;
                    }
                    self.set_status(SyncStatus::Disconnected);
                    let backoff = self.config.reconnect_backoff(failures);
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            self.set_status(SyncStatus::Closed);
                            return;
                        }
                        _ = sleep(backoff) => {}
                    }
                }
            }
        }
    }

    async fn connect(&self) -> Result<(RemoteStream, BoxStream<RemoteEvent>), TransportError> {
        let endpoint = self.connector.connect().await?;
        let remote = RemoteStream::new(endpoint, self.reference.clone());
        let events = remote.open().await?;
        Ok((remote, events))
    }

    async fn session(
        &mut self,
        remote: &RemoteStream,
        mut events: BoxStream<RemoteEvent>,
    ) -> SessionEnd {
        self.synced = None;
        self.pending.clear();
        self.flush_at = None;
        self.full_deadline = Some(Instant::now() + self.config.request_timeout());

        let cancel = self.cancel.clone();
        let dirty = self.dirty.clone();
        let mut reached_live = false;

        loop {
            let wakeup = self.next_wakeup();
            let step = tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                event = events.next() => match event {
                    Some(Ok(event)) => self.on_event(remote, event).await,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, reference = %self.reference, "remote transport failed");
                        return SessionEnd::Lost { reached_live };
                    }
                    None => {
                        tracing::warn!(reference = %self.reference, "remote stream ended");
                        return SessionEnd::Lost { reached_live };
                    }
                },
                _ = dirty.notified() => self.on_local_change(remote).await,
                _ = sleep_until_opt(wakeup) => self.on_wakeup(remote).await,
            };

            if let Err(e) = step {
                tracing::warn!(error = %e, reference = %self.reference, "send to remote failed");
                return SessionEnd::Lost { reached_live };
            }
            if *self.status.borrow() == SyncStatus::Live {
                reached_live = true;
            }
        }
    }

    async fn on_event(
        &mut self,
        remote: &RemoteStream,
        event: RemoteEvent,
    ) -> Result<(), TransportError> {
        match event {
            RemoteEvent::Patch { patch, full: true } => {
                let snapshot = apply_patch(&Value::Null, &patch);
                self.workspace.update(snapshot.clone());
                self.synced = Some(snapshot);
                self.flush_at = None;
                self.full_deadline = None;
                tracing::debug!(reference = %self.reference, "full state applied");
                self.set_status(SyncStatus::Live);
            }
            RemoteEvent::Patch { patch, full: false } => {
                let Some(synced) = self.synced.as_ref() else {
                    tracing::debug!(reference = %self.reference, "ignoring patch before full state");
                    return Ok(());
                };
                let next = apply_patch(synced, &patch);
                if &next == synced {
                    // A hub that broadcasts to the origin echoes our own commit.
                    tracing::trace!(reference = %self.reference, "ignoring remote patch with no effect");
                    return Ok(());
                }
                let conflicts = self.pending.conflicts_with(&patch);
                if !conflicts.is_empty() {
                    tracing::warn!(
                        reference = %self.reference,
                        conflicts = conflicts.len(),
                        "remote change races an unacknowledged local edit"
                    );
                    return self.reconcile(remote).await;
                }
                self.synced = Some(next);
                self.workspace.apply_patch(&patch);
            }
            RemoteEvent::Committed { id } => {
                if self.pending.resolve(&id).is_some() {
                    tracing::trace!(%id, "patch committed");
                }
            }
            RemoteEvent::Failed { id, message } => {
                if self.pending.resolve(&id).is_some() {
                    tracing::warn!(%id, %message, reference = %self.reference, "remote rejected patch");
                    return self.reconcile(remote).await;
                }
            }
        }
        Ok(())
    }

    async fn on_local_change(&mut self, remote: &RemoteStream) -> Result<(), TransportError> {
        if self.synced.is_none() {
            return Ok(());
        }
        let window = self.config.outgoing_debounce();
        if window.is_zero() {
            return self.flush(remote).await;
        }
        self.flush_at = Some(Instant::now() + window);
        Ok(())
    }

    async fn on_wakeup(&mut self, remote: &RemoteStream) -> Result<(), TransportError> {
        let now = Instant::now();
        if self.flush_at.is_some_and(|at| at <= now) {
            self.flush(remote).await?;
        }

        let expired = self.pending.take_expired(now);
        if !expired.is_empty() {
            tracing::warn!(
                reference = %self.reference,
                count = expired.len(),
                "patch request timed out"
            );
            return self.reconcile(remote).await;
        }

        if self.full_deadline.is_some_and(|at| at <= now) {
            tracing::warn!(reference = %self.reference, "full state not received in time");
            return self.reconcile(remote).await;
        }
        Ok(())
    }

    /// Send local edits not yet on the remote.
    async fn flush(&mut self, remote: &RemoteStream) -> Result<(), TransportError> {
        self.flush_at = None;
        let Some(synced) = self.synced.as_ref() else {
            return Ok(());
        };
        let current = self.workspace.current();
        if &current == synced {
            return Ok(());
        }

        let patch = diff(synced, &current);
        let ops = patch.len();
        let id = remote.push(patch.clone()).await?;
        tracing::debug!(%id, ops, reference = %self.reference, "patch sent");
        self.pending
            .insert(id, patch, Instant::now() + self.config.request_timeout());
        self.synced = Some(current);
        Ok(())
    }

    async fn reconcile(&mut self, remote: &RemoteStream) -> Result<(), TransportError> {
        if *self.status.borrow() != SyncStatus::Connecting {
            self.set_status(SyncStatus::Reconciling);
        }
        self.synced = None;
        self.pending.clear();
        self.flush_at = None;
        self.full_deadline = Some(Instant::now() + self.config.request_timeout());
        remote.resubscribe().await
    }

    fn next_wakeup(&self) -> Option<Instant> {
        [self.flush_at, self.pending.next_deadline(), self.full_deadline]
            .into_iter()
            .flatten()
            .min()
    }

    fn set_status(&self, next: SyncStatus) {
        let changed = self.status.send_if_modified(|status| {
            if *status == next {
                false
            } else {
                *status = next;
                true
            }
        });
        if changed {
            tracing::debug!(reference = %self.reference, status = ?next, "sync status changed");
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

//! In-process authoritative store speaking the sync protocol.
//!
//! [`LoopbackHost`] owns a workspace and serves any number of peers over
//! channel endpoints. It is the remote used by tests and the demo binary.

use crate::protocol::{ClientMessage, RemoteMessage, RequestId};
use crate::subscription::Subscription;
use crate::transport::{ChannelEndpoint, ClientEndpoint, Connector, TransportError};
use crate::workspace::Workspace;
use async_trait::async_trait;
use meshsync_state::{apply_patch, diff, resolve, try_apply_patch, Patch, Reference, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Authoritative store for a set of peers.
///
/// Per peer and reference the host remembers the value the peer is known to
/// hold. A commit updates that value for its origin, so a peer never gets its
/// own change back while every other subscriber receives it as a patch.
#[derive(Clone)]
pub struct LoopbackHost {
    inner: Arc<HostInner>,
}

struct HostInner {
    workspace: Workspace,
    reject_commits: AtomicBool,
    stall_responses: AtomicBool,
    next_peer: AtomicU64,
    peers: Mutex<HashMap<u64, CancellationToken>>,
}

struct PeerSubscription {
    known: Arc<Mutex<Option<Value>>>,
    _subscription: Subscription,
}

impl LoopbackHost {
    pub fn new(initial: Value) -> Self {
        Self {
            inner: Arc::new(HostInner {
                workspace: Workspace::new("loopback", initial),
                reject_commits: AtomicBool::new(false),
                stall_responses: AtomicBool::new(false),
                next_peer: AtomicU64::new(1),
                peers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The authoritative workspace. Edits made here reach every subscriber.
    pub fn workspace(&self) -> &Workspace {
        &self.inner.workspace
    }

    /// Open a new peer connection.
    ///
    /// Must be called within a tokio runtime.
    pub fn connect_endpoint(&self) -> ClientEndpoint {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<RemoteMessage>();

        let peer = self.inner.next_peer.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.inner.peers().insert(peer, cancel.clone());
        tracing::debug!(peer, "peer connected");

        let inner = self.inner.clone();
        tokio::spawn(inner.serve(peer, requests_rx, outbound_tx, cancel));

        Arc::new(ChannelEndpoint::new(outbound_rx, requests_tx))
    }

    /// Answer every patch change request with `Failed`.
    pub fn set_reject_commits(&self, reject: bool) {
        self.inner.reject_commits.store(reject, Ordering::SeqCst);
    }

    /// Apply patch change requests but never answer them.
    pub fn set_stall_responses(&self, stall: bool) {
        self.inner.stall_responses.store(stall, Ordering::SeqCst);
    }

    /// Close every open peer connection.
    pub fn drop_connections(&self) {
        let peers: Vec<CancellationToken> = self.inner.peers().drain().map(|(_, c)| c).collect();
        for cancel in peers {
            cancel.cancel();
        }
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers().len()
    }
}

#[async_trait]
impl Connector for LoopbackHost {
    async fn connect(&self) -> Result<ClientEndpoint, TransportError> {
        Ok(self.connect_endpoint())
    }
}

impl HostInner {
    fn peers(&self) -> MutexGuard<'_, HashMap<u64, CancellationToken>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn serve(
        self: Arc<Self>,
        peer: u64,
        mut requests: mpsc::UnboundedReceiver<ClientMessage>,
        outbound: mpsc::UnboundedSender<RemoteMessage>,
        cancel: CancellationToken,
    ) {
        let mut subscriptions: HashMap<Reference, PeerSubscription> = HashMap::new();
        loop {
            let request = tokio::select! {
                _ = cancel.cancelled() => break,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            match request {
                ClientMessage::SubscribeRequest { reference } => {
                    tracing::debug!(peer, %reference, "subscribe");
                    let subscription = self.subscribe_peer(reference.clone(), outbound.clone());
                    subscriptions.insert(reference, subscription);
                }
                ClientMessage::UnsubscribeRequest { reference } => {
                    tracing::debug!(peer, %reference, "unsubscribe");
                    subscriptions.remove(&reference);
                }
                ClientMessage::PatchChangeRequest {
                    id,
                    reference,
                    patch,
                } => {
                    let response = self.commit(id, &reference, &patch, subscriptions.get(&reference));
                    if self.stall_responses.load(Ordering::SeqCst) {
                        tracing::debug!(peer, "response withheld");
                        continue;
                    }
                    if outbound.send(response).is_err() {
                        break;
                    }
                }
            }
        }
        drop(subscriptions);
        self.peers().remove(&peer);
        tracing::debug!(peer, "peer disconnected");
    }

    /// Watch `reference` for one peer: a full state first, patches after.
    fn subscribe_peer(
        &self,
        reference: Reference,
        outbound: mpsc::UnboundedSender<RemoteMessage>,
    ) -> PeerSubscription {
        let known: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let subscription = {
            let known = known.clone();
            self.workspace.subscribe(move |doc| {
                let resolved = resolve(&reference, doc).cloned().unwrap_or(Value::Null);
                let mut known = known.lock().unwrap_or_else(PoisonError::into_inner);
                let message = match known.as_ref() {
                    None => Some(RemoteMessage::full(reference.clone(), resolved.clone())),
                    Some(previous) if *previous == resolved => None,
                    Some(previous) => {
                        match RemoteMessage::patch(reference.clone(), &diff(previous, &resolved)) {
                            Ok(message) => Some(message),
                            Err(e) => {
                                tracing::warn!(error = %e, %reference, "cannot encode change");
                                None
                            }
                        }
                    }
                };
                *known = Some(resolved);
                if let Some(message) = message {
                    if outbound.send(message).is_err() {
                        tracing::trace!(%reference, "peer gone");
                    }
                }
            })
        };
        PeerSubscription {
            known,
            _subscription: subscription,
        }
    }

    /// Strictly apply a peer's patch and build the response.
    fn commit(
        &self,
        id: RequestId,
        reference: &Reference,
        patch: &Patch,
        origin: Option<&PeerSubscription>,
    ) -> RemoteMessage {
        if self.reject_commits.load(Ordering::SeqCst) {
            tracing::debug!(%id, "commit rejected");
            return RemoteMessage::failed(id, "commits are disabled");
        }

        let rooted = patch.clone().prefixed(&reference.to_path());
        let mut failure = None;
        self.workspace
            .try_update_with(|doc| match try_apply_patch(doc, &rooted) {
                Ok(next) => {
                    if let Some(origin) = origin {
                        let mut known = origin.known.lock().unwrap_or_else(PoisonError::into_inner);
                        if let Some(value) = known.as_ref() {
                            *known = Some(apply_patch(value, patch));
                        }
                    }
                    Some(next)
                }
                Err(e) => {
                    failure = Some(e.to_string());
                    None
                }
            });

        match failure {
            Some(message) => {
                tracing::debug!(%id, %message, "commit failed");
                RemoteMessage::failed(id, message)
            }
            None => RemoteMessage::committed(id),
        }
    }
}

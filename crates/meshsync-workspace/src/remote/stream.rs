//! Protocol adapter for one reference on one endpoint.

use crate::protocol::{
    change_to_patch, ChangeType, ClientMessage, CommitStatus, RemoteMessage, RequestId,
};
use crate::transport::{BoxStream, ClientEndpoint, TransportError};
use futures::{Stream, StreamExt};
use meshsync_state::{Patch, Reference};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Inbound events for one reference.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteEvent {
    /// A change to apply locally. `full` marks a full-state notification,
    /// delivered as a single root `replace`.
    Patch { patch: Patch, full: bool },
    /// A request sent through [`RemoteStream::push`] was committed.
    Committed { id: RequestId },
    /// A request sent through [`RemoteStream::push`] was rejected.
    Failed { id: RequestId, message: String },
}

/// Subscribe/unsubscribe lifecycle plus patch requests for one reference.
///
/// An endpoint hands out its inbound stream once, so one endpoint carries
/// one `RemoteStream`.
pub struct RemoteStream {
    endpoint: ClientEndpoint,
    reference: Reference,
    in_flight: Arc<Mutex<HashSet<RequestId>>>,
}

impl RemoteStream {
    pub fn new(endpoint: ClientEndpoint, reference: Reference) -> Self {
        Self {
            endpoint,
            reference,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Send the subscribe request and return the filtered inbound stream.
    ///
    /// Change notifications for other references and responses to requests
    /// this adapter did not send are dropped. A frame that fails to decode
    /// is logged and skipped; any other transport error is passed through.
    pub async fn open(&self) -> Result<BoxStream<RemoteEvent>, TransportError> {
        let inbound = self.endpoint.recv().await?;
        self.resubscribe().await?;

        let reference = self.reference.clone();
        let in_flight = self.in_flight.clone();
        let events = inbound.filter_map(move |item| {
            let event = match item {
                Ok(message) => route(&reference, &in_flight, message).map(Ok),
                Err(TransportError::Decode(e)) => {
                    tracing::warn!(error = %e, "dropping undecodable frame");
                    None
                }
                Err(e) => Some(Err(e)),
            };
            futures::future::ready(event)
        });
        Ok(Box::pin(events))
    }

    /// The inbound patch projection of [`open`](Self::open).
    ///
    /// The stream ends at the first transport error.
    pub async fn patches(&self) -> Result<impl Stream<Item = Patch> + Send, TransportError> {
        let mut events = self.open().await?;
        Ok(async_stream::stream! {
            while let Some(event) = events.next().await {
                match event {
                    Ok(RemoteEvent::Patch { patch, .. }) => yield patch,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "remote patch stream ended");
                        break;
                    }
                }
            }
        })
    }

    /// Ask the remote to (re)send the full state.
    pub async fn resubscribe(&self) -> Result<(), TransportError> {
        self.endpoint
            .send(ClientMessage::SubscribeRequest {
                reference: self.reference.clone(),
            })
            .await
    }

    /// Send a patch change request. The returned id correlates the response.
    pub async fn push(&self, patch: Patch) -> Result<RequestId, TransportError> {
        let id = RequestId::new();
        self.in_flight_set().insert(id.clone());
        let sent = self
            .endpoint
            .send(ClientMessage::PatchChangeRequest {
                id: id.clone(),
                reference: self.reference.clone(),
                patch,
            })
            .await;
        if let Err(e) = sent {
            self.in_flight_set().remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    /// Unsubscribe (best effort) and close the endpoint.
    pub async fn close(&self) {
        let unsubscribe = ClientMessage::UnsubscribeRequest {
            reference: self.reference.clone(),
        };
        if let Err(e) = self.endpoint.send(unsubscribe).await {
            tracing::debug!(error = %e, reference = %self.reference, "unsubscribe not delivered");
        }
        if let Err(e) = self.endpoint.close().await {
            tracing::debug!(error = %e, "endpoint close failed");
        }
    }

    fn in_flight_set(&self) -> std::sync::MutexGuard<'_, HashSet<RequestId>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn route(
    reference: &Reference,
    in_flight: &Mutex<HashSet<RequestId>>,
    message: RemoteMessage,
) -> Option<RemoteEvent> {
    match message {
        RemoteMessage::DataChanged {
            reference: target,
            change_type,
            change,
        } => {
            if &target != reference {
                tracing::trace!(other = %target, "change for another reference");
                return None;
            }
            match change_to_patch(change_type, change) {
                Ok(patch) => Some(RemoteEvent::Patch {
                    patch,
                    full: change_type == ChangeType::Full,
                }),
                Err(e) => {
                    tracing::warn!(error = %e, %reference, "dropping malformed change notification");
                    None
                }
            }
        }
        RemoteMessage::PatchChangeResponse {
            id,
            status,
            message,
        } => {
            let ours = in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            if !ours {
                tracing::debug!(%id, "response for a request this stream did not send");
                return None;
            }
            Some(match status {
                CommitStatus::Committed => RemoteEvent::Committed { id },
                CommitStatus::Failed => RemoteEvent::Failed {
                    id,
                    message: message.unwrap_or_default(),
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelEndpoint, Endpoint};
    use meshsync_state::{path, Op};
    use serde_json::json;
    use std::time::Duration;

    fn wired(
        reference: Reference,
    ) -> (RemoteStream, ChannelEndpoint<ClientMessage, RemoteMessage>) {
        let (client, server) = ChannelEndpoint::<RemoteMessage, ClientMessage>::pair();
        (RemoteStream::new(Arc::new(client), reference), server)
    }

    #[tokio::test]
    async fn open_subscribes_and_maps_full_to_root_replace() {
        let reference = Reference::collection("todos");
        let (stream, server) = wired(reference.clone());
        let mut requests = server.recv().await.unwrap();

        let mut events = stream.open().await.unwrap();
        assert_eq!(
            requests.next().await.unwrap().unwrap(),
            ClientMessage::SubscribeRequest {
                reference: reference.clone()
            }
        );

        server
            .send(RemoteMessage::full(reference.clone(), json!({"t1": {}})))
            .await
            .unwrap();
        assert_eq!(
            events.next().await.unwrap().unwrap(),
            RemoteEvent::Patch {
                patch: Patch::replace_root(json!({"t1": {}})),
                full: true
            }
        );
    }

    #[tokio::test]
    async fn other_references_are_filtered_out() {
        let reference = Reference::collection("todos");
        let (stream, server) = wired(reference.clone());
        let mut events = stream.open().await.unwrap();

        server
            .send(RemoteMessage::full(Reference::collection("users"), json!({})))
            .await
            .unwrap();
        let patch = Patch::new().with_op(Op::remove(path!("t1")));
        server
            .send(RemoteMessage::patch(reference.clone(), &patch).unwrap())
            .await
            .unwrap();

        assert_eq!(
            events.next().await.unwrap().unwrap(),
            RemoteEvent::Patch { patch, full: false }
        );
    }

    #[tokio::test]
    async fn push_correlates_responses() {
        let reference = Reference::root();
        let (stream, server) = wired(reference.clone());
        let mut requests = server.recv().await.unwrap();
        let mut events = stream.open().await.unwrap();
        let _subscribe = requests.next().await;

        let first = stream.push(Patch::replace_root(json!(1))).await.unwrap();
        let second = stream.push(Patch::replace_root(json!(2))).await.unwrap();
        assert_ne!(first, second);

        // Out of order, plus one unknown id.
        server
            .send(RemoteMessage::committed(RequestId::from("stranger")))
            .await
            .unwrap();
        server
            .send(RemoteMessage::failed(second.clone(), "conflict"))
            .await
            .unwrap();
        server.send(RemoteMessage::committed(first.clone())).await.unwrap();

        assert_eq!(
            events.next().await.unwrap().unwrap(),
            RemoteEvent::Failed {
                id: second,
                message: "conflict".into()
            }
        );
        assert_eq!(
            events.next().await.unwrap().unwrap(),
            RemoteEvent::Committed { id: first }
        );
    }

    #[tokio::test]
    async fn patches_projection_yields_only_patches() {
        let reference = Reference::root();
        let (stream, server) = wired(reference.clone());
        let patches = stream.patches().await.unwrap();
        tokio::pin!(patches);

        server
            .send(RemoteMessage::full(reference.clone(), json!({"a": 1})))
            .await
            .unwrap();
        server.close().await.unwrap();

        assert_eq!(
            patches.next().await,
            Some(Patch::replace_root(json!({"a": 1})))
        );
        let end = tokio::time::timeout(Duration::from_secs(1), patches.next()).await;
        assert_eq!(end.unwrap(), None);
    }

    #[tokio::test]
    async fn close_sends_unsubscribe() {
        let reference = Reference::entity("users", "u1");
        let (stream, server) = wired(reference.clone());
        let mut requests = server.recv().await.unwrap();

        stream.close().await;

        assert_eq!(
            requests.next().await.unwrap().unwrap(),
            ClientMessage::UnsubscribeRequest { reference }
        );
        assert!(requests.next().await.is_none());
    }
}

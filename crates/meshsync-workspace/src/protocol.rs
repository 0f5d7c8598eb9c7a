//! Messages exchanged with the remote authoritative store.

use meshsync_state::{Patch, Reference, StateResult, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation id of a patch change request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// A fresh, time-ordered id.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for RequestId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client to remote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum ClientMessage {
    /// Register interest; the remote answers with a full notification and
    /// keeps notifying until unsubscribed.
    SubscribeRequest { reference: Reference },
    UnsubscribeRequest { reference: Reference },
    /// Ask the remote to commit a patch rooted at `reference`.
    PatchChangeRequest {
        id: RequestId,
        reference: Reference,
        patch: Patch,
    },
}

impl ClientMessage {
    pub fn reference(&self) -> &Reference {
        match self {
            ClientMessage::SubscribeRequest { reference }
            | ClientMessage::UnsubscribeRequest { reference }
            | ClientMessage::PatchChangeRequest { reference, .. } => reference,
        }
    }
}

/// Remote to client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum RemoteMessage {
    DataChanged {
        reference: Reference,
        #[serde(rename = "changeType")]
        change_type: ChangeType,
        /// The full snapshot for [`ChangeType::Full`], a patch otherwise.
        change: Value,
    },
    PatchChangeResponse {
        id: RequestId,
        status: CommitStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl RemoteMessage {
    /// Full-state notification.
    pub fn full(reference: Reference, snapshot: Value) -> Self {
        RemoteMessage::DataChanged {
            reference,
            change_type: ChangeType::Full,
            change: snapshot,
        }
    }

    /// Incremental notification.
    pub fn patch(reference: Reference, patch: &Patch) -> StateResult<Self> {
        Ok(RemoteMessage::DataChanged {
            reference,
            change_type: ChangeType::Patch,
            change: serde_json::to_value(patch)?,
        })
    }

    pub fn committed(id: RequestId) -> Self {
        RemoteMessage::PatchChangeResponse {
            id,
            status: CommitStatus::Committed,
            message: None,
        }
    }

    pub fn failed(id: RequestId, message: impl Into<String>) -> Self {
        RemoteMessage::PatchChangeResponse {
            id,
            status: CommitStatus::Failed,
            message: Some(message.into()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    Full,
    Patch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitStatus {
    Committed,
    Failed,
}

/// Decode the payload of a change notification into a patch.
///
/// A full snapshot becomes a single root `replace`.
pub fn change_to_patch(change_type: ChangeType, change: Value) -> StateResult<Patch> {
    match change_type {
        ChangeType::Full => Ok(Patch::replace_root(change)),
        ChangeType::Patch => Ok(serde_json::from_value(change)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshsync_state::{path, Op};
    use serde_json::json;

    #[test]
    fn subscribe_request_wire_shape() {
        let msg = ClientMessage::SubscribeRequest {
            reference: Reference::parse_path("/layout/main").unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"$type": "SubscribeRequest", "reference": "$.layout.main"})
        );
    }

    #[test]
    fn entity_reference_in_request() {
        let msg = ClientMessage::PatchChangeRequest {
            id: RequestId::from("r1"),
            reference: Reference::entity("users", "u1"),
            patch: Patch::new().with_op(Op::replace(path!("name"), json!("B"))),
        };
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            wire,
            json!({
                "$type": "PatchChangeRequest",
                "id": "r1",
                "reference": {"$type": "EntityReference", "collection": "users", "id": "u1"},
                "patch": [{"op": "replace", "path": "/name", "value": "B"}]
            })
        );
        let back: ClientMessage = serde_json::from_value(wire).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn data_changed_decodes_both_change_types() {
        let full: RemoteMessage = serde_json::from_value(json!({
            "$type": "DataChanged",
            "reference": "$",
            "changeType": "Full",
            "change": {"count": 1}
        }))
        .unwrap();
        let RemoteMessage::DataChanged {
            change_type,
            change,
            ..
        } = full
        else {
            panic!("expected DataChanged");
        };
        assert_eq!(
            change_to_patch(change_type, change).unwrap(),
            Patch::replace_root(json!({"count": 1}))
        );

        let patch = change_to_patch(
            ChangeType::Patch,
            json!([{"op": "remove", "path": "/a"}]),
        )
        .unwrap();
        assert_eq!(patch.ops(), &[Op::remove(path!("a"))]);
    }

    #[test]
    fn response_message_is_optional() {
        let wire = serde_json::to_value(RemoteMessage::committed(RequestId::from("r2"))).unwrap();
        assert_eq!(
            wire,
            json!({"$type": "PatchChangeResponse", "id": "r2", "status": "Committed"})
        );
        let failed: RemoteMessage = serde_json::from_value(json!({
            "$type": "PatchChangeResponse", "id": "r3", "status": "Failed", "message": "nope"
        }))
        .unwrap();
        assert_eq!(failed, RemoteMessage::failed(RequestId::from("r3"), "nope"));
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }
}

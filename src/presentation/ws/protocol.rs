use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::document::Role;

/// §4.6 message protocol. Binary CRDT/awareness payloads are opaque byte
/// buffers; serde_json's default `Vec<u8>` encoding (an array of integers)
/// is what the wire carries, matching the reference transport's
/// byte-array-in-JSON convention rather than a base64 string.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinDocument {
        document_id: Uuid,
    },
    RejoinDocument {
        document_id: Uuid,
        state_vector: Option<Vec<u8>>,
    },
    LeaveDocument {
        document_id: Uuid,
    },
    YjsUpdate {
        document_id: Uuid,
        update: Vec<u8>,
    },
    YjsAwareness {
        document_id: Uuid,
        update: Vec<u8>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct PresenceUser {
    pub user_id: Uuid,
    pub display_name: String,
    pub email: String,
    pub role: RoleWire,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleWire {
    Owner,
    Editor,
    Viewer,
}

impl From<Role> for RoleWire {
    fn from(role: Role) -> Self {
        match role {
            Role::Owner => RoleWire::Owner,
            Role::Editor => RoleWire::Editor,
            Role::Viewer => RoleWire::Viewer,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    JoinAck {
        document_id: Uuid,
        success: bool,
        users: Vec<PresenceUser>,
        error: Option<String>,
    },
    RejoinAck {
        document_id: Uuid,
        success: bool,
        users: Vec<PresenceUser>,
        error: Option<String>,
    },
    YjsSync {
        document_id: Uuid,
        update: Vec<u8>,
    },
    YjsUpdate {
        document_id: Uuid,
        update: Vec<u8>,
        user_id: Uuid,
    },
    YjsAwareness {
        document_id: Uuid,
        update: Vec<u8>,
        user_id: Uuid,
    },
    UserJoined {
        document_id: Uuid,
        user_id: Uuid,
        display_name: String,
        email: String,
    },
    UserLeft {
        document_id: Uuid,
        user_id: Uuid,
    },
    PermissionDenied {
        document_id: Uuid,
        message: String,
    },
}

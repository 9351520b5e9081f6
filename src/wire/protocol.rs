//! Wire protocol message types.
//!
//! Messages travel as JSON text frames over the persistent channel,
//! discriminated by a `type` field:
//!
//! - server -> client on connect: `initial-sync` with the full sorted
//!   file list;
//! - server -> client ongoing: `file-change`, one per changed path,
//!   deletes before adds/changes within a cycle;
//! - client -> server: `client-file-change` with a `write` or `delete`
//!   request.

use serde::{Deserialize, Serialize};

/// One file in an initial snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitialFile {
    /// Wire path (always `/`-prefixed).
    pub path: String,
    /// Base64-encoded content.
    pub content: String,
}

/// What happened to a mirrored file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeEvent {
    Add,
    Change,
    Delete,
}

/// Messages pushed from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Full snapshot delivered on connect, and on rehydration of an
    /// empty registry. `files` is sorted lexicographically by path.
    InitialSync {
        files: Vec<InitialFile>,
        directory: String,
    },
    /// One incremental change. `content` is present for add/change,
    /// absent for delete.
    FileChange {
        event: ChangeEvent,
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
}

/// Operation requested by a client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientEvent {
    Write,
    Delete,
}

/// Messages pushed from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    ClientFileChange {
        event: ClientEvent,
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
}

/// Errors from decoding inbound frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed client message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("write request missing content for {0}")]
    MissingContent(String),
    #[error("invalid base64 content: {0}")]
    InvalidContent(#[from] base64::DecodeError),
    #[error("path {0} escapes the project root")]
    PathOutsideRoot(String),
}

impl ClientMessage {
    /// Parse a JSON text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_change_delete_omits_content() {
        let msg = ServerMessage::FileChange {
            event: ChangeEvent::Delete,
            path: "/src/app.ts".to_string(),
            content: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("content"));
        assert!(json.contains(r#""type":"file-change""#));
        assert!(json.contains(r#""event":"delete""#));
    }

    #[test]
    fn initial_sync_shape() {
        let msg = ServerMessage::InitialSync {
            files: vec![InitialFile {
                path: "/src/app.ts".to_string(),
                content: "aGk=".to_string(),
            }],
            directory: "/home/user/project".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"initial-sync""#));
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn client_write_parses() {
        let msg = ClientMessage::parse(
            r#"{"type":"client-file-change","event":"write","path":"/src/app.ts","content":"aGk="}"#,
        )
        .unwrap();
        let ClientMessage::ClientFileChange { event, path, content } = msg;
        assert_eq!(event, ClientEvent::Write);
        assert_eq!(path, "/src/app.ts");
        assert_eq!(content.as_deref(), Some("aGk="));
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(ClientMessage::parse(r#"{"type":"bogus"}"#).is_err());
    }
}

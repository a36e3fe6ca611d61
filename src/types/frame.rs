use serde::{Deserialize, Serialize};

/// A frame exchanged with the coordinating server.
///
/// Frames are JSON objects tagged by their `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Sent once every time the channel opens
    Register { user: String, dev: String },
    /// Keep-alive
    Ping,
    /// Successful task outcome
    Response {
        taskid: String,
        response: String,
        status: u16,
    },
    /// Failed task outcome
    Error {
        taskid: String,
        error: String,
        code: u16,
    },
}

impl Frame {
    pub fn register(user: impl Into<String>, dev: impl Into<String>) -> Self {
        Self::Register {
            user: user.into(),
            dev: dev.into(),
        }
    }

    pub fn response(taskid: impl Into<String>, response: impl Into<String>, status: u16) -> Self {
        Self::Response {
            taskid: taskid.into(),
            response: response.into(),
            status,
        }
    }

    pub fn error(taskid: impl Into<String>, error: impl Into<String>, code: u16) -> Self {
        Self::Error {
            taskid: taskid.into(),
            error: error.into(),
            code,
        }
    }

    /// The `type` tag of this frame
    pub fn kind(&self) -> &'static str {
        use crate::types::constants::frame_types;

        match self {
            Frame::Register { .. } => frame_types::REGISTER,
            Frame::Ping => frame_types::PING,
            Frame::Response { .. } => frame_types::RESPONSE,
            Frame::Error { .. } => frame_types::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_wire_format() {
        let value = serde_json::to_value(Frame::register("alice", "dev-1")).unwrap();
        assert_eq!(
            value,
            json!({"type": "register", "user": "alice", "dev": "dev-1"})
        );
    }

    #[test]
    fn test_ping_wire_format() {
        let json = serde_json::to_string(&Frame::Ping).unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_response_and_error_wire_format() {
        let value = serde_json::to_value(Frame::response("t1", "ok", 200)).unwrap();
        assert_eq!(
            value,
            json!({"type": "response", "taskid": "t1", "response": "ok", "status": 200})
        );

        let value = serde_json::to_value(Frame::error("t2", "Failed with status: 500", 500)).unwrap();
        assert_eq!(
            value,
            json!({"type": "error", "taskid": "t2", "error": "Failed with status: 500", "code": 500})
        );
    }

    #[test]
    fn test_kind_matches_tag() {
        for frame in [
            Frame::register("u", "d"),
            Frame::Ping,
            Frame::response("t", "", 204),
            Frame::error("t", "e", 500),
        ] {
            let value = serde_json::to_value(&frame).unwrap();
            assert_eq!(value["type"], frame.kind());
        }
    }
}

//! Wire protocol between the console and the agent backend.
//!
//! Every frame is a JSON object. Frames carrying an `action` field are
//! actions; everything else is an observation.

use agent_console_core::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discriminant field of action frames.
pub const ACTION_FIELD: &str = "action";

/// Actions the console projects into state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Agent (re)initialised.
    #[serde(rename = "initialize")]
    Init,
    Browse,
    Write,
    Message,
    Finish,
    Run,
    RunIpython,
    AddTask,
    ModifyTask,
    ClearMessages,
}

impl ActionKind {
    /// Resolve a wire value. Returns `None` for actions the console does not handle.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        Some(match value {
            "initialize" => Self::Init,
            "browse" => Self::Browse,
            "write" => Self::Write,
            "message" => Self::Message,
            "finish" => Self::Finish,
            "run" => Self::Run,
            "run_ipython" => Self::RunIpython,
            "add_task" => Self::AddTask,
            "modify_task" => Self::ModifyTask,
            "clear_messages" => Self::ClearMessages,
            _ => return None,
        })
    }

    /// Wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "initialize",
            Self::Browse => "browse",
            Self::Write => "write",
            Self::Message => "message",
            Self::Finish => "finish",
            Self::Run => "run",
            Self::RunIpython => "run_ipython",
            Self::AddTask => "add_task",
            Self::ModifyTask => "modify_task",
            Self::ClearMessages => "clear_messages",
        }
    }
}

/// Inbound action frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMessage {
    /// Raw discriminant, possibly one the console does not know.
    pub action: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Human-readable summary (used by `finish`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionMessage {
    /// Known kind of this action, if any.
    #[must_use]
    pub fn kind(&self) -> Option<ActionKind> {
        ActionKind::from_wire(&self.action)
    }

    /// String argument, if present and a string.
    #[must_use]
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Action(ActionMessage),
    Observation(Value),
}

impl InboundMessage {
    /// Parse a text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError` if the frame is not a JSON object or the
    /// action payload is malformed.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        Self::from_value(serde_json::from_str(raw)?)
    }

    /// Classify an already-parsed frame.
    ///
    /// # Errors
    /// Returns `ProtocolError` if the value is not an object, the discriminant
    /// is not a string, or `args` is not an object.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(fields) = &value else {
            return Err(ProtocolError::NotAnObject);
        };
        match fields.get(ACTION_FIELD) {
            None => Ok(Self::Observation(value)),
            Some(Value::String(_)) => Ok(Self::Action(serde_json::from_value(value)?)),
            Some(other) => Err(ProtocolError::InvalidDiscriminant(other.to_string())),
        }
    }
}

/// Outbound action frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientAction {
    pub action: ActionKind,
    pub args: Value,
}

impl ClientAction {
    /// Initialise the agent with the given settings.
    #[must_use]
    pub fn initialize(settings: Value) -> Self {
        Self {
            action: ActionKind::Init,
            args: settings,
        }
    }

    /// A user chat message.
    #[must_use]
    pub fn message(content: impl Into<String>) -> Self {
        Self {
            action: ActionKind::Message,
            args: serde_json::json!({ "content": content.into() }),
        }
    }

    /// Encode as a text frame.
    #[must_use]
    pub fn to_frame(&self) -> String {
        // A derived `Serialize` over `Value` and a unit enum cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_action_frame() {
        let msg = InboundMessage::parse(r#"{"action":"write","args":{"path":"a.py","content":"x"}}"#)
            .unwrap();
        let InboundMessage::Action(action) = msg else {
            panic!("expected action");
        };
        assert_eq!(action.kind(), Some(ActionKind::Write));
        assert_eq!(action.arg_str("path"), Some("a.py"));
        assert_eq!(action.arg_str("missing"), None);
    }

    #[test]
    fn test_frame_without_action_is_observation() {
        let msg = InboundMessage::parse(r#"{"mainGoal":"done","task":{}}"#).unwrap();
        assert!(matches!(msg, InboundMessage::Observation(_)));

        let msg = InboundMessage::parse(r#"{"observation":"run","content":"ok","extras":{}}"#)
            .unwrap();
        assert!(matches!(msg, InboundMessage::Observation(_)));
    }

    #[test]
    fn test_unknown_action_still_parses() {
        let msg = InboundMessage::parse(r#"{"action":"teleport"}"#).unwrap();
        let InboundMessage::Action(action) = msg else {
            panic!("expected action");
        };
        assert_eq!(action.kind(), None);
        assert!(action.args.is_empty());
    }

    #[test]
    fn test_protocol_errors() {
        assert!(matches!(
            InboundMessage::parse("{not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            InboundMessage::parse("[1,2]"),
            Err(ProtocolError::NotAnObject)
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"action":7}"#),
            Err(ProtocolError::InvalidDiscriminant(_))
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"action":"run","args":"ls"}"#),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_wire_names_match_serde() {
        for kind in [
            ActionKind::Init,
            ActionKind::RunIpython,
            ActionKind::AddTask,
            ActionKind::ClearMessages,
        ] {
            let encoded = serde_json::to_value(kind).unwrap();
            assert_eq!(encoded, json!(kind.as_str()));
            assert_eq!(ActionKind::from_wire(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_client_action_frames() {
        let frame = ClientAction::message("hello").to_frame();
        let parsed: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed, json!({"action": "message", "args": {"content": "hello"}}));

        let frame = ClientAction::initialize(json!({"AGENT": "CodeActAgent"})).to_frame();
        assert!(frame.contains(r#""action":"initialize""#));
    }
}

//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is one JSON message. Clients send *requests* (correlated by
//! id), the server sends *responses* (echoing the id) and uncorrelated
//! *notifications* describing match-state events.

use serde::Serialize;
use serde_json::Value;

/// A JSON object (string-keyed map), the payload currency of the protocol.
pub type JsonObject = serde_json::Map<String, Value>;

/// Default server endpoint.
pub const DEFAULT_ADDR: &str = "127.0.0.1:14200";

/// Default server port, used by the client when none is given.
pub const DEFAULT_PORT: u16 = 14200;

// =============================================================================
// ERROR TAXONOMY
// =============================================================================

/// Closed set of wire error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Message was not valid JSON.
    ParseError,
    /// Message was not a well-formed request envelope.
    IncorrectRequest,
    /// Request named an operation the server does not implement.
    NoSuchOperation,
    /// Request was missing a required parameter.
    IncorrectParams,
    /// No game registered under the given id.
    UnknownGame,
    /// Client already has a current match.
    AlreadyInMatch,
    /// No active match with the given id (or wrong game for it).
    UnknownMatch,
    /// A player with that name already exists in the match.
    DuplicatePlayer,
    /// The client is not a participant of the referenced match.
    IncorrectMatch,
    /// The action can only be performed on the player's turn.
    GameNotPlayerTurn,
    /// The game does not support the requested action.
    GameNoSuchAction,
    /// The action's data payload was invalid.
    GameIncorrectActionData,
    /// The move itself was illegal.
    GameIncorrectMove,
}

impl ErrorCode {
    /// Stable numeric wire value.
    pub const fn code(self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::IncorrectRequest => -32600,
            ErrorCode::NoSuchOperation => -32601,
            ErrorCode::IncorrectParams => -32602,
            ErrorCode::UnknownGame => -40100,
            ErrorCode::AlreadyInMatch => -40101,
            ErrorCode::UnknownMatch => -40102,
            ErrorCode::DuplicatePlayer => -40103,
            ErrorCode::IncorrectMatch => -40104,
            ErrorCode::GameNotPlayerTurn => -50100,
            ErrorCode::GameNoSuchAction => -50101,
            ErrorCode::GameIncorrectActionData => -50102,
            ErrorCode::GameIncorrectMove => -50103,
        }
    }

    /// Canonical human-readable message for the code.
    pub const fn message(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::IncorrectRequest => "Incorrect request",
            ErrorCode::NoSuchOperation => "No such operation",
            ErrorCode::IncorrectParams => "Incorrect parameters",
            ErrorCode::UnknownGame => "Unknown game",
            ErrorCode::AlreadyInMatch => "Already in a match",
            ErrorCode::UnknownMatch => "Unknown match",
            ErrorCode::DuplicatePlayer => "Duplicate player name",
            ErrorCode::IncorrectMatch => "Incorrect match",
            ErrorCode::GameNotPlayerTurn => "Action not allowed outside player's turn",
            ErrorCode::GameNoSuchAction => "Unsupported action in game",
            ErrorCode::GameIncorrectActionData => "Incorrect data in game action",
            ErrorCode::GameIncorrectMove => "Incorrect move",
        }
    }

    /// Resolve a numeric wire value back to a code, if it is a known one.
    pub fn from_code(code: i64) -> Option<ErrorCode> {
        match code {
            -32700 => Some(ErrorCode::ParseError),
            -32600 => Some(ErrorCode::IncorrectRequest),
            -32601 => Some(ErrorCode::NoSuchOperation),
            -32602 => Some(ErrorCode::IncorrectParams),
            -40100 => Some(ErrorCode::UnknownGame),
            -40101 => Some(ErrorCode::AlreadyInMatch),
            -40102 => Some(ErrorCode::UnknownMatch),
            -40103 => Some(ErrorCode::DuplicatePlayer),
            -40104 => Some(ErrorCode::IncorrectMatch),
            -50100 => Some(ErrorCode::GameNotPlayerTurn),
            -50101 => Some(ErrorCode::GameNoSuchAction),
            -50102 => Some(ErrorCode::GameIncorrectActionData),
            -50103 => Some(ErrorCode::GameIncorrectMove),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
    /// Reply to a request, correlated by id.
    Response(Response),

    /// Server-originated event, no id.
    Notification(Notification),
}

/// Reply to a request. Carries exactly one of `result` or `error`;
/// the constructors keep that invariant.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    /// Echo of the request id; `null` for envelope-level failures where
    /// no id could be parsed.
    pub id: Value,
    /// Operation result, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonObject>,
    /// Error body, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    /// Successful response.
    pub fn ok(id: Value, result: JsonObject) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error response. `details`, when present, lands in `error.data.details`.
    pub fn err(id: Value, code: ErrorCode, details: Option<String>) -> Self {
        Response {
            id,
            result: None,
            error: Some(ErrorBody {
                code: code.code(),
                message: code.message().to_string(),
                data: details.map(|details| ErrorData { details }),
            }),
        }
    }
}

/// Error body of a response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Numeric wire value from the error taxonomy.
    pub code: i64,
    /// Canonical message for the code.
    pub message: String,
    /// Optional extra data; carries a `details` string when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ErrorData>,
}

/// The `data` member of an error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorData {
    /// Human-readable explanation of this particular failure.
    pub details: String,
}

/// Server-originated notification.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    /// Notification scope; currently always `match`.
    pub scope: NotificationScope,
    /// Which lifecycle event occurred.
    pub event: NotificationEvent,
    /// Match-state payload.
    pub data: MatchStateData,
}

/// Notification scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationScope {
    /// Match-lifecycle notifications.
    Match,
}

/// Match-lifecycle events carried by notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationEvent {
    /// Match transitioned to in-progress.
    Start,
    /// Game state changed within an in-progress match.
    Update,
    /// Match is done.
    End,
}

impl NotificationEvent {
    /// Wire spelling of the event.
    pub const fn as_str(self) -> &'static str {
        match self {
            NotificationEvent::Start => "start",
            NotificationEvent::Update => "update",
            NotificationEvent::End => "end",
        }
    }

    /// Parse the wire spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(NotificationEvent::Start),
            "update" => Some(NotificationEvent::Update),
            "end" => Some(NotificationEvent::End),
            _ => None,
        }
    }
}

/// Match lifecycle states, in order. A match never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStatus {
    /// Waiting for enough players to join.
    AwaitingPlayers,
    /// Minimum player count reached; about to start.
    Ready,
    /// Game running.
    InProgress,
    /// Terminal.
    Done,
}

impl MatchStatus {
    /// Wire spelling of the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            MatchStatus::AwaitingPlayers => "awaiting-players",
            MatchStatus::Ready => "ready",
            MatchStatus::InProgress => "in-progress",
            MatchStatus::Done => "done",
        }
    }
}

/// Payload of every match notification.
///
/// `game_state` is present iff the match is in progress or done;
/// `match_winner` is present iff the match is done, and is `null` for a draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MatchStateData {
    /// Match identifier (two-word slug).
    pub match_id: String,
    /// Current lifecycle state.
    pub match_status: MatchStatus,
    /// Game identifier the match was created under.
    pub game_id: String,
    /// Game-supplied observable state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_state: Option<JsonObject>,
    /// Winner's name, or `Some(None)` (serialized `null`) for a draw.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_winner: Option<Option<String>>,
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// A validated inbound request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Caller-generated id (string or integer, non-null).
    pub id: Value,
    /// Operation name.
    pub operation: String,
    /// Operation parameters; empty when the request carried none.
    pub params: JsonObject,
}

/// An envelope-level validation failure, with everything needed to build
/// the error response.
#[derive(Debug, Clone)]
pub struct WireFault {
    /// Request id to echo, or `null` when none could be parsed.
    pub id: Value,
    /// Error code to report.
    pub code: ErrorCode,
    /// Optional details string.
    pub details: Option<String>,
}

impl WireFault {
    fn anonymous(code: ErrorCode, details: impl Into<String>) -> Self {
        WireFault {
            id: Value::Null,
            code,
            details: Some(details.into()),
        }
    }
}

/// Build a client request envelope.
pub fn request_envelope(id: Value, operation: &str, params: Option<JsonObject>) -> Value {
    let mut msg = JsonObject::new();
    msg.insert("type".to_string(), Value::String("request".to_string()));
    msg.insert("id".to_string(), id);
    msg.insert("operation".to_string(), Value::String(operation.to_string()));
    if let Some(params) = params {
        msg.insert("params".to_string(), Value::Object(params));
    }
    Value::Object(msg)
}

/// Render a JSON value for inclusion in a details string: strings bare,
/// everything else in JSON notation.
pub fn display_value(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

/// Validate a raw inbound frame down to a [`Request`].
///
/// Checks run in order and the first failure wins: JSON parse, `type`
/// present, `type == "request"`, `id` present and non-null, `operation`
/// present. Whether the operation is *known*, and per-operation parameter
/// checks, are the dispatcher's concern.
pub fn parse_request(raw: &str) -> Result<Request, WireFault> {
    let msg: Value = match serde_json::from_str(raw) {
        Ok(msg) => msg,
        Err(e) => {
            return Err(WireFault::anonymous(
                ErrorCode::ParseError,
                format!(
                    "Incorrect JSON (parsing failed at line {} column {})",
                    e.line(),
                    e.column()
                ),
            ));
        }
    };

    let Some(obj) = msg.as_object() else {
        return Err(WireFault::anonymous(
            ErrorCode::IncorrectRequest,
            "Message is not an object",
        ));
    };

    let Some(message_type) = obj.get("type") else {
        return Err(WireFault::anonymous(
            ErrorCode::IncorrectRequest,
            "Message has no 'type' member",
        ));
    };

    if message_type.as_str() != Some("request") {
        return Err(WireFault::anonymous(
            ErrorCode::IncorrectRequest,
            format!("Incorrect message type: {}", display_value(message_type)),
        ));
    }

    let id = match obj.get("id") {
        Some(id) if !id.is_null() => id.clone(),
        _ => {
            return Err(WireFault::anonymous(
                ErrorCode::IncorrectRequest,
                "No id specified",
            ));
        }
    };

    let operation = match obj.get("operation") {
        Some(op) if !op.is_null() => match op.as_str() {
            Some(op) => op.to_string(),
            // A non-string operation can never match a handler.
            None => {
                return Err(WireFault {
                    id,
                    code: ErrorCode::NoSuchOperation,
                    details: None,
                });
            }
        },
        _ => {
            return Err(WireFault {
                id,
                code: ErrorCode::IncorrectRequest,
                details: Some("No operation specified".to_string()),
            });
        }
    };

    let params = match obj.get("params") {
        None => JsonObject::new(),
        Some(Value::Object(params)) => params.clone(),
        Some(_) => {
            return Err(WireFault {
                id,
                code: ErrorCode::IncorrectParams,
                details: Some("'params' must be an object".to_string()),
            });
        }
    };

    Ok(Request {
        id,
        operation,
        params,
    })
}

/// First key of `required` that is absent from `params`, if any.
pub fn first_missing_param<'a>(params: &JsonObject, required: &[&'a str]) -> Option<&'a str> {
    required.iter().find(|key| !params.contains_key(**key)).copied()
}

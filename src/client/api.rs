//! Client API
//!
//! Game and match handles over a [`Connector`]. Requests are validated
//! round trips; notifications are routed into per-match inboxes or a
//! user-supplied callback. A match handle's derived state (`status`,
//! `game_state`, `winner`) advances only when a notification is
//! processed.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};

use serde_json::Value;
use tracing::{debug, warn};

use crate::client::connector::Connector;
use crate::protocol::{self, JsonObject, NotificationEvent};

/// Errors surfaced by the client API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Could not establish the connection.
    #[error("Could not connect to the server: {0}")]
    ConnectionRefused(String),

    /// The connection closed while a request was outstanding (or before
    /// one could be sent).
    #[error("Connection to the server closed")]
    ConnectionClosed,

    /// A request was issued from inside a notification callback, which
    /// would deadlock the receive loop.
    #[error("Requests cannot be issued from a notification callback")]
    CalledFromCallback,

    /// The server sent a structurally invalid response.
    #[error("Malformed response: {reason}")]
    MalformedResponse {
        /// What was wrong.
        reason: String,
        /// The offending message.
        response: Value,
    },

    /// The client already has a current match.
    #[error("{0}")]
    AlreadyInAMatch(ErrorDetails),

    /// No such match (or wrong game for it).
    #[error("{0}")]
    UnknownMatch(ErrorDetails),

    /// A player with that name already exists in the match.
    #[error("{0}")]
    DuplicatePlayer(ErrorDetails),

    /// The game does not support the requested action.
    #[error("{0}")]
    GameNoSuchAction(ErrorDetails),

    /// The action's data payload was invalid.
    #[error("{0}")]
    GameIncorrectActionData(ErrorDetails),

    /// The action can only be performed on the player's turn.
    #[error("{0}")]
    GameNotPlayerTurn(ErrorDetails),

    /// The move itself was illegal.
    #[error("{0}")]
    GameIncorrectMove(ErrorDetails),

    /// Any other error response from the server.
    #[error("{0}")]
    ErrorResponse(ErrorDetails),
}

impl ClientError {
    fn malformed(reason: impl Into<String>, response: &Value) -> Self {
        ClientError::MalformedResponse {
            reason: reason.into(),
            response: response.clone(),
        }
    }

    /// The wire error carried by this failure, when it stems from an
    /// error response.
    pub fn error_details(&self) -> Option<&ErrorDetails> {
        match self {
            ClientError::AlreadyInAMatch(d)
            | ClientError::UnknownMatch(d)
            | ClientError::DuplicatePlayer(d)
            | ClientError::GameNoSuchAction(d)
            | ClientError::GameIncorrectActionData(d)
            | ClientError::GameNotPlayerTurn(d)
            | ClientError::GameIncorrectMove(d)
            | ClientError::ErrorResponse(d) => Some(d),
            _ => None,
        }
    }
}

/// Contents of an error response, attached to the typed client errors.
#[derive(Debug, Clone)]
pub struct ErrorDetails {
    /// Numeric wire code.
    pub code: i64,
    /// Canonical message.
    pub message: String,
    /// The `details` string from the error's data, if present.
    pub details: Option<String>,
    /// The full error data mapping.
    pub data: JsonObject,
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {}: {}", self.code, self.message)?;
        if let Some(details) = &self.details {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

fn error_from_response(code: i64, message: String, data: JsonObject) -> ClientError {
    use crate::protocol::ErrorCode;

    let details = data
        .get("details")
        .and_then(Value::as_str)
        .map(str::to_string);
    let d = ErrorDetails {
        code,
        message,
        details,
        data,
    };

    match ErrorCode::from_code(code) {
        Some(ErrorCode::AlreadyInMatch) => ClientError::AlreadyInAMatch(d),
        Some(ErrorCode::UnknownMatch) => ClientError::UnknownMatch(d),
        Some(ErrorCode::DuplicatePlayer) => ClientError::DuplicatePlayer(d),
        Some(ErrorCode::GameNoSuchAction) => ClientError::GameNoSuchAction(d),
        Some(ErrorCode::GameIncorrectActionData) => ClientError::GameIncorrectActionData(d),
        Some(ErrorCode::GameNotPlayerTurn) => ClientError::GameNotPlayerTurn(d),
        Some(ErrorCode::GameIncorrectMove) => ClientError::GameIncorrectMove(d),
        _ => ClientError::ErrorResponse(d),
    }
}

/// Callback invoked on the receive context for every routed match
/// notification. The callback must call [`MatchNotification::process`]
/// itself if it wants the match handle's derived state to advance.
pub type NotificationCallback = Arc<dyn Fn(&MatchNotification) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shared client state: the connector, the match index used for
/// notification routing, and the optional callback.
pub struct ApiCore {
    connector: Arc<dyn Connector>,
    matches: Mutex<HashMap<(String, String), Match>>,
    callback: Mutex<Option<NotificationCallback>>,
}

impl ApiCore {
    pub(crate) fn new(connector: Arc<dyn Connector>) -> Arc<Self> {
        Arc::new(ApiCore {
            connector,
            matches: Mutex::new(HashMap::new()),
            callback: Mutex::new(None),
        })
    }

    pub(crate) fn set_notification_callback(&self, callback: Option<NotificationCallback>) {
        *lock(&self.callback) = callback;
    }

    /// One request/response round trip, returning the validated result
    /// mapping or a typed error.
    pub(crate) fn send_request(
        &self,
        operation: &str,
        params: Option<JsonObject>,
    ) -> Result<JsonObject, ClientError> {
        let id = self.connector.next_request_id();
        let request = protocol::request_envelope(id, operation, params);
        let response = self.connector.exchange(request)?;

        let Some(obj) = response.as_object() else {
            return Err(ClientError::malformed("Response is not an object", &response));
        };
        for field in ["type", "id"] {
            if !obj.contains_key(field) {
                return Err(ClientError::malformed(
                    format!("Missing '{field}' field in response"),
                    &response,
                ));
            }
        }
        if obj["type"].as_str() != Some("response") {
            return Err(ClientError::malformed(
                format!(
                    "Unexpected message type '{}'",
                    protocol::display_value(&obj["type"])
                ),
                &response,
            ));
        }

        if let Some(error) = obj.get("error") {
            let Some(error_obj) = error.as_object() else {
                return Err(ClientError::malformed("'error' is not an object", &response));
            };
            let Some(code) = error_obj.get("code").and_then(Value::as_i64) else {
                return Err(ClientError::malformed("Missing 'code' field in error", &response));
            };
            let Some(message) = error_obj.get("message").and_then(Value::as_str) else {
                return Err(ClientError::malformed(
                    "Missing 'message' field in error",
                    &response,
                ));
            };
            // `data` is optional on the wire.
            let data = error_obj
                .get("data")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            return Err(error_from_response(code, message.to_string(), data));
        }

        let Some(result) = obj.get("result").and_then(Value::as_object) else {
            return Err(ClientError::malformed(
                "Missing 'result' field in response",
                &response,
            ));
        };
        Ok(result.clone())
    }

    /// Fetch the server's game catalog as handles keyed by game id.
    pub(crate) fn get_games(core: &Arc<ApiCore>) -> Result<HashMap<String, Game>, ClientError> {
        let result = core.send_request("list-games", None)?;
        let response = Value::Object(result.clone());

        let Some(games) = result.get("games").and_then(Value::as_array) else {
            return Err(ClientError::malformed("Missing 'games' field", &response));
        };

        let mut handles = HashMap::new();
        for game in games {
            let Some(id) = game.get("id").and_then(Value::as_str) else {
                return Err(ClientError::malformed("Missing 'id' field in game", &response));
            };
            let Some(description) = game.get("description").and_then(Value::as_str) else {
                return Err(ClientError::malformed(
                    "Missing 'description' field in game",
                    &response,
                ));
            };
            handles.insert(
                id.to_string(),
                Game {
                    core: core.clone(),
                    id: id.to_string(),
                    description: description.to_string(),
                },
            );
        }
        Ok(handles)
    }

    fn register_match(&self, handle: &Match) {
        lock(&self.matches).insert(
            (
                handle.inner.game_id.clone(),
                handle.inner.match_id.clone(),
            ),
            handle.clone(),
        );
    }

    /// Route one raw notification to its match inbox or the callback.
    /// Called from the receive context.
    pub(crate) fn route_notification(&self, raw: Value) {
        let Some(obj) = raw.as_object() else {
            warn!("discarding non-object notification");
            return;
        };
        if obj.get("scope").and_then(Value::as_str) != Some("match") {
            warn!("discarding notification with unsupported scope");
            return;
        }
        let Some(event) = obj
            .get("event")
            .and_then(Value::as_str)
            .and_then(NotificationEvent::parse)
        else {
            warn!("discarding notification with unknown event");
            return;
        };
        let Some(data) = obj.get("data").and_then(Value::as_object) else {
            warn!("discarding notification without data");
            return;
        };
        let (Some(game_id), Some(match_id)) = (
            data.get("game-id").and_then(Value::as_str),
            data.get("match-id").and_then(Value::as_str),
        ) else {
            warn!("discarding notification without match reference");
            return;
        };

        let handle = lock(&self.matches)
            .get(&(game_id.to_string(), match_id.to_string()))
            .cloned();
        let Some(handle) = handle else {
            debug!(game_id, match_id, "dropping notification for unknown match");
            return;
        };

        let notification = MatchNotification {
            handle: handle.clone(),
            event,
            data: data.clone(),
        };

        let callback = lock(&self.callback).clone();
        match callback {
            Some(callback) => (callback.as_ref())(&notification),
            None => handle.enqueue(notification),
        }
    }
}

/// A game offered by the server. Obtained from `get_games`.
pub struct Game {
    core: Arc<ApiCore>,
    id: String,
    description: String,
}

impl Game {
    /// Game identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Create a new match of this game.
    pub fn create_match(&self, player_name: &str) -> Result<Match, ClientError> {
        let mut params = JsonObject::new();
        params.insert("game".to_string(), Value::String(self.id.clone()));
        params.insert(
            "player-name".to_string(),
            Value::String(player_name.to_string()),
        );
        let result = self.core.send_request("create-match", Some(params))?;

        let Some(match_id) = result.get("match-id").and_then(Value::as_str) else {
            return Err(ClientError::malformed(
                "Missing 'match-id' field",
                &Value::Object(result.clone()),
            ));
        };

        let handle = Match::new(&self.core, &self.id, match_id, player_name);
        self.core.register_match(&handle);
        Ok(handle)
    }

    /// Join an existing match of this game.
    pub fn join_match(&self, match_id: &str, player_name: &str) -> Result<Match, ClientError> {
        let mut params = JsonObject::new();
        params.insert("game".to_string(), Value::String(self.id.clone()));
        params.insert("match-id".to_string(), Value::String(match_id.to_string()));
        params.insert(
            "player-name".to_string(),
            Value::String(player_name.to_string()),
        );
        let result = self.core.send_request("join-match", Some(params))?;

        if !result.is_empty() {
            return Err(ClientError::malformed(
                "Unexpected results in 'join-match'",
                &Value::Object(result),
            ));
        }

        let handle = Match::new(&self.core, &self.id, match_id, player_name);
        self.core.register_match(&handle);
        Ok(handle)
    }
}

#[derive(Default)]
struct MatchView {
    status: Option<String>,
    game_state: Option<JsonObject>,
    winner: Option<String>,
}

struct MatchInner {
    core: Weak<ApiCore>,
    game_id: String,
    match_id: String,
    player_name: String,
    view: Mutex<MatchView>,
    inbox: Mutex<VecDeque<MatchNotification>>,
    available: Condvar,
}

/// Handle to a match this client participates in. Cheap to clone; all
/// clones share state.
#[derive(Clone)]
pub struct Match {
    inner: Arc<MatchInner>,
}

impl fmt::Debug for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Match").finish()
    }
}

impl Match {
    fn new(core: &Arc<ApiCore>, game_id: &str, match_id: &str, player_name: &str) -> Self {
        Match {
            inner: Arc::new(MatchInner {
                core: Arc::downgrade(core),
                game_id: game_id.to_string(),
                match_id: match_id.to_string(),
                player_name: player_name.to_string(),
                view: Mutex::new(MatchView::default()),
                inbox: Mutex::new(VecDeque::new()),
                available: Condvar::new(),
            }),
        }
    }

    /// Match identifier.
    pub fn id(&self) -> &str {
        &self.inner.match_id
    }

    /// This client's player name in the match.
    pub fn player_name(&self) -> &str {
        &self.inner.player_name
    }

    /// Last processed match status, if any notification has been
    /// processed yet.
    pub fn status(&self) -> Option<String> {
        lock(&self.inner.view).status.clone()
    }

    /// Last processed game state.
    pub fn game_state(&self) -> Option<JsonObject> {
        lock(&self.inner.view).game_state.clone()
    }

    /// Last processed winner.
    pub fn winner(&self) -> Option<String> {
        lock(&self.inner.view).winner.clone()
    }

    /// Send a game action and wait for its result mapping.
    pub fn game_action(
        &self,
        action: &str,
        data: Option<JsonObject>,
    ) -> Result<JsonObject, ClientError> {
        let core = self.inner.core.upgrade().ok_or(ClientError::ConnectionClosed)?;

        let mut params = JsonObject::new();
        params.insert(
            "match-id".to_string(),
            Value::String(self.inner.match_id.clone()),
        );
        params.insert("action".to_string(), Value::String(action.to_string()));
        params.insert(
            "data".to_string(),
            Value::Object(data.unwrap_or_default()),
        );
        core.send_request("game-action", Some(params))
    }

    /// Block until at least one notification for this match has been
    /// applied, then drain and apply any further queued ones.
    ///
    /// The rendezvous for turn-based play. Never returns while the
    /// callback path is active, since callbacks bypass the inbox.
    pub fn wait_for_update(&self) {
        let first = {
            let mut inbox = lock(&self.inner.inbox);
            while inbox.is_empty() {
                inbox = self
                    .inner
                    .available
                    .wait(inbox)
                    .unwrap_or_else(|e| e.into_inner());
            }
            inbox.pop_front()
        };
        if let Some(notification) = first {
            notification.process();
        }
        while let Some(notification) = self.next_notification() {
            notification.process();
        }
    }

    /// Pop the next unprocessed notification, without blocking.
    pub fn next_notification(&self) -> Option<MatchNotification> {
        lock(&self.inner.inbox).pop_front()
    }

    fn enqueue(&self, notification: MatchNotification) {
        lock(&self.inner.inbox).push_back(notification);
        self.inner.available.notify_all();
    }

    fn apply(
        &self,
        status: Option<String>,
        game_state: Option<JsonObject>,
        winner: Option<String>,
    ) {
        let mut view = lock(&self.inner.view);
        view.status = status;
        view.game_state = game_state;
        view.winner = winner;
    }
}

/// A match notification as received from the server. Carries the raw
/// data; [`MatchNotification::process`] copies it onto the match handle.
#[derive(Clone)]
pub struct MatchNotification {
    handle: Match,
    event: NotificationEvent,
    data: JsonObject,
}

impl MatchNotification {
    /// The lifecycle event.
    pub fn event(&self) -> NotificationEvent {
        self.event
    }

    /// The match this notification pertains to.
    pub fn match_handle(&self) -> &Match {
        &self.handle
    }

    /// Match status carried by the notification.
    pub fn match_status(&self) -> Option<String> {
        self.data
            .get("match-status")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Game state carried by the notification.
    pub fn game_state(&self) -> Option<JsonObject> {
        self.data.get("game-state").and_then(Value::as_object).cloned()
    }

    /// Winner carried by the notification (absent until the match is
    /// done, and absent on a draw).
    pub fn winner(&self) -> Option<String> {
        self.data
            .get("match-winner")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Apply the notification to the match handle's derived state.
    pub fn process(&self) {
        self.handle
            .apply(self.match_status(), self.game_state(), self.winner());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Connector that replays canned responses, for exercising the
    /// response-validation ladder.
    struct CannedConnector {
        responses: Mutex<VecDeque<Value>>,
    }

    impl CannedConnector {
        fn core_with(responses: Vec<Value>) -> Arc<ApiCore> {
            ApiCore::new(Arc::new(CannedConnector {
                responses: Mutex::new(responses.into()),
            }))
        }
    }

    impl Connector for CannedConnector {
        fn next_request_id(&self) -> Value {
            json!(1)
        }

        fn exchange(&self, _request: Value) -> Result<Value, ClientError> {
            lock(&self.responses)
                .pop_front()
                .ok_or(ClientError::ConnectionClosed)
        }
    }

    fn send(response: Value) -> Result<JsonObject, ClientError> {
        CannedConnector::core_with(vec![response]).send_request("list-games", None)
    }

    fn assert_malformed(result: Result<JsonObject, ClientError>, expected_reason: &str) {
        match result.unwrap_err() {
            ClientError::MalformedResponse { reason, .. } => {
                assert_eq!(reason, expected_reason);
            }
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_responses() {
        assert_malformed(send(json!([1, 2])), "Response is not an object");
        assert_malformed(send(json!({"id": 1})), "Missing 'type' field in response");
        assert_malformed(
            send(json!({"type": "notification", "id": 1})),
            "Unexpected message type 'notification'",
        );
        assert_malformed(
            send(json!({"type": "response", "id": 1})),
            "Missing 'result' field in response",
        );
        assert_malformed(
            send(json!({"type": "response", "id": 1, "error": {"message": "x"}})),
            "Missing 'code' field in error",
        );
        assert_malformed(
            send(json!({"type": "response", "id": 1, "error": {"code": -40102}})),
            "Missing 'message' field in error",
        );
    }

    #[test]
    fn test_known_error_code_maps_to_typed_variant() {
        let err = send(json!({
            "type": "response", "id": 1,
            "error": {"code": -40102, "message": "Unknown match",
                      "data": {"details": "Unknown match: foobar"}}
        }))
        .unwrap_err();

        match &err {
            ClientError::UnknownMatch(details) => {
                assert_eq!(details.code, -40102);
                assert_eq!(details.message, "Unknown match");
                assert_eq!(details.details.as_deref(), Some("Unknown match: foobar"));
            }
            other => panic!("expected UnknownMatch, got {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "Error -40102: Unknown match (Unknown match: foobar)"
        );
    }

    #[test]
    fn test_unrecognized_error_code_is_generic() {
        let err = send(json!({
            "type": "response", "id": 1,
            "error": {"code": -99999, "message": "Strange"}
        }))
        .unwrap_err();
        assert!(matches!(err, ClientError::ErrorResponse(_)));
        // Missing data is tolerated, not malformed.
        assert!(err.error_details().unwrap().details.is_none());
    }

    #[test]
    fn test_error_data_is_optional() {
        let err = send(json!({
            "type": "response", "id": 1,
            "error": {"code": -32601, "message": "No such operation"}
        }))
        .unwrap_err();
        assert!(matches!(err, ClientError::ErrorResponse(_)));
        assert_eq!(err.error_details().unwrap().code, -32601);
    }

    #[test]
    fn test_successful_result_returned() {
        let result = send(json!({
            "type": "response", "id": 1, "result": {"games": []}
        }))
        .unwrap();
        assert_eq!(result["games"], json!([]));
    }
}

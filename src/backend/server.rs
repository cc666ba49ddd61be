//! Match Server Core
//!
//! Transport-independent dispatcher: owns the registered games, the active
//! matches and the connected clients, validates inbound requests, mutates
//! match state and fans notifications out to subscribers.
//!
//! The dispatcher is fully synchronous. Transports hold it behind a mutex,
//! process one message per connection at a time and enqueue outbound
//! messages through non-blocking sinks, which preserves the ordering
//! contract: the acting client sees its response strictly before any
//! notification caused by the same request, and fan-out order equals
//! action serialization order.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::authoring::{GameError, GameFactory, GameOptions};
use crate::backend::slug::{random_slugs, SlugSource};
use crate::protocol::{
    self, first_missing_param, ErrorCode, JsonObject, MatchStateData, MatchStatus, Notification,
    NotificationEvent, NotificationScope, Outbound, Request, Response,
};

use super::matches::ActiveMatch;

/// Identifier of a connected client, unique for the server's lifetime.
pub type ClientId = u64;

/// Outbound side of a connection. Implementations must not block: they
/// enqueue and return, the transport drains.
pub trait MessageSink: Send {
    /// Enqueue one message for delivery to the client.
    fn send(&mut self, msg: &Outbound);
}

/// A game registered with the server. Immutable after registration.
pub struct RegisteredGame {
    /// Unique game identifier.
    pub game_id: String,
    /// Factory producing a fresh game instance per match.
    pub factory: GameFactory,
    /// Human-readable description.
    pub description: String,
}

/// Per-connection state.
struct ClientState {
    sink: Box<dyn MessageSink>,
    current_match: Option<String>,
    current_player: Option<usize>,
}

/// The match server: registries plus the operation dispatcher.
pub struct ChimeraServer {
    games: HashMap<String, RegisteredGame>,
    matches: HashMap<String, ActiveMatch>,
    clients: HashMap<ClientId, ClientState>,
    slugs: SlugSource,
    next_client_id: ClientId,
}

impl Default for ChimeraServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChimeraServer {
    /// Server with the default (entropy-seeded) slug source.
    pub fn new() -> Self {
        Self::with_slug_source(random_slugs())
    }

    /// Server with a caller-provided match-id source. The dispatcher
    /// retries the source until it yields an unused id.
    pub fn with_slug_source(slugs: SlugSource) -> Self {
        ChimeraServer {
            games: HashMap::new(),
            matches: HashMap::new(),
            clients: HashMap::new(),
            slugs,
            next_client_id: 0,
        }
    }

    /// Register a game. Later registrations under the same id replace
    /// earlier ones.
    pub fn register_game(&mut self, game_id: &str, factory: GameFactory, description: &str) {
        info!(game_id, description, "registered game");
        self.games.insert(
            game_id.to_string(),
            RegisteredGame {
                game_id: game_id.to_string(),
                factory,
                description: description.to_string(),
            },
        );
    }

    /// Attach a new connection and return its id.
    pub fn connect_client(&mut self, sink: Box<dyn MessageSink>) -> ClientId {
        let id = self.next_client_id;
        self.next_client_id += 1;
        self.clients.insert(
            id,
            ClientState {
                sink,
                current_match: None,
                current_player: None,
            },
        );
        debug!(client = id, "client connected");
        id
    }

    /// Detach a connection: drop its registry entry and remove it from
    /// every match's subscriber set. Remaining players keep playing.
    pub fn disconnect_client(&mut self, client_id: ClientId) {
        if self.clients.remove(&client_id).is_some() {
            for m in self.matches.values_mut() {
                m.subscribers.retain(|c| *c != client_id);
            }
            debug!(client = client_id, "client disconnected");
        }
    }

    /// Whether a match with the given id is active.
    pub fn has_match(&self, match_id: &str) -> bool {
        self.matches.contains_key(match_id)
    }

    /// Number of active matches.
    pub fn num_matches(&self) -> usize {
        self.matches.len()
    }

    /// Lifecycle state of an active match.
    pub fn match_status(&self, match_id: &str) -> Option<MatchStatus> {
        self.matches.get(match_id).map(|m| m.state)
    }

    /// Player names seated in an active match, in seating order.
    pub fn match_player_names(&self, match_id: &str) -> Option<Vec<String>> {
        self.matches
            .get(match_id)
            .map(|m| m.game.seats().iter().map(|p| p.name.clone()).collect())
    }

    /// Validate and dispatch one raw inbound frame from a client.
    pub fn process_message(&mut self, client_id: ClientId, raw: &str) {
        debug!(client = client_id, "RCVD: {raw}");

        let request = match protocol::parse_request(raw) {
            Ok(request) => request,
            Err(fault) => {
                self.respond_err(client_id, fault.id, fault.code, fault.details);
                return;
            }
        };

        match request.operation.as_str() {
            "list-games" => self.handle_list_games(client_id, request),
            "create-match" => self.handle_create_match(client_id, request),
            "join-match" => self.handle_join_match(client_id, request),
            "game-action" => self.handle_game_action(client_id, request),
            _ => self.respond_err(client_id, request.id, ErrorCode::NoSuchOperation, None),
        }
    }

    // -------------------------------------------------------------------------
    // Operation handlers
    // -------------------------------------------------------------------------

    fn handle_list_games(&mut self, client_id: ClientId, request: Request) {
        let games: Vec<Value> = self
            .games
            .values()
            .map(|rg| json!({"id": rg.game_id, "description": rg.description}))
            .collect();

        let mut result = JsonObject::new();
        result.insert("games".to_string(), Value::Array(games));
        self.respond_ok(client_id, request.id, result);
    }

    fn handle_create_match(&mut self, client_id: ClientId, request: Request) {
        if self.client_in_match(client_id) {
            self.respond_err(
                client_id,
                request.id,
                ErrorCode::AlreadyInMatch,
                Some("You are already in a match. You cannot create new matches.".to_string()),
            );
            return;
        }

        if let Some(missing) = first_missing_param(&request.params, &["game", "player-name"]) {
            self.respond_err(
                client_id,
                request.id,
                ErrorCode::IncorrectParams,
                Some(format!("Missing '{missing}' parameter")),
            );
            return;
        }

        let game_id = protocol::display_value(&request.params["game"]);
        if !self.games.contains_key(&game_id) {
            self.respond_err(
                client_id,
                request.id,
                ErrorCode::UnknownGame,
                Some(format!("Unknown game: {game_id}")),
            );
            return;
        }

        let Some(player_name) = request.params["player-name"].as_str().map(str::to_string)
        else {
            self.respond_err(
                client_id,
                request.id,
                ErrorCode::IncorrectParams,
                Some("'player-name' must be a string".to_string()),
            );
            return;
        };

        let mut match_id = (self.slugs)();
        while self.matches.contains_key(&match_id) {
            match_id = (self.slugs)();
        }

        // Game options are not exposed through the protocol yet; every
        // match is created with the empty mapping.
        let factory = self.games[&game_id].factory;
        let game = factory(&GameOptions::new());

        let mut m = ActiveMatch::new(match_id.clone(), game_id.clone(), game);
        let player_id = m.add_player(&player_name);
        m.subscribers.push(client_id);
        self.matches.insert(match_id.clone(), m);

        if let Some(client) = self.clients.get_mut(&client_id) {
            client.current_match = Some(match_id.clone());
            client.current_player = Some(player_id);
        }

        info!(client = client_id, game_id, match_id, "match created");

        let mut result = JsonObject::new();
        result.insert("match-id".to_string(), Value::String(match_id));
        self.respond_ok(client_id, request.id, result);
    }

    fn handle_join_match(&mut self, client_id: ClientId, request: Request) {
        if self.client_in_match(client_id) {
            self.respond_err(
                client_id,
                request.id,
                ErrorCode::AlreadyInMatch,
                Some("You are already in a match. You cannot join another match.".to_string()),
            );
            return;
        }

        if let Some(missing) =
            first_missing_param(&request.params, &["game", "player-name", "match-id"])
        {
            self.respond_err(
                client_id,
                request.id,
                ErrorCode::IncorrectParams,
                Some(format!("Missing '{missing}' parameter")),
            );
            return;
        }

        let Some(match_id) = request.params["match-id"].as_str().map(str::to_string) else {
            self.respond_err(
                client_id,
                request.id,
                ErrorCode::IncorrectParams,
                Some("'match-id' must be a string".to_string()),
            );
            return;
        };

        let Some(player_name) = request.params["player-name"].as_str().map(str::to_string)
        else {
            self.respond_err(
                client_id,
                request.id,
                ErrorCode::IncorrectParams,
                Some("'player-name' must be a string".to_string()),
            );
            return;
        };

        let game_id = protocol::display_value(&request.params["game"]);

        let check: Result<(), (ErrorCode, String)> = match self.matches.get(&match_id) {
            None => Err((
                ErrorCode::UnknownMatch,
                format!("Unknown match: {match_id}"),
            )),
            Some(m) if m.game_id != game_id => Err((
                ErrorCode::UnknownMatch,
                format!("Wrong game for {match_id} (expected {})", m.game_id),
            )),
            Some(m) if m.state >= MatchStatus::InProgress => Err((
                ErrorCode::UnknownMatch,
                format!("Match '{match_id}' has already started"),
            )),
            Some(m) if m.game.seats().name_taken(&player_name) => Err((
                ErrorCode::DuplicatePlayer,
                format!("Player '{player_name}' already exists in match '{match_id}'"),
            )),
            Some(_) => Ok(()),
        };
        if let Err((code, details)) = check {
            self.respond_err(client_id, request.id, code, Some(details));
            return;
        }

        let (player_id, fills_match) = {
            let Some(m) = self.matches.get_mut(&match_id) else {
                return;
            };
            let player_id = m.add_player(&player_name);
            m.subscribers.push(client_id);
            (player_id, m.state == MatchStatus::Ready)
        };

        if let Some(client) = self.clients.get_mut(&client_id) {
            client.current_match = Some(match_id.clone());
            client.current_player = Some(player_id);
        }

        info!(client = client_id, match_id, player_name, "player joined");

        self.respond_ok(client_id, request.id, JsonObject::new());

        // A join that reached the minimum player count starts the match
        // within the same dispatch, so "ready" is never seen on the wire.
        if fills_match {
            self.start_match(&match_id);
        }
    }

    fn handle_game_action(&mut self, client_id: ClientId, request: Request) {
        if let Some(missing) =
            first_missing_param(&request.params, &["match-id", "action", "data"])
        {
            self.respond_err(
                client_id,
                request.id,
                ErrorCode::IncorrectParams,
                Some(format!("Missing '{missing}' parameter")),
            );
            return;
        }

        let Some(match_id) = request.params["match-id"].as_str().map(str::to_string) else {
            self.respond_err(
                client_id,
                request.id,
                ErrorCode::IncorrectParams,
                Some("'match-id' must be a string".to_string()),
            );
            return;
        };

        let (current_match, current_player) = match self.clients.get(&client_id) {
            Some(client) => (client.current_match.clone(), client.current_player),
            None => (None, None),
        };

        let is_current = current_match.as_deref() == Some(match_id.as_str())
            && self.matches.contains_key(&match_id);
        let Some(player_id) = current_player.filter(|_| is_current) else {
            self.respond_err(
                client_id,
                request.id,
                ErrorCode::IncorrectMatch,
                Some(format!(
                    "You are not in {match_id} (or that match does not exist)"
                )),
            );
            return;
        };

        let Some(action) = request.params["action"].as_str().map(str::to_string) else {
            self.respond_err(
                client_id,
                request.id,
                ErrorCode::IncorrectParams,
                Some("'action' must be a string".to_string()),
            );
            return;
        };

        let data = match &request.params["data"] {
            Value::Object(data) => data.clone(),
            _ => {
                self.respond_err(
                    client_id,
                    request.id,
                    ErrorCode::IncorrectParams,
                    Some("'data' must be an object".to_string()),
                );
                return;
            }
        };

        enum Performed {
            NoSuchAction,
            Failed(GameError),
            Succeeded {
                result: JsonObject,
                done: bool,
                state_changed: bool,
            },
        }

        let performed = {
            let Some(m) = self.matches.get_mut(&match_id) else {
                return;
            };
            if !m.game.actions().contains(&action.as_str()) {
                Performed::NoSuchAction
            } else {
                match m.game.handle_action(&action, player_id, &data) {
                    Ok(outcome) => Performed::Succeeded {
                        done: m.game.done(),
                        result: outcome.result,
                        state_changed: outcome.state_changed,
                    },
                    Err(e) => Performed::Failed(e),
                }
            }
        };

        match performed {
            Performed::NoSuchAction => {
                self.respond_err(
                    client_id,
                    request.id,
                    ErrorCode::GameNoSuchAction,
                    Some(format!("No such action: {action}")),
                );
            }
            Performed::Failed(e) => {
                let code = match e {
                    GameError::NotPlayerTurn(_) => ErrorCode::GameNotPlayerTurn,
                    GameError::IncorrectActionData(_) => ErrorCode::GameIncorrectActionData,
                    GameError::IncorrectMove(_) => ErrorCode::GameIncorrectMove,
                };
                self.respond_err(client_id, request.id, code, Some(e.details().to_string()));
            }
            Performed::Succeeded {
                result,
                done,
                state_changed,
            } => {
                // Response first; at most one notification follows.
                self.respond_ok(client_id, request.id, result);
                if done {
                    self.end_match(&match_id);
                } else if state_changed {
                    self.update_match(&match_id);
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Match transitions & fan-out
    // -------------------------------------------------------------------------

    fn start_match(&mut self, match_id: &str) {
        let (data, subscribers) = {
            let Some(m) = self.matches.get_mut(match_id) else {
                return;
            };
            m.state = MatchStatus::InProgress;
            m.game.on_start();
            (m.state_data(), m.subscribers.clone())
        };

        info!(match_id, "match started");
        for subscriber in subscribers {
            self.notify(subscriber, NotificationEvent::Start, data.clone());
        }
    }

    fn update_match(&mut self, match_id: &str) {
        let (data, subscribers) = {
            let Some(m) = self.matches.get(match_id) else {
                return;
            };
            (m.state_data(), m.subscribers.clone())
        };

        for subscriber in subscribers {
            self.notify(subscriber, NotificationEvent::Update, data.clone());
        }
    }

    fn end_match(&mut self, match_id: &str) {
        // Removal is atomic with the end fan-out: both happen within the
        // same dispatch, under the same lock.
        let Some(mut m) = self.matches.remove(match_id) else {
            return;
        };
        m.state = MatchStatus::Done;
        m.game.on_end();

        let data = m.state_data();
        info!(match_id, winner = ?data.match_winner, "match ended");

        for subscriber in &m.subscribers {
            self.notify(*subscriber, NotificationEvent::End, data.clone());
        }

        // Release the participants so they can create or join again.
        for subscriber in m.subscribers {
            if let Some(client) = self.clients.get_mut(&subscriber) {
                if client.current_match.as_deref() == Some(match_id) {
                    client.current_match = None;
                    client.current_player = None;
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Outbound helpers
    // -------------------------------------------------------------------------

    fn client_in_match(&self, client_id: ClientId) -> bool {
        self.clients
            .get(&client_id)
            .is_some_and(|c| c.current_match.is_some())
    }

    fn send(&mut self, client_id: ClientId, msg: Outbound) {
        match self.clients.get_mut(&client_id) {
            Some(client) => client.sink.send(&msg),
            None => warn!(client = client_id, "dropping message for unknown client"),
        }
    }

    fn respond_ok(&mut self, client_id: ClientId, id: Value, result: JsonObject) {
        self.send(client_id, Outbound::Response(Response::ok(id, result)));
    }

    fn respond_err(
        &mut self,
        client_id: ClientId,
        id: Value,
        code: ErrorCode,
        details: Option<String>,
    ) {
        debug!(client = client_id, code = code.code(), ?details, "request failed");
        self.send(client_id, Outbound::Response(Response::err(id, code, details)));
    }

    fn notify(&mut self, client_id: ClientId, event: NotificationEvent, data: MatchStateData) {
        self.send(
            client_id,
            Outbound::Notification(Notification {
                scope: NotificationScope::Match,
                event,
                data,
            }),
        );
    }
}

//! Game Authoring Contract
//!
//! The interface plug-in games implement to run under the match server.
//! A game owns its rules and observable state; the server owns identity,
//! matchmaking and notification fan-out. Games declare their actions up
//! front and signal structured failures through [`GameError`], which the
//! dispatcher translates one-to-one into wire error codes.

use crate::protocol::JsonObject;

/// Options mapping a game is constructed from.
pub type GameOptions = JsonObject;

/// Factory registered for a game id; invoked once per created match.
pub type GameFactory = fn(&GameOptions) -> Box<dyn Game>;

/// A named participant within a match. Ids are dense and 0-based in
/// seating order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Seat index.
    pub id: usize,
    /// Name, unique within the match.
    pub name: String,
}

/// Structured failures an action can signal. Each maps to exactly one
/// wire error code and carries a human-readable `details` string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// The acting player is not the current player.
    #[error("{0}")]
    NotPlayerTurn(String),

    /// The action's data payload is invalid.
    #[error("{0}")]
    IncorrectActionData(String),

    /// The move itself is illegal in the current state.
    #[error("{0}")]
    IncorrectMove(String),
}

impl GameError {
    /// Turn violation with the stock message.
    pub fn not_player_turn() -> Self {
        GameError::NotPlayerTurn("It is not your turn.".to_string())
    }

    /// Bad action data.
    pub fn incorrect_action_data(details: impl Into<String>) -> Self {
        GameError::IncorrectActionData(details.into())
    }

    /// Illegal move.
    pub fn incorrect_move(details: impl Into<String>) -> Self {
        GameError::IncorrectMove(details.into())
    }

    /// The details string carried by the error.
    pub fn details(&self) -> &str {
        match self {
            GameError::NotPlayerTurn(d)
            | GameError::IncorrectActionData(d)
            | GameError::IncorrectMove(d) => d,
        }
    }
}

/// What a successful action hands back to the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct ActionOutcome {
    /// Result mapping returned to the acting client.
    pub result: JsonObject,
    /// True when the action materially altered observable state; drives
    /// the `update` notification.
    pub state_changed: bool,
}

impl ActionOutcome {
    /// Outcome that changed state.
    pub fn changed(result: JsonObject) -> Self {
        ActionOutcome {
            result,
            state_changed: true,
        }
    }

    /// Outcome that left state untouched.
    pub fn unchanged(result: JsonObject) -> Self {
        ActionOutcome {
            result,
            state_changed: false,
        }
    }
}

/// Seating for a match: the ordered player list plus occupancy bounds.
#[derive(Debug, Clone)]
pub struct Seats {
    min: usize,
    max: usize,
    players: Vec<Player>,
}

impl Seats {
    /// Seating with the given occupancy bounds.
    pub fn new(min: usize, max: usize) -> Self {
        Seats {
            min,
            max,
            players: Vec::new(),
        }
    }

    /// The classic two-player shape: exactly two seats.
    pub fn two_player() -> Self {
        Seats::new(2, 2)
    }

    /// Minimum players needed for the match to start.
    pub fn min_players(&self) -> usize {
        self.min
    }

    /// Maximum players the match accepts.
    pub fn max_players(&self) -> usize {
        self.max
    }

    /// Number of seated players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// True when nobody is seated yet.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Seat a new player, assigning the next dense id. Returns the id.
    pub fn seat(&mut self, name: &str) -> usize {
        let id = self.players.len();
        self.players.push(Player {
            id,
            name: name.to_string(),
        });
        id
    }

    /// Player at the given seat.
    pub fn get(&self, id: usize) -> Option<&Player> {
        self.players.get(id)
    }

    /// All seated players, in seating order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    /// Whether a name is already in use within this match.
    pub fn name_taken(&self, name: &str) -> bool {
        self.players.iter().any(|p| p.name == name)
    }
}

/// Turn cursor for turn-based games: tracks whose turn it is and guards
/// actions against out-of-turn players.
#[derive(Debug, Clone, Default)]
pub struct Turns {
    current: usize,
}

impl Turns {
    /// Cursor starting at player 0.
    pub fn new() -> Self {
        Turns::default()
    }

    /// Seat id of the player whose turn it is.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Reject the action unless it is `player`'s turn.
    pub fn require(&self, player: usize) -> Result<(), GameError> {
        if player == self.current {
            Ok(())
        } else {
            Err(GameError::not_player_turn())
        }
    }

    /// Advance to the next player in seating order.
    pub fn advance(&mut self, num_players: usize) {
        self.current = (self.current + 1) % num_players;
    }
}

/// Exact-field validation for action data: every listed field must be
/// present, and no other fields may appear.
pub fn require_fields(data: &JsonObject, fields: &[&str]) -> Result<(), GameError> {
    for field in fields {
        if !data.contains_key(*field) {
            return Err(GameError::incorrect_action_data(format!(
                "Missing data field: {field}"
            )));
        }
    }
    for field in data.keys() {
        if !fields.contains(&field.as_str()) {
            return Err(GameError::incorrect_action_data(format!(
                "Unexpected data field: {field}"
            )));
        }
    }
    Ok(())
}

/// The contract a plug-in game implements.
///
/// Lifecycle: the server constructs the game through its registered
/// factory, seats players as they join, calls [`Game::on_start`] exactly
/// once when the match begins and [`Game::on_end`] exactly once when
/// [`Game::done`] turns true after an action.
pub trait Game: Send {
    /// The game's seating.
    fn seats(&self) -> &Seats;

    /// Mutable seating, used by the server while players join.
    fn seats_mut(&mut self) -> &mut Seats;

    /// Minimum players needed to start.
    fn min_players(&self) -> usize {
        self.seats().min_players()
    }

    /// Players currently seated.
    fn num_players(&self) -> usize {
        self.seats().len()
    }

    /// Called once when the match transitions to in-progress.
    fn on_start(&mut self) {}

    /// Called once when the match is done.
    fn on_end(&mut self) {}

    /// Whether the game has concluded.
    fn done(&self) -> bool;

    /// The winner, meaningful only once [`Game::done`] is true.
    /// `None` means a draw.
    fn winner(&self) -> Option<&Player>;

    /// JSON-serializable mapping of the current observable state.
    fn game_state(&self) -> JsonObject;

    /// Actions this game supports, declared up front for dispatch and
    /// discovery.
    fn actions(&self) -> &'static [&'static str];

    /// Perform a declared action for the given player. The dispatcher only
    /// calls this with names from [`Game::actions`].
    fn handle_action(
        &mut self,
        action: &str,
        player: usize,
        data: &JsonObject,
    ) -> Result<ActionOutcome, GameError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seats_assign_dense_ids() {
        let mut seats = Seats::two_player();
        assert_eq!(seats.seat("Alex"), 0);
        assert_eq!(seats.seat("Sam"), 1);
        assert_eq!(seats.len(), 2);
        assert_eq!(seats.get(0).unwrap().name, "Alex");
        assert_eq!(seats.get(1).unwrap().name, "Sam");
        assert!(seats.get(2).is_none());
    }

    #[test]
    fn test_seats_name_taken() {
        let mut seats = Seats::new(2, 4);
        seats.seat("Alex");
        assert!(seats.name_taken("Alex"));
        assert!(!seats.name_taken("Sam"));
    }

    #[test]
    fn test_turns_guard_and_advance() {
        let mut turns = Turns::new();
        assert_eq!(turns.current(), 0);
        assert!(turns.require(0).is_ok());
        assert_eq!(turns.require(1), Err(GameError::not_player_turn()));

        turns.advance(2);
        assert_eq!(turns.current(), 1);
        turns.advance(2);
        assert_eq!(turns.current(), 0);
    }

    #[test]
    fn test_require_fields_missing() {
        let data = JsonObject::new();
        let err = require_fields(&data, &["phrase"]).unwrap_err();
        assert_eq!(
            err,
            GameError::incorrect_action_data("Missing data field: phrase")
        );
    }

    #[test]
    fn test_require_fields_unexpected() {
        let mut data = JsonObject::new();
        data.insert("phrase".to_string(), json!("Test"));
        data.insert("foo".to_string(), json!("bar"));
        let err = require_fields(&data, &["phrase"]).unwrap_err();
        assert_eq!(
            err,
            GameError::incorrect_action_data("Unexpected data field: foo")
        );
    }

    #[test]
    fn test_require_fields_exact() {
        let mut data = JsonObject::new();
        data.insert("phrase".to_string(), json!("Test"));
        assert!(require_fields(&data, &["phrase"]).is_ok());
        assert!(require_fields(&JsonObject::new(), &[]).is_ok());
    }

    #[test]
    fn test_game_error_details() {
        assert_eq!(GameError::not_player_turn().details(), "It is not your turn.");
        assert_eq!(GameError::incorrect_move("nope").details(), "nope");
    }
}

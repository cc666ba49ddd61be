//! Player One Wins
//!
//! A fun game (for player one): a single round where each player says a
//! phrase and, no matter what anybody said, player one wins.

use serde_json::Value;

use crate::authoring::{
    require_fields, ActionOutcome, Game, GameError, GameOptions, Player, Seats, Turns,
};
use crate::protocol::JsonObject;

/// The "Player One Wins" game. Two players, turn-based, one round.
pub struct PlayerOneWins {
    seats: Seats,
    turns: Turns,
    phrases: Vec<Option<Value>>,
}

impl PlayerOneWins {
    /// New game; options are unused.
    pub fn new(_options: &GameOptions) -> Self {
        PlayerOneWins {
            seats: Seats::two_player(),
            turns: Turns::new(),
            phrases: Vec::new(),
        }
    }

    /// Factory for server registration.
    pub fn factory(options: &GameOptions) -> Box<dyn Game> {
        Box::new(Self::new(options))
    }

    fn ensure_started(&self) -> Result<(), GameError> {
        if self.phrases.is_empty() {
            Err(GameError::incorrect_move("The match has not started yet"))
        } else {
            Ok(())
        }
    }

    fn phrase(&self, player: usize) -> Value {
        self.phrases
            .get(player)
            .cloned()
            .flatten()
            .unwrap_or(Value::Null)
    }
}

impl Game for PlayerOneWins {
    fn seats(&self) -> &Seats {
        &self.seats
    }

    fn seats_mut(&mut self) -> &mut Seats {
        &mut self.seats
    }

    fn on_start(&mut self) {
        self.phrases = vec![None; self.num_players()];
    }

    fn done(&self) -> bool {
        !self.phrases.is_empty() && self.phrases.iter().all(Option::is_some)
    }

    fn winner(&self) -> Option<&Player> {
        // Player one always wins.
        if self.done() {
            self.seats.get(0)
        } else {
            None
        }
    }

    fn game_state(&self) -> JsonObject {
        let mut state = JsonObject::new();
        state.insert("player1_phrase".to_string(), self.phrase(0));
        state.insert("player2_phrase".to_string(), self.phrase(1));
        state
    }

    fn actions(&self) -> &'static [&'static str] {
        &["move"]
    }

    fn handle_action(
        &mut self,
        action: &str,
        player: usize,
        data: &JsonObject,
    ) -> Result<ActionOutcome, GameError> {
        match action {
            "move" => {
                self.turns.require(player)?;
                require_fields(data, &["phrase"])?;
                self.ensure_started()?;

                let phrase = data["phrase"].clone();
                if let Some(slot) = self.phrases.get_mut(player) {
                    *slot = Some(phrase.clone());
                }
                self.turns.advance(self.num_players());

                let mut result = JsonObject::new();
                result.insert("received".to_string(), phrase);
                Ok(ActionOutcome::changed(result))
            }
            _ => Err(GameError::incorrect_action_data(format!(
                "Unhandled action: {action}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn started_game() -> PlayerOneWins {
        let mut game = PlayerOneWins::new(&GameOptions::new());
        game.seats_mut().seat("Alex");
        game.seats_mut().seat("Sam");
        game.on_start();
        game
    }

    fn move_data(phrase: &str) -> JsonObject {
        let mut data = JsonObject::new();
        data.insert("phrase".to_string(), json!(phrase));
        data
    }

    #[test]
    fn test_initial_state() {
        let game = started_game();
        assert!(!game.done());
        assert!(game.winner().is_none());
        let state = game.game_state();
        assert_eq!(state["player1_phrase"], Value::Null);
        assert_eq!(state["player2_phrase"], Value::Null);
    }

    #[test]
    fn test_player_one_always_wins() {
        let mut game = started_game();

        let outcome = game.handle_action("move", 0, &move_data("Test")).unwrap();
        assert_eq!(outcome.result["received"], "Test");
        assert!(outcome.state_changed);
        assert!(!game.done());

        let outcome = game.handle_action("move", 1, &move_data("Test 2")).unwrap();
        assert_eq!(outcome.result["received"], "Test 2");
        assert!(game.done());
        assert_eq!(game.winner().unwrap().name, "Alex");

        let state = game.game_state();
        assert_eq!(state["player1_phrase"], "Test");
        assert_eq!(state["player2_phrase"], "Test 2");
    }

    #[test]
    fn test_out_of_turn_move_rejected() {
        let mut game = started_game();
        let err = game.handle_action("move", 1, &move_data("Test")).unwrap_err();
        assert!(matches!(err, GameError::NotPlayerTurn(_)));
    }

    #[test]
    fn test_move_data_validated() {
        let mut game = started_game();

        let err = game.handle_action("move", 0, &JsonObject::new()).unwrap_err();
        assert!(matches!(err, GameError::IncorrectActionData(_)));

        let mut data = move_data("Test");
        data.insert("foo".to_string(), json!("bar"));
        let err = game.handle_action("move", 0, &data).unwrap_err();
        assert!(matches!(err, GameError::IncorrectActionData(_)));
    }
}

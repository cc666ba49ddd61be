//! Chicken
//!
//! Each round both players secretly pick swerve or don't-swerve, points
//! accrue per the classic payoff table, and the game ends in a crash the
//! first round neither player swerves. Most points wins; a tie is a draw.

use serde_json::{json, Value};

use crate::authoring::{require_fields, ActionOutcome, Game, GameError, GameOptions, Player, Seats};
use crate::protocol::JsonObject;

/// Outcome of one resolved round.
#[derive(Debug, Clone, Copy)]
struct Round {
    p1_swerve: bool,
    p2_swerve: bool,
    p1_points: i64,
    p2_points: i64,
}

/// The game of Chicken. Two players, simultaneous rounds.
pub struct Chicken {
    seats: Seats,
    started: bool,
    points: [i64; 2],
    current_round: [Option<bool>; 2],
    rounds: Vec<Round>,
}

impl Chicken {
    /// New game; options are unused.
    pub fn new(_options: &GameOptions) -> Self {
        Chicken {
            seats: Seats::two_player(),
            started: false,
            points: [0, 0],
            current_round: [None, None],
            rounds: Vec::new(),
        }
    }

    /// Factory for server registration.
    pub fn factory(options: &GameOptions) -> Box<dyn Game> {
        Box::new(Self::new(options))
    }

    fn ensure_started(&self) -> Result<(), GameError> {
        if self.started {
            Ok(())
        } else {
            Err(GameError::incorrect_move("The match has not started yet"))
        }
    }

    /// Resolve the round if both moves are in. Returns whether it resolved.
    fn maybe_resolve_round(&mut self) -> bool {
        let (Some(p1_swerve), Some(p2_swerve)) = (self.current_round[0], self.current_round[1])
        else {
            return false;
        };

        let (p1_points, p2_points) = match (p1_swerve, p2_swerve) {
            (true, true) => (1, 1),
            (true, false) => (0, 3),
            (false, true) => (3, 0),
            (false, false) => (0, 0),
        };

        self.points[0] += p1_points;
        self.points[1] += p2_points;
        self.rounds.push(Round {
            p1_swerve,
            p2_swerve,
            p1_points,
            p2_points,
        });
        self.current_round = [None, None];
        true
    }
}

impl Game for Chicken {
    fn seats(&self) -> &Seats {
        &self.seats
    }

    fn seats_mut(&mut self) -> &mut Seats {
        &mut self.seats
    }

    fn on_start(&mut self) {
        self.started = true;
        self.points = [0, 0];
        self.current_round = [None, None];
        self.rounds.clear();
    }

    fn done(&self) -> bool {
        self.rounds
            .last()
            .is_some_and(|r| !r.p1_swerve && !r.p2_swerve)
    }

    fn winner(&self) -> Option<&Player> {
        if !self.done() {
            return None;
        }
        match self.points[0].cmp(&self.points[1]) {
            std::cmp::Ordering::Greater => self.seats.get(0),
            std::cmp::Ordering::Less => self.seats.get(1),
            std::cmp::Ordering::Equal => None,
        }
    }

    fn game_state(&self) -> JsonObject {
        let rounds: Vec<Value> = self
            .rounds
            .iter()
            .map(|r| {
                json!({
                    "p1_swerve": r.p1_swerve,
                    "p2_swerve": r.p2_swerve,
                    "p1_points": r.p1_points,
                    "p2_points": r.p2_points,
                })
            })
            .collect();

        let mut state = JsonObject::new();
        state.insert("p1_points".to_string(), json!(self.points[0]));
        state.insert("p2_points".to_string(), json!(self.points[1]));
        state.insert("rounds".to_string(), Value::Array(rounds));
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
                require_fields(data, &["swerve"])?;
                self.ensure_started()?;

                let Some(swerve) = data["swerve"].as_bool() else {
                    return Err(GameError::incorrect_action_data(format!(
                        "Provided swerve is not a boolean: {}",
                        data["swerve"]
                    )));
                };

                let Some(slot) = self.current_round.get_mut(player) else {
                    return Err(GameError::incorrect_move("You are not seated in this game"));
                };
                if slot.is_some() {
                    return Err(GameError::incorrect_move(
                        "You have already submitted a move this round",
                    ));
                }
                *slot = Some(swerve);

                let resolved = self.maybe_resolve_round();

                let mut result = JsonObject::new();
                result.insert("swerve".to_string(), data["swerve"].clone());
                Ok(ActionOutcome {
                    result,
                    state_changed: resolved,
                })
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

    fn started_game() -> Chicken {
        let mut game = Chicken::new(&GameOptions::new());
        game.seats_mut().seat("Alex");
        game.seats_mut().seat("Sam");
        game.on_start();
        game
    }

    fn swerve(value: bool) -> JsonObject {
        let mut data = JsonObject::new();
        data.insert("swerve".to_string(), json!(value));
        data
    }

    fn play_round(game: &mut Chicken, p1: bool, p2: bool) {
        let first = game.handle_action("move", 0, &swerve(p1)).unwrap();
        assert!(!first.state_changed);
        let second = game.handle_action("move", 1, &swerve(p2)).unwrap();
        assert!(second.state_changed);
    }

    #[test]
    fn test_payoff_table() {
        let mut game = started_game();
        play_round(&mut game, true, true);
        assert_eq!(game.points, [1, 1]);
        play_round(&mut game, false, true);
        assert_eq!(game.points, [4, 1]);
        play_round(&mut game, true, false);
        assert_eq!(game.points, [4, 4]);
        assert!(!game.done());
    }

    #[test]
    fn test_crash_ends_game() {
        let mut game = started_game();
        play_round(&mut game, false, true);
        play_round(&mut game, false, false);
        assert!(game.done());
        assert_eq!(game.winner().unwrap().name, "Alex");
    }

    #[test]
    fn test_tied_crash_is_a_draw() {
        let mut game = started_game();
        play_round(&mut game, true, true);
        play_round(&mut game, false, false);
        assert!(game.done());
        assert!(game.winner().is_none());
    }

    #[test]
    fn test_second_submission_in_round_rejected() {
        let mut game = started_game();
        game.handle_action("move", 0, &swerve(true)).unwrap();
        let err = game.handle_action("move", 0, &swerve(false)).unwrap_err();
        assert_eq!(
            err,
            GameError::incorrect_move("You have already submitted a move this round")
        );
        // The original move stands and the round still resolves.
        game.handle_action("move", 1, &swerve(true)).unwrap();
        assert_eq!(game.points, [1, 1]);
    }

    #[test]
    fn test_non_boolean_swerve_rejected() {
        let mut game = started_game();
        let mut data = JsonObject::new();
        data.insert("swerve".to_string(), json!("yes"));
        let err = game.handle_action("move", 0, &data).unwrap_err();
        assert!(matches!(err, GameError::IncorrectActionData(_)));
    }

    #[test]
    fn test_game_state_shape() {
        let mut game = started_game();
        play_round(&mut game, false, true);
        let state = game.game_state();
        assert_eq!(state["p1_points"], 3);
        assert_eq!(state["p2_points"], 0);
        assert_eq!(state["rounds"][0]["p1_swerve"], false);
        assert_eq!(state["rounds"][0]["p2_swerve"], true);
    }
}

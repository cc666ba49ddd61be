//! Active Matches
//!
//! Per-match lifecycle state owned by the server: the game instance, the
//! lifecycle status and the set of subscribed clients.

use crate::authoring::Game;
use crate::backend::server::ClientId;
use crate::protocol::{MatchStateData, MatchStatus};

/// A single playthrough of a game.
pub struct ActiveMatch {
    /// Server-generated slug identifying the match.
    pub match_id: String,
    /// Game this match was created under.
    pub game_id: String,
    /// The plug-in game instance.
    pub game: Box<dyn Game>,
    /// Lifecycle state; never regresses.
    pub state: MatchStatus,
    /// Clients receiving notifications for this match, in subscription
    /// order.
    pub subscribers: Vec<ClientId>,
}

impl ActiveMatch {
    /// Fresh match awaiting players.
    pub fn new(match_id: String, game_id: String, game: Box<dyn Game>) -> Self {
        ActiveMatch {
            match_id,
            game_id,
            game,
            state: MatchStatus::AwaitingPlayers,
            subscribers: Vec::new(),
        }
    }

    /// Seat a player and advance to `Ready` once the minimum count is
    /// reached. Returns the new player's seat id.
    pub fn add_player(&mut self, name: &str) -> usize {
        let player_id = self.game.seats_mut().seat(name);
        if self.state == MatchStatus::AwaitingPlayers
            && self.game.num_players() >= self.game.min_players()
        {
            self.state = MatchStatus::Ready;
        }
        player_id
    }

    /// Notification payload for the current state. `game-state` appears
    /// only once the match is in progress, `match-winner` only once it is
    /// done (`null` meaning a draw).
    pub fn state_data(&self) -> MatchStateData {
        let game_state = matches!(self.state, MatchStatus::InProgress | MatchStatus::Done)
            .then(|| self.game.game_state());
        let match_winner = (self.state == MatchStatus::Done)
            .then(|| self.game.winner().map(|p| p.name.clone()));

        MatchStateData {
            match_id: self.match_id.clone(),
            match_status: self.state,
            game_id: self.game_id.clone(),
            game_state,
            match_winner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoring::{ActionOutcome, GameError, Seats};
    use crate::protocol::JsonObject;

    struct Stub {
        seats: Seats,
        done: bool,
    }

    impl Stub {
        fn boxed(min: usize, max: usize) -> Box<dyn Game> {
            Box::new(Stub {
                seats: Seats::new(min, max),
                done: false,
            })
        }
    }

    impl Game for Stub {
        fn seats(&self) -> &Seats {
            &self.seats
        }
        fn seats_mut(&mut self) -> &mut Seats {
            &mut self.seats
        }
        fn done(&self) -> bool {
            self.done
        }
        fn winner(&self) -> Option<&crate::authoring::Player> {
            None
        }
        fn game_state(&self) -> JsonObject {
            JsonObject::new()
        }
        fn actions(&self) -> &'static [&'static str] {
            &[]
        }
        fn handle_action(
            &mut self,
            _action: &str,
            _player: usize,
            _data: &JsonObject,
        ) -> Result<ActionOutcome, GameError> {
            Ok(ActionOutcome::default())
        }
    }

    #[test]
    fn test_ready_at_min_players() {
        let mut m = ActiveMatch::new("a-b".into(), "stub".into(), Stub::boxed(2, 2));
        assert_eq!(m.state, MatchStatus::AwaitingPlayers);
        assert_eq!(m.add_player("Alex"), 0);
        assert_eq!(m.state, MatchStatus::AwaitingPlayers);
        assert_eq!(m.add_player("Sam"), 1);
        assert_eq!(m.state, MatchStatus::Ready);
    }

    #[test]
    fn test_ready_immediately_for_single_player_games() {
        let mut m = ActiveMatch::new("a-b".into(), "stub".into(), Stub::boxed(1, 4));
        m.add_player("Alex");
        assert_eq!(m.state, MatchStatus::Ready);
    }

    #[test]
    fn test_state_data_hides_game_state_until_started() {
        let mut m = ActiveMatch::new("a-b".into(), "stub".into(), Stub::boxed(2, 2));
        m.add_player("Alex");
        let data = m.state_data();
        assert_eq!(data.match_status, MatchStatus::AwaitingPlayers);
        assert!(data.game_state.is_none());
        assert!(data.match_winner.is_none());

        m.state = MatchStatus::InProgress;
        let data = m.state_data();
        assert!(data.game_state.is_some());
        assert!(data.match_winner.is_none());

        m.state = MatchStatus::Done;
        let data = m.state_data();
        assert!(data.game_state.is_some());
        // Stub has no winner: a draw, present and null.
        assert_eq!(data.match_winner, Some(None));
    }
}

//! Connect-M
//!
//! Drop pieces into columns of a gravity board; M contiguous pieces in a
//! row, column or diagonal win. The classic board is 6x7 with M = 4,
//! overridable through game options.

use serde_json::{json, Value};

use crate::authoring::{
    require_fields, ActionOutcome, Game, GameError, GameOptions, Player, Seats, Turns,
};
use crate::protocol::JsonObject;

/// Piece colors, assigned by seating order: player 0 red, player 1 yellow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceColor {
    /// Player one's pieces.
    Red,
    /// Player two's pieces.
    Yellow,
}

impl PieceColor {
    /// One-letter form used in serialized board state.
    pub const fn letter(self) -> &'static str {
        match self {
            PieceColor::Red => "R",
            PieceColor::Yellow => "Y",
        }
    }
}

/// A Connect-M board. Rows are indexed from the bottom.
pub struct ConnectMBoard {
    cells: Vec<Vec<Option<PieceColor>>>,
    top: Vec<usize>,
    nrows: usize,
    ncols: usize,
    m: usize,
    winner: Option<PieceColor>,
}

impl ConnectMBoard {
    /// Board with the given dimensions. Both dimensions must be at
    /// least `m`.
    pub fn new(nrows: usize, ncols: usize, m: usize) -> Self {
        debug_assert!(nrows >= m && ncols >= m);
        ConnectMBoard {
            cells: vec![vec![None; ncols]; nrows],
            top: vec![0; ncols],
            nrows,
            ncols,
            m,
            winner: None,
        }
    }

    /// Number of columns.
    pub fn num_cols(&self) -> usize {
        self.ncols
    }

    /// Whether a piece can be dropped into the column. Out-of-range
    /// columns simply cannot take a piece.
    pub fn can_drop(&self, col: usize) -> bool {
        col < self.ncols && self.top[col] < self.nrows
    }

    /// Whether dropping a piece of `color` into `col` would win, without
    /// actually dropping it.
    pub fn drop_wins(&mut self, col: usize, color: PieceColor) -> bool {
        if !self.can_drop(col) {
            return false;
        }
        // Tentatively place the piece, check, undo.
        let row = self.top[col];
        self.cells[row][col] = Some(color);
        let wins = self.winner_at(row, col);
        self.cells[row][col] = None;
        wins
    }

    /// Drop a piece. The caller must have checked [`ConnectMBoard::can_drop`].
    pub fn drop(&mut self, col: usize, color: PieceColor) {
        let row = self.top[col];
        self.cells[row][col] = Some(color);
        self.top[col] += 1;
        if self.winner_at(row, col) {
            self.winner = Some(color);
        }
    }

    /// The winning color, if any.
    pub fn winner(&self) -> Option<PieceColor> {
        self.winner
    }

    /// Whether play is over: somebody won or the board filled up.
    pub fn is_done(&self) -> bool {
        self.winner.is_some() || self.top.iter().all(|&t| t >= self.nrows)
    }

    /// Board as rows of `" "`, `"R"`, `"Y"`, top row first — suitable for
    /// JSON serialization.
    pub fn to_str_grid(&self) -> Vec<Vec<&'static str>> {
        self.cells
            .iter()
            .rev()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.map_or(" ", PieceColor::letter))
                    .collect()
            })
            .collect()
    }

    fn get(&self, row: i64, col: i64) -> Option<PieceColor> {
        if row < 0 || col < 0 || row as usize >= self.nrows || col as usize >= self.ncols {
            return None;
        }
        self.cells[row as usize][col as usize]
    }

    /// Whether the piece at (row, col) completes M in a row along any axis.
    fn winner_at(&self, row: usize, col: usize) -> bool {
        let origin = self.cells[row][col];
        if origin.is_none() {
            return false;
        }

        let count = |dr: i64, dc: i64| -> usize {
            let mut n = 0;
            let (mut r, mut c) = (row as i64, col as i64);
            for _ in 0..self.m - 1 {
                r += dr;
                c += dc;
                if self.get(r, c) == origin {
                    n += 1;
                } else {
                    break;
                }
            }
            n
        };

        // Row, column and the two diagonals through the piece.
        let axes = [(0, 1), (1, 0), (1, 1), (1, -1)];
        axes.iter()
            .any(|&(dr, dc)| count(dr, dc) + 1 + count(-dr, -dc) >= self.m)
    }
}

fn option_usize(options: &GameOptions, key: &str, default: usize) -> usize {
    options
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(default)
}

/// The Connect-M game. Two players, turn-based.
pub struct ConnectM {
    seats: Seats,
    turns: Turns,
    board: ConnectMBoard,
    started: bool,
}

impl ConnectM {
    /// New game. Options `nrows`, `ncols` and `m` override the classic
    /// 6x7-connect-4 board; dimensions smaller than `m` fall back to it.
    pub fn new(options: &GameOptions) -> Self {
        let nrows = option_usize(options, "nrows", 6);
        let ncols = option_usize(options, "ncols", 7);
        let m = option_usize(options, "m", 4);
        let board = if nrows >= m && ncols >= m && m >= 2 {
            ConnectMBoard::new(nrows, ncols, m)
        } else {
            ConnectMBoard::new(6, 7, 4)
        };

        ConnectM {
            seats: Seats::two_player(),
            turns: Turns::new(),
            board,
            started: false,
        }
    }

    /// Factory for server registration.
    pub fn factory(options: &GameOptions) -> Box<dyn Game> {
        Box::new(Self::new(options))
    }

    const fn color_of(player: usize) -> PieceColor {
        if player == 0 {
            PieceColor::Red
        } else {
            PieceColor::Yellow
        }
    }

    const fn seat_of(color: PieceColor) -> usize {
        match color {
            PieceColor::Red => 0,
            PieceColor::Yellow => 1,
        }
    }

    fn ensure_started(&self) -> Result<(), GameError> {
        if self.started {
            Ok(())
        } else {
            Err(GameError::incorrect_move("The match has not started yet"))
        }
    }

    fn handle_drop(&mut self, player: usize, data: &JsonObject) -> Result<ActionOutcome, GameError> {
        self.turns.require(player)?;
        require_fields(data, &["column"])?;
        self.ensure_started()?;

        let column = &data["column"];
        let Some(col) = column.as_i64() else {
            return Err(GameError::incorrect_action_data(format!(
                "Provided column is not an integer: {column}"
            )));
        };
        if col < 0 || col as usize >= self.board.num_cols() {
            return Err(GameError::incorrect_move(format!(
                "Incorrect column number: {col}"
            )));
        }
        let col = col as usize;
        if !self.board.can_drop(col) {
            return Err(GameError::incorrect_move(format!(
                "Cannot drop piece in column {col}"
            )));
        }

        self.board.drop(col, Self::color_of(player));
        self.turns.advance(self.num_players());

        let mut result = JsonObject::new();
        result.insert("column".to_string(), column.clone());
        Ok(ActionOutcome::changed(result))
    }

    fn handle_drop_info(&mut self, data: &JsonObject) -> Result<ActionOutcome, GameError> {
        require_fields(data, &[])?;
        self.ensure_started()?;

        let mut can_drop = Vec::new();
        let mut wins_yellow = Vec::new();
        let mut wins_red = Vec::new();
        for col in 0..self.board.num_cols() {
            can_drop.push(json!(self.board.can_drop(col)));
            wins_yellow.push(json!(self.board.drop_wins(col, PieceColor::Yellow)));
            wins_red.push(json!(self.board.drop_wins(col, PieceColor::Red)));
        }

        let mut result = JsonObject::new();
        result.insert("can_drop".to_string(), Value::Array(can_drop));
        result.insert(
            "drop_wins".to_string(),
            json!({"Y": wins_yellow, "R": wins_red}),
        );
        Ok(ActionOutcome::unchanged(result))
    }
}

impl Game for ConnectM {
    fn seats(&self) -> &Seats {
        &self.seats
    }

    fn seats_mut(&mut self) -> &mut Seats {
        &mut self.seats
    }

    fn on_start(&mut self) {
        self.started = true;
    }

    fn done(&self) -> bool {
        self.board.is_done()
    }

    fn winner(&self) -> Option<&Player> {
        self.board
            .winner()
            .and_then(|color| self.seats.get(Self::seat_of(color)))
    }

    fn game_state(&self) -> JsonObject {
        let mut players = JsonObject::new();
        for player in self.seats.iter() {
            players.insert(
                player.name.clone(),
                json!(Self::color_of(player.id).letter()),
            );
        }

        let turn = self
            .seats
            .get(self.turns.current())
            .map_or(Value::Null, |p| json!(p.name));

        let mut state = JsonObject::new();
        state.insert("turn".to_string(), turn);
        state.insert("players".to_string(), Value::Object(players));
        state.insert("board".to_string(), json!(self.board.to_str_grid()));
        state
    }

    fn actions(&self) -> &'static [&'static str] {
        &["drop", "drop_info"]
    }

    fn handle_action(
        &mut self,
        action: &str,
        player: usize,
        data: &JsonObject,
    ) -> Result<ActionOutcome, GameError> {
        match action {
            "drop" => self.handle_drop(player, data),
            "drop_info" => self.handle_drop_info(data),
            _ => Err(GameError::incorrect_action_data(format!(
                "Unhandled action: {action}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_game() -> ConnectM {
        let mut game = ConnectM::new(&GameOptions::new());
        game.seats_mut().seat("Alex");
        game.seats_mut().seat("Sam");
        game.on_start();
        game
    }

    fn drop_data(col: u64) -> JsonObject {
        let mut data = JsonObject::new();
        data.insert("column".to_string(), json!(col));
        data
    }

    #[test]
    fn test_board_vertical_win() {
        let mut board = ConnectMBoard::new(6, 7, 4);
        for _ in 0..3 {
            board.drop(0, PieceColor::Red);
        }
        assert!(board.winner().is_none());
        board.drop(0, PieceColor::Red);
        assert_eq!(board.winner(), Some(PieceColor::Red));
        assert!(board.is_done());
    }

    #[test]
    fn test_board_horizontal_win() {
        let mut board = ConnectMBoard::new(6, 7, 4);
        for col in 1..4 {
            board.drop(col, PieceColor::Yellow);
        }
        board.drop(4, PieceColor::Yellow);
        assert_eq!(board.winner(), Some(PieceColor::Yellow));
    }

    #[test]
    fn test_board_diagonal_win() {
        let mut board = ConnectMBoard::new(6, 7, 4);
        // Staircase: red at (0,0), (1,1), (2,2), (3,3).
        board.drop(0, PieceColor::Red);
        board.drop(1, PieceColor::Yellow);
        board.drop(1, PieceColor::Red);
        board.drop(2, PieceColor::Yellow);
        board.drop(2, PieceColor::Yellow);
        board.drop(2, PieceColor::Red);
        board.drop(3, PieceColor::Yellow);
        board.drop(3, PieceColor::Yellow);
        board.drop(3, PieceColor::Yellow);
        assert!(board.winner().is_none());
        board.drop(3, PieceColor::Red);
        assert_eq!(board.winner(), Some(PieceColor::Red));
    }

    #[test]
    fn test_board_full_is_done_without_winner() {
        use PieceColor::{Red as R, Yellow as Y};
        // 4x4 draw: paired columns of alternating colors leave every
        // row, column and diagonal short of four.
        let mut board = ConnectMBoard::new(4, 4, 4);
        let columns = [[R, Y, R, Y], [R, Y, R, Y], [Y, R, Y, R], [Y, R, Y, R]];
        for (col, pieces) in columns.iter().enumerate() {
            for piece in pieces {
                board.drop(col, *piece);
            }
        }
        assert!(board.winner().is_none());
        assert!(board.is_done());
    }

    #[test]
    fn test_drop_wins_is_side_effect_free() {
        let mut board = ConnectMBoard::new(6, 7, 4);
        for _ in 0..3 {
            board.drop(0, PieceColor::Red);
        }
        assert!(board.drop_wins(0, PieceColor::Red));
        assert!(!board.drop_wins(0, PieceColor::Yellow));
        // Probing must not place anything.
        assert!(board.winner().is_none());
        assert!(board.can_drop(0));
    }

    #[test]
    fn test_drop_action_and_turns() {
        let mut game = started_game();

        let outcome = game.handle_action("drop", 0, &drop_data(3)).unwrap();
        assert_eq!(outcome.result["column"], 3);
        assert!(outcome.state_changed);

        let err = game.handle_action("drop", 0, &drop_data(3)).unwrap_err();
        assert!(matches!(err, GameError::NotPlayerTurn(_)));

        game.handle_action("drop", 1, &drop_data(3)).unwrap();
        let state = game.game_state();
        assert_eq!(state["turn"], "Alex");
        assert_eq!(state["players"]["Alex"], "R");
        assert_eq!(state["players"]["Sam"], "Y");
        // Bottom row of the serialized grid is the last one.
        assert_eq!(state["board"][5][3], "R");
        assert_eq!(state["board"][4][3], "Y");
    }

    #[test]
    fn test_drop_rejects_bad_columns() {
        let mut game = started_game();

        let mut data = JsonObject::new();
        data.insert("column".to_string(), json!("three"));
        let err = game.handle_action("drop", 0, &data).unwrap_err();
        assert!(matches!(err, GameError::IncorrectActionData(_)));

        let err = game.handle_action("drop", 0, &drop_data(99)).unwrap_err();
        assert!(matches!(err, GameError::IncorrectMove(_)));
    }

    #[test]
    fn test_drop_rejects_full_column() {
        let mut game = started_game();
        for turn in 0..6 {
            game.handle_action("drop", turn % 2, &drop_data(0)).unwrap();
        }
        let err = game.handle_action("drop", 0, &drop_data(0)).unwrap_err();
        assert_eq!(err, GameError::incorrect_move("Cannot drop piece in column 0"));
    }

    #[test]
    fn test_drop_info_queries_each_color_independently() {
        let mut game = started_game();
        // Three reds stacked in column 0: a red drop wins, a yellow one
        // does not.
        game.handle_action("drop", 0, &drop_data(0)).unwrap();
        game.handle_action("drop", 1, &drop_data(6)).unwrap();
        game.handle_action("drop", 0, &drop_data(0)).unwrap();
        game.handle_action("drop", 1, &drop_data(6)).unwrap();
        game.handle_action("drop", 0, &drop_data(0)).unwrap();

        let info = game
            .handle_action("drop_info", 1, &JsonObject::new())
            .unwrap();
        assert!(!info.state_changed);
        assert_eq!(info.result["can_drop"][0], true);
        assert_eq!(info.result["drop_wins"]["R"][0], true);
        assert_eq!(info.result["drop_wins"]["Y"][0], false);
    }

    #[test]
    fn test_win_ends_game_with_winner() {
        let mut game = started_game();
        for _ in 0..3 {
            game.handle_action("drop", 0, &drop_data(0)).unwrap();
            game.handle_action("drop", 1, &drop_data(6)).unwrap();
        }
        game.handle_action("drop", 0, &drop_data(0)).unwrap();
        assert!(game.done());
        assert_eq!(game.winner().unwrap().name, "Alex");
    }

    #[test]
    fn test_custom_dimensions_from_options() {
        let mut options = GameOptions::new();
        options.insert("nrows".to_string(), json!(5));
        options.insert("ncols".to_string(), json!(5));
        options.insert("m".to_string(), json!(3));
        let game = ConnectM::new(&options);
        assert_eq!(game.board.num_cols(), 5);

        // Dimensions smaller than m fall back to the classic board.
        let mut bad = GameOptions::new();
        bad.insert("nrows".to_string(), json!(2));
        bad.insert("m".to_string(), json!(4));
        let game = ConnectM::new(&bad);
        assert_eq!(game.board.num_cols(), 7);
    }
}

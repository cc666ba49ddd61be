//! Built-in Example Games
//!
//! Games shipped with the server, plus the startup registry the binary
//! consults for `--load-game`.

pub mod chicken;
pub mod connectm;
pub mod p1wins;

pub use chicken::Chicken;
pub use connectm::{ConnectM, ConnectMBoard, PieceColor};
pub use p1wins::PlayerOneWins;

use crate::authoring::GameFactory;

/// Resolve a game name (optionally path-qualified, e.g.
/// `chimera::games::ConnectM`) against the built-in registry.
///
/// Returns `(game_id, factory, description)`: the id is the lower-cased
/// final path segment, the description the segment itself.
pub fn builtin(name: &str) -> Option<(String, GameFactory, String)> {
    let class_name = name
        .rsplit(|c: char| c == ':' || c == '.')
        .next()
        .unwrap_or(name);

    let factory: GameFactory = match class_name {
        "PlayerOneWins" => PlayerOneWins::factory,
        "Chicken" => Chicken::factory,
        "ConnectM" => ConnectM::factory,
        _ => return None,
    };

    Some((class_name.to_lowercase(), factory, class_name.to_string()))
}

/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{fmt, hash::Hash};

use anyhow::Result;
use chessie::{Color, Game, Move, PieceKind};

use crate::{PositionKey, Score};

/// One of the two players of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Side {
    White,
    Black,
}

impl From<Color> for Side {
    #[inline(always)]
    fn from(color: Color) -> Self {
        if color.is_white() {
            Self::White
        } else {
            Self::Black
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::White => write!(f, "w"),
            Self::Black => write!(f, "b"),
        }
    }
}

/// Whether a game is still in progress, and if not, how it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameStatus {
    /// The side-to-move has at least one legal move and no draw rule applies.
    Ongoing,

    /// The side-to-move is in check and has no legal moves.
    Checkmate,

    /// The side-to-move is not in check, but has no legal moves.
    Stalemate,

    /// The game is drawn by rule (fifty moves, insufficient material).
    Draw,
}

impl GameStatus {
    /// Returns `true` if the game has ended.
    #[inline(always)]
    pub const fn is_over(&self) -> bool {
        !matches!(self, Self::Ongoing)
    }

    /// The score of a finished game from the side-to-move's perspective, `ply` plies from the root.
    ///
    /// Being mated sooner is worse, so mate scores shrink in magnitude with distance from the root.
    #[inline(always)]
    pub fn score(&self, ply: i32) -> Score {
        match self {
            Self::Checkmate => -Score::MATE + ply,
            Self::Ongoing | Self::Stalemate | Self::Draw => Score::DRAW,
        }
    }
}

/// The rules of a two-player, perfect-information game, as consumed by the search.
///
/// Positions are applied copy-make: [`Rules::play`] returns a new position and never alters `self`,
/// so a position handed to the search is never observably changed, however the search exits.
pub trait Rules: Clone + Send + Sync + 'static {
    /// A move in this game.
    type Move: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// All legal moves available to the side-to-move.
    fn legal_moves(&self) -> Result<Vec<Self::Move>>;

    /// Returns a copy of this position with `mv` applied.
    fn play(&self, mv: Self::Move) -> Self;

    /// Returns `true` if `mv` captures an enemy piece.
    fn is_capture(&self, mv: Self::Move) -> bool;

    /// Returns `true` if playing `mv` puts the opponent in check.
    fn gives_check(&self, mv: Self::Move) -> bool;

    /// Determines whether the game is over, given the legal moves available in this position.
    fn status(&self, legal_moves: &[Self::Move]) -> GameStatus;

    /// The side whose turn it is.
    fn side(&self) -> Side;

    /// The key identifying this position in the transposition table.
    fn position_key(&self) -> PositionKey;
}

impl Rules for Game {
    type Move = Move;

    #[inline(always)]
    fn legal_moves(&self) -> Result<Vec<Move>> {
        Ok(self.get_legal_moves().into_iter().collect())
    }

    #[inline(always)]
    fn play(&self, mv: Move) -> Self {
        self.with_move_made(mv)
    }

    #[inline(always)]
    fn is_capture(&self, mv: Move) -> bool {
        mv.is_capture()
    }

    #[inline(always)]
    fn gives_check(&self, mv: Move) -> bool {
        self.with_move_made(mv).is_in_check()
    }

    fn status(&self, legal_moves: &[Move]) -> GameStatus {
        if legal_moves.is_empty() {
            if self.is_in_check() {
                GameStatus::Checkmate
            } else {
                GameStatus::Stalemate
            }
        } else if self.halfmove() >= 100 || has_insufficient_material(self) {
            GameStatus::Draw
        } else {
            GameStatus::Ongoing
        }
    }

    #[inline(always)]
    fn side(&self) -> Side {
        self.side_to_move().into()
    }

    #[inline(always)]
    fn position_key(&self) -> PositionKey {
        PositionKey::new(self.key().inner(), self.side())
    }
}

/// Returns `true` if neither side can possibly deliver mate: bare Kings, or a single minor piece.
fn has_insufficient_material(game: &Game) -> bool {
    let heavy_or_pawns = game.kind(PieceKind::Queen).population()
        + game.kind(PieceKind::Rook).population()
        + game.kind(PieceKind::Pawn).population();

    let minors =
        game.kind(PieceKind::Knight).population() + game.kind(PieceKind::Bishop).population();

    heavy_or_pawns == 0 && minors <= 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play_uci(game: &Game, moves: &[&str]) -> Game {
        moves.iter().fold(*game, |game, mv| {
            let mv = Move::from_uci(&game, mv).unwrap();
            game.play(mv)
        })
    }

    #[test]
    fn test_transpositions_share_a_key() {
        let start = Game::default();
        let a = play_uci(&start, &["g1f3", "g8f6", "b1c3"]);
        let b = play_uci(&start, &["b1c3", "g8f6", "g1f3"]);

        assert_eq!(a.position_key(), b.position_key());
        assert_ne!(a.position_key(), start.position_key());
    }

    #[test]
    fn test_side_to_move_is_part_of_the_key() {
        let game = Game::default();
        let mut flipped = game;
        flipped.toggle_side_to_move();

        assert_eq!(game.side(), Side::White);
        assert_eq!(flipped.side(), Side::Black);
        assert_ne!(game.position_key(), flipped.position_key());
    }

    #[test]
    fn test_play_leaves_original_untouched() {
        let game = Game::default();
        let fen = game.to_fen();
        let mv = Move::from_uci(&game, "e2e4").unwrap();

        let after = game.play(mv);
        assert_eq!(game.to_fen(), fen);
        assert_ne!(after.to_fen(), fen);
    }

    #[test]
    fn test_checkmate_status() {
        // Fool's mate
        let game: Game = "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3"
            .parse()
            .unwrap();
        let moves = game.legal_moves().unwrap();

        assert!(moves.is_empty());
        assert_eq!(game.status(&moves), GameStatus::Checkmate);
        assert_eq!(game.status(&moves).score(0), -Score::MATE);
    }

    #[test]
    fn test_stalemate_status() {
        let game: Game = "k7/8/KQ6/8/8/8/8/8 b - - 0 1".parse().unwrap();
        let moves = game.legal_moves().unwrap();

        assert_eq!(game.status(&moves), GameStatus::Stalemate);
        assert_eq!(game.status(&moves).score(5), Score::DRAW);
    }

    #[test]
    fn test_insufficient_material_is_a_draw() {
        let game: Game = "8/4k3/2n5/8/3K4/8/8/8 w - - 0 1".parse().unwrap();
        let moves = game.legal_moves().unwrap();

        assert!(!moves.is_empty());
        assert_eq!(game.status(&moves), GameStatus::Draw);
    }

    #[test]
    fn test_captures_and_checks() {
        let game: Game = "4k3/8/8/3p4/4P3/8/8/4K2R w K - 0 1".parse().unwrap();

        let capture = Move::from_uci(&game, "e4d5").unwrap();
        assert!(game.is_capture(capture));
        assert!(!game.gives_check(capture));

        let quiet = Move::from_uci(&game, "e4e5").unwrap();
        assert!(!game.is_capture(quiet));

        let check = Move::from_uci(&game, "h1h8").unwrap();
        assert!(game.gives_check(check));
    }
}

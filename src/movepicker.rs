/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use chessie::{
    bishop_attacks, king_attacks, knight_attacks, pawn_attacks, rook_attacks, Color, Game, Move,
    Piece, PieceKind, Square,
};

use crate::{endgame_weight, value_of, Rules};

/// Base bonus for capturing a piece at least as valuable as the capturer.
const GOOD_CAPTURE_BONUS: i32 = 20_000;

/// Base bonus for capturing a piece less valuable than the capturer.
const LOSING_CAPTURE_BONUS: i32 = 2_500;

/// Bonus for a move that puts the opponent in check.
const CHECK_BONUS: i32 = 10_000;

/// Bonus for castling.
const CASTLE_BONUS: i32 = 5_000;

/// Bonus for landing on one of the four central squares.
const CENTER_BONUS: i32 = 1_000;

/// Bonus for landing on the ring of squares around the center.
const EXTENDED_CENTER_BONUS: i32 = 250;

/// Penalty for retreating a developed piece during the opening.
const RETREAT_PENALTY: i32 = -2_000;

/// Penalty for moving the Queen during the opening while the minor pieces are still at home.
const EARLY_QUEEN_PENALTY: i32 = -3_000;

/// Penalty for every enemy piece attacking the square a piece lands on.
const ATTACKED_SQUARE_PENALTY: i32 = -1_500;

/// Positions whose endgame weight is at or below this are considered to be in the opening.
const OPENING_ENDGAME_WEIGHT: i32 = 10;

/// Assigns priorities to the moves of a position, so that the most promising are searched first.
///
/// Ordering only affects how quickly the search prunes; it never changes a backed-up score.
/// Implementations must be deterministic: the same position and move always yield the same priority.
pub trait MoveOrderer<R: Rules>: Send + Sync + 'static {
    /// The priority of playing `mv` in `position`. Higher is searched first.
    fn priority(&self, position: &R, mv: R::Move) -> i32;

    /// Scores every move in `moves`, returning a [`MovePicker`] that yields them in descending priority.
    ///
    /// Moves of equal priority are yielded in the order they were given.
    fn order(&self, position: &R, moves: Vec<R::Move>) -> MovePicker<R::Move> {
        let scores = moves.iter().map(|&mv| self.priority(position, mv)).collect();
        MovePicker::new(moves, scores)
    }
}

/// Lazily yields moves by descending score, via selection.
///
/// Since a cutoff often happens within the first few moves, only the moves actually visited are ever sorted.
#[derive(Debug, Clone)]
pub struct MovePicker<M> {
    moves: Vec<M>,
    scores: Vec<i32>,
    current: usize,
}

impl<M: Copy> MovePicker<M> {
    /// Creates a new [`MovePicker`] over `moves`, where `scores[i]` is the priority of `moves[i]`.
    pub fn new(moves: Vec<M>, scores: Vec<i32>) -> Self {
        debug_assert_eq!(moves.len(), scores.len());
        Self {
            moves,
            scores,
            current: 0,
        }
    }
}

impl<M: Copy> Iterator for MovePicker<M> {
    type Item = (M, i32);

    fn next(&mut self) -> Option<Self::Item> {
        // No more moves left
        if self.current >= self.moves.len() {
            return None;
        }

        // Find the index of the next highest score, preferring the earliest among equals
        let mut best_index = self.current;
        let mut best_score = self.scores[best_index];

        for i in (self.current + 1)..self.moves.len() {
            if self.scores[i] > best_score {
                best_index = i;
                best_score = self.scores[i];
            }
        }

        // Rotate rather than swap, so the skipped moves keep their relative order
        if best_index != self.current {
            self.moves[self.current..=best_index].rotate_right(1);
            self.scores[self.current..=best_index].rotate_right(1);
        }

        let mv = self.moves[self.current];
        let score = self.scores[self.current];

        // Increment for next call
        self.current += 1;

        Some((mv, score))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.moves.len() - self.current;
        (remaining, Some(remaining))
    }
}

impl<M: Copy> ExactSizeIterator for MovePicker<M> {}

/// Chess move ordering heuristics.
///
/// Highest first: good captures ([MVV-LVA](https://www.chessprogramming.org/MVV-LVA)),
/// checks, castling, and moves to the center. Moving onto a square the opponent attacks is
/// penalized once per attacker. In the opening, retreating a developed piece
/// and moving the Queen before the minor pieces are penalized.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicOrderer;

impl HeuristicOrderer {
    /// Bonus for a capture, scaled by how favorable the trade is.
    #[inline(always)]
    fn capture_bonus(game: &Game, mv: Move, attacker: PieceKind) -> i32 {
        let victim = if mv.is_en_passant() {
            value_of(PieceKind::Pawn)
        } else {
            game.piece_at(mv.to())
                .map(|victim| value_of(victim.kind()))
                .unwrap_or_default()
        };
        let attacker = value_of(attacker);

        if victim >= attacker {
            GOOD_CAPTURE_BONUS + 10 * victim - attacker
        } else {
            // Losing material: penalize by one and a half times the deficit
            LOSING_CAPTURE_BONUS + 10 * victim - attacker - 3 * (attacker - victim) / 2
        }
    }

    /// Bonus for landing on the center of the board.
    #[inline(always)]
    fn center_bonus(square: Square) -> i32 {
        let file = square.index() % 8;
        let rank = square.index() / 8;

        if (3..=4).contains(&file) && (3..=4).contains(&rank) {
            CENTER_BONUS
        } else if (2..=5).contains(&file) && (2..=5).contains(&rank) {
            EXTENDED_CENTER_BONUS
        } else {
            0
        }
    }

    /// Penalties that only apply in the opening.
    fn opening_penalty(game: &Game, mv: Move, piece: Piece) -> i32 {
        let color = piece.color();
        let mut penalty = 0;

        let from_rank = relative_rank(mv.from(), color);
        let to_rank = relative_rank(mv.to(), color);

        // A piece off its home rank is considered developed
        let is_piece = !matches!(piece.kind(), PieceKind::Pawn | PieceKind::King);
        if is_piece && from_rank > 0 && to_rank < from_rank {
            penalty += RETREAT_PENALTY;
        }

        if piece.kind() == PieceKind::Queen && undeveloped_minors(game, color) >= 2 {
            penalty += EARLY_QUEEN_PENALTY;
        }

        penalty
    }
}

impl MoveOrderer<Game> for HeuristicOrderer {
    fn priority(&self, game: &Game, mv: Move) -> i32 {
        // Can't move unless there's a piece at `from`, but there's no reason to panic over it
        let Some(piece) = game.piece_at(mv.from()) else {
            return 0;
        };

        let after = game.with_move_made(mv);
        let mut score = 0;

        if mv.is_capture() {
            score += Self::capture_bonus(game, mv, piece.kind());
        }

        if after.is_in_check() {
            score += CHECK_BONUS;
        }

        if mv.is_short_castle() || mv.is_long_castle() {
            score += CASTLE_BONUS;
        } else {
            let attackers = attackers_of(&after, mv.to(), piece.color().opponent());
            score += Self::center_bonus(mv.to()) + ATTACKED_SQUARE_PENALTY * attackers as i32;
        }

        if endgame_weight(game) <= OPENING_ENDGAME_WEIGHT {
            score += Self::opening_penalty(game, mv, piece);
        }

        score
    }
}

/// Leaves moves in the order the rules engine generated them.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unordered;

impl<R: Rules> MoveOrderer<R> for Unordered {
    #[inline(always)]
    fn priority(&self, _position: &R, _mv: R::Move) -> i32 {
        0
    }
}

/// Rank of `square` counted from `color`'s back rank, in `[0, 7]`.
#[inline(always)]
fn relative_rank(square: Square, color: Color) -> usize {
    square.rank_relative_to(color).index() / 8
}

/// Number of `color`'s pieces attacking `square`.
fn attackers_of(game: &Game, square: Square, color: Color) -> u8 {
    let blockers = game.occupied();
    let diagonals = game.kind(PieceKind::Bishop) | game.kind(PieceKind::Queen);
    let orthogonals = game.kind(PieceKind::Rook) | game.kind(PieceKind::Queen);

    // A pawn of `color` attacks `square` from wherever an opposing pawn on `square` would attack
    let attackers = (pawn_attacks(square, color.opponent()) & game.kind(PieceKind::Pawn))
        | (knight_attacks(square) & game.kind(PieceKind::Knight))
        | (king_attacks(square) & game.kind(PieceKind::King))
        | (bishop_attacks(square, blockers) & diagonals)
        | (rook_attacks(square, blockers) & orthogonals);

    (attackers & game.color(color)).population()
}

/// Number of `color`'s Knights and Bishops still standing on their back rank.
fn undeveloped_minors(game: &Game, color: Color) -> usize {
    Square::iter()
        .filter(|&square| relative_rank(square, color) == 0)
        .filter_map(|square| game.piece_at(square))
        .filter(|piece| {
            piece.color() == color
                && matches!(piece.kind(), PieceKind::Knight | PieceKind::Bishop)
        })
        .count()
}

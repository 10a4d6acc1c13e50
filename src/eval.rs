/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use anyhow::Result;
use chessie::{Board, Color, File, Game, PieceKind, Rank, Square};

use crate::{Psqt, Score};

/// Initial material value of all pieces in a standard setup.
const INITIAL_MATERIAL_VALUE: i32 = value_of(PieceKind::Pawn) * 16
    + value_of(PieceKind::Knight) * 4
    + value_of(PieceKind::Bishop) * 4
    + value_of(PieceKind::Rook) * 4
    + value_of(PieceKind::Queen) * 2;

/// Encapsulates the logic of scoring a position of `R`.
///
/// Positions must be evaluated from the side-to-move's perspective.
/// That is, if it is Black's turn, a "good" evaluation for Black will be a positive number.
///
/// Evaluation may fail. A failure is treated as a fault in whichever search task triggered it,
/// and never as a real score.
pub trait Evaluator<R>: Send + Sync + 'static {
    /// Evaluate `position` from the side-to-move's perspective.
    fn evaluate(&self, position: &R) -> Result<Score>;
}

/// Scores a position by counting material only.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialEval;

impl Evaluator<Game> for MaterialEval {
    fn evaluate(&self, game: &Game) -> Result<Score> {
        let stm = game.side_to_move();

        let score = PieceKind::all_except_king()
            .into_iter()
            .fold(0, |score, kind| {
                let ours = game.piece_parts(stm, kind).population() as i32;
                let theirs = game.piece_parts(stm.opponent(), kind).population() as i32;
                score + (ours - theirs) * value_of(kind)
            });

        Ok(Score(score))
    }
}

/// Scores a position with [PeSTO](https://www.chessprogramming.org/PeSTO%27s_Evaluation_Function)'s
/// material and Piece-Square Tables, tapered between middle-game and end-game values.
#[derive(Debug, Clone, Copy, Default)]
pub struct PsqtEval;

impl PsqtEval {
    /// Evaluate `game` from `color`'s perspective.
    fn eval_for(game: &Game, color: Color) -> Score {
        // By default, both scores are draws.
        let mut mg = Score::DRAW;
        let mut eg = Score::DRAW;

        // Iterate over every occupied square
        for (square, piece) in game.board() {
            let (mg_psqt_score, eg_psqt_score) = Psqt::evals(piece, square);

            // Flip scores appropriately to evaluate from `color`'s perspective
            if color == piece.color() {
                mg += mg_psqt_score;
                eg += eg_psqt_score;
            } else {
                mg -= mg_psqt_score;
                eg -= eg_psqt_score;
            }
        }

        mg.lerp(eg, endgame_weight(game))
    }
}

impl Evaluator<Game> for PsqtEval {
    #[inline(always)]
    fn evaluate(&self, game: &Game) -> Result<Score> {
        Ok(Self::eval_for(game, game.side_to_move()))
    }
}

/// Renders a board with each piece's (tapered) Piece-Square value, for the `eval` command.
#[derive(Debug, Clone, Copy)]
pub struct EvalBreakdown<'a> {
    /// The game whose position to display.
    game: &'a Game,

    /// Percentage of game completion, in the range `[0, 100]`.
    endgame_weight: i32,
}

impl<'a> EvalBreakdown<'a> {
    /// Construct a new [`EvalBreakdown`], computing the endgame weight of `game`.
    pub fn new(game: &'a Game) -> Self {
        Self {
            game,
            endgame_weight: endgame_weight(game),
        }
    }

    /// Fetches the value for the piece on the specified square, if one exists, from White's perspective.
    #[inline(always)]
    fn value_at(&self, square: Square) -> Option<Score> {
        self.game.piece_at(square).map(|piece| {
            Psqt::eval(piece, square, self.endgame_weight)
                * piece.color().negation_multiplier() as i32
        })
    }
}

impl fmt::Display for EvalBreakdown<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let color = self.game.side_to_move();

        write!(f, "  +")?;
        for _ in File::iter() {
            write!(f, "-----+")?;
        }
        writeln!(f)?;

        for rank in Rank::iter().rev() {
            write!(f, "{rank} |")?;

            // Piece chars
            for file in File::iter() {
                let piece = self.game.piece_at(Square::new(file, rank));
                let piece_char = piece.map(|p| p.char()).unwrap_or(' ');
                write!(f, "  {piece_char}  |")?;
            }
            writeln!(f)?;
            write!(f, "  |")?;

            // Their contributions
            for file in File::iter() {
                let score = match self.value_at(Square::new(file, rank)) {
                    Some(val) if val > Score::DRAW => format!("+{}", val.normalize()),
                    Some(val) => format!("{}", val.normalize()),
                    None => String::new(),
                };
                write!(f, "{score:^5}|")?;
            }
            writeln!(f)?;

            write!(f, "  +")?;
            for _ in File::iter() {
                write!(f, "-----+")?;
            }
            writeln!(f)?;
        }
        for file in File::iter() {
            write!(f, "     {file}")?;
        }

        let score = PsqtEval::eval_for(self.game, color);

        let winning_side = if score > Score::DRAW {
            Some(color)
        } else if score < Score::DRAW {
            Some(color.opponent())
        } else {
            None
        };

        writeln!(f, "\n\nEndgame: {}%", self.endgame_weight)?;
        writeln!(
            f,
            "Winning side: {}",
            winning_side.map(|c| c.name()).unwrap_or("N/A")
        )?;
        writeln!(f, "Score: {score}")?;

        Ok(())
    }
}

/// Returns a value of the provided `PieceKind`.
///
/// Values are obtained from here: <https://www.chessprogramming.org/Simplified_Evaluation_Function>
#[inline(always)]
pub const fn value_of(kind: PieceKind) -> i32 {
    match kind {
        PieceKind::Pawn => 100,
        PieceKind::Knight => 320,
        PieceKind::Bishop => 330,
        PieceKind::Rook => 500,
        PieceKind::Queen => 900,
        PieceKind::King => 0, // King is invaluable, but 0 is easier to work with in computations
    }
}

/// Counts the material value of all pieces on the board
///
/// Does NOT count the material of the King, as it cannot be removed from the board.
#[inline(always)]
fn material_remaining(board: &Board) -> i32 {
    PieceKind::all_except_king()
        .into_iter()
        .fold(0, |score, kind| {
            score + board.kind(kind).population() as i32 * value_of(kind)
        })
}

/// Fraction of the starting material that has left the board, as an `i32` in the range `[0, 100]`.
///
/// Lower numbers are closer to the beginning of the game. Higher numbers are closer to the end of the game.
#[inline(always)]
pub fn endgame_weight(board: &Board) -> i32 {
    let remaining = INITIAL_MATERIAL_VALUE - material_remaining(board);
    (remaining * 100 / INITIAL_MATERIAL_VALUE).clamp(0, 100)
}

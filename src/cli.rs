/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{SearchConfig, TieBreak, FEN_STARTPOS};

/// A time-bounded, parallel alpha-beta chess search engine.
#[derive(Debug, Clone, Parser)]
#[command(version, about, rename_all = "lower")]
pub struct Cli {
    #[command(subcommand)]
    pub command: EngineCommand,
}

/// A command to be executed by the engine.
#[derive(Debug, Clone, Subcommand)]
#[command(rename_all = "lower")]
pub enum EngineCommand {
    /// Search a position for the best move within a time budget.
    #[command(alias = "go")]
    Search {
        /// FEN of the position to search.
        #[arg(short, long, default_value = FEN_STARTPOS)]
        fen: String,

        /// Time budget, in milliseconds.
        #[arg(short, long, default_value_t = 1_000)]
        movetime: u64,

        /// Maximum depth to search to.
        #[arg(short, long)]
        depth: Option<u8>,

        #[command(flatten)]
        options: SearchOptions,
    },

    /// Print a static evaluation of a position.
    Eval {
        /// FEN of the position to evaluate.
        #[arg(short, long, default_value = FEN_STARTPOS)]
        fen: String,

        /// The evaluator to use.
        #[arg(short, long, value_enum, default_value_t = EvalKind::Psqt)]
        evaluator: EvalKind,

        /// If set, each piece's contribution will be printed on the board.
        #[arg(short, long, default_value = "false")]
        pretty: bool,
    },

    /// List the legal moves of a position in the order they would be searched, with their priorities.
    Order {
        /// FEN of the position whose moves to order.
        #[arg(short, long, default_value = FEN_STARTPOS)]
        fen: String,
    },

    /// Run fixed-depth searches over a suite of positions, reporting nodes and speed.
    Bench {
        /// Override the default benchmark depth.
        #[arg(short, long)]
        depth: Option<u8>,

        /// If set, the benchmarking results will be printed in a well-formatted table.
        #[arg(short, long, default_value = "false")]
        pretty: bool,

        #[command(flatten)]
        options: SearchOptions,
    },
}

/// Options shared by every command that runs a search.
#[derive(Debug, Clone, Args)]
pub struct SearchOptions {
    /// Number of worker threads [default: available cores, at most 8].
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// How to choose between equally-scored moves.
    #[arg(long, value_enum, default_value_t = TieBreakKind::First)]
    pub tie_break: TieBreakKind,

    /// Seed for `--tie-break random`.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// The evaluator to use.
    #[arg(short, long, value_enum, default_value_t = EvalKind::Psqt)]
    pub evaluator: EvalKind,

    /// The move ordering to use.
    #[arg(short, long, value_enum, default_value_t = OrderKind::Heuristic)]
    pub orderer: OrderKind,

    /// Stop deepening once this fraction of the budget has been used.
    #[arg(long)]
    pub soft_fraction: Option<f64>,
}

impl SearchOptions {
    /// Builds a [`SearchConfig`] from these options, leaving unset fields at their defaults.
    pub fn config(&self, max_depth: Option<u8>) -> SearchConfig {
        let mut config = SearchConfig::default();

        if let Some(threads) = self.threads {
            config.threads = threads;
        }

        if let Some(depth) = max_depth {
            config.max_depth = depth;
        }

        if let Some(fraction) = self.soft_fraction {
            config.soft_fraction = fraction;
        }

        config.tie_break = match self.tie_break {
            TieBreakKind::First => TieBreak::FirstFound,
            TieBreakKind::Random => TieBreak::Random { seed: self.seed },
        };

        config.validated()
    }
}

/// Evaluators selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EvalKind {
    /// Material only.
    Material,

    /// Tapered material and Piece-Square Tables.
    Psqt,
}

/// Move orderings selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrderKind {
    /// Captures, checks, castling, and central moves first.
    Heuristic,

    /// Whatever order the move generator produced.
    None,
}

/// Tie-break policies selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TieBreakKind {
    /// The first of the tied moves, in search order.
    First,

    /// A random one of the tied moves.
    Random,
}

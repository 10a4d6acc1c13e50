/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Command-line interface.
mod cli;

/// Iterative deepening over a worker pool, bounded by a deadline.
mod coordinator;

/// Executes commands from the command line.
mod engine;

/// Evaluation of chess positions.
mod eval;

/// Hashable identity of a position.
mod key;

/// Move ordering.
mod movepicker;

/// A fixed-size pool of worker threads.
mod pool;

/// Piece-Square Tables.
mod psqt;

/// The interface between the search and the rules of the game.
mod rules;

/// Centipawn and mate scores.
mod score;

/// Alpha-beta and quiescence search of a single subtree.
mod search;

/// Transposition table, shared between concurrent searches.
mod ttable;

/// Misc utility functions, constants, and types.
mod utils;

pub use cli::*;
pub use coordinator::*;
pub use engine::*;
pub use eval::*;
pub use key::*;
pub use movepicker::*;
pub use pool::*;
pub use psqt::*;
pub use rules::*;
pub use score::*;
pub use search::*;
pub use ttable::*;
pub use utils::*;

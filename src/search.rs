/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
    marker::PhantomData,
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

use thiserror::Error;

use crate::{Evaluator, MoveOrderer, PositionKey, Rules, Score, TTable};

/// Default number of plies the quiescence search may extend past the main search.
pub const DEFAULT_QSEARCH_CEILING: usize = 16;

/// Reasons a search can stop before producing a score.
///
/// Neither is ever turned into a fabricated score: an interrupted branch reports no result at all.
#[derive(Debug, Error)]
pub enum Interrupt {
    /// The deadline passed, or the search was told to stop.
    #[error("search deadline exceeded")]
    DeadlineExceeded,

    /// The rules engine or evaluator failed.
    #[error("search faulted: {0:#}")]
    Fault(#[from] anyhow::Error),
}

/// Executes a depth-bounded [negamax](https://www.chessprogramming.org/Negamax) search
/// with [alpha-beta pruning](https://www.chessprogramming.org/Alpha-Beta) on positions of `R`.
///
/// One [`Search`] belongs to one search task and is only ever driven by one thread.
/// Positions are copied when moves are applied, so the position handed to the search is never altered.
pub struct Search<'a, R, E, O> {
    /// Cache of exact scores, shared with every other task of the same top-level search.
    ttable: &'a TTable,

    /// Scores leaf positions.
    evaluator: &'a E,

    /// Decides the order in which moves are visited.
    orderer: &'a O,

    /// Hard limit on search time.
    ///
    /// At *any* point in the search, if this limit is reached, the search will cancel.
    deadline: Instant,

    /// Raised by the coordinator once it no longer wants this task's result.
    stop: &'a AtomicBool,

    /// Maximum number of plies quiescence search may extend past a leaf.
    qsearch_ceiling: usize,

    /// Number of nodes searched.
    nodes: u64,

    _rules: PhantomData<fn(&R)>,
}

impl<'a, R, E, O> Search<'a, R, E, O>
where
    R: Rules,
    E: Evaluator<R>,
    O: MoveOrderer<R>,
{
    /// Construct a new [`Search`] that will give up once `deadline` passes or `stop` is raised.
    pub fn new(
        ttable: &'a TTable,
        evaluator: &'a E,
        orderer: &'a O,
        deadline: Instant,
        stop: &'a AtomicBool,
    ) -> Self {
        Self {
            ttable,
            evaluator,
            orderer,
            deadline,
            stop,
            qsearch_ceiling: DEFAULT_QSEARCH_CEILING,
            nodes: 0,
            _rules: PhantomData,
        }
    }

    /// Sets the maximum number of plies quiescence search may extend past a leaf.
    pub fn with_qsearch_ceiling(mut self, ceiling: usize) -> Self {
        self.qsearch_ceiling = ceiling;
        self
    }

    /// Number of nodes searched so far.
    #[inline(always)]
    pub fn nodes(&self) -> u64 {
        self.nodes
    }

    /// Search `position`, which lies `ply` plies below the root, to `depth` with a full window.
    ///
    /// The score is from the perspective of the side-to-move in `position`.
    pub fn search(&mut self, position: &R, depth: u8, ply: i32) -> Result<Score, Interrupt> {
        self.negamax(position, depth, ply, -Score::INF, Score::INF)
    }

    /// Primary location of search logic.
    ///
    /// Uses the [negamax](https://www.chessprogramming.org/Negamax) algorithm in a fail-soft framework.
    pub fn negamax(
        &mut self,
        position: &R,
        depth: u8,
        ply: i32,
        mut alpha: Score,
        beta: Score,
    ) -> Result<Score, Interrupt> {
        self.check_limits()?;

        // The table holds exact scores only, so any sufficiently deep entry can be returned as-is
        let key = position.position_key();
        if let Some(entry) = self.ttable.get(&key, depth) {
            return Ok(entry.score.absolute(ply));
        }

        // Leaves are handed off to quiescence, which does its own terminal check
        if depth == 0 {
            let score = self.quiescence(position, ply, alpha, beta)?;
            self.store(key, depth, ply, score, alpha, beta);
            return Ok(score);
        }

        self.nodes += 1;

        let moves = position.legal_moves()?;

        // Finished games are scored the same regardless of remaining depth
        let status = position.status(&moves);
        if status.is_over() {
            return Ok(status.score(ply));
        }

        let original_alpha = alpha;

        // Start with a *really bad* initial score
        let mut best = -Score::INF;

        for (mv, _) in self.orderer.order(position, moves) {
            // Copy-make the new position
            let child = position.play(mv);

            let score = -self.negamax(&child, depth - 1, ply + 1, -beta, -alpha)?;

            if score > best {
                best = score;
            }

            if score > alpha {
                alpha = score;
            }

            // Fail high
            if alpha >= beta {
                break;
            }
        }

        self.store(key, depth, ply, best, original_alpha, beta);

        Ok(best)
    }

    /// Search only captures until the position is quiet, to avoid stopping in the middle of an exchange.
    ///
    /// See [Quiescence Search](https://www.chessprogramming.org/Quiescence_Search). This is fail-hard:
    /// the result is always within `[alpha, beta]`.
    pub fn quiescence(
        &mut self,
        position: &R,
        ply: i32,
        alpha: Score,
        beta: Score,
    ) -> Result<Score, Interrupt> {
        self.qsearch(position, 0, ply, alpha, beta)
    }

    fn qsearch(
        &mut self,
        position: &R,
        qdepth: usize,
        ply: i32,
        mut alpha: Score,
        beta: Score,
    ) -> Result<Score, Interrupt> {
        self.check_limits()?;
        self.nodes += 1;

        let moves = position.legal_moves()?;

        let status = position.status(&moves);
        if status.is_over() {
            return Ok(status.score(ply));
        }

        let stand_pat = self.evaluator.evaluate(position)?;

        // The opponent would never have allowed this position
        if stand_pat >= beta {
            return Ok(beta);
        }

        if stand_pat > alpha {
            alpha = stand_pat;
        }

        if qdepth >= self.qsearch_ceiling {
            return Ok(alpha);
        }

        let captures = moves
            .into_iter()
            .filter(|&mv| position.is_capture(mv))
            .collect();

        for (mv, _) in self.orderer.order(position, captures) {
            let child = position.play(mv);

            let score = -self.qsearch(&child, qdepth + 1, ply + 1, -beta, -alpha)?;

            if score >= beta {
                return Ok(beta);
            }

            if score > alpha {
                alpha = score;
            }
        }

        Ok(alpha)
    }

    /// Write `score` to the table, but only if it is exact with respect to the window it was searched with.
    #[inline(always)]
    fn store(&self, key: PositionKey, depth: u8, ply: i32, score: Score, alpha: Score, beta: Score) {
        if alpha < score && score < beta {
            self.ttable.put(key, depth, score.relative(ply));
        }
    }

    /// Checks whether the search must stop.
    #[inline(always)]
    fn check_limits(&self) -> Result<(), Interrupt> {
        if self.stop.load(Ordering::Relaxed) || Instant::now() >= self.deadline {
            Err(Interrupt::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}

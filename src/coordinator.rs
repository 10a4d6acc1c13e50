/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
    any::Any,
    fmt,
    marker::PhantomData,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use chessie::{Game, Move};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    Evaluator, GameStatus, HeuristicOrderer, Interrupt, MoveOrderer, PsqtEval, Rules, Score,
    Search, TTable, WorkerPool, DEFAULT_QSEARCH_CEILING, MAX_DEPTH, MAX_THREADS,
};

/// Stand-in for an "infinite" budget, since an [`Instant`] cannot be arbitrarily far in the future.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// How to choose between root moves that share the best score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TieBreak {
    /// Keep the tied move that was dispatched first at that depth.
    ///
    /// Dispatch order is fixed before any task runs, so the choice never depends on which task finished first.
    #[default]
    FirstFound,

    /// Choose uniformly among the tied moves, using a generator seeded with `seed`.
    Random { seed: u64 },
}

/// Configuration variables for a [`SearchCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    /// Number of worker threads root moves are spread across.
    pub threads: usize,

    /// Maximum depth to execute the search.
    pub max_depth: u8,

    /// Soft limit on search time, as a fraction of the budget.
    ///
    /// During iterative deepening, if a depth concludes and this share of the budget has been used,
    /// the search will exit, since there probably isn't enough time remaining to complete another depth.
    pub soft_fraction: f64,

    /// How ties between equally-scored root moves are broken.
    pub tie_break: TieBreak,

    /// Maximum number of plies quiescence search may extend past a leaf.
    pub qsearch_ceiling: usize,

    /// Number of independently locked shards in the transposition table.
    pub tt_shards: usize,
}

impl SearchConfig {
    /// Default maximum depth.
    pub const DEFAULT_MAX_DEPTH: u8 = 64;

    /// Default soft limit, as a fraction of the budget.
    pub const DEFAULT_SOFT_FRACTION: f64 = 0.5;

    /// Returns a copy of this config with every field clamped into a usable range.
    pub fn validated(self) -> Self {
        let qsearch_ceiling = self.qsearch_ceiling.min(MAX_DEPTH / 2);

        // Main search and quiescence together can never exceed the maximum ply
        let depth_limit = (MAX_DEPTH - qsearch_ceiling).min(u8::MAX as usize) as u8;

        let soft_fraction = if self.soft_fraction.is_finite() && self.soft_fraction > 0.0 {
            self.soft_fraction.min(1.0)
        } else {
            Self::DEFAULT_SOFT_FRACTION
        };

        Self {
            threads: self.threads.clamp(1, MAX_THREADS),
            max_depth: self.max_depth.clamp(1, depth_limit),
            soft_fraction,
            tie_break: self.tie_break,
            qsearch_ceiling,
            tt_shards: self.tt_shards.clamp(1, TTable::MAX_SHARDS).next_power_of_two(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        let threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(MAX_THREADS);

        Self {
            threads,
            max_depth: Self::DEFAULT_MAX_DEPTH,
            soft_fraction: Self::DEFAULT_SOFT_FRACTION,
            tie_break: TieBreak::default(),
            qsearch_ceiling: DEFAULT_QSEARCH_CEILING,
            tt_shards: TTable::DEFAULT_SHARDS,
        }
    }
}

/// How the move in a [`SearchResult`] was arrived at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchStatus {
    /// The deepest depth searched was completed, and the search stopped by choice.
    Completed,

    /// The deadline passed mid-depth, so the result of the last fully completed depth was used.
    TimedOut,

    /// The deadline passed before any depth completed; the best of the moves that did finish was used.
    Partial,

    /// No move was evaluated successfully, so the first legal move was chosen without a score.
    Fallback,

    /// The game is already over; there is nothing to play.
    NoLegalMoves(GameStatus),

    /// The legal moves of the root position could not be generated.
    Faulted,
}

/// The result of a search, containing the best move found, its score, and total nodes searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchResult<M> {
    /// Best move found during the search.
    ///
    /// `None` only if there are no legal moves, or they could not be generated.
    pub best_move: Option<M>,

    /// Evaluation of the position after `best_move` is made, from the mover's perspective.
    pub score: Score,

    /// Depth at which `score` was found.
    pub depth_reached: u8,

    /// Number of nodes searched.
    pub nodes: u64,

    /// How this result was arrived at.
    pub status: SearchStatus,
}

impl<M: fmt::Display> fmt::Display for SearchResult<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.best_move {
            Some(mv) => write!(f, "bestmove {mv}")?,
            None => write!(f, "bestmove (none)")?,
        }

        write!(
            f,
            " score {} depth {} nodes {} status {:?}",
            self.score, self.depth_reached, self.nodes, self.status
        )
    }
}

/// What became of a single root move's search task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The subtree was fully searched. The score is from the root's perspective.
    Completed(Score),

    /// The deadline passed first. Carries no score.
    TimedOut,

    /// The rules engine or evaluator failed, or the task panicked.
    Faulted(String),
}

/// Sent from a search task back to the coordinator.
#[derive(Debug)]
struct TaskReport {
    /// Which top-level call dispatched the task.
    generation: u64,

    /// Which depth of that call.
    depth: u8,

    /// Position of the move in that depth's dispatch order.
    index: usize,

    outcome: TaskOutcome,

    nodes: u64,
}

/// Everything the coordinator learned from one depth of iterative deepening.
struct Round {
    /// Root-perspective score for each root move that completed, in dispatch order.
    scores: Vec<Option<Score>>,

    /// Whether every task reported and none ran out of time.
    complete: bool,

    nodes: u64,
}

/// Drives [iterative deepening](https://www.chessprogramming.org/Iterative_Deepening) over a position,
/// spreading the root moves of every depth across a pool of workers, and always answering by the deadline.
///
/// The transposition table and worker pool are owned by the coordinator. The table is cleared at the
/// start of every call to [`SearchCoordinator::find_best_move`].
pub struct SearchCoordinator<R: Rules, E, O> {
    config: SearchConfig,

    evaluator: Arc<E>,

    orderer: Arc<O>,

    ttable: Arc<TTable>,

    pool: WorkerPool,

    /// Used to break ties when [`TieBreak::Random`] is configured.
    rng: SmallRng,

    /// Incremented on every call, so reports from earlier calls can be told apart.
    generation: u64,

    /// Channel that every task reports through.
    reports: (Sender<TaskReport>, Receiver<TaskReport>),

    _rules: PhantomData<fn(&R)>,
}

impl<R, E, O> SearchCoordinator<R, E, O>
where
    R: Rules,
    E: Evaluator<R>,
    O: MoveOrderer<R>,
{
    /// Create a new [`SearchCoordinator`], spawning its worker pool.
    pub fn new(config: SearchConfig, evaluator: E, orderer: O) -> Self {
        let config = config.validated();

        let seed = match config.tie_break {
            TieBreak::Random { seed } => seed,
            TieBreak::FirstFound => 0,
        };

        Self {
            config,
            evaluator: Arc::new(evaluator),
            orderer: Arc::new(orderer),
            ttable: Arc::new(TTable::new(config.tt_shards)),
            pool: WorkerPool::new(config.threads),
            rng: SmallRng::seed_from_u64(seed),
            generation: 0,
            reports: unbounded(),
            _rules: PhantomData,
        }
    }

    /// The (validated) configuration of this coordinator.
    #[inline(always)]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Find the best move in `position` within `budget`.
    ///
    /// Always returns by the deadline (plus scheduling noise), and always returns a legal move if one exists.
    pub fn find_best_move(&mut self, position: &R, budget: Duration) -> SearchResult<R::Move> {
        let start = Instant::now();
        let deadline = start
            .checked_add(budget)
            .unwrap_or_else(|| start + FAR_FUTURE);
        let soft_limit = Duration::try_from_secs_f64(budget.as_secs_f64() * self.config.soft_fraction)
            .unwrap_or(Duration::MAX);

        self.generation += 1;
        self.reset_ttable();

        // Raised once this call no longer wants results, so abandoned tasks unwind promptly
        let stop = Arc::new(AtomicBool::new(false));

        let moves = match position.legal_moves() {
            Ok(moves) => moves,
            Err(err) => {
                log::error!("Failed to generate root moves: {err:#}");
                return SearchResult {
                    best_move: None,
                    score: -Score::INF,
                    depth_reached: 0,
                    nodes: 0,
                    status: SearchStatus::Faulted,
                };
            }
        };

        if moves.is_empty() {
            let status = position.status(&moves);
            log::info!("No legal moves: {status:?}");

            return SearchResult {
                best_move: None,
                score: status.score(0),
                depth_reached: 0,
                nodes: 0,
                status: SearchStatus::NoLegalMoves(status),
            };
        }

        // Depth 1 is dispatched in heuristic order, later depths in the order of the previous depth's scores
        let mut root = self
            .orderer
            .order(position, moves)
            .map(|(mv, _)| mv)
            .collect::<Vec<_>>();
        let fallback = root[0];

        let mut completed: Option<(R::Move, Score, u8)> = None;
        let mut partial: Option<(R::Move, Score, u8)> = None;
        let mut timed_out = false;
        let mut nodes = 0;

        for depth in 1..=self.config.max_depth {
            log::debug!("Dispatching {} root moves at depth {depth}", root.len());
            let round = self.run_depth(position, &root, depth, deadline, &stop);
            nodes += round.nodes;

            if !round.complete {
                timed_out = true;
                partial = self
                    .pick(&round.scores)
                    .map(|(index, score)| (root[index], score, depth));
                break;
            }

            let Some((index, score)) = self.pick(&round.scores) else {
                log::warn!("Every root move faulted at depth {depth}");
                break;
            };
            let best = root[index];
            completed = Some((best, score, depth));

            let elapsed = start.elapsed();
            log::info!(
                "depth {depth} bestmove {best} score {score} nodes {nodes} time {}ms",
                elapsed.as_millis()
            );

            root = reorder(&root, &round.scores);

            // A forced mate cannot be improved upon by searching deeper
            if score.is_winning_mate() {
                log::debug!("Found forced mate at depth {depth}; not deepening");
                break;
            }

            if elapsed >= soft_limit {
                log::debug!(
                    "Soft limit of {}ms reached after depth {depth}",
                    soft_limit.as_millis()
                );
                break;
            }
        }

        // Anything still running belongs to a depth that will never be used
        stop.store(true, Ordering::Relaxed);

        let stats = self.ttable.stats();
        log::debug!(
            "TT: {} probes, {} hits ({:.1}%), {} stores, {} entries",
            stats.probes,
            stats.hits,
            stats.hit_rate(),
            stats.stores,
            self.ttable.len()
        );

        let (best_move, score, depth_reached, status) = if let Some((mv, score, depth)) = completed {
            let status = if timed_out {
                SearchStatus::TimedOut
            } else {
                SearchStatus::Completed
            };
            (mv, score, depth, status)
        } else if let Some((mv, score, depth)) = partial {
            log::info!("No depth completed in time; using partial result from depth {depth}");
            (mv, score, depth, SearchStatus::Partial)
        } else {
            log::info!("No move was evaluated in time; falling back to {fallback}");
            (fallback, -Score::INF, 0, SearchStatus::Fallback)
        };

        SearchResult {
            best_move: Some(best_move),
            score,
            depth_reached,
            nodes,
            status,
        }
    }

    /// Search every move in `root` to `depth`, waiting for the results until `deadline`.
    fn run_depth(
        &mut self,
        position: &R,
        root: &[R::Move],
        depth: u8,
        deadline: Instant,
        stop: &Arc<AtomicBool>,
    ) -> Round {
        let generation = self.generation;

        for (index, &mv) in root.iter().enumerate() {
            // Each task owns its own copy of the position
            let child = position.play(mv);

            let sender = self.reports.0.clone();
            let ttable = Arc::clone(&self.ttable);
            let evaluator = Arc::clone(&self.evaluator);
            let orderer = Arc::clone(&self.orderer);
            let stop = Arc::clone(stop);
            let ceiling = self.config.qsearch_ceiling;

            self.pool.execute(move || {
                let searched = panic::catch_unwind(AssertUnwindSafe(|| {
                    let mut search = Search::new(&ttable, &*evaluator, &*orderer, deadline, &stop)
                        .with_qsearch_ceiling(ceiling);

                    let res = search.search(&child, depth - 1, 1);
                    (res, search.nodes())
                }));

                let (outcome, nodes) = match searched {
                    // Scores come back from the opponent's perspective
                    Ok((Ok(score), nodes)) => (TaskOutcome::Completed(-score), nodes),
                    Ok((Err(Interrupt::DeadlineExceeded), nodes)) => (TaskOutcome::TimedOut, nodes),
                    Ok((Err(Interrupt::Fault(err)), nodes)) => {
                        (TaskOutcome::Faulted(format!("{err:#}")), nodes)
                    }
                    Err(payload) => (TaskOutcome::Faulted(panic_message(&*payload)), 0),
                };

                let report = TaskReport {
                    generation,
                    depth,
                    index,
                    outcome,
                    nodes,
                };

                // The coordinator owns the receiver, so this only fails once it is gone entirely
                if sender.send(report).is_err() {
                    log::trace!("Coordinator dropped before task {index} at depth {depth} reported");
                }
            });
        }

        let mut round = Round {
            scores: vec![None; root.len()],
            complete: false,
            nodes: 0,
        };
        let mut reported = 0;
        let mut timed_out = false;

        while reported < root.len() {
            let report = match self.reports.1.recv_deadline(deadline) {
                Ok(report) => report,
                Err(RecvTimeoutError::Timeout) => {
                    log::debug!(
                        "Deadline reached with {} of {} root moves reported at depth {depth}",
                        reported,
                        root.len()
                    );
                    timed_out = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };

            // Late arrivals from an earlier call
            if report.generation != generation || report.depth != depth {
                log::trace!(
                    "Discarding stale report from generation {} depth {}",
                    report.generation,
                    report.depth
                );
                continue;
            }

            reported += 1;
            round.nodes += report.nodes;

            match report.outcome {
                TaskOutcome::Completed(score) => round.scores[report.index] = Some(score),
                TaskOutcome::TimedOut => timed_out = true,
                TaskOutcome::Faulted(reason) => {
                    log::warn!(
                        "Search of root move {} faulted at depth {depth}: {reason}",
                        root[report.index]
                    );
                }
            }
        }

        round.complete = reported == root.len() && !timed_out;
        round
    }

    /// Index and score of the best of `scores`, breaking ties according to the configured [`TieBreak`].
    fn pick(&mut self, scores: &[Option<Score>]) -> Option<(usize, Score)> {
        let best = scores.iter().flatten().max().copied()?;

        let tied = scores
            .iter()
            .enumerate()
            .filter(|(_, score)| **score == Some(best))
            .map(|(index, _)| index)
            .collect::<Vec<_>>();

        let index = match self.config.tie_break {
            TieBreak::FirstFound => tied[0],
            TieBreak::Random { .. } => tied[self.rng.random_range(0..tied.len())],
        };

        Some((index, best))
    }

    /// Empties the transposition table before a new search.
    fn reset_ttable(&mut self) {
        match Arc::get_mut(&mut self.ttable) {
            Some(ttable) => ttable.clear(),
            None => {
                // Tasks abandoned by the previous call still hold the old table
                log::debug!("Previous search still winding down; allocating a new table");
                self.ttable = Arc::new(TTable::new(self.config.tt_shards));
            }
        }
    }
}

impl SearchCoordinator<Game, PsqtEval, HeuristicOrderer> {
    /// A coordinator for standard chess, with the default evaluator and move ordering.
    pub fn chess(config: SearchConfig) -> Self {
        Self::new(config, PsqtEval, HeuristicOrderer)
    }
}

impl<R: Rules, E, O> fmt::Debug for SearchCoordinator<R, E, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchCoordinator")
            .field("config", &self.config)
            .field("workers", &self.pool.size())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Find the best move in `game` within `budget`, using the default configuration.
pub fn find_best_move(game: &Game, budget: Duration) -> SearchResult<Move> {
    SearchCoordinator::chess(SearchConfig::default()).find_best_move(game, budget)
}

/// Stable-sorts `root` by descending score, with moves that have no score last.
fn reorder<M: Copy>(root: &[M], scores: &[Option<Score>]) -> Vec<M> {
    let mut ranked = root.iter().copied().zip(scores.iter().copied()).collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.into_iter().map(|(mv, _)| mv).collect()
}

/// Extracts a readable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        String::from("panicked")
    }
}

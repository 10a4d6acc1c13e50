/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chessie::{Game, Move};

use crate::{
    EngineCommand, EvalBreakdown, EvalKind, Evaluator, HeuristicOrderer, MaterialEval,
    MoveOrderer, OrderKind, PsqtEval, Rules, SearchConfig, SearchCoordinator, SearchOptions,
    SearchResult, Unordered, BENCHMARK_FENS,
};

/// Default depth at which to run the benchmark searches.
const BENCH_DEPTH: u8 = 4;

/// A reusable search over chess positions, with its evaluator and move ordering already chosen.
type Searcher = Box<dyn FnMut(&Game, Duration) -> SearchResult<Move>>;

/// Totals from a run of the `bench` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchReport {
    /// Nodes searched across every benchmark position.
    pub nodes: u64,

    /// Wall-clock time spent searching.
    pub elapsed: Duration,
}

impl BenchReport {
    /// Nodes searched per second.
    pub fn nps(&self) -> u64 {
        (self.nodes as f64 / self.elapsed.as_secs_f64().max(f64::EPSILON)) as u64
    }
}

/// Returns a string of the engine's name and current version.
pub fn name() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Executes a single [`EngineCommand`], printing its results to stdout.
pub fn execute(command: EngineCommand) -> Result<()> {
    match command {
        EngineCommand::Search {
            fen,
            movetime,
            depth,
            options,
        } => {
            let game = parse_fen(&fen)?;
            let mut search = searcher(options.config(depth), &options);

            let res = search(&game, Duration::from_millis(movetime));
            println!("{res}");
        }

        EngineCommand::Eval {
            fen,
            evaluator,
            pretty,
        } => {
            let game = parse_fen(&fen)?;

            if pretty {
                print!("{}", EvalBreakdown::new(&game));
            } else {
                let score = match evaluator {
                    EvalKind::Material => MaterialEval.evaluate(&game),
                    EvalKind::Psqt => PsqtEval.evaluate(&game),
                }
                .context("Failed to evaluate position")?;

                println!("{score}");
            }
        }

        EngineCommand::Order { fen } => {
            let game = parse_fen(&fen)?;
            let moves = game
                .legal_moves()
                .context("Failed to generate legal moves")?;

            if moves.is_empty() {
                println!("(none)");
            }

            for (mv, priority) in HeuristicOrderer.order(&game, moves) {
                println!("{mv:<6} {priority}");
            }
        }

        EngineCommand::Bench {
            depth,
            pretty,
            options,
        } => {
            let report = bench(depth.unwrap_or(BENCH_DEPTH), &options, true)?;
            print_bench(&report, pretty);
        }
    }

    Ok(())
}

/// Search every benchmark position to exactly `depth`, accumulating node counts.
pub fn bench(depth: u8, options: &SearchOptions, verbose: bool) -> Result<BenchReport> {
    // No deadline, and never stop early
    let config = SearchConfig {
        soft_fraction: 1.0,
        ..options.config(Some(depth))
    };
    let mut search = searcher(config, options);

    let num_tests = BENCHMARK_FENS.len();
    let mut nodes = 0;
    let start = Instant::now();

    for (i, fen) in BENCHMARK_FENS.into_iter().enumerate() {
        if verbose {
            println!("Benchmark position {}/{}: {fen}", i + 1, num_tests);
        }

        let game = parse_fen(fen)?;
        let res = search(&game, Duration::MAX);
        log::debug!("{res}");

        nodes += res.nodes;
    }

    Ok(BenchReport {
        nodes,
        elapsed: start.elapsed(),
    })
}

/// Prints the results of [`bench`], optionally as a table.
fn print_bench(report: &BenchReport, pretty: bool) {
    let nodes = report.nodes;
    let nps = report.nps();
    let m_nps = nps as f64 / 1_000_000.0;
    let ms = report.elapsed.as_millis();

    if pretty {
        println!();
        println!("+--- Benchmark Complete ---+");
        println!("| time (ms)  : {ms:<12}|");
        println!("| nodes      : {nodes:<12}|");
        println!("| nps        : {nps:<12}|");
        println!("| Mnps       : {m_nps:<12.2}|");
        println!("+--------------------------+");
    } else {
        println!("{nodes} nodes {nps} nps");
    }
}

/// Builds a [`Searcher`] from the evaluator and move ordering chosen in `options`.
fn searcher(config: SearchConfig, options: &SearchOptions) -> Searcher {
    fn boxed<E, O>(config: SearchConfig, evaluator: E, orderer: O) -> Searcher
    where
        E: Evaluator<Game>,
        O: MoveOrderer<Game>,
    {
        let mut coordinator = SearchCoordinator::new(config, evaluator, orderer);
        log::debug!("Created {coordinator:?}");

        Box::new(move |game: &Game, budget: Duration| coordinator.find_best_move(game, budget))
    }

    match (options.evaluator, options.orderer) {
        (EvalKind::Material, OrderKind::Heuristic) => boxed(config, MaterialEval, HeuristicOrderer),
        (EvalKind::Material, OrderKind::None) => boxed(config, MaterialEval, Unordered),
        (EvalKind::Psqt, OrderKind::Heuristic) => boxed(config, PsqtEval, HeuristicOrderer),
        (EvalKind::Psqt, OrderKind::None) => boxed(config, PsqtEval, Unordered),
    }
}

fn parse_fen(fen: &str) -> Result<Game> {
    Game::from_fen(fen).with_context(|| format!("Invalid FEN {fen:?}"))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::Cli;

    fn options(args: &[&str]) -> SearchOptions {
        let cli = Cli::try_parse_from(["newt", "bench"].iter().chain(args)).unwrap();
        match cli.command {
            EngineCommand::Bench { options, .. } => options,
            other => panic!("expected a bench command, got {other:?}"),
        }
    }

    #[test]
    fn test_bench_is_deterministic() {
        let options = options(&["--threads", "2"]);

        let first = bench(2, &options, false).unwrap();
        let second = bench(2, &options, false).unwrap();

        assert!(first.nodes > 0);
        assert_eq!(first.nodes, second.nodes);
    }

    #[test]
    fn test_every_evaluator_and_orderer_searches() {
        let game = parse_fen(crate::FEN_KIWIPETE).unwrap();

        for args in [
            ["-e", "material", "-o", "heuristic"],
            ["-e", "material", "-o", "none"],
            ["-e", "psqt", "-o", "heuristic"],
            ["-e", "psqt", "-o", "none"],
        ] {
            let options = options(&args);
            let mut search = searcher(options.config(Some(2)), &options);
            let res = search(&game, Duration::MAX);

            let legal = game.legal_moves().unwrap();
            assert!(legal.contains(&res.best_move.unwrap()), "{args:?}");
            assert_eq!(res.depth_reached, 2, "{args:?}");
        }
    }

    #[test]
    fn test_invalid_fen_is_an_error() {
        let res = execute(EngineCommand::Order {
            fen: String::from("not a fen"),
        });

        assert!(res.is_err());
    }
}

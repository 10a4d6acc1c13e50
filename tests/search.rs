/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use chessie::{Color, Game, PieceKind, Square};
use newt::{
    find_best_move, Evaluator, GameStatus, HeuristicOrderer, PsqtEval, Rules, Score, SearchConfig,
    SearchCoordinator, SearchStatus, TieBreak, FEN_KIWIPETE, FEN_STARTPOS,
};

/// Fails to evaluate any position with a White pawn on e4.
struct NoKingsPawn;

impl Evaluator<Game> for NoKingsPawn {
    fn evaluate(&self, game: &Game) -> Result<Score> {
        if has_white_pawn_on_e4(game) {
            bail!("refusing to evaluate a pawn on e4");
        }

        PsqtEval.evaluate(game)
    }
}

/// Panics when evaluating any position with a White pawn on e4.
struct PanickyEval;

impl Evaluator<Game> for PanickyEval {
    fn evaluate(&self, game: &Game) -> Result<Score> {
        if has_white_pawn_on_e4(game) {
            panic!("pawn on e4");
        }

        PsqtEval.evaluate(game)
    }
}

/// Sleeps before every evaluation, so a search can be caught mid-depth.
struct SlowEval(Duration);

impl Evaluator<Game> for SlowEval {
    fn evaluate(&self, game: &Game) -> Result<Score> {
        std::thread::sleep(self.0);
        PsqtEval.evaluate(game)
    }
}

fn has_white_pawn_on_e4(game: &Game) -> bool {
    game.piece_at(Square::E4)
        .is_some_and(|piece| piece.kind() == PieceKind::Pawn && piece.color() == Color::White)
}

fn game(fen: &str) -> Game {
    Game::from_fen(fen).unwrap()
}

fn config(threads: usize, max_depth: u8) -> SearchConfig {
    SearchConfig {
        threads,
        max_depth,
        ..Default::default()
    }
}

fn assert_legal(game: &Game, mv: Option<chessie::Move>) {
    let mv = mv.expect("a move should be returned when legal moves exist");
    assert!(game.legal_moves().unwrap().contains(&mv), "{mv} is not legal");
}

#[test]
fn test_checkmated_root_has_no_move() {
    // Fool's mate
    let game = game("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3");
    let res = SearchCoordinator::chess(config(2, 4)).find_best_move(&game, Duration::from_secs(1));

    assert_eq!(res.best_move, None);
    assert_eq!(res.score, -Score::MATE);
    assert_eq!(res.status, SearchStatus::NoLegalMoves(GameStatus::Checkmate));
    assert_eq!(res.nodes, 0);
}

#[test]
fn test_stalemated_root_has_no_move() {
    let game = game("k7/8/1Q6/8/8/8/8/7K b - - 0 1");
    let res = SearchCoordinator::chess(config(2, 4)).find_best_move(&game, Duration::from_secs(1));

    assert_eq!(res.best_move, None);
    assert_eq!(res.score, Score::DRAW);
    assert_eq!(res.status, SearchStatus::NoLegalMoves(GameStatus::Stalemate));
}

#[test]
fn test_finds_mate_in_one_and_stops() {
    let game = game("k7/8/KQ6/8/8/8/8/8 w - - 0 1");
    let res = SearchCoordinator::chess(config(4, 10)).find_best_move(&game, Duration::from_secs(10));

    assert_eq!(res.score, Score::MATE - 1);
    assert_eq!(res.depth_reached, 1);
    assert_eq!(res.status, SearchStatus::Completed);

    // Whichever mate was chosen, it must actually be mate
    let after = game.play(res.best_move.unwrap());
    let replies = after.legal_moves().unwrap();
    assert_eq!(after.status(&replies), GameStatus::Checkmate);
}

#[test]
fn test_completes_every_depth_without_a_deadline() {
    let game = game(FEN_STARTPOS);
    let res = SearchCoordinator::chess(config(4, 3)).find_best_move(&game, Duration::MAX);

    assert_legal(&game, res.best_move);
    assert_eq!(res.depth_reached, 3);
    assert_eq!(res.status, SearchStatus::Completed);
    assert!(res.nodes > 20);
}

#[test]
fn test_deadline_is_respected() {
    let game = game(FEN_KIWIPETE);
    let mut coordinator = SearchCoordinator::chess(config(4, 64));
    let budget = Duration::from_millis(200);

    let start = Instant::now();
    let res = coordinator.find_best_move(&game, budget);
    let elapsed = start.elapsed();

    assert_legal(&game, res.best_move);
    assert!(
        elapsed < budget + Duration::from_millis(150),
        "search took {}ms",
        elapsed.as_millis()
    );
    assert!(matches!(
        res.status,
        SearchStatus::Completed | SearchStatus::TimedOut | SearchStatus::Partial | SearchStatus::Fallback
    ));
}

#[test]
fn test_zero_budget_falls_back_to_a_legal_move() {
    let game = game(FEN_KIWIPETE);
    let res = SearchCoordinator::chess(config(4, 64)).find_best_move(&game, Duration::ZERO);

    assert_legal(&game, res.best_move);
    assert_eq!(res.status, SearchStatus::Fallback);
    assert_eq!(res.score, -Score::INF);
    assert_eq!(res.depth_reached, 0);
}

#[test]
fn test_fallback_is_first_ordered_move() {
    let game = game(FEN_KIWIPETE);
    let res = SearchCoordinator::chess(config(1, 64)).find_best_move(&game, Duration::ZERO);

    let moves = game.legal_moves().unwrap();
    let (first, _) = newt::MoveOrderer::order(&HeuristicOrderer, &game, moves)
        .next()
        .unwrap();

    assert_eq!(res.best_move, Some(first));
}

#[test]
fn test_single_and_multi_threaded_agree() {
    let game = game(FEN_KIWIPETE);

    let single = SearchCoordinator::chess(config(1, 3)).find_best_move(&game, Duration::MAX);
    let multi = SearchCoordinator::chess(config(4, 3)).find_best_move(&game, Duration::MAX);

    assert_eq!(single.status, SearchStatus::Completed);
    assert_eq!(multi.status, SearchStatus::Completed);
    assert_eq!(single.score, multi.score);
    assert_eq!(single.best_move, multi.best_move);
}

#[test]
fn test_repeated_searches_are_deterministic() {
    let game = game(FEN_STARTPOS);
    let mut coordinator = SearchCoordinator::chess(config(1, 3));

    let first = coordinator.find_best_move(&game, Duration::MAX);
    let second = coordinator.find_best_move(&game, Duration::MAX);

    // A single worker visits everything in the same order, against a freshly cleared table
    assert_eq!(first, second);
}

#[test]
fn test_seeded_random_tie_break_is_reproducible() {
    let game = game(FEN_STARTPOS);
    let config = SearchConfig {
        tie_break: TieBreak::Random { seed: 1234 },
        ..config(1, 2)
    };

    let a = SearchCoordinator::chess(config).find_best_move(&game, Duration::MAX);
    let b = SearchCoordinator::chess(config).find_best_move(&game, Duration::MAX);

    assert_legal(&game, a.best_move);
    assert_eq!(a.best_move, b.best_move);
    assert_eq!(a.score, b.score);
}

#[test]
fn test_faulted_root_move_is_excluded() {
    let game = game(FEN_STARTPOS);
    let mut coordinator = SearchCoordinator::new(config(4, 2), NoKingsPawn, HeuristicOrderer);

    let res = coordinator.find_best_move(&game, Duration::MAX);

    assert_legal(&game, res.best_move);
    assert_ne!(res.best_move.unwrap(), "e2e4");
    assert_eq!(res.status, SearchStatus::Completed);
    assert_eq!(res.depth_reached, 2);
}

#[test]
fn test_panicking_root_move_is_excluded() {
    let game = game(FEN_STARTPOS);
    let mut coordinator = SearchCoordinator::new(config(2, 2), PanickyEval, HeuristicOrderer);

    let res = coordinator.find_best_move(&game, Duration::MAX);

    assert_legal(&game, res.best_move);
    assert_ne!(res.best_move.unwrap(), "e2e4");
    assert_eq!(res.status, SearchStatus::Completed);

    // The pool survives, and can be searched with again
    let again = coordinator.find_best_move(&game, Duration::MAX);
    assert_eq!(again.best_move, res.best_move);
}

#[test]
fn test_free_function_finds_a_legal_move() {
    let game = game(FEN_STARTPOS);
    let res = find_best_move(&game, Duration::from_millis(100));

    assert_legal(&game, res.best_move);
}

#[test]
fn test_depth_one_picks_the_best_scored_reply() {
    use std::sync::atomic::AtomicBool;

    use newt::{Search, TTable};

    let game = game(FEN_STARTPOS);
    let res = SearchCoordinator::chess(config(2, 1)).find_best_move(&game, Duration::MAX);
    assert_eq!(res.depth_reached, 1);

    // Score every root move independently
    let ttable = TTable::default();
    let stop = AtomicBool::new(false);
    let deadline = Instant::now() + Duration::from_secs(60);
    let scores = game
        .legal_moves()
        .unwrap()
        .into_iter()
        .map(|mv| {
            let mut search = Search::new(&ttable, &PsqtEval, &HeuristicOrderer, deadline, &stop);
            (mv, -search.search(&game.play(mv), 0, 1).unwrap())
        })
        .collect::<Vec<_>>();

    let best = scores.iter().map(|(_, score)| *score).max().unwrap();
    let quiet = scores.iter().find(|(mv, _)| *mv == "a2a3").unwrap().1;

    assert_eq!(res.score, best);
    assert!(res.score >= quiet);
}

#[test]
fn test_unfinished_depth_keeps_last_completed_depth() {
    let game = game(FEN_STARTPOS);

    // Depth 1 takes ~20 evaluations, depth 2 ~400, so only depth 1 fits in the budget
    let slow = SearchConfig {
        soft_fraction: 1.0,
        ..config(1, 64)
    };
    let mut coordinator =
        SearchCoordinator::new(slow, SlowEval(Duration::from_millis(2)), HeuristicOrderer);
    let res = coordinator.find_best_move(&game, Duration::from_millis(250));

    assert_eq!(res.status, SearchStatus::TimedOut);
    assert_eq!(res.depth_reached, 1);

    // Same as a search that was allowed to finish depth 1
    let finished = SearchCoordinator::chess(config(1, 1)).find_best_move(&game, Duration::MAX);
    assert_eq!(finished.status, SearchStatus::Completed);
    assert_eq!(res.best_move, finished.best_move);
    assert_eq!(res.score, finished.score);
}

#[test]
fn test_partial_depth_is_used_when_none_completed() {
    use std::sync::atomic::AtomicBool;

    use newt::{Search, TTable};

    let game = game(FEN_STARTPOS);

    // Each root move takes ~20ms, so a handful finish before the deadline and the rest do not
    let mut coordinator =
        SearchCoordinator::new(config(1, 64), SlowEval(Duration::from_millis(20)), HeuristicOrderer);
    let res = coordinator.find_best_move(&game, Duration::from_millis(100));

    assert_eq!(res.status, SearchStatus::Partial);
    assert_eq!(res.depth_reached, 1);
    assert_legal(&game, res.best_move);

    // The score is that move's own depth 1 score, not a placeholder
    let ttable = TTable::default();
    let stop = AtomicBool::new(false);
    let deadline = Instant::now() + Duration::from_secs(60);
    let mut search = Search::new(&ttable, &PsqtEval, &HeuristicOrderer, deadline, &stop);
    let child = game.play(res.best_move.unwrap());

    assert_eq!(res.score, -search.search(&child, 0, 1).unwrap());
}

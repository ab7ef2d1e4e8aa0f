//! Minimal driver around the search core.
//!
//! Usage:
//!   basalt                          depth-13 search of the start position
//!   basalt <depth>                  search the start position
//!   basalt <depth> "<fen>"          search an arbitrary position
//!   basalt perft <depth> ["<fen>"]  legal move count to the given depth
//!
//! This is a harness, not a protocol front-end: it prints the worker's
//! info lines and the final best move, then exits.

use std::sync::mpsc;
use std::time::Instant;

use basalt::movegen;
use basalt::position::START_FEN;
use basalt::{Limits, Position, SearchOptions, ThreadPool};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("perft") {
        let depth: u32 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(5);
        let fen = args.get(2).map(String::as_str).unwrap_or(START_FEN);
        let mut pos = match Position::from_fen(fen) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("bad FEN: {e:#}");
                std::process::exit(1);
            }
        };
        let started = Instant::now();
        let nodes = movegen::perft(&mut pos, depth);
        let elapsed = started.elapsed().as_secs_f64().max(1e-6);
        println!(
            "perft({depth}) = {nodes}  ({:.0} nodes/s)",
            nodes as f64 / elapsed
        );
        return;
    }

    let depth: i32 = args.first().and_then(|s| s.parse().ok()).unwrap_or(13);
    let fen = args.get(1).map(String::as_str).unwrap_or(START_FEN);
    let pos = match Position::from_fen(fen) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("bad FEN: {e:#}");
            std::process::exit(1);
        }
    };

    println!("{pos}");

    let pool = ThreadPool::new(SearchOptions {
        threads: std::thread::available_parallelism().map_or(1, |n| n.get().min(8)),
        hash_mb: 64,
        ..Default::default()
    });

    let (tx, rx) = mpsc::channel();
    pool.start_searching(&pos, &Limits::depth(depth), Some(tx));
    while let Ok(line) = rx.recv() {
        println!("{line}");
    }
    let report = pool
        .wait_for_search_finished()
        .expect("search produces a report");

    let chess960 = pos.is_chess960();
    println!(
        "bestmove {}{}",
        report.best_move.to_uci(chess960),
        if report.ponder_move.is_ok() {
            format!(" ponder {}", report.ponder_move.to_uci(chess960))
        } else {
            String::new()
        }
    );
}

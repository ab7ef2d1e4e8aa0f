//! Worker pool.
//!
//! N symmetric workers share the transposition table and a relaxed stop
//! flag; everything else is thread-local. Worker 0 is the main thread: it
//! alone consults the time manager, reports progress, and flips `stop`.
//! Between searches the OS threads sleep on a condition variable.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::chess_move::Move;
use crate::position::Position;
use crate::search::{Limits, SearchWorker, WorkerReport};
use crate::tt::TranspositionTable;
use crate::types::*;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub threads: usize,
    pub hash_mb: usize,
    pub multi_pv: usize,
    pub move_overhead_ms: i64,
}

impl Default for SearchOptions {
    fn default() -> SearchOptions {
        SearchOptions {
            threads: 1,
            hash_mb: 16,
            multi_pv: 1,
            move_overhead_ms: 30,
        }
    }
}

enum Request {
    Search {
        pos: Box<Position>,
        limits: Limits,
        info: Option<Sender<String>>,
    },
    Clear,
    Quit,
}

struct CellState {
    request: Option<Request>,
    busy: bool,
    report: Option<WorkerReport>,
}

struct WorkerCell {
    state: Mutex<CellState>,
    cv: Condvar,
}

impl WorkerCell {
    fn new() -> WorkerCell {
        WorkerCell {
            state: Mutex::new(CellState {
                request: None,
                busy: false,
                report: None,
            }),
            cv: Condvar::new(),
        }
    }

    fn submit(&self, request: Request) {
        let mut st = self.state.lock();
        st.busy = true;
        st.report = None;
        st.request = Some(request);
        self.cv.notify_all();
    }

    fn wait_idle(&self) {
        let mut st = self.state.lock();
        while st.busy {
            self.cv.wait(&mut st);
        }
    }

    fn take_report(&self) -> Option<WorkerReport> {
        self.state.lock().report.clone()
    }
}

pub struct ThreadPool {
    cells: Vec<Arc<WorkerCell>>,
    handles: Vec<JoinHandle<()>>,
    tt: Arc<TranspositionTable>,
    stop: Arc<AtomicBool>,
    nodes: Arc<Vec<AtomicU64>>,
    options: SearchOptions,
}

impl ThreadPool {
    pub fn new(options: SearchOptions) -> ThreadPool {
        let threads = options.threads.max(1);
        let tt = Arc::new(TranspositionTable::new(options.hash_mb));
        let stop = Arc::new(AtomicBool::new(false));
        let nodes: Arc<Vec<AtomicU64>> =
            Arc::new((0..threads).map(|_| AtomicU64::new(0)).collect());
        let bm_changes: Arc<Vec<AtomicU64>> =
            Arc::new((0..threads).map(|_| AtomicU64::new(0)).collect());

        let mut cells = Vec::with_capacity(threads);
        let mut handles = Vec::with_capacity(threads);

        for id in 0..threads {
            let cell = Arc::new(WorkerCell::new());
            cells.push(cell.clone());

            let tt = tt.clone();
            let stop = stop.clone();
            let nodes = nodes.clone();
            let bm_changes = bm_changes.clone();
            let multi_pv = options.multi_pv;
            let overhead = options.move_overhead_ms;

            handles.push(std::thread::spawn(move || {
                let mut worker =
                    SearchWorker::new(id, threads, tt, stop, nodes, bm_changes);
                loop {
                    let request = {
                        let mut st = cell.state.lock();
                        while st.request.is_none() {
                            cell.cv.wait(&mut st);
                        }
                        st.request.take().unwrap()
                    };

                    match request {
                        Request::Quit => {
                            let mut st = cell.state.lock();
                            st.busy = false;
                            cell.cv.notify_all();
                            break;
                        }
                        Request::Clear => {
                            worker.clear(threads);
                            let mut st = cell.state.lock();
                            st.busy = false;
                            cell.cv.notify_all();
                        }
                        Request::Search { pos, limits, info } => {
                            worker.prepare(&pos, &limits, multi_pv, overhead, info);
                            worker.run();
                            let mut st = cell.state.lock();
                            st.report = Some(worker.report());
                            st.busy = false;
                            cell.cv.notify_all();
                        }
                    }
                }
            }));
        }

        ThreadPool {
            cells,
            handles,
            tt,
            stop,
            nodes,
            options,
        }
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    pub fn tt(&self) -> &TranspositionTable {
        &self.tt
    }

    /// Begin a search on every worker; returns immediately. Worker 0 gets
    /// the info channel and owns the clock.
    pub fn start_searching(
        &self,
        pos: &Position,
        limits: &Limits,
        info: Option<Sender<String>>,
    ) {
        self.wait_for_search_finished();
        self.stop.store(false, Ordering::Relaxed);
        self.tt.new_search();

        // Helpers first so the main worker never waits on a cold start.
        for (id, cell) in self.cells.iter().enumerate().rev() {
            cell.submit(Request::Search {
                pos: Box::new(pos.clone()),
                limits: limits.clone(),
                info: if id == 0 { info.clone() } else { None },
            });
        }
    }

    /// Ask all workers to wind down at the next safe point.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Block until every worker has gone idle, then pick the best report:
    /// deepest completed iteration wins, except that a shorter proven mate
    /// or any strictly better score at equal depth takes precedence.
    pub fn wait_for_search_finished(&self) -> Option<WorkerReport> {
        for cell in &self.cells {
            cell.wait_idle();
        }

        let mut best: Option<WorkerReport> = None;
        for cell in &self.cells {
            let Some(report) = cell.take_report() else {
                continue;
            };
            if report.best_move == Move::NONE {
                if best.is_none() {
                    best = Some(report);
                }
                continue;
            }
            best = Some(match best.take() {
                None => report,
                Some(cur) if cur.best_move == Move::NONE => report,
                Some(cur) => {
                    let deeper = report.completed_depth > cur.completed_depth
                        && report.score > cur.score;
                    let better_mate =
                        report.score >= VALUE_MATE_IN_MAX_PLY && report.score > cur.score;
                    let better_same_depth = report.completed_depth == cur.completed_depth
                        && report.score > cur.score;
                    if deeper || better_mate || better_same_depth {
                        report
                    } else {
                        cur
                    }
                }
            });
        }
        best
    }

    /// Convenience: run a full search to completion and return the best.
    pub fn search(
        &self,
        pos: &Position,
        limits: &Limits,
        info: Option<Sender<String>>,
    ) -> WorkerReport {
        self.start_searching(pos, limits, info);
        self.wait_for_search_finished()
            .expect("search always produces a report")
    }

    /// Total nodes across all workers for the current or last search.
    pub fn nodes_searched(&self) -> u64 {
        self.nodes.iter().map(|n| n.load(Ordering::Relaxed)).sum()
    }

    /// Reset histories on every worker and wipe the shared table.
    pub fn clear(&self) {
        self.wait_for_search_finished();
        for cell in &self.cells {
            cell.submit(Request::Clear);
        }
        for cell in &self.cells {
            cell.wait_idle();
        }
        self.tt.clear();
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
        for cell in &self.cells {
            cell.submit(Request::Quit);
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_depth(pool: &ThreadPool, fen: &str, depth: Depth) -> WorkerReport {
        let pos = Position::from_fen(fen).unwrap();
        pool.search(&pos, &Limits::depth(depth), None)
    }

    #[test]
    fn finds_mate_in_one() {
        let pool = ThreadPool::new(SearchOptions::default());
        let report = fixed_depth(&pool, "6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", 2);
        assert_eq!(report.best_move.to_uci(false), "a1a8");
        assert_eq!(report.score, VALUE_MATE - 1);
    }

    #[test]
    fn mated_position_reports_no_move() {
        // Black is already checkmated (back-rank), white to move... flip:
        // side to move has no legal moves and is in check.
        let pool = ThreadPool::new(SearchOptions::default());
        let pos = Position::from_fen("R5k1/5ppp/8/8/8/8/8/6K1 b - - 0 1").unwrap();
        let report = pool.search(&pos, &Limits::depth(3), None);
        assert_eq!(report.best_move, Move::NONE);
    }

    #[test]
    fn fifty_move_draw_scores_zero() {
        let pool = ThreadPool::new(SearchOptions::default());
        let report = fixed_depth(&pool, "6k1/8/8/8/8/8/8/R5K1 w - - 100 80", 3);
        // Any root move: the position is drawn where it stands.
        assert!(report.score.abs() <= 1, "score {}", report.score);
    }

    #[test]
    fn multiple_threads_agree_on_forced_mate() {
        let pool = ThreadPool::new(SearchOptions {
            threads: 3,
            ..Default::default()
        });
        let report = fixed_depth(&pool, "6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", 3);
        assert_eq!(report.best_move.to_uci(false), "a1a8");
        assert!(report.score >= VALUE_MATE_IN_MAX_PLY);
    }

    #[test]
    fn node_limit_is_respected_loosely() {
        let pool = ThreadPool::new(SearchOptions::default());
        let pos = Position::startpos();
        let limits = Limits {
            nodes: Some(20_000),
            ..Default::default()
        };
        let report = pool.search(&pos, &limits, None);
        assert!(report.best_move != Move::NONE);
        // The limit is polled every 1024 nodes, so allow generous slack.
        assert!(pool.nodes_searched() < 400_000);
    }

    #[test]
    fn clear_resets_between_games() {
        let pool = ThreadPool::new(SearchOptions::default());
        let pos = Position::startpos();
        let first = pool.search(&pos, &Limits::depth(4), None);
        pool.clear();
        let second = pool.search(&pos, &Limits::depth(4), None);
        assert_eq!(first.best_move != Move::NONE, second.best_move != Move::NONE);
    }
}

//! Iterative-deepening alpha-beta search.
//!
//! Each worker runs the full iterative-deepening loop on its own copy of
//! the position, sharing only the transposition table and the stop flag.
//! The move loop is driven by the staged `MovePicker`; pruning, extensions
//! and reductions follow the usual family: razoring, reverse futility,
//! null move with verification, ProbCut, singular extensions, LMR.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::chess_move::Move;
use crate::eval;
use crate::history::*;
use crate::movegen::{self, GenType};
use crate::movepick::{HistoryContext, MovePicker};
use crate::position::Position;
use crate::timeman::TimeManager;
use crate::tt::{value_from_tt, value_to_tt, Bound, TranspositionTable};
use crate::types::*;

/// External constraints on one `go` invocation.
#[derive(Debug, Clone, Default)]
pub struct Limits {
    pub time: [i64; 2],
    pub inc: [i64; 2],
    pub movestogo: Option<i64>,
    pub movetime: Option<i64>,
    pub depth: Option<Depth>,
    pub nodes: Option<u64>,
    pub infinite: bool,
    pub ponder: bool,
}

impl Limits {
    pub fn depth(d: Depth) -> Limits {
        Limits {
            depth: Some(d),
            ..Default::default()
        }
    }

    pub fn use_time_management(&self) -> bool {
        self.time[0] > 0 || self.time[1] > 0
    }
}

#[derive(Debug, Clone)]
pub struct RootMove {
    pub mv: Move,
    pub score: Value,
    pub previous_score: Value,
    pub average_score: Value,
    pub sel_depth: i32,
    pub pv: Vec<Move>,
}

impl RootMove {
    fn new(mv: Move) -> RootMove {
        RootMove {
            mv,
            score: -VALUE_INFINITE,
            previous_score: -VALUE_INFINITE,
            average_score: -VALUE_INFINITE,
            sel_depth: 0,
            pv: vec![mv],
        }
    }
}

/// Outcome of one worker's search, compared across workers by the pool.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub best_move: Move,
    pub ponder_move: Move,
    pub score: Value,
    pub completed_depth: Depth,
    pub pv: Vec<Move>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeType {
    Root,
    Pv,
    NonPv,
}

const STACK_OFFSET: usize = 7;
const STACK_SIZE: usize = MAX_PLY + 10;

#[derive(Clone, Copy)]
struct StackEntry {
    current_move: Move,
    excluded_move: Move,
    killers: [Move; 2],
    static_eval: Value,
    stat_score: i32,
    move_count: i32,
    in_check: bool,
    tt_pv: bool,
    tt_hit: bool,
    multiple_extensions: i32,
    cutoff_cnt: i32,
    /// Continuation-history slot selected by the move made at this ply.
    cont_slot: usize,
    /// Dense index of the piece that moved, 0 for none.
    cont_piece: usize,
}

impl Default for StackEntry {
    fn default() -> StackEntry {
        StackEntry {
            current_move: Move::NONE,
            excluded_move: Move::NONE,
            killers: [Move::NONE; 2],
            static_eval: VALUE_NONE,
            stat_score: 0,
            move_count: 0,
            in_check: false,
            tt_pv: false,
            tt_hit: false,
            multiple_extensions: 0,
            cutoff_cnt: 0,
            cont_slot: ContinuationHistory::slot(false, false, 0, 0),
            cont_piece: 0,
        }
    }
}

/// Triangular principal-variation table.
struct PvTable {
    len: Vec<usize>,
    moves: Vec<Vec<Move>>,
}

impl PvTable {
    fn new() -> PvTable {
        PvTable {
            len: vec![0; MAX_PLY + 2],
            moves: vec![vec![Move::NONE; MAX_PLY + 2]; MAX_PLY + 2],
        }
    }

    fn reset(&mut self, ply: usize) {
        self.len[ply] = 0;
    }

    fn update(&mut self, ply: usize, m: Move) {
        self.moves[ply][0] = m;
        let child_len = self.len[ply + 1].min(MAX_PLY);
        for i in 0..child_len {
            self.moves[ply][i + 1] = self.moves[ply + 1][i];
        }
        self.len[ply] = child_len + 1;
    }

    fn line(&self, ply: usize) -> Vec<Move> {
        self.moves[ply][..self.len[ply]].to_vec()
    }
}

fn stat_bonus(depth: Depth) -> i32 {
    (246 * depth - 351).clamp(0, 1136)
}

fn stat_malus(depth: Depth) -> i32 {
    (519 * depth - 306).clamp(0, 1266)
}

fn futility_margin(depth: Depth, improving: bool, opp_worsening: bool, stat_prev: i32) -> Value {
    118 * depth - i32::from(improving) * 118 - i32::from(opp_worsening) * 118 / 3 - stat_prev / 267
}

fn futility_move_count(improving: bool, depth: Depth) -> i32 {
    if improving {
        3 + depth * depth
    } else {
        (3 + depth * depth) / 2
    }
}

/// Slightly dithered draw score to nudge threads apart in repeated lines.
fn value_draw(nodes: u64) -> Value {
    VALUE_DRAW - 1 + (nodes & 2) as Value
}

pub struct SearchWorker {
    pub id: usize,
    is_main: bool,
    thread_count: usize,

    pos: Position,
    root_moves: Vec<RootMove>,
    stack: Vec<StackEntry>,
    pv: PvTable,

    butterfly: ButterflyHistory,
    capture_history: CaptureHistory,
    cont_history: ContinuationHistory,
    pawn_history: PawnHistory,
    corr_history: CorrectionHistory,
    counter_moves: CounterMoveHistory,
    reductions: Vec<i32>,

    tt: Arc<TranspositionTable>,
    stop: Arc<AtomicBool>,
    shared_nodes: Arc<Vec<AtomicU64>>,
    shared_bm_changes: Arc<Vec<AtomicU64>>,

    limits: Limits,
    tm: TimeManager,
    multi_pv: usize,
    info: Option<Sender<String>>,

    nodes: u64,
    unflushed_nodes: u64,
    sel_depth: i32,
    root_depth: Depth,
    pub completed_depth: Depth,
    nmp_min_ply: i32,
    pv_idx: usize,
    optimism: [Value; COLOR_COUNT],
}

impl SearchWorker {
    pub fn new(
        id: usize,
        thread_count: usize,
        tt: Arc<TranspositionTable>,
        stop: Arc<AtomicBool>,
        shared_nodes: Arc<Vec<AtomicU64>>,
        shared_bm_changes: Arc<Vec<AtomicU64>>,
    ) -> SearchWorker {
        let mut w = SearchWorker {
            id,
            is_main: id == 0,
            thread_count,
            pos: Position::startpos(),
            root_moves: Vec::new(),
            stack: vec![StackEntry::default(); STACK_SIZE],
            pv: PvTable::new(),
            butterfly: ButterflyHistory::new(),
            capture_history: CaptureHistory::new(),
            cont_history: ContinuationHistory::new(),
            pawn_history: PawnHistory::new(),
            corr_history: CorrectionHistory::new(),
            counter_moves: CounterMoveHistory::new(),
            reductions: vec![0; MAX_MOVES],
            tt,
            stop,
            shared_nodes,
            shared_bm_changes,
            limits: Limits::default(),
            tm: TimeManager::infinite(),
            multi_pv: 1,
            info: None,
            nodes: 0,
            unflushed_nodes: 0,
            sel_depth: 0,
            root_depth: 0,
            completed_depth: 0,
            nmp_min_ply: 0,
            pv_idx: 0,
            optimism: [0; COLOR_COUNT],
        };
        w.clear(thread_count);
        w
    }

    /// Zero all history state and rebuild the reduction table.
    pub fn clear(&mut self, threads: usize) {
        self.butterfly.clear();
        self.capture_history.clear();
        self.cont_history.clear();
        self.pawn_history.clear();
        self.corr_history.clear();
        self.counter_moves.clear();
        for i in 1..MAX_MOVES {
            self.reductions[i] = ((19.80 + (threads as f64).ln() / 2.0) * (i as f64).ln()) as i32;
        }
        self.thread_count = threads;
    }

    /// Snapshot the root position and limits before `run`.
    pub fn prepare(
        &mut self,
        pos: &Position,
        limits: &Limits,
        multi_pv: usize,
        move_overhead_ms: i64,
        info: Option<Sender<String>>,
    ) {
        self.pos = pos.clone();
        self.limits = limits.clone();
        self.info = info;
        self.nodes = 0;
        self.unflushed_nodes = 0;
        self.completed_depth = 0;
        self.root_depth = 0;
        self.nmp_min_ply = 0;
        self.sel_depth = 0;
        self.shared_nodes[self.id].store(0, Ordering::Relaxed);
        self.shared_bm_changes[self.id].store(0, Ordering::Relaxed);
        self.stack = vec![StackEntry::default(); STACK_SIZE];

        self.root_moves = movegen::generate(pos, GenType::Legal)
            .iter()
            .map(RootMove::new)
            .collect();
        self.multi_pv = multi_pv.max(1).min(self.root_moves.len().max(1));

        let us = pos.side_to_move();
        self.tm = if let Some(ms) = limits.movetime {
            TimeManager::fixed((ms - move_overhead_ms).max(1))
        } else if limits.use_time_management() {
            TimeManager::new(
                limits.time[us.index()],
                limits.inc[us.index()],
                limits.movestogo,
                move_overhead_ms,
                limits.ponder,
                pos.game_ply(),
            )
        } else {
            TimeManager::infinite()
        };
    }

    pub fn nodes_searched(&self) -> u64 {
        self.nodes
    }

    pub fn report(&self) -> WorkerReport {
        let best = self.root_moves.first();
        WorkerReport {
            best_move: best.map_or(Move::NONE, |rm| rm.mv),
            ponder_move: best
                .and_then(|rm| rm.pv.get(1).copied())
                .unwrap_or(Move::NONE),
            score: best.map_or(-VALUE_INFINITE, |rm| {
                if rm.score == -VALUE_INFINITE {
                    rm.previous_score
                } else {
                    rm.score
                }
            }),
            completed_depth: self.completed_depth,
            pv: best.map_or_else(Vec::new, |rm| rm.pv.clone()),
        }
    }

    #[inline]
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn count_node(&mut self) {
        self.nodes += 1;
        self.unflushed_nodes += 1;
        if self.unflushed_nodes >= 1024 {
            self.shared_nodes[self.id].fetch_add(self.unflushed_nodes, Ordering::Relaxed);
            self.unflushed_nodes = 0;
            if self.is_main {
                self.check_time();
            }
        }
    }

    fn total_nodes(&self) -> u64 {
        self.shared_nodes
            .iter()
            .map(|n| n.load(Ordering::Relaxed))
            .sum()
    }

    /// Main-thread poll: flips the shared stop flag on hard limits.
    fn check_time(&mut self) {
        if self.limits.infinite {
            return;
        }
        if self.tm.timed() && self.tm.elapsed_ms() >= self.tm.maximum_ms() {
            self.stop.store(true, Ordering::Relaxed);
        }
        if let Some(max_nodes) = self.limits.nodes {
            if self.total_nodes() + self.unflushed_nodes >= max_nodes {
                self.stop.store(true, Ordering::Relaxed);
            }
        }
    }

    fn history_ctx(&self, ss: usize) -> HistoryContext<'_> {
        HistoryContext {
            butterfly: &self.butterfly,
            capture: &self.capture_history,
            pawn: &self.pawn_history,
            cont: &self.cont_history,
            cont_slots: [
                self.stack[ss - 1].cont_slot,
                self.stack[ss - 2].cont_slot,
                self.stack[ss - 4].cont_slot,
                self.stack[ss - 6].cont_slot,
            ],
        }
    }

    #[inline]
    fn reduction(
        &self,
        improving: bool,
        depth: Depth,
        move_count: i32,
        delta: Value,
        root_delta: Value,
    ) -> Depth {
        let d = (depth as usize).clamp(1, MAX_MOVES - 1);
        let mc = (move_count as usize).clamp(1, MAX_MOVES - 1);
        let r = self.reductions[d] * self.reductions[mc];
        let mut reduction = (r + 1346 - delta * 896 / root_delta.max(1)) / 1024;
        if !improving && r > 880 {
            reduction += 1;
        }
        reduction
    }

    // --- Iterative deepening ---

    pub fn run(&mut self) {
        if self.root_moves.is_empty() {
            if self.is_main {
                let score = if self.pos.checkers() != 0 {
                    mated_in(0)
                } else {
                    VALUE_DRAW
                };
                self.send_info(format!("info depth 0 score {}", format_score(score)));
                self.stop.store(true, Ordering::Relaxed);
            }
            self.info = None;
            return;
        }

        let us = self.pos.side_to_move();
        let mut last_best_move = Move::NONE;
        let mut last_best_depth: Depth = 0;
        let mut prev_time_reduction = 1.0f64;
        let mut iter_value = [VALUE_ZERO; 4];

        let max_depth = self.limits.depth.unwrap_or(MAX_PLY as Depth - 1);

        while self.root_depth < max_depth && !self.stopped() {
            self.root_depth += 1;

            for rm in &mut self.root_moves {
                rm.previous_score = rm.score;
            }

            let mut pv_idx = 0;
            while pv_idx < self.multi_pv && !self.stopped() {
                self.pv_idx = pv_idx;
                self.sel_depth = 0;

                // Aspiration window around the smoothed score of this line.
                let avg = if self.root_moves[pv_idx].average_score == -VALUE_INFINITE {
                    VALUE_ZERO
                } else {
                    self.root_moves[pv_idx].average_score
                };
                let mut delta = 10 + avg * avg / 12493;
                let mut alpha = (avg - delta).max(-VALUE_INFINITE + 1);
                let mut beta = (avg + delta).min(VALUE_INFINITE - 1);

                let opt = 132 * avg / (avg.abs() + 89);
                self.optimism[us.index()] = opt;
                self.optimism[(!us).index()] = -opt;

                let mut failed_high_cnt: i32 = 0;
                loop {
                    let adjusted = (self.root_depth - failed_high_cnt).max(1);
                    let value =
                        self.search(NodeType::Root, alpha, beta, adjusted, false, STACK_OFFSET);

                    self.root_moves[pv_idx..].sort_by(|a, b| b.score.cmp(&a.score));

                    if self.stopped() {
                        break;
                    }

                    if value <= alpha {
                        // Fail low: pull beta toward the middle, reopen alpha.
                        beta = (alpha + beta) / 2;
                        alpha = (value - delta).max(-VALUE_INFINITE + 1);
                        failed_high_cnt = 0;
                        if self.is_main && self.root_depth > 6 {
                            self.print_pv(pv_idx, Some("upperbound"));
                        }
                    } else if value >= beta {
                        beta = (value + delta).min(VALUE_INFINITE - 1);
                        failed_high_cnt += 1;
                        if self.is_main && self.root_depth > 6 {
                            self.print_pv(pv_idx, Some("lowerbound"));
                        }
                    } else {
                        break;
                    }

                    delta += delta / 3;
                }

                self.root_moves[..=pv_idx].sort_by(|a, b| b.score.cmp(&a.score));

                if self.is_main && (self.stopped() || pv_idx + 1 == self.multi_pv) {
                    for i in 0..=pv_idx {
                        self.print_pv(i, None);
                    }
                }

                pv_idx += 1;
            }

            if !self.stopped() {
                self.completed_depth = self.root_depth;
            }

            if self.root_moves[0].mv != last_best_move {
                last_best_move = self.root_moves[0].mv;
                last_best_depth = self.root_depth;
            }

            iter_value[(self.root_depth as usize) & 3] = self.root_moves[0].score;

            if let Some(d) = self.limits.depth {
                if self.is_main && self.completed_depth >= d {
                    self.stop.store(true, Ordering::Relaxed);
                }
            }

            // Main-thread stop decision between iterations.
            if self.is_main && !self.stopped() && self.tm.timed() && !self.limits.infinite {
                let best_value = self.root_moves[0].score;
                let prev_avg = if self.root_moves[0].average_score == -VALUE_INFINITE {
                    best_value
                } else {
                    self.root_moves[0].average_score
                };

                // Spend more time when the score is sliding downhill.
                let falling = ((66.0
                    + 14.0 * f64::from(prev_avg - best_value)
                    + 6.0
                        * f64::from(
                            iter_value[(self.root_depth as usize + 3) & 3] - best_value,
                        ))
                    / 616.0)
                    .clamp(0.51, 1.51);

                // A long-stable best move earns a shorter budget.
                let time_reduction = if last_best_depth + 8 < self.completed_depth {
                    1.56
                } else {
                    0.69
                };
                let reduction = (1.4 + prev_time_reduction) / (2.17 * time_reduction);
                prev_time_reduction = time_reduction;

                let changes: u64 = self
                    .shared_bm_changes
                    .iter()
                    .map(|c| c.swap(0, Ordering::Relaxed))
                    .sum();
                let instability = 1.0 + 1.8 * changes as f64 / self.thread_count as f64;

                let total = self.tm.optimum_ms() as f64 * falling * reduction * instability;
                if self.tm.elapsed_ms() as f64 > total {
                    self.stop.store(true, Ordering::Relaxed);
                }
            }
        }

        // Flush the node remainder so pool-wide sums settle.
        self.shared_nodes[self.id].fetch_add(self.unflushed_nodes, Ordering::Relaxed);
        self.unflushed_nodes = 0;

        if self.is_main {
            // In infinite or ponder mode the result is held back until the
            // driver flips the stop flag.
            while (self.limits.infinite || self.limits.ponder) && !self.stopped() {
                std::thread::yield_now();
            }
            self.stop.store(true, Ordering::Relaxed);
        }

        // Release the info channel so the driver's receive loop terminates.
        self.info = None;
    }

    fn send_info(&self, line: String) {
        if let Some(tx) = &self.info {
            let _ = tx.send(line);
        }
    }

    fn print_pv(&self, pv_idx: usize, bound: Option<&str>) {
        let rm = &self.root_moves[pv_idx];
        let nodes = self.total_nodes() + self.unflushed_nodes;
        let elapsed = self.tm.elapsed_ms().max(1);
        let nps = nodes.saturating_mul(1000) / elapsed as u64;
        let pv: Vec<String> = rm
            .pv
            .iter()
            .map(|m| m.to_uci(self.pos.is_chess960()))
            .collect();
        let score = if rm.score == -VALUE_INFINITE {
            format_score(rm.previous_score)
        } else {
            format_score(rm.score)
        };
        let bound = bound.map_or(String::new(), |b| format!(" {}", b));
        self.send_info(format!(
            "info depth {} seldepth {} multipv {} score {}{} nodes {} nps {} hashfull {} time {} pv {}",
            self.root_depth,
            rm.sel_depth,
            pv_idx + 1,
            score,
            bound,
            nodes,
            nps,
            self.tt.hashfull(),
            elapsed,
            pv.join(" ")
        ));
    }

    // --- Alpha-beta ---

    fn search(
        &mut self,
        node_type: NodeType,
        mut alpha: Value,
        mut beta: Value,
        mut depth: Depth,
        cut_node: bool,
        ss: usize,
    ) -> Value {
        let pv_node = node_type != NodeType::NonPv;
        let root_node = node_type == NodeType::Root;
        let ply = (ss - STACK_OFFSET) as i32;

        debug_assert!(-VALUE_INFINITE <= alpha && alpha < beta && beta <= VALUE_INFINITE);
        debug_assert!(pv_node || alpha == beta - 1);

        // Step 1: an upcoming repetition is already as good as a draw.
        if !root_node && alpha < VALUE_DRAW && self.pos.has_game_cycle(ply) {
            alpha = value_draw(self.nodes);
            if alpha >= beta {
                return alpha;
            }
        }

        // Step 2: depth exhausted, drop to quiescence.
        if depth <= 0 {
            return self.qsearch(pv_node, alpha, beta, DEPTH_QS_CHECKS, ss);
        }
        depth = depth.min(MAX_PLY as Depth - 1);

        if pv_node {
            self.pv.reset(ply as usize);
        }

        let in_check = self.pos.checkers() != 0;
        self.stack[ss].in_check = in_check;
        self.stack[ss].move_count = 0;
        self.stack[ss + 2].killers = [Move::NONE; 2];
        self.stack[ss + 1].excluded_move = Move::NONE;
        self.stack[ss + 1].cutoff_cnt = 0;

        if !root_node {
            // Step 3: aborted search, draw, or ply cap.
            if self.stopped() || self.pos.is_draw(ply) || ply >= MAX_PLY as i32 - 1 {
                return if ply >= MAX_PLY as i32 - 1 && !in_check {
                    eval::evaluate(&self.pos, self.optimism[self.pos.side_to_move().index()])
                } else {
                    value_draw(self.nodes)
                };
            }

            // Step 4: mate-distance pruning.
            alpha = alpha.max(mated_in(ply));
            beta = beta.min(mate_in(ply + 1));
            if alpha >= beta {
                return alpha;
            }
        }

        let us = self.pos.side_to_move();
        let excluded = self.stack[ss].excluded_move;
        self.sel_depth = self.sel_depth.max(ply + 1);

        // Step 5: transposition table probe, with the key salted while a
        // singular candidate is excluded so sub-searches do not collide.
        let pos_key = if excluded == Move::NONE {
            self.pos.key()
        } else {
            self.pos.key() ^ u64::from(excluded.0).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        };
        let (tt_data, tt_entry) = self.tt.probe(pos_key);
        let tt_value = if tt_data.hit {
            value_from_tt(tt_data.value, ply, self.pos.rule50_count())
        } else {
            VALUE_NONE
        };
        let tt_move = if root_node {
            self.root_moves[self.pv_idx].pv[0]
        } else {
            tt_data.mv
        };
        let tt_capture = tt_move != Move::NONE && self.pos.is_capture_stage(tt_move);
        self.stack[ss].tt_hit = tt_data.hit;
        if excluded == Move::NONE {
            self.stack[ss].tt_pv = pv_node || (tt_data.hit && tt_data.is_pv);
        }

        // TT cutoff at non-PV nodes; suppressed near fifty-move expiry so a
        // cached result cannot mask an over-the-board draw.
        if !pv_node
            && excluded == Move::NONE
            && tt_data.hit
            && tt_value != VALUE_NONE
            && tt_data.depth > depth - i32::from(tt_value <= beta)
            && (tt_data.bound as u8
                & if tt_value >= beta {
                    Bound::Lower as u8
                } else {
                    Bound::Upper as u8
                })
                != 0
            && self.pos.rule50_count() < 90
        {
            if tt_move != Move::NONE && tt_value >= beta {
                // Reward the cutoff move so it keeps rising in sibling nodes.
                if !tt_capture && self.pos.pseudo_legal(tt_move) {
                    self.update_quiet_histories(ss, tt_move, stat_bonus(depth));
                }
                // Penalize the early quiet that walked into this refutation.
                let prev = self.stack[ss - 1];
                if prev.current_move.is_ok()
                    && prev.move_count <= 2
                    && self.pos.st().captured.is_none()
                {
                    self.update_continuation_entry(
                        ss - 1,
                        prev.cont_piece,
                        prev.current_move.to_sq(),
                        -stat_malus(depth + 1),
                    );
                }
            }
            if tt_value >= beta && tt_value.abs() < VALUE_MATE_IN_MAX_PLY && depth >= 6 {
                return (tt_value + beta) / 2;
            }
            return tt_value;
        }

        // Step 6: static evaluation, corrected by pawn-structure history.
        let raw_eval;
        let mut eval_for_pruning;
        if in_check {
            raw_eval = VALUE_NONE;
            eval_for_pruning = VALUE_NONE;
            self.stack[ss].static_eval = VALUE_NONE;
        } else if excluded != Move::NONE {
            // Re-entry of the same node: the outer call already evaluated.
            raw_eval = self.stack[ss].static_eval;
            eval_for_pruning = raw_eval;
        } else {
            raw_eval = if tt_data.hit && tt_data.eval != VALUE_NONE {
                tt_data.eval
            } else {
                eval::hint_common_access(&self.pos);
                eval::evaluate(&self.pos, self.optimism[us.index()])
            };
            let corrected = self.corrected_eval(raw_eval);
            self.stack[ss].static_eval = corrected;
            eval_for_pruning = corrected;

            // A stored value bounded the right way beats the bare eval.
            if tt_data.hit
                && tt_value != VALUE_NONE
                && (tt_data.bound as u8
                    & if tt_value > corrected {
                        Bound::Lower as u8
                    } else {
                        Bound::Upper as u8
                    })
                    != 0
            {
                eval_for_pruning = tt_value;
            }
        }

        // Step 7: improving/worsening flags from the eval trend.
        let improving = if in_check {
            false
        } else {
            let two_ago = self.stack[ss - 2].static_eval;
            let four_ago = self.stack[ss - 4].static_eval;
            if two_ago != VALUE_NONE {
                self.stack[ss].static_eval > two_ago
            } else if four_ago != VALUE_NONE {
                self.stack[ss].static_eval > four_ago
            } else {
                true
            }
        };
        let opponent_worsening = !in_check
            && self.stack[ss].static_eval != VALUE_NONE
            && self.stack[ss - 1].static_eval != VALUE_NONE
            && self.stack[ss].static_eval + self.stack[ss - 1].static_eval > 2;

        // Step 8: razoring; a hopeless eval drops straight into quiescence.
        if !root_node
            && !in_check
            && excluded == Move::NONE
            && eval_for_pruning != VALUE_NONE
            && eval_for_pruning
                < alpha - 438 - 306 * depth * depth / (1 + self.stack[ss].cutoff_cnt)
        {
            let value = self.qsearch(false, alpha - 1, alpha, DEPTH_QS_CHECKS, ss);
            if value < alpha && value.abs() < VALUE_MATE_IN_MAX_PLY {
                return value;
            }
        }

        // Step 9: reverse futility (child-node futility pruning).
        if !pv_node
            && !in_check
            && excluded == Move::NONE
            && depth < 9
            && eval_for_pruning != VALUE_NONE
            && (tt_move == Move::NONE || tt_capture)
            && beta > VALUE_MATED_IN_MAX_PLY
            && eval_for_pruning < VALUE_MATE_IN_MAX_PLY
            && eval_for_pruning
                - futility_margin(
                    depth,
                    improving,
                    opponent_worsening,
                    self.stack[ss - 1].stat_score / 267,
                )
                >= beta
        {
            return (eval_for_pruning + beta) / 2;
        }

        // Step 10: null-move search with verification at high depth.
        if !pv_node
            && !in_check
            && excluded == Move::NONE
            && self.stack[ss - 1].current_move != Move::NULL
            && eval_for_pruning != VALUE_NONE
            && eval_for_pruning >= beta
            && beta > VALUE_MATED_IN_MAX_PLY
            && beta < VALUE_MATE_IN_MAX_PLY
            && ply >= self.nmp_min_ply
            && self.pos.non_pawn_material(us) > 0
        {
            let r = ((eval_for_pruning - beta) / 144).min(6) + depth / 3 + 4;
            self.stack[ss].current_move = Move::NULL;
            self.stack[ss].cont_piece = 0;
            self.stack[ss].cont_slot = ContinuationHistory::slot(false, false, 0, 0);

            eval::hint_common_access(&self.pos);
            self.pos.do_null_move();
            let mut null_value =
                -self.search(NodeType::NonPv, -beta, -beta + 1, depth - r, !cut_node, ss + 1);
            self.pos.undo_null_move();

            if self.stopped() {
                return VALUE_ZERO;
            }

            if null_value >= beta && null_value < VALUE_MATE_IN_MAX_PLY {
                if self.nmp_min_ply != 0 || depth < 16 {
                    return null_value;
                }
                // Verification: rerun this node without null moves allowed
                // until well past the current ply.
                self.nmp_min_ply = ply + 3 * (depth - r) / 4;
                let v = self.search(NodeType::NonPv, beta - 1, beta, depth - r, false, ss);
                self.nmp_min_ply = 0;
                if v >= beta {
                    if null_value > v {
                        null_value = v;
                    }
                    return null_value;
                }
            }
        }

        // Step 11: internal iterative reductions without a hash move.
        if pv_node && tt_move == Move::NONE {
            depth -= 3;
        }
        if depth <= 0 {
            return self.qsearch(true, alpha, beta, DEPTH_QS_CHECKS, ss);
        }
        if cut_node && depth >= 8 && tt_move == Move::NONE {
            depth -= 2;
        }

        // Step 12: ProbCut. A capture beating beta by a margin at reduced
        // depth almost always holds at full depth.
        let probcut_beta = (beta + 168 - 70 * i32::from(improving)).min(VALUE_INFINITE - 1);
        if !pv_node
            && depth > 3
            && excluded == Move::NONE
            && eval_for_pruning != VALUE_NONE
            && beta.abs() < VALUE_MATE_IN_MAX_PLY
            && !(tt_data.hit
                && tt_data.depth >= depth - 3
                && tt_value != VALUE_NONE
                && tt_value < probcut_beta)
        {
            let mut picker =
                MovePicker::new_probcut(&self.pos, tt_move, probcut_beta - eval_for_pruning);
            loop {
                let m = {
                    let ctx = self.history_ctx(ss);
                    picker.next(&self.pos, &ctx)
                };
                let Some(m) = m else { break };
                if m == excluded || !self.pos.legal(m) {
                    continue;
                }

                self.make_move(ss, m);
                // Quiescence filter first, then the reduced full search.
                let mut value = -self.qsearch(
                    false,
                    -probcut_beta,
                    -probcut_beta + 1,
                    DEPTH_QS_CHECKS,
                    ss + 1,
                );
                if value >= probcut_beta && depth - 4 > 0 {
                    value = -self.search(
                        NodeType::NonPv,
                        -probcut_beta,
                        -probcut_beta + 1,
                        depth - 4,
                        !cut_node,
                        ss + 1,
                    );
                }
                self.unmake_move(m);

                if self.stopped() {
                    return VALUE_ZERO;
                }
                if value >= probcut_beta {
                    self.tt.save(
                        tt_entry,
                        pos_key,
                        value_to_tt(value, ply),
                        self.stack[ss].tt_pv,
                        Bound::Lower,
                        depth - 3,
                        m,
                        raw_eval,
                    );
                    return value - (probcut_beta - beta);
                }
            }
        }

        // Step 13: the move loop.
        let counter = {
            let prev = self.stack[ss - 1];
            if prev.current_move.is_ok() {
                self.counter_moves
                    .get(prev.cont_piece, prev.current_move.to_sq())
            } else {
                Move::NONE
            }
        };
        let mut picker =
            MovePicker::new_main(&self.pos, tt_move, self.stack[ss].killers, counter, depth);

        let mut best_value = -VALUE_INFINITE;
        let mut best_move = Move::NONE;
        let mut move_count = 0;
        let mut quiets_tried: Vec<Move> = Vec::new();
        let mut captures_tried: Vec<Move> = Vec::new();
        let mut depth_already_reduced = false;

        loop {
            let m = {
                let ctx = self.history_ctx(ss);
                picker.next(&self.pos, &ctx)
            };
            let Some(m) = m else { break };

            if m == excluded {
                continue;
            }
            if root_node && !self.root_moves[self.pv_idx..].iter().any(|rm| rm.mv == m) {
                continue;
            }
            if !root_node && !self.pos.legal(m) {
                continue;
            }

            move_count += 1;
            self.stack[ss].move_count = move_count;

            let capture = self.pos.is_capture_stage(m);
            let gives_check = self.pos.gives_check(m);
            let moved_piece = self.pos.moved_piece(m).expect("picker yields real moves");
            let mut new_depth = depth - 1;
            let delta = beta - alpha;

            let mut r = self.reduction(improving, depth, move_count, delta, delta.max(1));

            // Step 13a: shallow-depth pruning once one move secured a
            // non-mate score.
            if !root_node
                && self.pos.non_pawn_material(us) > 0
                && best_value > VALUE_MATED_IN_MAX_PLY
            {
                if move_count >= futility_move_count(improving, depth) {
                    picker.set_skip_quiets();
                }

                let lmr_depth = (new_depth - r).max(0);

                if capture || gives_check {
                    let captured = self.pos.captured_type(m);
                    // Futility for losing captures.
                    if !gives_check && lmr_depth < 7 && !in_check {
                        let cap_hist = captured
                            .map_or(0, |c| self.capture_history.get(moved_piece, m.to_sq(), c));
                        let futility_value = self.stack[ss].static_eval
                            + 285
                            + 251 * lmr_depth
                            + captured.map_or(0, piece_value)
                            + cap_hist / 7;
                        if self.stack[ss].static_eval != VALUE_NONE && futility_value <= alpha {
                            continue;
                        }
                    }
                    // Losing far more material than the depth justifies.
                    if !self.pos.see_ge(m, -185 * depth) {
                        continue;
                    }
                } else {
                    let pc_idx = moved_piece.index();
                    let cont_score = self
                        .cont_history
                        .get(self.stack[ss - 1].cont_slot, pc_idx, m.to_sq())
                        + self
                            .cont_history
                            .get(self.stack[ss - 2].cont_slot, pc_idx, m.to_sq())
                        + self
                            .pawn_history
                            .get(self.pos.pawn_key(), moved_piece, m.to_sq());
                    // Continuation-history pruning of repeatedly bad quiets.
                    if lmr_depth < 6 && cont_score < -3884 * depth {
                        continue;
                    }
                    // Late-move futility on non-checking quiets.
                    if !in_check
                        && !gives_check
                        && lmr_depth < 14
                        && self.stack[ss].static_eval != VALUE_NONE
                        && self.stack[ss].static_eval + 115 + 122 * lmr_depth <= alpha
                    {
                        picker.set_skip_quiets();
                    }
                    // Negative-SEE quiets priced by the reduced depth.
                    if !self.pos.see_ge(m, -27 * lmr_depth * lmr_depth) {
                        continue;
                    }
                }
            }

            // Step 13b: singular extension. If the hash move alone beats a
            // lowered window where every other move fails, extend it.
            let mut extension = 0;
            if !root_node
                && m == tt_move
                && excluded == Move::NONE
                && depth >= 4 + 2 * i32::from(pv_node && tt_data.is_pv)
                && tt_value != VALUE_NONE
                && tt_value.abs() < VALUE_MATE_IN_MAX_PLY
                && (tt_data.bound as u8 & Bound::Lower as u8) != 0
                && tt_data.depth >= depth - 3
                && ply < 2 * self.root_depth
            {
                let singular_beta = tt_value
                    - (64 + 57 * i32::from(self.stack[ss].tt_pv && !pv_node)) * depth / 64;
                let singular_depth = (depth - 1) / 2;

                self.stack[ss].excluded_move = m;
                let value = self.search(
                    NodeType::NonPv,
                    singular_beta - 1,
                    singular_beta,
                    singular_depth,
                    cut_node,
                    ss,
                );
                self.stack[ss].excluded_move = Move::NONE;

                if value < singular_beta {
                    extension = 1;
                    if !pv_node
                        && self.stack[ss].multiple_extensions <= 16
                        && value < singular_beta - 25
                    {
                        extension = 2;
                    }
                } else if singular_beta >= beta {
                    // Multi-cut: a second move fails high as well.
                    return singular_beta;
                } else if tt_value >= beta {
                    extension = -2 + i32::from(pv_node);
                } else if cut_node {
                    extension = -2;
                } else if tt_value <= value {
                    extension = -1;
                }
            } else if pv_node
                && capture
                && self.stack[ss - 1].current_move.is_ok()
                && m.to_sq() == self.stack[ss - 1].current_move.to_sq()
            {
                // Recapture extension when the exchange history backs it.
                let captured = self.pos.captured_type(m).unwrap_or(PieceType::Pawn);
                if self.capture_history.get(moved_piece, m.to_sq(), captured) > 4000 {
                    extension = 1;
                }
            }

            new_depth += extension;
            self.stack[ss].multiple_extensions =
                self.stack[ss - 1].multiple_extensions + i32::from(extension >= 2);

            // Step 13c: make the move and dispatch to the child.
            self.make_move_with(ss, m, moved_piece, capture);

            let mut value = VALUE_ZERO;
            let mut needs_full_search = false;

            if depth >= 2 && move_count > 1 + i32::from(root_node) {
                // Late-move reduction with the usual adjustments.
                if self.stack[ss].tt_pv {
                    r -= 1 + i32::from(tt_value != VALUE_NONE && tt_value > alpha);
                }
                if cut_node {
                    r += 2;
                }
                if tt_capture && !capture {
                    r += 1;
                }
                if !pv_node {
                    r += 1;
                }
                let pc_idx = moved_piece.index();
                let stat_score = 2 * self.butterfly.get(us, m)
                    + self
                        .cont_history
                        .get(self.stack[ss - 1].cont_slot, pc_idx, m.to_sq())
                    + self
                        .cont_history
                        .get(self.stack[ss - 2].cont_slot, pc_idx, m.to_sq())
                    - 3848;
                self.stack[ss].stat_score = stat_score;
                r -= stat_score / 13659;

                let d = (new_depth - r).clamp(1, new_depth + 1);
                value = -self.search(NodeType::NonPv, -alpha - 1, -alpha, d, true, ss + 1);

                if value > alpha && d < new_depth {
                    // Research deeper or shallower based on how loudly the
                    // reduced search spoke.
                    let go_deeper = value > best_value + 47 + 2 * new_depth;
                    let go_shallower = value < best_value + new_depth;
                    let rd = new_depth + i32::from(go_deeper) - i32::from(go_shallower);
                    if rd > d {
                        value =
                            -self.search(NodeType::NonPv, -alpha - 1, -alpha, rd, !cut_node, ss + 1);
                    }

                    // Post-research continuation feedback for the move.
                    if !capture {
                        let bonus = if value <= alpha {
                            -stat_malus(new_depth)
                        } else if value >= beta {
                            stat_bonus(new_depth)
                        } else {
                            0
                        };
                        if bonus != 0 {
                            self.update_continuation_entry(ss, moved_piece.index(), m.to_sq(), bonus);
                        }
                    }
                }
            } else if !pv_node || move_count > 1 {
                // Null-window search without reduction.
                if tt_move == Move::NONE {
                    r += 2;
                }
                value = -self.search(
                    NodeType::NonPv,
                    -alpha - 1,
                    -alpha,
                    new_depth - i32::from(r > 3),
                    !cut_node,
                    ss + 1,
                );
            } else {
                needs_full_search = true;
            }

            // Full-window search for the first PV move, or after a
            // null-window result landed inside the window.
            if pv_node
                && (move_count == 1 || needs_full_search || (value > alpha && (root_node || value < beta)))
            {
                value = -self.search(NodeType::Pv, -beta, -alpha, new_depth, false, ss + 1);
            }

            // Step 13d: unmake.
            self.unmake_move(m);

            if self.stopped() {
                return VALUE_ZERO;
            }
            debug_assert!(value > -VALUE_INFINITE && value < VALUE_INFINITE);

            if root_node {
                let rm = self
                    .root_moves
                    .iter_mut()
                    .find(|rm| rm.mv == m)
                    .expect("root move list is stable");
                rm.average_score = if rm.average_score == -VALUE_INFINITE {
                    value
                } else {
                    (2 * value + rm.average_score) / 3
                };

                if move_count == 1 || value > alpha {
                    rm.score = value;
                    rm.sel_depth = self.sel_depth;
                    rm.pv = vec![m];
                    rm.pv.extend(self.pv.line(ply as usize + 1));
                    if move_count > 1 {
                        self.shared_bm_changes[self.id].fetch_add(1, Ordering::Relaxed);
                    }
                } else {
                    // Unsearched lines sort behind every searched one.
                    rm.score = -VALUE_INFINITE;
                }
            }

            if value > best_value {
                best_value = value;
                if value > alpha {
                    best_move = m;
                    if pv_node && !root_node {
                        self.pv.update(ply as usize, m);
                    }
                    if value >= beta {
                        self.stack[ss].cutoff_cnt += 1 + i32::from(extension < 2);
                        break;
                    }
                    alpha = value;

                    // Shrink remaining depth once in a middle depth band.
                    if depth > 2
                        && depth < 14
                        && value.abs() < VALUE_MATE_IN_MAX_PLY
                        && !depth_already_reduced
                    {
                        depth -= 2;
                        depth_already_reduced = true;
                    }
                }
            }

            if m != best_move && move_count < 32 {
                if capture {
                    captures_tried.push(m);
                } else {
                    quiets_tried.push(m);
                }
            }
        }

        // Step 14: no legal move was searched.
        if move_count == 0 {
            return if excluded != Move::NONE {
                alpha
            } else if in_check {
                mated_in(ply)
            } else {
                VALUE_DRAW
            };
        }

        if best_value >= beta {
            // History credit for the refutation, debit for the also-rans.
            self.update_all_stats(ss, depth, best_move, &quiets_tried, &captures_tried);
            // Step 15: fail-high smoothing toward beta.
            if best_value.abs() < VALUE_MATE_IN_MAX_PLY && beta.abs() < VALUE_MATE_IN_MAX_PLY {
                best_value = (best_value * (depth + 2) + beta) / (depth + 3);
            }
        } else if best_move == Move::NONE {
            // Everything failed low: mild credit to the previous move.
            let prev = self.stack[ss - 1];
            if prev.current_move.is_ok() && self.pos.st().captured.is_none() && depth > 5 {
                self.update_continuation_entry(
                    ss - 1,
                    prev.cont_piece,
                    prev.current_move.to_sq(),
                    stat_bonus(depth) / 2,
                );
            }
        }

        // Step 16: correction history learns the eval error.
        if !in_check
            && (best_move == Move::NONE || !self.pos.is_capture(best_move))
            && raw_eval != VALUE_NONE
            && !(best_value >= beta && best_value <= self.stack[ss].static_eval)
            && !(best_move == Move::NONE && best_value >= self.stack[ss].static_eval)
        {
            let bonus = ((best_value - self.stack[ss].static_eval) * depth / 8)
                .clamp(-CORRECTION_LIMIT / 4, CORRECTION_LIMIT / 4);
            self.corr_history.update(us, self.pos.pawn_key(), bonus);
        }

        // Step 17: transposition table store; the uncorrected eval goes in.
        if excluded == Move::NONE && !(root_node && self.pv_idx > 0) {
            let bound = if best_value >= beta {
                Bound::Lower
            } else if pv_node && best_move != Move::NONE {
                Bound::Exact
            } else {
                Bound::Upper
            };
            self.tt.save(
                tt_entry,
                pos_key,
                value_to_tt(best_value, ply),
                self.stack[ss].tt_pv,
                bound,
                depth,
                best_move,
                raw_eval,
            );
        }

        best_value
    }

    // --- Quiescence ---

    fn qsearch(
        &mut self,
        pv_node: bool,
        mut alpha: Value,
        beta: Value,
        depth: Depth,
        ss: usize,
    ) -> Value {
        debug_assert!(depth <= DEPTH_QS_CHECKS);
        let ply = (ss - STACK_OFFSET) as i32;

        if pv_node {
            self.pv.reset(ply as usize);
        }

        // Repetition and clock draws apply before anything tactical.
        if alpha < VALUE_DRAW && self.pos.has_game_cycle(ply) {
            alpha = value_draw(self.nodes);
            if alpha >= beta {
                return alpha;
            }
        }
        let in_check = self.pos.checkers() != 0;
        if self.stopped() || self.pos.is_draw(ply) || ply >= MAX_PLY as i32 - 1 {
            return if ply >= MAX_PLY as i32 - 1 && !in_check {
                eval::evaluate(&self.pos, self.optimism[self.pos.side_to_move().index()])
            } else {
                value_draw(self.nodes)
            };
        }

        self.stack[ss].in_check = in_check;
        let us = self.pos.side_to_move();

        // Checks are searched one qsearch layer deep, then captures only.
        let tt_depth = if in_check || depth >= DEPTH_QS_CHECKS {
            DEPTH_QS_CHECKS
        } else {
            DEPTH_QS_NO_CHECKS
        };

        let pos_key = self.pos.key();
        let (tt_data, tt_entry) = self.tt.probe(pos_key);
        let tt_value = if tt_data.hit {
            value_from_tt(tt_data.value, ply, self.pos.rule50_count())
        } else {
            VALUE_NONE
        };
        let tt_move = tt_data.mv;
        let tt_pv = tt_data.hit && tt_data.is_pv;

        if !pv_node
            && tt_data.hit
            && tt_value != VALUE_NONE
            && tt_data.depth >= tt_depth
            && (tt_data.bound as u8
                & if tt_value >= beta {
                    Bound::Lower as u8
                } else {
                    Bound::Upper as u8
                })
                != 0
        {
            return tt_value;
        }

        // Stand pat on the corrected static evaluation.
        let raw_eval;
        let mut best_value;
        let futility_base;
        if in_check {
            raw_eval = VALUE_NONE;
            best_value = -VALUE_INFINITE;
            futility_base = -VALUE_INFINITE;
            self.stack[ss].static_eval = VALUE_NONE;
        } else {
            raw_eval = if tt_data.hit && tt_data.eval != VALUE_NONE {
                tt_data.eval
            } else {
                eval::evaluate(&self.pos, self.optimism[us.index()])
            };
            best_value = self.corrected_eval(raw_eval);
            self.stack[ss].static_eval = best_value;

            if tt_data.hit
                && tt_value != VALUE_NONE
                && (tt_data.bound as u8
                    & if tt_value > best_value {
                        Bound::Lower as u8
                    } else {
                        Bound::Upper as u8
                    })
                    != 0
            {
                best_value = tt_value;
            }

            if best_value >= beta {
                if !tt_data.hit {
                    self.tt.save(
                        tt_entry,
                        pos_key,
                        value_to_tt(best_value, ply),
                        false,
                        Bound::Lower,
                        DEPTH_QS_NO_CHECKS,
                        Move::NONE,
                        raw_eval,
                    );
                }
                return best_value;
            }
            if best_value > alpha {
                alpha = best_value;
            }
            futility_base = self.stack[ss].static_eval + 226;
        }

        let mut picker = MovePicker::new_qsearch(&self.pos, tt_move, tt_depth);
        let mut best_move = Move::NONE;
        let mut move_count = 0;

        loop {
            let m = {
                let ctx = self.history_ctx(ss);
                picker.next(&self.pos, &ctx)
            };
            let Some(m) = m else { break };
            if !self.pos.legal(m) {
                continue;
            }

            move_count += 1;
            let capture = self.pos.is_capture_stage(m);
            let gives_check = self.pos.gives_check(m);
            let moved_piece = self.pos.moved_piece(m).expect("picker yields real moves");

            if best_value > VALUE_MATED_IN_MAX_PLY && !gives_check && capture && !in_check {
                // Futility: even winning this capture cannot reach alpha.
                if move_count > 2 {
                    continue;
                }
                let futility_value = futility_base + self.pos.captured_value(m);
                if futility_value <= alpha {
                    best_value = best_value.max(futility_value);
                    continue;
                }
                if futility_base <= alpha && !self.pos.see_ge(m, 1) {
                    best_value = best_value.max(futility_base);
                    continue;
                }
            }

            if best_value > VALUE_MATED_IN_MAX_PLY && !capture && in_check {
                // Quiet evasions with a rotten continuation history are noise.
                let pc_idx = moved_piece.index();
                let cont = self
                    .cont_history
                    .get(self.stack[ss - 1].cont_slot, pc_idx, m.to_sq())
                    + self
                        .cont_history
                        .get(self.stack[ss - 2].cont_slot, pc_idx, m.to_sq());
                if cont < 0 && move_count > 2 {
                    continue;
                }
            }

            // The exchange must not lose more than a fraction of a pawn.
            if best_value > VALUE_MATED_IN_MAX_PLY && !self.pos.see_ge(m, -78) {
                continue;
            }

            self.make_move_with(ss, m, moved_piece, capture);
            let value = -self.qsearch(pv_node, -beta, -alpha, depth - 1, ss + 1);
            self.unmake_move(m);

            if self.stopped() {
                return VALUE_ZERO;
            }

            if value > best_value {
                best_value = value;
                if value > alpha {
                    best_move = m;
                    if pv_node {
                        self.pv.update(ply as usize, m);
                    }
                    if value >= beta {
                        break;
                    }
                    alpha = value;
                }
            }
        }

        // All evasions exhausted or pruned while in check: mate.
        if in_check && best_value == -VALUE_INFINITE {
            return mated_in(ply);
        }

        let bound = if best_value >= beta {
            Bound::Lower
        } else {
            Bound::Upper
        };
        self.tt.save(
            tt_entry,
            pos_key,
            value_to_tt(best_value, ply),
            tt_pv,
            bound,
            tt_depth,
            best_move,
            raw_eval,
        );

        best_value
    }

    // --- Move make/unmake with stack bookkeeping ---

    fn make_move(&mut self, ss: usize, m: Move) {
        let capture = self.pos.is_capture_stage(m);
        let moved_piece = self.pos.moved_piece(m).expect("make_move on empty square");
        self.make_move_with(ss, m, moved_piece, capture);
    }

    fn make_move_with(&mut self, ss: usize, m: Move, moved_piece: Piece, capture: bool) {
        let in_check = self.pos.checkers() != 0;
        self.stack[ss].current_move = m;
        self.stack[ss].cont_piece = moved_piece.index();
        self.stack[ss].cont_slot =
            ContinuationHistory::slot(in_check, capture, moved_piece.index(), m.to_sq());
        self.count_node();
        self.pos.do_move(m);
    }

    fn unmake_move(&mut self, m: Move) {
        self.pos.undo_move(m);
    }

    // --- Evaluation correction ---

    fn corrected_eval(&self, raw: Value) -> Value {
        let us = self.pos.side_to_move();
        let correction = self.corr_history.get(us, self.pos.pawn_key()) / 4;
        (raw + correction).clamp(-VALUE_MAX_EVAL + 1, VALUE_MAX_EVAL - 1)
    }

    // --- History maintenance ---

    fn update_continuation_entry(&mut self, ss: usize, pc_idx: usize, to: Square, bonus: i32) {
        let slot = self.stack[ss].cont_slot;
        self.cont_history.update(slot, pc_idx, to, bonus);
    }

    /// Propagate a bonus for (piece, to) through the continuation tables of
    /// the last one, two, three, four and six plies.
    fn update_continuation_histories(&mut self, ss: usize, pc_idx: usize, to: Square, bonus: i32) {
        for i in [1usize, 2, 3, 4, 6] {
            if self.stack[ss].in_check && i > 2 {
                break;
            }
            if self.stack[ss - i].current_move.is_ok() {
                let slot = self.stack[ss - i].cont_slot;
                let scaled = bonus / (1 + 3 * i32::from(i == 3));
                self.cont_history.update(slot, pc_idx, to, scaled);
            }
        }
    }

    fn update_quiet_histories(&mut self, ss: usize, m: Move, bonus: i32) {
        let us = self.pos.side_to_move();
        self.butterfly.update(us, m, bonus);
        if let Some(pc) = self.pos.moved_piece(m) {
            self.update_continuation_histories(ss, pc.index(), m.to_sq(), bonus);
            self.pawn_history
                .update(self.pos.pawn_key(), pc, m.to_sq(), bonus / 2);
        }
    }

    /// Stats on a beta cutoff: credit the winner, debit the also-rans.
    fn update_all_stats(
        &mut self,
        ss: usize,
        depth: Depth,
        best_move: Move,
        quiets_tried: &[Move],
        captures_tried: &[Move],
    ) {
        let us = self.pos.side_to_move();
        let bonus = stat_bonus(depth);
        let malus = stat_malus(depth);

        if !self.pos.is_capture_stage(best_move) {
            // Killer slots and the counter-move refutation.
            if self.stack[ss].killers[0] != best_move {
                self.stack[ss].killers[1] = self.stack[ss].killers[0];
                self.stack[ss].killers[0] = best_move;
            }
            let prev = self.stack[ss - 1];
            if prev.current_move.is_ok() {
                self.counter_moves
                    .set(prev.cont_piece, prev.current_move.to_sq(), best_move);
            }

            self.update_quiet_histories(ss, best_move, bonus);
            for &q in quiets_tried {
                self.butterfly.update(us, q, -malus);
                if let Some(pc) = self.pos.moved_piece(q) {
                    self.update_continuation_histories(ss, pc.index(), q.to_sq(), -malus);
                    self.pawn_history
                        .update(self.pos.pawn_key(), pc, q.to_sq(), -malus / 2);
                }
            }
        } else if let (Some(pc), Some(captured)) = (
            self.pos.moved_piece(best_move),
            self.pos.captured_type(best_move),
        ) {
            self.capture_history
                .update(pc, best_move.to_sq(), captured, bonus);
        }

        for &c in captures_tried {
            if let (Some(pc), Some(captured)) =
                (self.pos.moved_piece(c), self.pos.captured_type(c))
            {
                self.capture_history.update(pc, c.to_sq(), captured, -malus);
            }
        }
    }
}

/// Render a value the way engine front-ends expect: centipawns, or moves
/// until mate for scores inside the mate range.
pub fn format_score(v: Value) -> String {
    if v.abs() >= VALUE_MATE_IN_MAX_PLY {
        let mate = if v > 0 {
            (VALUE_MATE - v + 1) / 2
        } else {
            -(VALUE_MATE + v) / 2
        };
        format!("mate {}", mate)
    } else {
        format!("cp {}", v * 100 / PAWN_VALUE)
    }
}

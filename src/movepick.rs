//! Staged move ordering.
//!
//! The picker hands the search one move per call, generating and scoring
//! each class of moves only when the previous class runs dry: hash move,
//! winning captures, refutations, quiets sorted by history, then the losing
//! captures and quiets it stashed along the way. Quiescence and ProbCut get
//! reduced stage chains. The hash move is never yielded twice.

use crate::bitboard::*;
use crate::chess_move::{Move, MoveList};
use crate::history::*;
use crate::movegen::{self, GenType};
use crate::position::Position;
use crate::types::*;

/// History tables a `next()` call reads; rebuilt cheaply by the caller
/// whenever it needs to hand the picker fresh borrows.
pub struct HistoryContext<'a> {
    pub butterfly: &'a ButterflyHistory,
    pub capture: &'a CaptureHistory,
    pub pawn: &'a PawnHistory,
    pub cont: &'a ContinuationHistory,
    /// Continuation slots for the previous 1, 2, 4 and 6 plies.
    pub cont_slots: [usize; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    TTMove,
    CaptureInit,
    GoodCapture,
    Refutation,
    QuietInit,
    GoodQuiet,
    BadCapture,
    BadQuiet,
    EvasionInit,
    Evasion,
    QCaptureInit,
    QCapture,
    QCheckInit,
    QCheck,
    ProbcutInit,
    Probcut,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Main,
    QSearch,
    Probcut,
}

const CHECK_BONUS: i32 = 16384;
const QUEEN_ESCAPE_BONUS: i32 = 51700;
const ROOK_ESCAPE_BONUS: i32 = 25600;
const MINOR_ESCAPE_BONUS: i32 = 14450;
const QUEEN_EN_PRISE: i32 = 49000;
const ROOK_EN_PRISE: i32 = 24335;
const MINOR_EN_PRISE: i32 = 14900;

fn quiet_threshold(depth: Depth) -> i32 {
    -3560 * depth
}

pub struct MovePicker {
    stage: Stage,
    mode: Mode,
    in_check: bool,
    tt_move: Move,
    refutations: [Move; 3],
    depth: Depth,
    threshold: Value,
    skip_quiets: bool,

    captures: MoveList,
    quiets: MoveList,
    bad_captures: Vec<Move>,
    cur: usize,
}

impl MovePicker {
    /// Picker for the main search.
    pub fn new_main(
        pos: &Position,
        tt_move: Move,
        killers: [Move; 2],
        counter: Move,
        depth: Depth,
    ) -> MovePicker {
        let tt_ok = tt_move != Move::NONE && pos.pseudo_legal(tt_move);
        MovePicker {
            stage: if tt_ok { Stage::TTMove } else { Stage::CaptureInit },
            mode: Mode::Main,
            in_check: pos.checkers() != 0,
            tt_move: if tt_ok { tt_move } else { Move::NONE },
            refutations: [killers[0], killers[1], counter],
            depth,
            threshold: 0,
            skip_quiets: false,
            captures: MoveList::new(),
            quiets: MoveList::new(),
            bad_captures: Vec::new(),
            cur: 0,
        }
        .fix_entry_stage()
    }

    /// Picker for quiescence. At `DEPTH_QS_CHECKS` quiet checking moves are
    /// appended after the captures run out.
    pub fn new_qsearch(pos: &Position, tt_move: Move, depth: Depth) -> MovePicker {
        let tt_ok = tt_move != Move::NONE && pos.pseudo_legal(tt_move);
        MovePicker {
            stage: if tt_ok { Stage::TTMove } else { Stage::CaptureInit },
            mode: Mode::QSearch,
            in_check: pos.checkers() != 0,
            tt_move: if tt_ok { tt_move } else { Move::NONE },
            refutations: [Move::NONE; 3],
            depth,
            threshold: 0,
            skip_quiets: false,
            captures: MoveList::new(),
            quiets: MoveList::new(),
            bad_captures: Vec::new(),
            cur: 0,
        }
        .fix_entry_stage()
    }

    /// Picker for ProbCut: only captures beating the exchange threshold.
    pub fn new_probcut(pos: &Position, tt_move: Move, threshold: Value) -> MovePicker {
        let tt_ok = tt_move != Move::NONE
            && pos.is_capture_stage(tt_move)
            && pos.pseudo_legal(tt_move)
            && pos.see_ge(tt_move, threshold);
        MovePicker {
            stage: if tt_ok { Stage::TTMove } else { Stage::CaptureInit },
            mode: Mode::Probcut,
            in_check: false,
            tt_move: if tt_ok { tt_move } else { Move::NONE },
            refutations: [Move::NONE; 3],
            depth: 0,
            threshold,
            skip_quiets: false,
            captures: MoveList::new(),
            quiets: MoveList::new(),
            bad_captures: Vec::new(),
            cur: 0,
        }
        .fix_entry_stage()
    }

    /// The stage that follows the hash move for this picker's mode.
    fn generation_stage(&self) -> Stage {
        match self.mode {
            _ if self.in_check => Stage::EvasionInit,
            Mode::Main => Stage::CaptureInit,
            Mode::QSearch => Stage::QCaptureInit,
            Mode::Probcut => Stage::ProbcutInit,
        }
    }

    fn fix_entry_stage(mut self) -> MovePicker {
        if self.stage != Stage::TTMove {
            self.stage = self.generation_stage();
        }
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The search calls this once pruning decides quiets cannot raise alpha.
    pub fn set_skip_quiets(&mut self) {
        self.skip_quiets = true;
    }

    fn score_captures(&mut self, pos: &Position, ctx: &HistoryContext) {
        for i in 0..self.captures.len() {
            let m = self.captures[i].mv;
            let captured = pos.captured_type(m).unwrap_or(PieceType::Queen);
            let pc = pos.moved_piece(m).expect("capture from empty square");
            self.captures[i].score =
                7 * piece_value(captured) + ctx.capture.get(pc, m.to_sq(), captured);
        }
    }

    fn score_quiets(&mut self, pos: &Position, ctx: &HistoryContext) {
        let us = pos.side_to_move();
        let them = !us;

        // Squares attacked by progressively heavier enemy pieces, used to
        // reward escapes and punish moves en prise.
        let occ = pos.pieces();
        let threatened_by_pawn = pawn_attacks_by(them, pos.pieces_cp(them, PieceType::Pawn));
        let mut threatened_by_minor = threatened_by_pawn;
        let mut b = pos.pieces_cp(them, PieceType::Knight);
        while b != 0 {
            threatened_by_minor |= attacks_bb(PieceType::Knight, pop_lsb(&mut b), occ);
        }
        let mut b = pos.pieces_cp(them, PieceType::Bishop);
        while b != 0 {
            threatened_by_minor |= attacks_bb(PieceType::Bishop, pop_lsb(&mut b), occ);
        }
        let mut threatened_by_rook = threatened_by_minor;
        let mut b = pos.pieces_cp(them, PieceType::Rook);
        while b != 0 {
            threatened_by_rook |= attacks_bb(PieceType::Rook, pop_lsb(&mut b), occ);
        }
        let threatened = pos.pieces_cp(us, PieceType::Queen) & threatened_by_rook
            | pos.pieces_cp(us, PieceType::Rook) & threatened_by_minor
            | (pos.pieces_cp(us, PieceType::Knight) | pos.pieces_cp(us, PieceType::Bishop))
                & threatened_by_pawn;

        for i in 0..self.quiets.len() {
            let m = self.quiets[i].mv;
            let from = m.from_sq();
            let to = m.to_sq();
            let pc = pos.moved_piece(m).expect("quiet from empty square");
            let pc_idx = pc.index();
            let to_bb = square_bb(to);

            let mut score = 2 * ctx.butterfly.get(us, m);
            score += 2 * ctx.pawn.get(pos.pawn_key(), pc, to);
            score += 2 * ctx.cont.get(ctx.cont_slots[0], pc_idx, to);
            score += ctx.cont.get(ctx.cont_slots[1], pc_idx, to);
            score += ctx.cont.get(ctx.cont_slots[2], pc_idx, to);
            score += ctx.cont.get(ctx.cont_slots[3], pc_idx, to);

            if pos.check_squares(pc.kind) & to_bb != 0 {
                score += CHECK_BONUS;
            }

            if threatened & square_bb(from) != 0 {
                // Fleeing a cheaper attacker is urgent.
                score += match pc.kind {
                    PieceType::Queen if threatened_by_rook & to_bb == 0 => QUEEN_ESCAPE_BONUS,
                    PieceType::Rook if threatened_by_minor & to_bb == 0 => ROOK_ESCAPE_BONUS,
                    _ if threatened_by_pawn & to_bb == 0 => MINOR_ESCAPE_BONUS,
                    _ => 0,
                };
            } else {
                // Walking into a cheaper attacker is not.
                score -= match pc.kind {
                    PieceType::Queen => {
                        i32::from(threatened_by_rook & to_bb != 0) * QUEEN_EN_PRISE
                            + i32::from(threatened_by_minor & to_bb != 0) * ROOK_EN_PRISE
                    }
                    PieceType::Rook => i32::from(threatened_by_minor & to_bb != 0) * ROOK_EN_PRISE,
                    PieceType::Pawn => 0,
                    _ => i32::from(threatened_by_pawn & to_bb != 0) * MINOR_EN_PRISE,
                };
            }

            self.quiets[i].score = score;
        }
    }

    fn score_evasions(&mut self, pos: &Position, ctx: &HistoryContext) {
        let us = pos.side_to_move();
        for i in 0..self.captures.len() {
            let m = self.captures[i].mv;
            self.captures[i].score = if pos.is_capture(m) {
                let captured = pos.captured_type(m).unwrap_or(PieceType::Pawn);
                (1 << 28) + piece_value(captured)
                    - pos.moved_piece(m).map_or(0, |p| p.kind.index() as i32)
            } else {
                let pc_idx = pos.moved_piece(m).map_or(0, |p| p.index());
                ctx.butterfly.get(us, m) + ctx.cont.get(ctx.cont_slots[0], pc_idx, m.to_sq())
            };
        }
    }

    /// Next move, or `None` when exhausted. The caller still has to test
    /// `legal()`; the picker only guarantees pseudo-legality.
    pub fn next(&mut self, pos: &Position, ctx: &HistoryContext) -> Option<Move> {
        loop {
            match self.stage {
                Stage::TTMove => {
                    self.stage = self.generation_stage();
                    return Some(self.tt_move);
                }

                Stage::CaptureInit | Stage::QCaptureInit | Stage::ProbcutInit => {
                    self.captures = movegen::generate(pos, GenType::Captures);
                    self.score_captures(pos, ctx);
                    partial_insertion_sort(&mut self.captures, i32::MIN);
                    self.cur = 0;
                    self.stage = match self.stage {
                        Stage::CaptureInit => Stage::GoodCapture,
                        Stage::QCaptureInit => Stage::QCapture,
                        _ => Stage::Probcut,
                    };
                }

                Stage::GoodCapture => {
                    while self.cur < self.captures.len() {
                        let e = self.captures[self.cur];
                        self.cur += 1;
                        if e.mv == self.tt_move {
                            continue;
                        }
                        if pos.see_ge(e.mv, -e.score / 18) {
                            return Some(e.mv);
                        }
                        self.bad_captures.push(e.mv);
                    }
                    self.stage = Stage::Refutation;
                    self.cur = 0;
                }

                Stage::Refutation => {
                    while self.cur < 3 {
                        let m = self.refutations[self.cur];
                        self.cur += 1;
                        // The counter-move may coincide with a killer.
                        if self.cur == 3 && (m == self.refutations[0] || m == self.refutations[1])
                        {
                            continue;
                        }
                        if m != Move::NONE
                            && m != self.tt_move
                            && !pos.is_capture(m)
                            && pos.pseudo_legal(m)
                        {
                            return Some(m);
                        }
                    }
                    self.stage = Stage::QuietInit;
                }

                Stage::QuietInit => {
                    if !self.skip_quiets {
                        self.quiets = movegen::generate(pos, GenType::Quiets);
                        self.score_quiets(pos, ctx);
                        partial_insertion_sort(&mut self.quiets, quiet_threshold(self.depth));
                    }
                    self.cur = 0;
                    self.stage = Stage::GoodQuiet;
                }

                Stage::GoodQuiet => {
                    if !self.skip_quiets {
                        while self.cur < self.quiets.len() {
                            let e = self.quiets[self.cur];
                            if e.score < quiet_threshold(self.depth) {
                                // Sorted region exhausted; rest are bad quiets.
                                break;
                            }
                            self.cur += 1;
                            if e.mv != self.tt_move && !self.is_refutation(e.mv) {
                                return Some(e.mv);
                            }
                        }
                    }
                    self.stage = Stage::BadCapture;
                    self.cur = 0;
                }

                Stage::BadCapture => {
                    if self.cur < self.bad_captures.len() {
                        let m = self.bad_captures[self.cur];
                        self.cur += 1;
                        return Some(m);
                    }
                    self.stage = Stage::BadQuiet;
                    self.cur = self.first_bad_quiet();
                }

                Stage::BadQuiet => {
                    if !self.skip_quiets {
                        while self.cur < self.quiets.len() {
                            let e = self.quiets[self.cur];
                            self.cur += 1;
                            if e.mv != self.tt_move && !self.is_refutation(e.mv) {
                                return Some(e.mv);
                            }
                        }
                    }
                    self.stage = Stage::Done;
                }

                Stage::EvasionInit => {
                    self.captures = movegen::generate(pos, GenType::Evasions);
                    self.score_evasions(pos, ctx);
                    partial_insertion_sort(&mut self.captures, i32::MIN);
                    self.cur = 0;
                    self.stage = Stage::Evasion;
                }

                Stage::Evasion => {
                    while self.cur < self.captures.len() {
                        let m = self.captures[self.cur].mv;
                        self.cur += 1;
                        if m != self.tt_move {
                            return Some(m);
                        }
                    }
                    self.stage = Stage::Done;
                }

                Stage::QCapture => {
                    while self.cur < self.captures.len() {
                        let m = self.captures[self.cur].mv;
                        self.cur += 1;
                        if m != self.tt_move {
                            return Some(m);
                        }
                    }
                    if self.depth == DEPTH_QS_CHECKS {
                        self.stage = Stage::QCheckInit;
                    } else {
                        self.stage = Stage::Done;
                    }
                }

                Stage::QCheckInit => {
                    self.quiets = movegen::generate(pos, GenType::QuietChecks);
                    self.cur = 0;
                    self.stage = Stage::QCheck;
                }

                Stage::QCheck => {
                    while self.cur < self.quiets.len() {
                        let m = self.quiets[self.cur].mv;
                        self.cur += 1;
                        if m != self.tt_move {
                            return Some(m);
                        }
                    }
                    self.stage = Stage::Done;
                }

                Stage::Probcut => {
                    while self.cur < self.captures.len() {
                        let m = self.captures[self.cur].mv;
                        self.cur += 1;
                        if m != self.tt_move && pos.see_ge(m, self.threshold) {
                            return Some(m);
                        }
                    }
                    self.stage = Stage::Done;
                }

                Stage::Done => return None,
            }
        }
    }

    fn is_refutation(&self, m: Move) -> bool {
        self.refutations.contains(&m)
    }

    fn first_bad_quiet(&self) -> usize {
        let limit = quiet_threshold(self.depth);
        (0..self.quiets.len())
            .find(|&i| self.quiets[i].score < limit)
            .unwrap_or(self.quiets.len())
    }
}

/// Sort the entries whose score reaches `limit` to the front, descending;
/// entries below the limit keep their relative order at the tail.
fn partial_insertion_sort(list: &mut MoveList, limit: i32) {
    let len = list.len();
    let mut sorted_end = 0;
    for p in 1..len {
        if list[p].score >= limit {
            let tmp = list[p];
            sorted_end += 1;
            list[p] = list[sorted_end];
            let mut q = sorted_end;
            while q > 0 && list[q - 1].score < tmp.score {
                list[q] = list[q - 1];
                q -= 1;
            }
            list[q] = tmp;
        }
    }
}

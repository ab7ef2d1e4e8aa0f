//! Board state with make/unmake move semantics.
//!
//! A `Position` is mutated only through `do_move`/`undo_move` and their null
//! move counterparts. Every `do_move` pushes a fresh `StateInfo` onto an
//! undo stack owned by the position itself; "previous" is index arithmetic
//! into that stack, which keeps make/unmake O(1) without pointer chains.

use anyhow::{bail, Context, Result};

use crate::bitboard::*;
use crate::chess_move::{Move, MoveKind};
use crate::movegen::{self, GenType};
use crate::types::*;

/// Per-ply state, snapshotted by `do_move` and popped by `undo_move`.
#[derive(Debug, Clone, Default)]
pub struct StateInfo {
    // Copied from the previous state when a move is made.
    pub material_key: Key,
    pub pawn_key: Key,
    pub non_pawn_material: [Value; COLOR_COUNT],
    pub castling_rights: u8,
    pub rule50: i32,
    pub plies_from_null: i32,
    pub ep_square: Option<Square>,

    // Recomputed after the move.
    pub key: Key,
    pub checkers: Bitboard,
    pub blockers_for_king: [Bitboard; COLOR_COUNT],
    pub pinners: [Bitboard; COLOR_COUNT],
    pub check_squares: [Bitboard; PIECE_TYPE_COUNT],
    pub captured: Option<PieceType>,
    /// Signed distance to the closest ancestor with the same key, negative
    /// when that ancestor itself repeats an even earlier position.
    pub repetition: i32,
}

#[derive(Clone)]
pub struct Position {
    board: [Option<Piece>; 64],
    by_type: [Bitboard; PIECE_TYPE_COUNT],
    by_color: [Bitboard; COLOR_COUNT],
    side_to_move: Color,
    game_ply: i32,
    chess960: bool,
    castling_rights_mask: [u8; 64],
    castling_rook_square: [Square; CASTLING_RIGHT_COUNT],
    castling_path: [Bitboard; CASTLING_RIGHT_COUNT],
    states: Vec<StateInfo>,
}

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

impl Position {
    pub fn startpos() -> Position {
        Position::from_fen(START_FEN).expect("start position FEN is valid")
    }

    pub fn from_fen(fen: &str) -> Result<Position> {
        let mut pos = Position {
            board: [None; 64],
            by_type: [0; PIECE_TYPE_COUNT],
            by_color: [0; COLOR_COUNT],
            side_to_move: Color::White,
            game_ply: 0,
            chess960: false,
            castling_rights_mask: [0; 64],
            castling_rook_square: [0; CASTLING_RIGHT_COUNT],
            castling_path: [0; CASTLING_RIGHT_COUNT],
            states: vec![StateInfo::default()],
        };

        let mut parts = fen.split_whitespace();

        // 1. Piece placement.
        let placement = parts.next().context("FEN is empty")?;
        let mut sq_file: i32 = 0;
        let mut sq_rank: i32 = 7;
        for c in placement.chars() {
            match c {
                '/' => {
                    sq_rank -= 1;
                    sq_file = 0;
                    if sq_rank < 0 {
                        bail!("FEN has too many ranks: {fen}");
                    }
                }
                '1'..='8' => sq_file += c as i32 - '0' as i32,
                _ => {
                    let piece =
                        Piece::from_char(c).with_context(|| format!("bad piece '{c}' in {fen}"))?;
                    if sq_file > 7 {
                        bail!("FEN rank overflows: {fen}");
                    }
                    pos.put_piece(piece, make_square(sq_file as File, sq_rank as Rank));
                    sq_file += 1;
                }
            }
        }
        for c in [Color::White, Color::Black] {
            if pos.pieces_cp(c, PieceType::King).count_ones() != 1 {
                bail!("FEN must have exactly one king per side: {fen}");
            }
        }

        // 2. Side to move.
        pos.side_to_move = match parts.next() {
            Some("w") => Color::White,
            Some("b") => Color::Black,
            other => bail!("bad side-to-move field {other:?} in {fen}"),
        };

        // 3. Castling rights: standard letters, Shredder file letters, X-FEN.
        let castling = parts.next().unwrap_or("-");
        if castling != "-" {
            for token in castling.chars() {
                let color = if token.is_ascii_uppercase() {
                    Color::White
                } else {
                    Color::Black
                };
                let ksq = pos.king_square(color);
                let rook = Piece::new(color, PieceType::Rook);
                let rsq = match token.to_ascii_uppercase() {
                    'K' => {
                        let mut s = relative_square(color, SQ_H1);
                        while s > ksq && pos.board[s as usize] != Some(rook) {
                            s -= 1;
                        }
                        s
                    }
                    'Q' => {
                        let mut s = relative_square(color, SQ_A1);
                        while s < ksq && pos.board[s as usize] != Some(rook) {
                            s += 1;
                        }
                        s
                    }
                    'A'..='H' => {
                        pos.chess960 = true;
                        make_square(
                            token.to_ascii_uppercase() as u8 - b'A',
                            rank_of(ksq),
                        )
                    }
                    _ => bail!("bad castling token '{token}' in {fen}"),
                };
                if pos.board[rsq as usize] != Some(rook) || rsq == ksq {
                    bail!("castling right '{token}' has no rook in {fen}");
                }
                pos.set_castling_right(color, rsq);
            }
        }

        // 4. En passant, kept only when an actual capture is possible.
        let ep_field = parts.next().unwrap_or("-");
        if ep_field != "-" {
            let ep = square_from_string(ep_field)
                .with_context(|| format!("bad en-passant square '{ep_field}' in {fen}"))?;
            let us = pos.side_to_move;
            let them = !us;
            let victim_sq = (ep as i32 - pawn_push(us)) as Square;
            let crossed = (ep as i32 + pawn_push(us)) as Square;
            let valid = relative_rank(us, ep) == 5
                && pawn_attacks(them, ep) & pos.pieces_cp(us, PieceType::Pawn) != 0
                && pos.pieces_cp(them, PieceType::Pawn) & square_bb(victim_sq) != 0
                && pos.pieces() & (square_bb(ep) | square_bb(crossed)) == 0;
            if valid {
                pos.states[0].ep_square = Some(ep);
            }
        }

        // 5. Halfmove clock and fullmove number.
        pos.states[0].rule50 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let fullmove: i32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(1);
        pos.game_ply =
            ((fullmove - 1).max(0)) * 2 + if pos.side_to_move == Color::Black { 1 } else { 0 };

        // A nonstandard king or rook file means Chess960 even when the rights
        // came in as KQkq (X-FEN input).
        for idx in 0..CASTLING_RIGHT_COUNT {
            if pos.states[0].castling_rights & (1 << idx) != 0 {
                let c = Color::from_index(idx / 2);
                let standard_rook = relative_square(c, if idx % 2 == 0 { SQ_H1 } else { SQ_A1 });
                if pos.king_square(c) != relative_square(c, SQ_E1)
                    || pos.castling_rook_square[idx] != standard_rook
                {
                    pos.chess960 = true;
                }
            }
        }

        pos.init_state();
        Ok(pos)
    }

    /// Emit the position as FEN; Shredder-style castling letters in Chess960.
    pub fn fen(&self) -> String {
        let mut out = String::new();
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                match self.board[make_square(file, rank) as usize] {
                    Some(p) => {
                        if empty > 0 {
                            out.push((b'0' + empty) as char);
                            empty = 0;
                        }
                        out.push(p.to_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                out.push((b'0' + empty) as char);
            }
            if rank > 0 {
                out.push('/');
            }
        }

        out.push(' ');
        out.push(if self.side_to_move == Color::White { 'w' } else { 'b' });
        out.push(' ');

        let rights = self.st().castling_rights;
        if rights == 0 {
            out.push('-');
        } else {
            for idx in 0..CASTLING_RIGHT_COUNT {
                if rights & (1 << idx) == 0 {
                    continue;
                }
                let c = Color::from_index(idx / 2);
                let ch = if self.chess960 {
                    (b'A' + file_of(self.castling_rook_square[idx])) as char
                } else if idx % 2 == 0 {
                    'K'
                } else {
                    'Q'
                };
                out.push(if c == Color::White {
                    ch.to_ascii_uppercase()
                } else {
                    ch.to_ascii_lowercase()
                });
            }
        }

        out.push(' ');
        match self.st().ep_square {
            Some(ep) => out.push_str(&square_to_string(ep)),
            None => out.push('-'),
        }
        out.push_str(&format!(
            " {} {}",
            self.st().rule50,
            1 + (self.game_ply - i32::from(self.side_to_move == Color::Black)) / 2
        ));
        out
    }

    // --- Accessors ---

    #[inline(always)]
    pub fn st(&self) -> &StateInfo {
        self.states.last().unwrap()
    }

    #[inline(always)]
    fn st_mut(&mut self) -> &mut StateInfo {
        self.states.last_mut().unwrap()
    }

    #[inline(always)]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    #[inline(always)]
    pub fn game_ply(&self) -> i32 {
        self.game_ply
    }

    #[inline(always)]
    pub fn is_chess960(&self) -> bool {
        self.chess960
    }

    #[inline(always)]
    pub fn pieces(&self) -> Bitboard {
        self.by_color[0] | self.by_color[1]
    }

    #[inline(always)]
    pub fn pieces_c(&self, c: Color) -> Bitboard {
        self.by_color[c.index()]
    }

    #[inline(always)]
    pub fn pieces_pt(&self, pt: PieceType) -> Bitboard {
        self.by_type[pt.index()]
    }

    #[inline(always)]
    pub fn pieces_pt2(&self, a: PieceType, b: PieceType) -> Bitboard {
        self.by_type[a.index()] | self.by_type[b.index()]
    }

    #[inline(always)]
    pub fn pieces_cp(&self, c: Color, pt: PieceType) -> Bitboard {
        self.by_color[c.index()] & self.by_type[pt.index()]
    }

    #[inline(always)]
    pub fn piece_on(&self, s: Square) -> Option<Piece> {
        self.board[s as usize]
    }

    #[inline(always)]
    pub fn king_square(&self, c: Color) -> Square {
        lsb(self.pieces_cp(c, PieceType::King))
    }

    #[inline(always)]
    pub fn ep_square(&self) -> Option<Square> {
        self.st().ep_square
    }

    #[inline(always)]
    pub fn checkers(&self) -> Bitboard {
        self.st().checkers
    }

    #[inline(always)]
    pub fn blockers_for_king(&self, c: Color) -> Bitboard {
        self.st().blockers_for_king[c.index()]
    }

    #[inline(always)]
    pub fn pinners(&self, c: Color) -> Bitboard {
        self.st().pinners[c.index()]
    }

    #[inline(always)]
    pub fn check_squares(&self, pt: PieceType) -> Bitboard {
        self.st().check_squares[pt.index()]
    }

    #[inline(always)]
    pub fn key(&self) -> Key {
        self.st().key
    }

    #[inline(always)]
    pub fn pawn_key(&self) -> Key {
        self.st().pawn_key
    }

    #[inline(always)]
    pub fn material_key(&self) -> Key {
        self.st().material_key
    }

    #[inline(always)]
    pub fn rule50_count(&self) -> i32 {
        self.st().rule50
    }

    #[inline(always)]
    pub fn non_pawn_material(&self, c: Color) -> Value {
        self.st().non_pawn_material[c.index()]
    }

    #[inline(always)]
    pub fn count(&self, c: Color, pt: PieceType) -> u32 {
        self.pieces_cp(c, pt).count_ones()
    }

    pub fn castling_rights(&self) -> u8 {
        self.st().castling_rights
    }

    pub fn can_castle(&self, idx: usize) -> bool {
        self.st().castling_rights & (1 << idx) != 0
    }

    pub fn castling_rook(&self, idx: usize) -> Square {
        self.castling_rook_square[idx]
    }

    pub fn castling_impeded(&self, idx: usize) -> bool {
        self.pieces() & self.castling_path[idx] != 0
    }

    /// Moves that change material: ordinary captures and en passant.
    #[inline(always)]
    pub fn is_capture(&self, m: Move) -> bool {
        (self.board[m.to_sq() as usize].is_some() && m.kind() != MoveKind::Castling)
            || m.kind() == MoveKind::EnPassant
    }

    /// Captures plus queen promotions: the moves quiescence considers tactical.
    #[inline(always)]
    pub fn is_capture_stage(&self, m: Move) -> bool {
        self.is_capture(m)
            || (m.kind() == MoveKind::Promotion && m.promotion_type() == PieceType::Queen)
    }

    pub fn captured_value(&self, m: Move) -> Value {
        if m.kind() == MoveKind::EnPassant {
            PAWN_VALUE
        } else {
            self.board[m.to_sq() as usize].map_or(0, |p| piece_value(p.kind))
        }
    }

    /// Type of the piece a capture removes, pawn for en passant.
    pub fn captured_type(&self, m: Move) -> Option<PieceType> {
        if m.kind() == MoveKind::EnPassant {
            Some(PieceType::Pawn)
        } else {
            self.board[m.to_sq() as usize].map(|p| p.kind)
        }
    }

    pub fn moved_piece(&self, m: Move) -> Option<Piece> {
        self.board[m.from_sq() as usize]
    }

    // --- Board editing primitives ---

    fn put_piece(&mut self, pc: Piece, s: Square) {
        debug_assert!(self.board[s as usize].is_none());
        self.board[s as usize] = Some(pc);
        self.by_type[pc.kind.index()] |= square_bb(s);
        self.by_color[pc.color.index()] |= square_bb(s);
    }

    fn remove_piece(&mut self, s: Square) -> Piece {
        let pc = self.board[s as usize].take().expect("removing empty square");
        self.by_type[pc.kind.index()] ^= square_bb(s);
        self.by_color[pc.color.index()] ^= square_bb(s);
        pc
    }

    fn move_piece(&mut self, from: Square, to: Square) {
        let pc = self.remove_piece(from);
        self.put_piece(pc, to);
    }

    fn set_castling_right(&mut self, c: Color, rook_sq: Square) {
        let ksq = self.king_square(c);
        let kingside = rook_sq > ksq;
        let idx = castling_index(c, kingside);
        let bit = 1u8 << idx;

        self.states[0].castling_rights |= bit;
        self.castling_rights_mask[ksq as usize] |= bit;
        self.castling_rights_mask[rook_sq as usize] |= bit;
        self.castling_rook_square[idx] = rook_sq;

        let king_to = relative_square(c, if kingside { SQ_G1 } else { SQ_C1 });
        let rook_to = relative_square(c, if kingside { SQ_F1 } else { SQ_D1 });
        self.castling_path[idx] = (between_bb(rook_sq, rook_to) | between_bb(ksq, king_to))
            & !(square_bb(ksq) | square_bb(rook_sq));
    }

    /// Recompute every derived field of the top state from the board alone.
    fn init_state(&mut self) {
        let mut key = 0u64;
        let mut pawn_key = 0u64;
        let mut material_key = 0u64;
        let mut npm = [0; COLOR_COUNT];
        let mut counts = [[0usize; PIECE_TYPE_COUNT]; COLOR_COUNT];

        for s in 0u8..64 {
            if let Some(pc) = self.board[s as usize] {
                key ^= ZOBRIST.psq[pc.color.index()][pc.kind.index()][s as usize];
                if pc.kind == PieceType::Pawn {
                    pawn_key ^= ZOBRIST.psq[pc.color.index()][pc.kind.index()][s as usize];
                } else if pc.kind != PieceType::King {
                    npm[pc.color.index()] += piece_value(pc.kind);
                }
                counts[pc.color.index()][pc.kind.index()] += 1;
            }
        }
        for c in 0..COLOR_COUNT {
            for pt in 0..PIECE_TYPE_COUNT {
                for n in 0..counts[c][pt] {
                    material_key ^= ZOBRIST.psq[c][pt][n];
                }
            }
        }

        if self.side_to_move == Color::Black {
            key ^= ZOBRIST.side;
        }
        key ^= ZOBRIST.castling[self.st().castling_rights as usize];
        if let Some(ep) = self.st().ep_square {
            key ^= ZOBRIST.en_passant[file_of(ep) as usize];
        }

        let us = self.side_to_move;
        let ksq = self.king_square(us);
        let checkers = self.attackers_to(ksq) & self.pieces_c(!us);

        let st = self.st_mut();
        st.key = key;
        st.pawn_key = pawn_key;
        st.material_key = material_key;
        st.non_pawn_material = npm;
        st.checkers = checkers;
        st.repetition = 0;
        self.set_check_info();
    }

    /// Recompute the incremental key from scratch; test support.
    pub fn compute_key(&self) -> Key {
        let mut key = 0u64;
        for s in 0u8..64 {
            if let Some(pc) = self.board[s as usize] {
                key ^= ZOBRIST.psq[pc.color.index()][pc.kind.index()][s as usize];
            }
        }
        if self.side_to_move == Color::Black {
            key ^= ZOBRIST.side;
        }
        key ^= ZOBRIST.castling[self.st().castling_rights as usize];
        if let Some(ep) = self.st().ep_square {
            key ^= ZOBRIST.en_passant[file_of(ep) as usize];
        }
        key
    }

    // --- Attacks and check bookkeeping ---

    /// All pieces of both colors attacking `s` under the current occupancy.
    #[inline]
    pub fn attackers_to(&self, s: Square) -> Bitboard {
        self.attackers_to_occ(s, self.pieces())
    }

    pub fn attackers_to_occ(&self, s: Square, occupied: Bitboard) -> Bitboard {
        pawn_attacks(Color::Black, s) & self.pieces_cp(Color::White, PieceType::Pawn)
            | pawn_attacks(Color::White, s) & self.pieces_cp(Color::Black, PieceType::Pawn)
            | attacks_bb(PieceType::Knight, s, occupied) & self.pieces_pt(PieceType::Knight)
            | attacks_bb(PieceType::Rook, s, occupied)
                & self.pieces_pt2(PieceType::Rook, PieceType::Queen)
            | attacks_bb(PieceType::Bishop, s, occupied)
                & self.pieces_pt2(PieceType::Bishop, PieceType::Queen)
            | attacks_bb(PieceType::King, s, occupied) & self.pieces_pt(PieceType::King)
    }

    /// Sliders of `sliders` that would attack `s` if blockers were removed;
    /// fills `blockers` with the single interposed piece of either color and
    /// `pinners` with the sliders pinning pieces of the king's color.
    fn slider_blockers(&self, sliders: Bitboard, s: Square) -> (Bitboard, Bitboard) {
        let mut blockers = 0;
        let mut pinners = 0;

        let mut snipers = (attacks_bb(PieceType::Rook, s, 0)
            & self.pieces_pt2(PieceType::Rook, PieceType::Queen)
            | attacks_bb(PieceType::Bishop, s, 0)
                & self.pieces_pt2(PieceType::Bishop, PieceType::Queen))
            & sliders;
        let occupancy = self.pieces() ^ snipers;

        while snipers != 0 {
            let sniper_sq = pop_lsb(&mut snipers);
            let b = between_bb(s, sniper_sq) & occupancy & !square_bb(sniper_sq);
            if b != 0 && !more_than_one(b) {
                blockers |= b;
                if b & self.pieces_c(self.board[s as usize].unwrap().color) != 0 {
                    pinners |= square_bb(sniper_sq);
                }
            }
        }
        (blockers, pinners)
    }

    fn set_check_info(&mut self) {
        for c in [Color::White, Color::Black] {
            let ksq = self.king_square(c);
            let (blockers, pinners) = self.slider_blockers(self.pieces_c(!c), ksq);
            let st = self.st_mut();
            st.blockers_for_king[c.index()] = blockers;
            st.pinners[(!c).index()] = pinners;
        }

        let them = !self.side_to_move;
        let ksq = self.king_square(them);
        let occ = self.pieces();
        let bishop = attacks_bb(PieceType::Bishop, ksq, occ);
        let rook = attacks_bb(PieceType::Rook, ksq, occ);

        let st = self.st_mut();
        st.check_squares[PieceType::Pawn.index()] = pawn_attacks(them, ksq);
        st.check_squares[PieceType::Knight.index()] = attacks_bb(PieceType::Knight, ksq, occ);
        st.check_squares[PieceType::Bishop.index()] = bishop;
        st.check_squares[PieceType::Rook.index()] = rook;
        st.check_squares[PieceType::Queen.index()] = bishop | rook;
        st.check_squares[PieceType::King.index()] = 0;
    }

    // --- Making and unmaking moves ---

    /// Play `m`, which must be pseudo-legal; the caller has tested legality.
    pub fn do_move(&mut self, m: Move) {
        debug_assert!(m.is_ok());

        let us = self.side_to_move;
        let them = !us;
        let from = m.from_sq();
        let mut to = m.to_sq();

        let mut st = StateInfo {
            material_key: self.st().material_key,
            pawn_key: self.st().pawn_key,
            non_pawn_material: self.st().non_pawn_material,
            castling_rights: self.st().castling_rights,
            rule50: self.st().rule50 + 1,
            plies_from_null: self.st().plies_from_null + 1,
            ep_square: None,
            ..Default::default()
        };
        let mut key = self.st().key ^ ZOBRIST.side;
        if let Some(ep) = self.st().ep_square {
            key ^= ZOBRIST.en_passant[file_of(ep) as usize];
        }

        let pc = self.board[from as usize].expect("no piece on from-square");
        debug_assert_eq!(pc.color, us);

        let captured = if m.kind() == MoveKind::EnPassant {
            Some(PieceType::Pawn)
        } else if m.kind() == MoveKind::Castling {
            None
        } else {
            self.board[to as usize].map(|p| p.kind)
        };

        if m.kind() == MoveKind::Castling {
            let (king_to, rook_from, rook_to) = self.do_castling(us, from, to, false);
            key ^= ZOBRIST.psq[us.index()][PieceType::Rook.index()][rook_from as usize]
                ^ ZOBRIST.psq[us.index()][PieceType::Rook.index()][rook_to as usize];
            to = king_to;
        }

        if let Some(cap) = captured {
            let mut capsq = to;
            if cap == PieceType::Pawn {
                if m.kind() == MoveKind::EnPassant {
                    capsq = (to as i32 - pawn_push(us)) as Square;
                }
                st.pawn_key ^= ZOBRIST.psq[them.index()][PieceType::Pawn.index()][capsq as usize];
            } else {
                st.non_pawn_material[them.index()] -= piece_value(cap);
            }
            let cnt = self.count(them, cap) as usize;
            st.material_key ^= ZOBRIST.psq[them.index()][cap.index()][cnt - 1];
            self.remove_piece(capsq);
            key ^= ZOBRIST.psq[them.index()][cap.index()][capsq as usize];
            st.rule50 = 0;
        }

        // Castling rights lapse when king or rook squares are touched.
        let touched = self.castling_rights_mask[from as usize]
            | self.castling_rights_mask[m.to_sq() as usize];
        if st.castling_rights & touched != 0 {
            key ^= ZOBRIST.castling[st.castling_rights as usize];
            st.castling_rights &= !touched;
            key ^= ZOBRIST.castling[st.castling_rights as usize];
        }

        if m.kind() != MoveKind::Castling {
            self.move_piece(from, to);
            key ^= ZOBRIST.psq[us.index()][pc.kind.index()][from as usize]
                ^ ZOBRIST.psq[us.index()][pc.kind.index()][to as usize];
        } else {
            key ^= ZOBRIST.psq[us.index()][PieceType::King.index()][from as usize]
                ^ ZOBRIST.psq[us.index()][PieceType::King.index()][to as usize];
        }

        if pc.kind == PieceType::Pawn {
            if (to as i32 - from as i32).abs() == 16 {
                let ep = (from as i32 + pawn_push(us)) as Square;
                if pawn_attacks(us, ep) & self.pieces_cp(them, PieceType::Pawn) != 0 {
                    st.ep_square = Some(ep);
                    key ^= ZOBRIST.en_passant[file_of(ep) as usize];
                }
            } else if m.kind() == MoveKind::Promotion {
                let promo = m.promotion_type();
                self.remove_piece(to);
                self.put_piece(Piece::new(us, promo), to);
                key ^= ZOBRIST.psq[us.index()][PieceType::Pawn.index()][to as usize]
                    ^ ZOBRIST.psq[us.index()][promo.index()][to as usize];
                st.pawn_key ^= ZOBRIST.psq[us.index()][PieceType::Pawn.index()][to as usize];
                let pawn_cnt = self.count(us, PieceType::Pawn) as usize;
                let promo_cnt = self.count(us, promo) as usize;
                st.material_key ^= ZOBRIST.psq[us.index()][PieceType::Pawn.index()][pawn_cnt]
                    ^ ZOBRIST.psq[us.index()][promo.index()][promo_cnt - 1];
                st.non_pawn_material[us.index()] += piece_value(promo);
            }
            st.pawn_key ^= ZOBRIST.psq[us.index()][PieceType::Pawn.index()][from as usize]
                ^ ZOBRIST.psq[us.index()][PieceType::Pawn.index()][to as usize];
            st.rule50 = 0;
        }

        st.key = key;
        st.captured = captured;
        self.side_to_move = them;
        self.game_ply += 1;
        self.states.push(st);

        let ksq = self.king_square(them);
        let checkers = self.attackers_to(ksq) & self.pieces_c(us);
        self.st_mut().checkers = checkers;
        self.set_check_info();
        self.update_repetition();
    }

    /// Take back `m`; exact inverse of `do_move`.
    pub fn undo_move(&mut self, m: Move) {
        self.side_to_move = !self.side_to_move;
        let us = self.side_to_move;
        let from = m.from_sq();
        let to = m.to_sq();
        let captured = self.st().captured;

        if m.kind() == MoveKind::Promotion {
            self.remove_piece(to);
            self.put_piece(Piece::new(us, PieceType::Pawn), to);
        }

        if m.kind() == MoveKind::Castling {
            self.do_castling(us, from, to, true);
        } else {
            self.move_piece(to, from);
            if let Some(cap) = captured {
                let capsq = if m.kind() == MoveKind::EnPassant {
                    (to as i32 - pawn_push(us)) as Square
                } else {
                    to
                };
                self.put_piece(Piece::new(!us, cap), capsq);
            }
        }

        self.states.pop();
        self.game_ply -= 1;
    }

    /// King-takes-rook relocation; forward and reverse share the remove-both
    /// then place-both order so overlapping squares are handled.
    fn do_castling(
        &mut self,
        us: Color,
        from: Square,
        to: Square,
        undo: bool,
    ) -> (Square, Square, Square) {
        let kingside = to > from;
        let rook_from = to;
        let rook_to = relative_square(us, if kingside { SQ_F1 } else { SQ_D1 });
        let king_to = relative_square(us, if kingside { SQ_G1 } else { SQ_C1 });

        if !undo {
            self.remove_piece(from);
            self.remove_piece(rook_from);
            self.put_piece(Piece::new(us, PieceType::King), king_to);
            self.put_piece(Piece::new(us, PieceType::Rook), rook_to);
        } else {
            self.remove_piece(king_to);
            self.remove_piece(rook_to);
            self.put_piece(Piece::new(us, PieceType::King), from);
            self.put_piece(Piece::new(us, PieceType::Rook), rook_from);
        }
        (king_to, rook_from, rook_to)
    }

    /// Switch sides without moving; illegal while in check.
    pub fn do_null_move(&mut self) {
        debug_assert_eq!(self.checkers(), 0);

        let mut st = self.st().clone();
        st.key ^= ZOBRIST.side;
        if let Some(ep) = st.ep_square {
            st.key ^= ZOBRIST.en_passant[file_of(ep) as usize];
            st.ep_square = None;
        }
        st.rule50 += 1;
        st.plies_from_null = 0;
        st.repetition = 0;
        st.captured = None;

        self.side_to_move = !self.side_to_move;
        self.game_ply += 1;
        self.states.push(st);
        self.set_check_info();
    }

    pub fn undo_null_move(&mut self) {
        self.states.pop();
        self.side_to_move = !self.side_to_move;
        self.game_ply -= 1;
    }

    fn update_repetition(&mut self) {
        let end = self.st().rule50.min(self.st().plies_from_null);
        let top = self.states.len() - 1;
        let mut repetition = 0;
        if end >= 4 {
            let key = self.st().key;
            let mut i = 4;
            while i <= end && i as usize <= top {
                let prev = &self.states[top - i as usize];
                if prev.key == key {
                    repetition = if prev.repetition != 0 { -i } else { i };
                    break;
                }
                i += 2;
            }
        }
        self.st_mut().repetition = repetition;
    }

    // --- Legality ---

    /// Full legality for a pseudo-legal move.
    pub fn legal(&self, m: Move) -> bool {
        debug_assert!(m.is_ok());
        let us = self.side_to_move;
        let them = !us;
        let from = m.from_sq();
        let to = m.to_sq();
        let ksq = self.king_square(us);

        match m.kind() {
            MoveKind::EnPassant => {
                // Simulate the double pawn removal and look for revealed sliders.
                let capsq = (to as i32 - pawn_push(us)) as Square;
                let occupied =
                    (self.pieces() ^ square_bb(from) ^ square_bb(capsq)) | square_bb(to);
                attacks_bb(PieceType::Rook, ksq, occupied)
                    & self.pieces_c(them)
                    & self.pieces_pt2(PieceType::Rook, PieceType::Queen)
                    == 0
                    && attacks_bb(PieceType::Bishop, ksq, occupied)
                        & self.pieces_c(them)
                        & self.pieces_pt2(PieceType::Bishop, PieceType::Queen)
                        == 0
            }
            MoveKind::Castling => {
                // Walk the king's path; every square must be safe.
                let kingside = to > from;
                let king_to = relative_square(us, if kingside { SQ_G1 } else { SQ_C1 });
                let step: i32 = if king_to > from { -1 } else { 1 };
                let mut s = king_to as i32;
                while s != from as i32 {
                    if self.attackers_to(s as Square) & self.pieces_c(them) != 0 {
                        return false;
                    }
                    s += step;
                }
                // In Chess960 the vacating rook may have been the king's shield.
                !self.chess960 || self.blockers_for_king(us) & square_bb(to) == 0
            }
            _ if self.board[from as usize].map(|p| p.kind) == Some(PieceType::King) => {
                self.attackers_to_occ(to, self.pieces() ^ square_bb(from)) & self.pieces_c(them)
                    == 0
            }
            _ => {
                // Not pinned, or moving along the pin ray.
                self.blockers_for_king(us) & square_bb(from) == 0 || aligned(from, to, ksq)
            }
        }
    }

    /// Fuller validation for externally supplied moves, in particular moves
    /// fetched from the transposition table which may be garbled by key
    /// collisions. Kinds other than Normal are rare and checked against the
    /// generated list.
    pub fn pseudo_legal(&self, m: Move) -> bool {
        if !m.is_ok() {
            return false;
        }
        let us = self.side_to_move;
        let them = !us;
        let from = m.from_sq();
        let to = m.to_sq();

        if m.kind() != MoveKind::Normal {
            let list = if self.checkers() != 0 {
                movegen::generate(self, GenType::Evasions)
            } else {
                movegen::generate(self, GenType::NonEvasions)
            };
            return list.contains(m);
        }

        // Normal moves carry no promotion payload.
        if (m.0 >> 12) & 3 != 0 {
            return false;
        }

        let pc = match self.board[from as usize] {
            Some(p) if p.color == us => p,
            _ => return false,
        };
        if self.pieces_c(us) & square_bb(to) != 0 {
            return false;
        }

        if pc.kind == PieceType::Pawn {
            // Promotions are generated with their own kind bits.
            if relative_rank(us, to) == 7 {
                return false;
            }
            let push = pawn_push(us);
            let single = from as i32 + push == to as i32 && self.board[to as usize].is_none();
            let double = from as i32 + 2 * push == to as i32
                && relative_rank(us, from) == 1
                && self.board[to as usize].is_none()
                && self.board[(from as i32 + push) as usize].is_none();
            let captures = pawn_attacks(us, from) & self.pieces_c(them) & square_bb(to) != 0;
            if !single && !double && !captures {
                return false;
            }
        } else if attacks_bb(pc.kind, from, self.pieces()) & square_bb(to) == 0 {
            return false;
        }

        // In check the move must resolve it.
        if self.checkers() != 0 {
            if pc.kind != PieceType::King {
                if more_than_one(self.checkers()) {
                    return false;
                }
                if between_bb(self.king_square(us), lsb(self.checkers())) & square_bb(to) == 0 {
                    return false;
                }
            } else if self.attackers_to_occ(to, self.pieces() ^ square_bb(from))
                & self.pieces_c(them)
                != 0
            {
                return false;
            }
        }
        true
    }

    /// Does the pseudo-legal move `m` give check?
    pub fn gives_check(&self, m: Move) -> bool {
        let us = self.side_to_move;
        let them = !us;
        let from = m.from_sq();
        let to = m.to_sq();
        let ksq = self.king_square(them);
        let pc = self.board[from as usize].expect("gives_check on empty square");

        // Direct check.
        if self.check_squares(pc.kind) & square_bb(to) != 0 {
            return true;
        }

        // Discovered check: the moving piece screens a slider.
        if self.blockers_for_king(them) & square_bb(from) != 0 && !aligned(from, to, ksq) {
            return true;
        }

        match m.kind() {
            MoveKind::Normal => false,
            MoveKind::Promotion => {
                attacks_bb(m.promotion_type(), to, self.pieces() ^ square_bb(from))
                    & square_bb(ksq)
                    != 0
            }
            MoveKind::EnPassant => {
                let capsq = (to as i32 - pawn_push(us)) as Square;
                let occupied =
                    (self.pieces() ^ square_bb(from) ^ square_bb(capsq)) | square_bb(to);
                attacks_bb(PieceType::Rook, ksq, occupied)
                    & self.pieces_cp(us, PieceType::Rook)
                    != 0
                    || attacks_bb(PieceType::Rook, ksq, occupied)
                        & self.pieces_cp(us, PieceType::Queen)
                        != 0
                    || attacks_bb(PieceType::Bishop, ksq, occupied)
                        & (self.pieces_cp(us, PieceType::Bishop)
                            | self.pieces_cp(us, PieceType::Queen))
                        != 0
            }
            MoveKind::Castling => {
                let rook_to = relative_square(us, if to > from { SQ_F1 } else { SQ_D1 });
                self.check_squares(PieceType::Rook) & square_bb(rook_to) != 0
            }
        }
    }

    // --- Static exchange evaluation ---

    /// Does the swap sequence triggered by `m` win at least `threshold`?
    /// Iterative least-valuable-attacker simulation with X-ray reveals;
    /// pinned attackers stay out while their pinner is on the board.
    pub fn see_ge(&self, m: Move, threshold: Value) -> bool {
        if m.kind() != MoveKind::Normal {
            return VALUE_ZERO >= threshold;
        }

        let from = m.from_sq();
        let to = m.to_sq();

        let mut swap = self.board[to as usize].map_or(0, |p| piece_value(p.kind)) - threshold;
        if swap < 0 {
            return false;
        }
        swap = piece_value(self.board[from as usize].expect("SEE from empty square").kind) - swap;
        if swap <= 0 {
            return true;
        }

        let mut occupied = self.pieces() ^ square_bb(from) ^ square_bb(to);
        let us = self.board[from as usize].unwrap().color;
        let mut stm = us;
        let mut attackers = self.attackers_to_occ(to, occupied);
        let mut res = true;

        loop {
            stm = !stm;
            attackers &= occupied;

            let mut stm_attackers = attackers & self.pieces_c(stm);
            if stm_attackers == 0 {
                break;
            }
            // A pinned piece may not join the exchange while its pinner stands.
            if self.pinners(!stm) & occupied != 0 {
                stm_attackers &= !self.blockers_for_king(stm);
                if stm_attackers == 0 {
                    break;
                }
            }

            res = !res;

            // Least valuable attacker first; X-rays behind it join the fray.
            const ORDER: [(PieceType, Value); 5] = [
                (PieceType::Pawn, PAWN_VALUE),
                (PieceType::Knight, KNIGHT_VALUE),
                (PieceType::Bishop, BISHOP_VALUE),
                (PieceType::Rook, ROOK_VALUE),
                (PieceType::Queen, QUEEN_VALUE),
            ];
            let mut picked = None;
            for &(pt, val) in &ORDER {
                let b = stm_attackers & self.pieces_pt(pt);
                if b != 0 {
                    picked = Some((pt, val, lsb(b)));
                    break;
                }
            }

            match picked {
                Some((pt, val, sq)) => {
                    swap = val - swap;
                    if swap < i32::from(res) {
                        break;
                    }
                    occupied ^= square_bb(sq);
                    if matches!(pt, PieceType::Pawn | PieceType::Bishop | PieceType::Queen) {
                        attackers |= attacks_bb(PieceType::Bishop, to, occupied)
                            & self.pieces_pt2(PieceType::Bishop, PieceType::Queen);
                    }
                    if matches!(pt, PieceType::Rook | PieceType::Queen) {
                        attackers |= attacks_bb(PieceType::Rook, to, occupied)
                            & self.pieces_pt2(PieceType::Rook, PieceType::Queen);
                    }
                }
                None => {
                    // King takes, but only if the other side has no attacker
                    // left to take back.
                    return if attackers & !self.pieces_c(stm) != 0 {
                        !res
                    } else {
                        res
                    };
                }
            }
        }
        res
    }

    // --- Draws and cycles ---

    /// Fifty-move expiry (unless it is checkmate) or a repetition strictly
    /// inside the search tree.
    pub fn is_draw(&self, ply: i32) -> bool {
        if self.st().rule50 > 99
            && (self.checkers() == 0 || movegen::generate(self, GenType::Legal).len() > 0)
        {
            return true;
        }
        self.st().repetition != 0 && self.st().repetition < ply
    }

    /// Has the position repeated at least once before?
    pub fn is_repetition(&self) -> bool {
        self.st().repetition != 0
    }

    /// Probe the cuckoo tables: can the side to move force a key cycle with
    /// one reversible move, i.e. does an upcoming move repeat an ancestor?
    pub fn has_game_cycle(&self, ply: i32) -> bool {
        let end = self.st().rule50.min(self.st().plies_from_null);
        if end < 3 {
            return false;
        }

        let original_key = self.st().key;
        let top = self.states.len() - 1;

        let mut i = 3;
        while i <= end && i as usize <= top {
            let prev = &self.states[top - i as usize];
            let move_key = original_key ^ prev.key;

            let cuckoo = &*CUCKOO;
            let mut slot = cuckoo_h1(move_key);
            let hit = if cuckoo.keys[slot] == move_key {
                true
            } else {
                slot = cuckoo_h2(move_key);
                cuckoo.keys[slot] == move_key
            };

            if hit {
                let mv = cuckoo.moves[slot];
                let s1 = mv.from_sq();
                let s2 = mv.to_sq();
                if (between_bb(s1, s2) ^ square_bb(s2)) & self.pieces() == 0 {
                    // The cycling piece sits on one end of the move; only a
                    // cycle by the side to move counts.
                    let end = if self.board[s1 as usize].is_some() { s1 } else { s2 };
                    let owned = self.board[end as usize]
                        .map_or(false, |p| p.color == self.side_to_move);
                    if owned {
                        if ply > i {
                            return true;
                        }
                        // At or below the root it must be a true repetition.
                        if prev.repetition != 0 {
                            return true;
                        }
                    }
                }
            }
            i += 2;
        }
        false
    }

    /// Parse a long-algebraic move string against the legal move list.
    pub fn parse_uci_move(&self, text: &str) -> Option<Move> {
        movegen::generate(self, GenType::Legal)
            .iter()
            .find(|m| m.to_uci(self.chess960) == text)
    }

    /// Key of the position after `m`, before making it; used as a probe hint.
    pub fn key_after(&self, m: Move) -> Key {
        let from = m.from_sq();
        let to = m.to_sq();
        let pc = self.board[from as usize].expect("key_after on empty square");
        let mut k = self.st().key ^ ZOBRIST.side;
        if let Some(captured) = self.board[to as usize] {
            k ^= ZOBRIST.psq[captured.color.index()][captured.kind.index()][to as usize];
        }
        k ^ ZOBRIST.psq[pc.color.index()][pc.kind.index()][from as usize]
            ^ ZOBRIST.psq[pc.color.index()][pc.kind.index()][to as usize]
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  +---+---+---+---+---+---+---+---+")?;
        for rank in (0..8).rev() {
            write!(f, "{} |", rank + 1)?;
            for file in 0..8 {
                match self.board[make_square(file, rank) as usize] {
                    Some(p) => write!(f, " {} |", p.to_char())?,
                    None => write!(f, "   |")?,
                }
            }
            writeln!(f)?;
            writeln!(f, "  +---+---+---+---+---+---+---+---+")?;
        }
        writeln!(f, "    a   b   c   d   e   f   g   h")?;
        writeln!(f, "Fen: {}", self.fen())?;
        write!(f, "Key: {:016X}", self.key())
    }
}

// --- Cuckoo tables for upcoming-repetition detection ---
//
// Every reversible single-piece move (a, b) of every non-pawn piece is
// hashed by its Zobrist difference into one of two 8192-slot tables with
// cuckoo eviction, so `has_game_cycle` can probe in O(1).

pub struct CuckooTables {
    pub keys: Vec<Key>,
    pub moves: Vec<Move>,
    pub count: usize,
}

#[inline(always)]
fn cuckoo_h1(key: Key) -> usize {
    (key & 0x1FFF) as usize
}

#[inline(always)]
fn cuckoo_h2(key: Key) -> usize {
    ((key >> 16) & 0x1FFF) as usize
}

fn build_cuckoo() -> CuckooTables {
    let mut t = CuckooTables {
        keys: vec![0; 8192],
        moves: vec![Move::NONE; 8192],
        count: 0,
    };

    for c in [Color::White, Color::Black] {
        for pt in [
            PieceType::Knight,
            PieceType::Bishop,
            PieceType::Rook,
            PieceType::Queen,
            PieceType::King,
        ] {
            for a in 0u8..64 {
                for b in (a + 1)..64 {
                    if attacks_bb(pt, a, 0) & square_bb(b) == 0 {
                        continue;
                    }
                    let mut mv = Move::new(a, b);
                    let mut key = ZOBRIST.psq[c.index()][pt.index()][a as usize]
                        ^ ZOBRIST.psq[c.index()][pt.index()][b as usize]
                        ^ ZOBRIST.side;
                    let mut slot = cuckoo_h1(key);
                    loop {
                        std::mem::swap(&mut t.keys[slot], &mut key);
                        std::mem::swap(&mut t.moves[slot], &mut mv);
                        if mv == Move::NONE {
                            break;
                        }
                        // Push the evicted entry to its alternate slot.
                        slot = if slot == cuckoo_h1(key) {
                            cuckoo_h2(key)
                        } else {
                            cuckoo_h1(key)
                        };
                    }
                    t.count += 1;
                }
            }
        }
    }
    t
}

lazy_static::lazy_static! {
    pub static ref CUCKOO: CuckooTables = build_cuckoo();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fen_round_trip() {
        for fen in [
            START_FEN,
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "4k3/8/8/8/8/8/8/4K2R w K - 0 1",
            "r3k3/8/8/8/8/8/8/4K3 b q - 3 20",
        ] {
            let pos = Position::from_fen(fen).unwrap();
            assert_eq!(pos.fen(), fen, "round trip failed");
            assert_eq!(pos.key(), pos.compute_key());
        }
    }

    #[test]
    fn fen_rejects_garbage() {
        assert!(Position::from_fen("").is_err());
        assert!(Position::from_fen("rnbqkbnr/pppppppp w KQkq - 0 1").is_err());
        assert!(Position::from_fen("9/8/8/8/8/8/8/8 w - - 0 1").is_err());
        assert!(Position::from_fen("8/8/8/8/8/8/8/8 w - - 0 1").is_err());
    }

    #[test]
    fn ep_square_kept_only_when_capturable() {
        // Real double push with a black pawn ready to take.
        let pos =
            Position::from_fen("rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3")
                .unwrap();
        assert_eq!(pos.ep_square(), Some(square_from_string("e3").unwrap()));

        // No pawn can capture: the square is dropped.
        let pos =
            Position::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1")
                .unwrap();
        assert_eq!(pos.ep_square(), None);
    }

    #[test]
    fn do_undo_restores_everything() {
        let mut pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        let before_fen = pos.fen();
        let before_key = pos.key();
        let before_pawn_key = pos.pawn_key();

        let moves: Vec<Move> = movegen::generate(&pos, GenType::Legal).iter().collect();
        assert!(!moves.is_empty());
        for m in moves {
            pos.do_move(m);
            assert_eq!(pos.key(), pos.compute_key(), "incremental key broke on {}", m.to_uci(false));
            pos.undo_move(m);
            assert_eq!(pos.fen(), before_fen);
            assert_eq!(pos.key(), before_key);
            assert_eq!(pos.pawn_key(), before_pawn_key);
        }
    }

    #[test]
    fn castling_updates_rights_and_squares() {
        let mut pos = Position::from_fen("4k3/8/8/8/8/8/8/4K2R w K - 0 1").unwrap();
        let castle = Move::with_kind(MoveKind::Castling, SQ_E1, SQ_H1);
        assert!(movegen::generate(&pos, GenType::Legal).contains(castle));
        pos.do_move(castle);
        assert_eq!(
            pos.piece_on(SQ_G1),
            Some(Piece::new(Color::White, PieceType::King))
        );
        assert_eq!(
            pos.piece_on(SQ_F1),
            Some(Piece::new(Color::White, PieceType::Rook))
        );
        assert_eq!(pos.castling_rights(), 0);
        pos.undo_move(castle);
        assert_eq!(pos.fen(), "4k3/8/8/8/8/8/8/4K2R w K - 0 1");
    }

    #[test]
    fn chess960_overlapping_castle() {
        // King f1, rooks e1/g1: the kingside castle ends with the king on g1
        // (the rook's origin) and the rook on f1 (the king's origin).
        let mut pos =
            Position::from_fen("nqbnrkrb/pppppppp/8/8/8/8/PPPPPPPP/NQBNRKRB w KQkq - 0 1")
                .unwrap();
        assert!(pos.is_chess960());
        assert_eq!(pos.castling_rook(castling_index(Color::White, true)), SQ_G1);

        // Clear the h-file bishop's diagonal and lift it out of the way so
        // the g1 rook's path (none; it stays put) and king's path are free.
        for text in ["g2g3", "g7g6", "h1g2", "h8g7", "g2h3", "g7h6"] {
            let mv = pos.parse_uci_move(text).expect("setup move is legal");
            pos.do_move(mv);
        }

        let castle = Move::with_kind(MoveKind::Castling, SQ_F1, SQ_G1);
        let legal_moves = movegen::generate(&pos, GenType::Legal);
        assert!(legal_moves.contains(castle), "castle should be available");
        assert_eq!(castle.to_uci(true), "f1g1");

        let fen_before = pos.fen();
        pos.do_move(castle);
        assert_eq!(
            pos.piece_on(SQ_G1),
            Some(Piece::new(Color::White, PieceType::King))
        );
        assert_eq!(
            pos.piece_on(SQ_F1),
            Some(Piece::new(Color::White, PieceType::Rook))
        );
        pos.undo_move(castle);
        assert_eq!(pos.fen(), fen_before);
    }

    #[test]
    fn en_passant_discovered_check_is_illegal() {
        let pos = Position::from_fen("8/8/3p4/KPp4r/1R3p1k/8/4P1P1/8 w - c6 0 1").unwrap();
        assert_eq!(pos.ep_square(), Some(square_from_string("c6").unwrap()));
        let ep = Move::with_kind(
            MoveKind::EnPassant,
            square_from_string("b5").unwrap(),
            square_from_string("c6").unwrap(),
        );
        assert!(pos.pseudo_legal(ep));
        assert!(!pos.legal(ep), "EP capture must be rejected: it exposes the king on the rank");
    }

    #[test]
    fn null_move_round_trip() {
        let mut pos = Position::startpos();
        let key = pos.key();
        pos.do_null_move();
        assert_ne!(pos.key(), key);
        assert_eq!(pos.side_to_move(), Color::Black);
        pos.undo_null_move();
        assert_eq!(pos.key(), key);
        assert_eq!(pos.side_to_move(), Color::White);
    }

    #[test]
    fn threefold_repetition_detected() {
        let mut pos = Position::startpos();
        for m in ["g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8"] {
            let mv = pos.parse_uci_move(m).expect("legal shuffle move");
            pos.do_move(mv);
        }
        // Start position has now occurred three times.
        assert!(pos.is_repetition());
        assert!(pos.st().repetition < 0, "second recurrence is flagged as negative");
        assert!(pos.is_draw(MAX_PLY as i32));
    }

    #[test]
    fn fifty_move_rule_draw() {
        let pos = Position::from_fen("6k1/8/8/8/8/8/8/R5K1 w - - 100 80").unwrap();
        assert!(pos.is_draw(2));
    }

    #[test]
    fn see_basic_cases() {
        // Kiwipete: Nxf7 wins a pawn but loses the knight to the king.
        let pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        let nxf7 = pos.parse_uci_move("e5f7").unwrap();
        assert!(!pos.see_ge(nxf7, 0));
        assert!(pos.see_ge(nxf7, PAWN_VALUE - KNIGHT_VALUE));
        // Monotone in the threshold.
        assert!(pos.see_ge(nxf7, -QUEEN_VALUE));

        // Undefended pawn: capture wins material at threshold 0.
        let pos2 = Position::from_fen("4k3/8/8/3p4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let exd5 = pos2.parse_uci_move("e4d5").unwrap();
        assert!(pos2.see_ge(exd5, 0));
        assert!(pos2.see_ge(exd5, PAWN_VALUE));
        assert!(!pos2.see_ge(exd5, PAWN_VALUE + 1));
    }

    #[test]
    fn cuckoo_tables_are_populated() {
        assert_eq!(CUCKOO.count, 3668);
    }

    #[test]
    fn gives_check_direct_and_discovered() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/4R3/4K3 w - - 0 1").unwrap();
        // Rook already pins nothing: moving it off the file is no check,
        // along the file toward the king is.
        let re7 = pos.parse_uci_move("e2e7").unwrap();
        assert!(pos.gives_check(re7));
        let ra2 = pos.parse_uci_move("e2a2").unwrap();
        assert!(!pos.gives_check(ra2));

        // Discovered: the knight screens the b2 bishop's long diagonal.
        let pos2 = Position::from_fen("7k/8/8/8/8/2N5/1B6/4K3 w - - 0 1").unwrap();
        let nd5 = pos2.parse_uci_move("c3d5").unwrap();
        assert!(pos2.gives_check(nd5));

        let kd1 = pos2.parse_uci_move("e1d1").unwrap();
        assert!(!pos2.gives_check(kd1));
    }
}

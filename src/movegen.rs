//! Pseudo-legal move generation by category.

use crate::bitboard::*;
use crate::chess_move::{Move, MoveKind, MoveList};
use crate::position::Position;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenType {
    /// Captures and queen promotions.
    Captures,
    /// Non-captures including under-promotions.
    Quiets,
    /// Non-captures giving direct or discovered check, no castling or
    /// promotions.
    QuietChecks,
    /// All moves while in check: king moves, blocks, checker captures.
    Evasions,
    /// Captures plus quiets.
    NonEvasions,
    /// Fully legal moves.
    Legal,
}

pub fn generate(pos: &Position, kind: GenType) -> MoveList {
    let mut list = MoveList::new();
    match kind {
        GenType::Legal => {
            let us = pos.side_to_move();
            let ksq = pos.king_square(us);
            let pinned = pos.blockers_for_king(us) & pos.pieces_c(us);
            generate_all(
                pos,
                &mut list,
                if pos.checkers() != 0 {
                    GenType::Evasions
                } else {
                    GenType::NonEvasions
                },
            );
            // Only moves that can break legality get the expensive test.
            list.retain(|m| {
                if pinned & square_bb(m.from_sq()) != 0
                    || m.from_sq() == ksq
                    || m.kind() == MoveKind::EnPassant
                {
                    pos.legal(m)
                } else {
                    true
                }
            });
        }
        GenType::QuietChecks => {
            let mut quiets = MoveList::new();
            generate_all(pos, &mut quiets, GenType::Quiets);
            for m in quiets.iter() {
                if m.kind() == MoveKind::Normal && pos.gives_check(m) {
                    list.push(m);
                }
            }
        }
        _ => generate_all(pos, &mut list, kind),
    }
    list
}

fn generate_all(pos: &Position, list: &mut MoveList, kind: GenType) {
    debug_assert!(!matches!(kind, GenType::Legal | GenType::QuietChecks));
    let us = pos.side_to_move();
    let ksq = pos.king_square(us);
    let double_check = kind == GenType::Evasions && more_than_one(pos.checkers());

    // With two checkers only the king may move.
    if !double_check {
        let target = match kind {
            GenType::Evasions => between_bb(ksq, lsb(pos.checkers())),
            GenType::NonEvasions => !pos.pieces_c(us),
            GenType::Captures => pos.pieces_c(!us),
            GenType::Quiets => !pos.pieces(),
            _ => unreachable!(),
        };

        generate_pawn_moves(pos, list, target, kind);
        for pt in [
            PieceType::Knight,
            PieceType::Bishop,
            PieceType::Rook,
            PieceType::Queen,
        ] {
            let mut from_bb = pos.pieces_cp(us, pt);
            while from_bb != 0 {
                let from = pop_lsb(&mut from_bb);
                let mut b = attacks_bb(pt, from, pos.pieces()) & target;
                while b != 0 {
                    list.push(Move::new(from, pop_lsb(&mut b)));
                }
            }
        }
    }

    let king_target = match kind {
        GenType::Captures => pos.pieces_c(!us),
        GenType::Quiets => !pos.pieces(),
        _ => !pos.pieces_c(us),
    };
    let mut b = attacks_bb(PieceType::King, ksq, 0) & king_target;
    while b != 0 {
        list.push(Move::new(ksq, pop_lsb(&mut b)));
    }

    // Castling: path must be clear; attack safety is checked in legal().
    if matches!(kind, GenType::Quiets | GenType::NonEvasions) && pos.checkers() == 0 {
        for idx in [castling_index(us, true), castling_index(us, false)] {
            if pos.can_castle(idx) && !pos.castling_impeded(idx) {
                list.push(Move::with_kind(
                    MoveKind::Castling,
                    ksq,
                    pos.castling_rook(idx),
                ));
            }
        }
    }
}

fn make_promotions(list: &mut MoveList, from: Square, to: Square, kind: GenType) {
    if matches!(
        kind,
        GenType::Captures | GenType::Evasions | GenType::NonEvasions
    ) {
        list.push(Move::promotion(from, to, PieceType::Queen));
    }
    if matches!(
        kind,
        GenType::Quiets | GenType::Evasions | GenType::NonEvasions
    ) {
        list.push(Move::promotion(from, to, PieceType::Knight));
        list.push(Move::promotion(from, to, PieceType::Bishop));
        list.push(Move::promotion(from, to, PieceType::Rook));
    }
}

fn generate_pawn_moves(pos: &Position, list: &mut MoveList, target: Bitboard, kind: GenType) {
    let us = pos.side_to_move();
    let them = !us;
    let up = pawn_push(us);
    let (up_right, up_left) = match us {
        Color::White => (NORTH_EAST, NORTH_WEST),
        Color::Black => (SOUTH_WEST, SOUTH_EAST),
    };
    let rank7 = match us {
        Color::White => RANK_7_BB,
        Color::Black => RANK_2_BB,
    };
    let rank3 = match us {
        Color::White => rank_bb(2),
        Color::Black => rank_bb(5),
    };

    let pawns_on7 = pos.pieces_cp(us, PieceType::Pawn) & rank7;
    let pawns_not_on7 = pos.pieces_cp(us, PieceType::Pawn) & !rank7;
    let empty = !pos.pieces();
    let enemies = if kind == GenType::Evasions {
        pos.checkers()
    } else {
        pos.pieces_c(them)
    };

    // Single and double pushes, no promotions.
    if kind != GenType::Captures {
        let mut b1 = shift(pawns_not_on7, up) & empty;
        let mut b2 = shift(b1 & rank3, up) & empty;
        if kind == GenType::Evasions {
            b1 &= target;
            b2 &= target;
        }
        while b1 != 0 {
            let to = pop_lsb(&mut b1);
            list.push(Move::new((to as i32 - up) as Square, to));
        }
        while b2 != 0 {
            let to = pop_lsb(&mut b2);
            list.push(Move::new((to as i32 - 2 * up) as Square, to));
        }
    }

    // Promotions, including capturing ones.
    if pawns_on7 != 0 {
        let mut b1 = shift(pawns_on7, up_right) & enemies;
        let mut b2 = shift(pawns_on7, up_left) & enemies;
        let mut b3 = shift(pawns_on7, up) & empty;
        if kind == GenType::Evasions {
            b3 &= target;
        }
        while b1 != 0 {
            let to = pop_lsb(&mut b1);
            make_promotions(list, (to as i32 - up_right) as Square, to, kind);
        }
        while b2 != 0 {
            let to = pop_lsb(&mut b2);
            make_promotions(list, (to as i32 - up_left) as Square, to, kind);
        }
        while b3 != 0 {
            let to = pop_lsb(&mut b3);
            make_promotions(list, (to as i32 - up) as Square, to, kind);
        }
    }

    // Ordinary and en passant captures.
    if matches!(
        kind,
        GenType::Captures | GenType::Evasions | GenType::NonEvasions
    ) {
        let mut b1 = shift(pawns_not_on7, up_right) & enemies;
        let mut b2 = shift(pawns_not_on7, up_left) & enemies;
        while b1 != 0 {
            let to = pop_lsb(&mut b1);
            list.push(Move::new((to as i32 - up_right) as Square, to));
        }
        while b2 != 0 {
            let to = pop_lsb(&mut b2);
            list.push(Move::new((to as i32 - up_left) as Square, to));
        }

        if let Some(ep) = pos.ep_square() {
            // En passant can evade check only by capturing the checking pawn.
            let capsq = (ep as i32 - up) as Square;
            if kind == GenType::Evasions && target & square_bb(capsq) == 0 {
                return;
            }
            let mut b = pawns_not_on7 & pawn_attacks(them, ep);
            while b != 0 {
                list.push(Move::with_kind(MoveKind::EnPassant, pop_lsb(&mut b), ep));
            }
        }
    }
}

/// Count leaf nodes of the legal move tree to the given depth.
pub fn perft(pos: &mut Position, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }
    let list = generate(pos, GenType::Legal);
    if depth == 1 {
        return list.len() as u64;
    }
    let mut nodes = 0;
    for m in list.iter() {
        pos.do_move(m);
        nodes += perft(pos, depth - 1);
        pos.undo_move(m);
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startpos_has_twenty_moves() {
        let pos = Position::startpos();
        assert_eq!(generate(&pos, GenType::Legal).len(), 20);
        assert_eq!(generate(&pos, GenType::Captures).len(), 0);
        assert_eq!(generate(&pos, GenType::Quiets).len(), 20);
    }

    #[test]
    fn legal_subset_of_pseudo_legal() {
        let pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        for m in generate(&pos, GenType::Legal).iter() {
            assert!(pos.pseudo_legal(m), "{} not pseudo-legal", m.to_uci(false));
            assert!(pos.legal(m), "{} not legal", m.to_uci(false));
        }
    }

    #[test]
    fn evasions_when_double_checked_are_king_moves() {
        // White king e1 double-checked by rook e8 and bishop h4.
        let pos = Position::from_fen("4r2k/8/8/8/7b/8/8/4K3 w - - 0 1").unwrap();
        assert!(more_than_one(pos.checkers()));
        for m in generate(&pos, GenType::Evasions).iter() {
            assert_eq!(m.from_sq(), pos.king_square(Color::White));
        }
    }

    #[test]
    fn quiet_checks_give_check() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/3R4/4K3 w - - 0 1").unwrap();
        let checks = generate(&pos, GenType::QuietChecks);
        assert!(checks.len() > 0);
        for m in checks.iter() {
            assert!(pos.gives_check(m));
            assert!(!pos.is_capture(m));
        }
    }

    #[test]
    fn promotion_split_between_categories() {
        let pos = Position::from_fen("4k3/P7/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let caps = generate(&pos, GenType::Captures);
        let quiets = generate(&pos, GenType::Quiets);
        assert!(caps.iter().any(|m| m.kind() == MoveKind::Promotion
            && m.promotion_type() == PieceType::Queen));
        assert_eq!(
            quiets
                .iter()
                .filter(|m| m.kind() == MoveKind::Promotion)
                .count(),
            3,
            "under-promotions belong to quiets"
        );
    }

    #[test]
    fn generation_is_deterministic() {
        let pos = Position::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        let a: Vec<Move> = generate(&pos, GenType::Legal).iter().collect();
        let b: Vec<Move> = generate(&pos, GenType::Legal).iter().collect();
        assert_eq!(a, b);
    }
}

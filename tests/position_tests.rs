use basalt::bitboard::square_bb;
use basalt::chess_move::{Move, MoveKind};
use basalt::movegen::{generate, GenType};
use basalt::position::{Position, START_FEN};
use basalt::types::*;

#[test]
fn startpos_fields() {
    let pos = Position::startpos();
    assert_eq!(pos.side_to_move(), Color::White);
    assert_eq!(pos.castling_rights(), ANY_CASTLING);
    assert_eq!(pos.ep_square(), None);
    assert_eq!(pos.rule50_count(), 0);
    assert_eq!(pos.pieces().count_ones(), 32);
    assert_eq!(pos.king_square(Color::White), SQ_E1);
    assert_eq!(pos.king_square(Color::Black), SQ_E8);
    assert_eq!(
        pos.non_pawn_material(Color::White),
        2 * KNIGHT_VALUE + 2 * BISHOP_VALUE + 2 * ROOK_VALUE + QUEEN_VALUE
    );
}

#[test]
fn fen_round_trip_preserves_position() {
    for fen in [
        START_FEN,
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        "8/6k1/8/8/8/8/8/R6K b - - 25 60",
    ] {
        let pos = Position::from_fen(fen).unwrap();
        assert_eq!(pos.fen(), fen);
        let again = Position::from_fen(&pos.fen()).unwrap();
        assert_eq!(again.key(), pos.key());
    }
}

#[test]
fn shredder_fen_castling_letters() {
    // Shredder style uses file letters; standard placement maps back to
    // KQkq semantics but keeps Chess960 printing.
    let pos = Position::from_fen(
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w HAha - 0 1",
    )
    .unwrap();
    assert!(pos.is_chess960());
    assert_eq!(pos.castling_rights(), ANY_CASTLING);
    assert_eq!(pos.fen(), "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w HAha - 0 1");
}

#[test]
fn x_fen_nonstandard_rook_goes_chess960() {
    let pos =
        Position::from_fen("nqbnrkrb/pppppppp/8/8/8/8/PPPPPPPP/NQBNRKRB w KQkq - 0 1").unwrap();
    assert!(pos.is_chess960());
    assert_eq!(pos.castling_rook(castling_index(Color::White, true)), SQ_G1);
    assert_eq!(pos.castling_rook(castling_index(Color::White, false)), SQ_E1);
}

#[test]
fn zobrist_incremental_matches_scratch_along_a_game() {
    let mut pos = Position::startpos();
    for _ in 0..40 {
        let moves = generate(&pos, GenType::Legal);
        if moves.is_empty() {
            break;
        }
        // Deterministic walk: lowest-valued encoding first.
        let mut chosen = moves.iter().next().unwrap();
        for m in moves.iter() {
            if m.0 < chosen.0 {
                chosen = m;
            }
        }
        pos.do_move(chosen);
        assert_eq!(pos.key(), pos.compute_key(), "after {}", chosen.to_uci(false));
    }
}

#[test]
fn make_unmake_is_identity_over_every_legal_move() {
    for fen in [
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
        "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3",
    ] {
        let mut pos = Position::from_fen(fen).unwrap();
        let fen_before = pos.fen();
        let key_before = pos.key();
        let pawn_key_before = pos.pawn_key();
        let material_key_before = pos.material_key();

        for m in generate(&pos, GenType::Legal).iter() {
            pos.do_move(m);
            pos.undo_move(m);
            assert_eq!(pos.fen(), fen_before, "fen broke on {}", m.to_uci(false));
            assert_eq!(pos.key(), key_before, "key broke on {}", m.to_uci(false));
            assert_eq!(pos.pawn_key(), pawn_key_before);
            assert_eq!(pos.material_key(), material_key_before);
        }
    }
}

#[test]
fn en_passant_only_emitted_when_capturable() {
    // Capturable: FEN keeps the square.
    let pos =
        Position::from_fen("rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3")
            .unwrap();
    assert!(pos.fen().contains(" e3 "));

    // Not capturable: parsing drops it, round trip emits '-'.
    let pos = Position::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1")
        .unwrap();
    assert!(pos.fen().contains(" - "));
}

#[test]
fn en_passant_discovery_rejected_by_legality() {
    let pos = Position::from_fen("8/8/3p4/KPp4r/1R3p1k/8/4P1P1/8 w - c6 0 1").unwrap();
    let ep = Move::with_kind(
        MoveKind::EnPassant,
        square_from_string("b5").unwrap(),
        square_from_string("c6").unwrap(),
    );
    assert!(pos.pseudo_legal(ep));
    assert!(!pos.legal(ep));
    assert!(!generate(&pos, GenType::Legal).contains(ep));
}

#[test]
fn castling_through_attack_is_illegal() {
    // Black rook on f8 covers f1: white may not castle kingside.
    let pos = Position::from_fen("5rk1/8/8/8/8/8/8/4K2R w K - 0 1").unwrap();
    let castle = Move::with_kind(MoveKind::Castling, SQ_E1, SQ_H1);
    assert!(!pos.legal(castle));
    assert!(!generate(&pos, GenType::Legal).contains(castle));

    // Rook on g8 covers g1: same verdict.
    let pos = Position::from_fen("6rk/8/8/8/8/8/8/4K2R w K - 0 1").unwrap();
    assert!(!pos.legal(castle));
}

#[test]
fn castling_rights_die_with_rook_or_king() {
    let mut pos = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
    // Moving the h1 rook drops white kingside only.
    let rh2 = pos.parse_uci_move("h1h2").unwrap();
    pos.do_move(rh2);
    assert_eq!(pos.castling_rights(), WHITE_OOO | BLACK_OO | BLACK_OOO);
    pos.undo_move(rh2);
    assert_eq!(pos.castling_rights(), ANY_CASTLING);

    // Moving the king drops both white rights.
    let ke2 = pos.parse_uci_move("e1e2").unwrap();
    pos.do_move(ke2);
    assert_eq!(pos.castling_rights(), BLACK_OO | BLACK_OOO);
    pos.undo_move(ke2);

    // Capturing the a8 rook removes black queenside.
    let raxa8 = pos.parse_uci_move("a1a8").unwrap();
    pos.do_move(raxa8);
    assert_eq!(pos.castling_rights() & BLACK_OOO, 0);
}

#[test]
fn gives_check_matches_reality() {
    for fen in [
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    ] {
        let mut pos = Position::from_fen(fen).unwrap();
        for m in generate(&pos, GenType::Legal).iter() {
            let predicted = pos.gives_check(m);
            pos.do_move(m);
            let actual = pos.checkers() != 0;
            pos.undo_move(m);
            assert_eq!(predicted, actual, "gives_check wrong for {}", m.to_uci(false));
        }
    }
}

#[test]
fn key_after_predicts_simple_moves() {
    let mut pos = Position::startpos();
    // A knight move changes no castling rights and sets no ep square.
    let nf3 = pos.parse_uci_move("g1f3").unwrap();
    let predicted = pos.key_after(nf3);
    pos.do_move(nf3);
    assert_eq!(pos.key(), predicted);
}

#[test]
fn repetition_distance_is_signed() {
    let mut pos = Position::startpos();
    let shuffle = ["b1c3", "b8c6", "c3b1", "c6b8"];
    for m in shuffle {
        let mv = pos.parse_uci_move(m).unwrap();
        pos.do_move(mv);
    }
    // First recurrence: positive distance.
    assert_eq!(pos.st().repetition, 4);
    for m in shuffle {
        let mv = pos.parse_uci_move(m).unwrap();
        pos.do_move(mv);
    }
    // Second recurrence: negative marks three-fold.
    assert!(pos.st().repetition < 0);
    assert!(pos.is_draw(MAX_PLY as i32));
}

#[test]
fn halfmove_clock_resets_on_pawn_moves_and_captures() {
    let mut pos =
        Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 12 7").unwrap();
    let e4 = pos.parse_uci_move("e2e4").unwrap();
    pos.do_move(e4);
    assert_eq!(pos.rule50_count(), 0);

    let mut pos = Position::from_fen("4k3/8/8/3p4/4P3/8/8/4K3 w - - 30 40").unwrap();
    let take = pos.parse_uci_move("e4d5").unwrap();
    pos.do_move(take);
    assert_eq!(pos.rule50_count(), 0);

    let mut pos = Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 30 40").unwrap();
    let quiet = pos.parse_uci_move("a1a2").unwrap();
    pos.do_move(quiet);
    assert_eq!(pos.rule50_count(), 31);
}

#[test]
fn board_bitboards_stay_consistent() {
    let mut pos = Position::from_fen(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    )
    .unwrap();
    for m in generate(&pos, GenType::Legal).iter() {
        pos.do_move(m);
        let mut union = 0u64;
        for pt in 0..PIECE_TYPE_COUNT {
            union |= pos.pieces_pt(PieceType::from_index(pt));
        }
        assert_eq!(union, pos.pieces());
        assert_eq!(
            pos.pieces_c(Color::White) & pos.pieces_c(Color::Black),
            0,
            "color sets overlap"
        );
        for s in 0u8..64 {
            match pos.piece_on(s) {
                Some(p) => {
                    assert_ne!(pos.pieces_cp(p.color, p.kind) & square_bb(s), 0);
                }
                None => assert_eq!(pos.pieces() & square_bb(s), 0),
            }
        }
        pos.undo_move(m);
    }
}

use basalt::movegen::{self, generate, GenType};
use basalt::Position;

fn perft(fen: &str, depth: u32) -> u64 {
    let mut pos = Position::from_fen(fen).unwrap();
    movegen::perft(&mut pos, depth)
}

const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
const KIWIPETE: &str = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
const POSITION_3: &str = "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1";
const POSITION_4: &str = "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1";
const POSITION_5: &str = "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8";

#[test]
fn startpos_shallow() {
    assert_eq!(perft(START, 1), 20);
    assert_eq!(perft(START, 2), 400);
    assert_eq!(perft(START, 3), 8902);
}

#[test]
fn startpos_depth_four() {
    assert_eq!(perft(START, 4), 197_281);
}

#[test]
fn kiwipete() {
    assert_eq!(perft(KIWIPETE, 1), 48);
    assert_eq!(perft(KIWIPETE, 2), 2039);
    assert_eq!(perft(KIWIPETE, 3), 97_862);
}

#[test]
fn rook_endgame_with_en_passant_pins() {
    assert_eq!(perft(POSITION_3, 1), 14);
    assert_eq!(perft(POSITION_3, 2), 191);
    assert_eq!(perft(POSITION_3, 3), 2812);
    assert_eq!(perft(POSITION_3, 4), 43_238);
}

#[test]
fn promotion_storm() {
    assert_eq!(perft(POSITION_4, 1), 6);
    assert_eq!(perft(POSITION_4, 2), 264);
    assert_eq!(perft(POSITION_4, 3), 9467);
}

#[test]
fn tactical_middlegame() {
    assert_eq!(perft(POSITION_5, 1), 44);
    assert_eq!(perft(POSITION_5, 2), 1486);
    assert_eq!(perft(POSITION_5, 3), 62_379);
}

#[test]
fn legal_equals_filtered_pseudo_legal_everywhere() {
    // Walk a few plies deep and cross-check the two generation paths.
    fn walk(pos: &mut Position, depth: u32) {
        let legal = generate(pos, GenType::Legal);
        let pseudo = if pos.checkers() != 0 {
            generate(pos, GenType::Evasions)
        } else {
            generate(pos, GenType::NonEvasions)
        };

        let filtered: Vec<_> = pseudo.iter().filter(|&m| pos.legal(m)).collect();
        assert_eq!(legal.len(), filtered.len());
        for m in legal.iter() {
            assert!(pos.pseudo_legal(m), "{} fails pseudo_legal", m.to_uci(false));
        }

        if depth == 0 {
            return;
        }
        for m in legal.iter() {
            pos.do_move(m);
            walk(pos, depth - 1);
            pos.undo_move(m);
        }
    }

    let mut pos = Position::from_fen(KIWIPETE).unwrap();
    walk(&mut pos, 2);
}

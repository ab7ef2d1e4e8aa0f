use basalt::chess_move::Move;
use basalt::tt::{value_from_tt, value_to_tt, Bound, TranspositionTable};
use basalt::types::*;

#[test]
fn tt_store_and_probe_round_trip() {
    let tt = TranspositionTable::new(1);
    let key = 0xDEAD_BEEF_0000_0001u64;
    let (miss, entry) = tt.probe(key);
    assert!(!miss.hit);

    let mv = Move::new(12, 28);
    tt.save(entry, key, 42, false, Bound::Exact, 5, mv, 50);

    let (hit, _) = tt.probe(key);
    assert!(hit.hit);
    assert_eq!(hit.value, 42);
    assert_eq!(hit.eval, 50);
    assert_eq!(hit.depth, 5);
    assert_eq!(hit.bound, Bound::Exact);
    assert_eq!(hit.mv, mv);
}

#[test]
fn tt_eval_round_trips_across_sign_range() {
    let tt = TranspositionTable::new(1);
    for (i, &eval) in [0i32, 100, -100, 500, -500, 30000, -30000].iter().enumerate() {
        let key = 0x1234_5678u64.wrapping_add(i as u64).wrapping_mul(0x9E37_79B9);
        let (_, entry) = tt.probe(key);
        tt.save(entry, key, 42, false, Bound::Exact, 10, Move::NONE, eval);
        let (hit, _) = tt.probe(key);
        assert!(hit.hit);
        assert_eq!(hit.eval, eval, "eval mismatch for {eval}");
        assert_eq!(hit.value, 42, "value corrupted for eval {eval}");
        assert_eq!(hit.depth, 10, "depth corrupted for eval {eval}");
    }
}

#[test]
fn tt_clear_wipes_entries() {
    let tt = TranspositionTable::new(1);
    let key = 0xABCu64;
    let (_, entry) = tt.probe(key);
    tt.save(entry, key, 10, false, Bound::Lower, 2, Move::NONE, 15);
    assert!(tt.probe(key).0.hit);
    tt.clear();
    assert!(!tt.probe(key).0.hit);
}

#[test]
fn tt_all_bounds_survive() {
    let tt = TranspositionTable::new(1);
    for (i, &bound) in [Bound::Exact, Bound::Lower, Bound::Upper].iter().enumerate() {
        let key = 0xFEED_0000u64 + i as u64 * 0x0101_0101_0101;
        let (_, entry) = tt.probe(key);
        tt.save(entry, key, -200, true, bound, 5, Move::NONE, -150);
        let (hit, _) = tt.probe(key);
        assert!(hit.hit);
        assert_eq!(hit.bound, bound);
        assert_eq!(hit.value, -200);
        assert!(hit.is_pv);
    }
}

#[test]
fn replacement_keeps_the_more_valuable_entry() {
    let tt = TranspositionTable::new(1);
    let key = 0x5555_6666_7777_8888u64;
    let (_, entry) = tt.probe(key);
    tt.save(entry, key, 90, false, Bound::Lower, 22, Move::new(8, 16), 0);

    // A shallow non-exact save against the same slot and key must lose.
    let (_, entry) = tt.probe(key);
    tt.save(entry, key, -5, false, Bound::Upper, 1, Move::new(0, 8), 0);

    let (hit, _) = tt.probe(key);
    assert_eq!(hit.depth, 22);
    assert_eq!(hit.value, 90);
}

#[test]
fn exact_bound_always_overwrites() {
    let tt = TranspositionTable::new(1);
    let key = 0x1357_9BDF_2468_ACE0u64;
    let (_, entry) = tt.probe(key);
    tt.save(entry, key, 90, false, Bound::Lower, 22, Move::new(8, 16), 0);
    let (_, entry) = tt.probe(key);
    tt.save(entry, key, 7, false, Bound::Exact, 3, Move::new(1, 9), 0);
    let (hit, _) = tt.probe(key);
    assert_eq!(hit.depth, 3);
    assert_eq!(hit.value, 7);
}

#[test]
fn generation_refresh_on_probe() {
    let tt = TranspositionTable::new(1);
    let key = 0x9999_AAAA_BBBB_CCCCu64;
    let (_, entry) = tt.probe(key);
    tt.save(entry, key, 1, false, Bound::Lower, 8, Move::new(2, 10), 0);

    // Age the table by several searches; the entry still probes as a hit
    // and probing refreshes its generation in place.
    for _ in 0..5 {
        tt.new_search();
    }
    let (hit, _) = tt.probe(key);
    assert!(hit.hit);
    assert_eq!(hit.depth, 8);
}

#[test]
fn mate_scores_adjusted_for_ply() {
    // Stored as distance from the node, recovered as distance from root.
    for ply in [0, 2, 9, 30] {
        let v = mate_in(ply + 4);
        assert_eq!(value_from_tt(value_to_tt(v, ply), ply, 0), v);
        let v = mated_in(ply + 4);
        assert_eq!(value_from_tt(value_to_tt(v, ply), ply, 0), v);
    }
    // Non-mate scores pass through untouched.
    assert_eq!(value_to_tt(123, 17), 123);
    assert_eq!(value_from_tt(123, 17, 0), 123);
}

#[test]
fn unreachable_mate_demoted_by_fifty_move_clock() {
    let stored = value_to_tt(VALUE_MATE - 40, 0);
    assert_eq!(value_from_tt(stored, 0, 90), VALUE_MATE_IN_MAX_PLY - 1);
    let stored = value_to_tt(-(VALUE_MATE - 40), 0);
    assert_eq!(value_from_tt(stored, 0, 90), VALUE_MATED_IN_MAX_PLY + 1);
}

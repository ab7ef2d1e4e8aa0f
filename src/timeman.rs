//! Per-move time budgeting.
//!
//! From the remaining clock, increment and game ply the manager derives an
//! `optimum` budget (consulted between iterations: start another one only
//! while under it) and a `maximum` budget (hard abort inside an iteration).
//! The iterative-deepening loop scales optimum further by search-stability
//! factors before comparing.

use std::time::Instant;

pub struct TimeManager {
    start: Instant,
    optimum_ms: i64,
    maximum_ms: i64,
    use_time: bool,
}

impl TimeManager {
    /// Budget for a game with `our_time_ms` on the clock. Zero time means
    /// no time control: both budgets become effectively infinite.
    pub fn new(
        our_time_ms: i64,
        our_inc_ms: i64,
        moves_to_go: Option<i64>,
        move_overhead_ms: i64,
        ponder: bool,
        ply: i32,
    ) -> TimeManager {
        if our_time_ms <= 0 {
            return TimeManager {
                start: Instant::now(),
                optimum_ms: i64::MAX,
                maximum_ms: i64::MAX,
                use_time: false,
            };
        }

        let our_time = our_time_ms.max(1) as f64;
        let inc = our_inc_ms.max(0) as f64;
        let overhead = move_overhead_ms as f64;
        let ply = f64::from(ply);

        // Move horizon capped at 50, shrinking once under a second of clock.
        let mut mtg = moves_to_go.map_or(50.0, |m| (m as f64).min(50.0));
        if our_time < 1000.0 && mtg / our_time > 0.05 {
            mtg = our_time * 0.05;
        }

        let time_left = (our_time + inc * (mtg - 1.0) - overhead * (mtg + 2.0)).max(1.0);

        let c1 = (0.00308 + 0.000319 * (our_time / 1000.0).log10()).min(0.00506);
        let inc_bonus = if our_inc_ms >= 500 { 1.13 } else { 1.0 };
        let opt_scale =
            (0.0122 + (ply + 2.95).powf(0.462) * c1).min(0.213 * our_time / time_left) * inc_bonus;
        let max_scale = 6.64f64.min((3.39 + 3.01 * (our_time / 1000.0).log10()).max(2.93) + ply / 12.0);

        let mut optimum = opt_scale * time_left;
        let maximum = (0.825 * our_time - overhead).min(max_scale * optimum) - 10.0;
        if ponder {
            optimum *= 1.25;
        }

        TimeManager {
            start: Instant::now(),
            optimum_ms: optimum.max(1.0) as i64,
            maximum_ms: maximum.max(1.0) as i64,
            use_time: true,
        }
    }

    /// Exact per-move budget: optimum and maximum coincide.
    pub fn fixed(ms: i64) -> TimeManager {
        TimeManager {
            start: Instant::now(),
            optimum_ms: ms.max(1),
            maximum_ms: ms.max(1),
            use_time: true,
        }
    }

    pub fn infinite() -> TimeManager {
        TimeManager {
            start: Instant::now(),
            optimum_ms: i64::MAX,
            maximum_ms: i64::MAX,
            use_time: false,
        }
    }

    #[inline]
    pub fn elapsed_ms(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }

    #[inline]
    pub fn optimum_ms(&self) -> i64 {
        self.optimum_ms
    }

    #[inline]
    pub fn maximum_ms(&self) -> i64 {
        self.maximum_ms
    }

    /// Whether a clock is running at all this search.
    #[inline]
    pub fn timed(&self) -> bool {
        self.use_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimum_below_maximum_below_clock() {
        for &(time, inc) in &[(60_000i64, 0i64), (300_000, 3_000), (5_000, 100), (1_000, 0)] {
            let tm = TimeManager::new(time, inc, None, 30, false, 20);
            assert!(tm.timed());
            assert!(tm.optimum_ms() >= 1);
            assert!(tm.optimum_ms() <= tm.maximum_ms(), "opt {} max {}", tm.optimum_ms(), tm.maximum_ms());
            assert!(tm.maximum_ms() < time, "maximum must leave clock headroom");
        }
    }

    #[test]
    fn later_plies_get_more_of_the_pool() {
        let early = TimeManager::new(60_000, 0, None, 30, false, 2);
        let late = TimeManager::new(60_000, 0, None, 30, false, 60);
        assert!(late.optimum_ms() >= early.optimum_ms());
    }

    #[test]
    fn pondering_inflates_optimum() {
        let plain = TimeManager::new(60_000, 0, None, 30, false, 20);
        let ponder = TimeManager::new(60_000, 0, None, 30, true, 20);
        assert!(ponder.optimum_ms() > plain.optimum_ms());
    }

    #[test]
    fn zero_clock_means_untimed() {
        let tm = TimeManager::new(0, 0, None, 30, false, 0);
        assert!(!tm.timed());
        assert_eq!(tm.maximum_ms(), i64::MAX);
    }

    #[test]
    fn tiny_clock_still_yields_positive_budget() {
        let tm = TimeManager::new(50, 0, None, 10, false, 40);
        assert!(tm.optimum_ms() >= 1);
        assert!(tm.maximum_ms() >= 1);
    }
}

//! Composite "sync rate" health score.

use crate::smoothing::clamp;

const CPU_WEIGHT: f64 = 0.3;
const MEMORY_WEIGHT: f64 = 0.3;

/// `clamp(100 - (cpu*0.3 + memory*0.3), 0, 100)`.
///
/// Pure: recomputed every tick from the latest CPU and memory readings.
pub fn sync_rate(cpu_usage: f64, memory_usage: f64) -> f64 {
    clamp(
        100.0 - (cpu_usage * CPU_WEIGHT + memory_usage * MEMORY_WEIGHT),
        0.0,
        100.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_cpu_90_mem_50() {
        assert!((sync_rate(90.0, 50.0) - 58.0).abs() < 1e-9);
    }

    #[test]
    fn idle_machine_is_fully_synced() {
        assert_eq!(sync_rate(0.0, 0.0), 100.0);
    }

    #[test]
    fn always_within_bounds_and_exact() {
        let mut cpu = 0.0;
        while cpu <= 100.0 {
            let mut mem = 0.0;
            while mem <= 100.0 {
                let s = sync_rate(cpu, mem);
                assert!((0.0..=100.0).contains(&s));
                let expected = (100.0 - 0.3 * cpu - 0.3 * mem).clamp(0.0, 100.0);
                assert!((s - expected).abs() < 1e-9);
                mem += 7.5;
            }
            cpu += 5.0;
        }
    }

    #[test]
    fn out_of_range_inputs_clamp() {
        assert_eq!(sync_rate(400.0, 400.0), 0.0);
        assert_eq!(sync_rate(-100.0, -100.0), 100.0);
    }
}

//! Deployment suitability of an artifact per hardware class, from declared size.

use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform { EdgeDevice, SmallAccelerator, Workstation, ServerClass }

impl Platform {
    pub const ALL: [Platform; 4] = [Platform::EdgeDevice, Platform::SmallAccelerator, Platform::Workstation, Platform::ServerClass];
}

/// Platform capacities in MB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformCapacities {
    pub edge_device: f64,
    pub small_accelerator: f64,
    pub workstation: f64,
    pub server_class: f64,
}

impl Default for PlatformCapacities {
    fn default() -> Self { Self { edge_device: 1024.0, small_accelerator: 4096.0, workstation: 16384.0, server_class: 65536.0 } }
}

impl PlatformCapacities {
    pub fn capacity(&self, p: Platform) -> f64 {
        match p {
            Platform::EdgeDevice => self.edge_device,
            Platform::SmallAccelerator => self.small_accelerator,
            Platform::Workstation => self.workstation,
            Platform::ServerClass => self.server_class,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SizeScores {
    pub edge_device: f64,
    pub small_accelerator: f64,
    pub workstation: f64,
    pub server_class: f64,
}

impl SizeScores {
    pub fn get(&self, p: Platform) -> f64 {
        match p {
            Platform::EdgeDevice => self.edge_device,
            Platform::SmallAccelerator => self.small_accelerator,
            Platform::Workstation => self.workstation,
            Platform::ServerClass => self.server_class,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SizeSuitabilityEvaluator { capacities: PlatformCapacities }

impl SizeSuitabilityEvaluator {
    pub fn new(capacities: PlatformCapacities) -> Self { Self { capacities } }

    /// `clamp(1 - size/capacity, 0, 1)` per platform, rounded to two decimals.
    pub fn score(&self, size_mb: f64) -> SizeScores {
        let s = |p| platform_score(size_mb, self.capacities.capacity(p));
        SizeScores {
            edge_device: s(Platform::EdgeDevice),
            small_accelerator: s(Platform::SmallAccelerator),
            workstation: s(Platform::Workstation),
            server_class: s(Platform::ServerClass),
        }
    }

    /// Scores plus elapsed seconds.
    pub fn score_timed(&self, size_mb: f64) -> (SizeScores, f64) {
        let start = Instant::now();
        let scores = self.score(size_mb);
        (scores, start.elapsed().as_secs_f64())
    }
}

fn platform_score(size_mb: f64, capacity_mb: f64) -> f64 {
    if !(capacity_mb > 0.0) || size_mb.is_nan() { return 0.0; }
    let raw = (1.0 - size_mb.max(0.0) / capacity_mb).clamp(0.0, 1.0);
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn scores_against_default_table() {
        let ev = SizeSuitabilityEvaluator::new(PlatformCapacities::default());
        let s = ev.score(512.0);
        assert_eq!(s.edge_device, 0.5);
        assert_eq!(s.small_accelerator, 0.88);
        assert_eq!(s.server_class, 0.99);
    }

    #[test]
    fn oversized_is_zero_never_negative() {
        let ev = SizeSuitabilityEvaluator::new(PlatformCapacities::default());
        let s = ev.score(10_000.0);
        assert_eq!(s.edge_device, 0.0);
        assert_eq!(s.small_accelerator, 0.0);
        assert!(s.workstation > 0.0);
    }

    proptest! {
        #[test]
        fn scores_bounded_and_monotone(a in 0.0f64..200_000.0, b in 0.0f64..200_000.0) {
            let ev = SizeSuitabilityEvaluator::new(PlatformCapacities::default());
            let (small, large) = if a <= b { (a, b) } else { (b, a) };
            let (s_small, s_large) = (ev.score(small), ev.score(large));
            for p in Platform::ALL {
                prop_assert!((0.0..=1.0).contains(&s_small.get(p)));
                prop_assert!((0.0..=1.0).contains(&s_large.get(p)));
                prop_assert!(s_large.get(p) <= s_small.get(p));
            }
        }
    }
}

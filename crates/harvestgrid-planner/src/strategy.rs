//! Scheduling strategies — how each plan mode paces its cycle.
//!
//! Every mode shares the same calculator, allocator, and controller; the
//! table here is the only thing that differs between them.

use std::time::Duration;

use harvest_core::PlanMode;
use harvest_core::config::PacingConfig;

/// How stage launches are spaced within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pacing {
    /// Launch stages a fixed offset apart so their effects land in order.
    Offset {
        stage_delay: Duration,
        cycle_delay: Duration,
    },
    /// Wait out each stage's estimated duration (plus padding) before
    /// launching the next.
    Sequential {
        padding: Duration,
        cycle_delay: Duration,
    },
}

impl Pacing {
    /// Delay appended after the completion window.
    pub fn cycle_delay(&self) -> Duration {
        match self {
            Pacing::Offset { cycle_delay, .. } | Pacing::Sequential { cycle_delay, .. } => {
                *cycle_delay
            }
        }
    }
}

/// The per-mode table consumed by the cycle controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    pub mode: PlanMode,
    pub pacing: Pacing,
    /// Whether the controller loops; a non-repeating strategy runs one cycle.
    pub repeat: bool,
}

impl Strategy {
    pub fn for_mode(mode: PlanMode, pacing: &PacingConfig) -> Self {
        let stage_delay = Duration::from_millis(pacing.stage_delay_ms);
        let cycle_delay = Duration::from_millis(pacing.cycle_delay_ms);

        match mode {
            PlanMode::Threshold => Self {
                mode,
                pacing: Pacing::Offset {
                    stage_delay,
                    cycle_delay,
                },
                repeat: true,
            },
            PlanMode::Batch => Self {
                mode,
                pacing: Pacing::Sequential {
                    padding: Duration::from_millis(pacing.sequential_padding_ms),
                    cycle_delay,
                },
                repeat: true,
            },
            PlanMode::Drain => Self {
                mode,
                pacing: Pacing::Offset {
                    stage_delay: Duration::ZERO,
                    cycle_delay: Duration::ZERO,
                },
                repeat: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_uses_fixed_offsets() {
        let s = Strategy::for_mode(PlanMode::Threshold, &PacingConfig::default());
        assert_eq!(
            s.pacing,
            Pacing::Offset {
                stage_delay: Duration::from_millis(50),
                cycle_delay: Duration::from_millis(200),
            }
        );
        assert!(s.repeat);
    }

    #[test]
    fn batch_waits_out_each_stage() {
        let s = Strategy::for_mode(PlanMode::Batch, &PacingConfig::default());
        match s.pacing {
            Pacing::Sequential { padding, .. } => {
                assert_eq!(padding, Duration::from_millis(100));
            }
            other => panic!("expected Sequential, got {other:?}"),
        }
    }

    #[test]
    fn drain_runs_once() {
        let s = Strategy::for_mode(PlanMode::Drain, &PacingConfig::default());
        assert!(!s.repeat);
        assert_eq!(s.pacing.cycle_delay(), Duration::ZERO);
    }
}

//! Replay metrics: pure functions over the daily equity curve.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayMetrics {
    pub total_return: f64,
    /// Worst peak-to-trough decline, as a non-positive fraction.
    pub max_drawdown: f64,
    pub rebalances: usize,
    pub failed_cycles: usize,
    pub liquidations: usize,
    pub fills: usize,
}

impl ReplayMetrics {
    pub fn from_equity(equity_curve: &[f64]) -> Self {
        Self {
            total_return: total_return(equity_curve),
            max_drawdown: max_drawdown(equity_curve),
            ..Self::default()
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    let (Some(&initial), Some(&final_eq)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    if equity_curve.len() < 2 || initial <= 0.0 {
        return 0.0;
    }
    (final_eq - initial) / initial
}

/// Maximum drawdown as a negative fraction (e.g. -0.25 for a 25% drawdown).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;

    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (eq - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_return_basic() {
        assert!((total_return(&[100.0, 110.0, 121.0]) - 0.21).abs() < 1e-12);
        assert_eq!(total_return(&[100.0]), 0.0);
        assert_eq!(total_return(&[]), 0.0);
    }

    #[test]
    fn max_drawdown_tracks_running_peak() {
        let curve = [100.0, 120.0, 90.0, 130.0, 117.0];
        assert!((max_drawdown(&curve) - (-0.25)).abs() < 1e-12);
    }

    #[test]
    fn monotone_curve_has_no_drawdown() {
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn from_equity_fills_curve_metrics_only() {
        let m = ReplayMetrics::from_equity(&[100.0, 50.0, 75.0]);
        assert!((m.total_return + 0.25).abs() < 1e-12);
        assert!((m.max_drawdown + 0.5).abs() < 1e-12);
        assert_eq!(m.rebalances, 0);
    }
}

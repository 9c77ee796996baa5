//! Contributing-factor sum policy

use serde::Deserialize;
use tracing::warn;

use super::models::{ContributingFactor, FactorBreakdown};

/// Allowed deviation from 100 before the policy applies
pub const SUM_TOLERANCE: f64 = 0.5;

/// What to do when factor percentages do not sum to 100
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorSumPolicy {
    /// Keep the values as returned
    #[default]
    Accept,
    /// Scale the values so they sum to 100
    Renormalize,
    /// Treat the response as a schema violation
    Reject,
}

pub fn sums_to_hundred(breakdown: &FactorBreakdown) -> bool {
    (breakdown.total() - 100.0).abs() <= SUM_TOLERANCE
}

/// Apply the policy to a validated breakdown
pub fn apply_policy(
    policy: FactorSumPolicy,
    breakdown: FactorBreakdown,
) -> Result<FactorBreakdown, String> {
    if sums_to_hundred(&breakdown) {
        return Ok(breakdown);
    }

    let total = breakdown.total();
    match policy {
        FactorSumPolicy::Accept => {
            warn!(total, "Contributing factors do not sum to 100, rendering as returned");
            Ok(breakdown)
        }
        FactorSumPolicy::Renormalize => {
            if total <= 0.0 {
                return Err("cannot renormalize factors that sum to 0".to_string());
            }
            warn!(total, "Renormalizing contributing factors to 100");
            Ok(FactorBreakdown {
                factors: renormalize(&breakdown.factors, total),
            })
        }
        FactorSumPolicy::Reject => Err(format!("factor influences sum to {}, expected 100", total)),
    }
}

/// Largest-remainder rounding to one decimal place
fn renormalize(factors: &[ContributingFactor], total: f64) -> Vec<ContributingFactor> {
    const TENTHS: i64 = 1000;

    let scaled: Vec<f64> = factors
        .iter()
        .map(|f| f.influence_percent * TENTHS as f64 / total)
        .collect();
    let mut tenths: Vec<i64> = scaled.iter().map(|v| v.floor() as i64).collect();

    let mut order: Vec<usize> = (0..factors.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = scaled[a] - scaled[a].floor();
        let rb = scaled[b] - scaled[b].floor();
        rb.total_cmp(&ra)
    });

    let remaining = TENTHS - tenths.iter().sum::<i64>();
    for &idx in order.iter().cycle().take(remaining.max(0) as usize) {
        tenths[idx] += 1;
    }

    factors
        .iter()
        .zip(tenths)
        .map(|(factor, t)| ContributingFactor {
            name: factor.name.clone(),
            influence_percent: t as f64 / 10.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakdown(values: &[f64]) -> FactorBreakdown {
        FactorBreakdown {
            factors: values
                .iter()
                .enumerate()
                .map(|(i, v)| ContributingFactor {
                    name: format!("factor-{}", i),
                    influence_percent: *v,
                })
                .collect(),
        }
    }

    #[test]
    fn test_accept_keeps_short_sum() {
        let result = apply_policy(FactorSumPolicy::Accept, breakdown(&[30.0, 30.0, 30.0])).unwrap();
        let values: Vec<f64> = result.factors.iter().map(|f| f.influence_percent).collect();
        assert_eq!(values, vec![30.0, 30.0, 30.0]);
    }

    #[test]
    fn test_renormalize_sums_to_hundred() {
        let result =
            apply_policy(FactorSumPolicy::Renormalize, breakdown(&[30.0, 30.0, 30.0])).unwrap();
        let values: Vec<f64> = result.factors.iter().map(|f| f.influence_percent).collect();
        assert_eq!(values, vec![33.4, 33.3, 33.3]);
        assert!((result.total() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_renormalize_preserves_proportions() {
        let result =
            apply_policy(FactorSumPolicy::Renormalize, breakdown(&[20.0, 40.0, 60.0, 80.0]))
                .unwrap();
        let values: Vec<f64> = result.factors.iter().map(|f| f.influence_percent).collect();
        assert_eq!(values, vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_reject_fails_outside_tolerance() {
        assert!(apply_policy(FactorSumPolicy::Reject, breakdown(&[30.0, 30.0, 30.0])).is_err());
        assert!(apply_policy(FactorSumPolicy::Reject, breakdown(&[33.3, 33.3, 33.3])).is_ok());
    }

    #[test]
    fn test_renormalize_zero_total_fails() {
        assert!(apply_policy(FactorSumPolicy::Renormalize, breakdown(&[0.0, 0.0, 0.0])).is_err());
    }
}

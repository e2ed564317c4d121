//! Weight allocation methods and their shared linear algebra.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::metrics::math::{mean, percentile, std_dev};

use super::types::{
    OptimizationMethod, OptimizationRequest, OptimizationResult, WeightConstraints,
};

/// Pivot magnitude below which a matrix is treated as singular.
const SINGULARITY_EPSILON: f64 = 1e-10;

/// Iteration cap for risk parity.
const RISK_PARITY_MAX_ITERS: usize = 500;

/// Risk-contribution convergence tolerance.
const RISK_PARITY_TOLERANCE: f64 = 1e-8;

/// Weight floor applied during risk-parity iteration.
const RISK_PARITY_WEIGHT_FLOOR: f64 = 1e-4;

/// Passes of clamp-and-redistribute when applying bounds.
const CONSTRAINT_MAX_PASSES: usize = 16;

/// Weight below which an asset does not count toward diversification.
const MATERIAL_WEIGHT: f64 = 0.01;

/// Optimization failure.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Request shape is unusable.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Iterative method failed to converge and no fallback applied.
    #[error("Method {method} did not converge after {iterations} iterations")]
    NonConvergence {
        /// Method that failed.
        method: OptimizationMethod,
        /// Iterations attempted.
        iterations: usize,
    },

    /// Background worker failed.
    #[error("Optimizer worker failed: {0}")]
    Worker(String),
}

/// Run one optimization request synchronously.
///
/// Degraded inputs (missing market caps, singular covariance, infeasible
/// bounds) fall back to equal weights with `converged = false` and a
/// warning rather than erroring.
///
/// # Errors
///
/// `InsufficientData` when the request shape is unusable: no symbols,
/// mismatched series lengths, or fewer than two observations.
pub fn optimize(request: &OptimizationRequest) -> Result<OptimizationResult, OptimizerError> {
    validate(request)?;
    let n = request.symbols.len();

    let mut warnings = Vec::new();
    let mut converged = true;
    let mut method = request.method;

    let constraints = if request.constraints.feasible_for(n) {
        request.constraints
    } else {
        warnings.push(format!(
            "weight bounds [{}, {}] are infeasible for {n} assets; using defaults",
            request.constraints.min_weight, request.constraints.max_weight
        ));
        converged = false;
        WeightConstraints::default()
    };

    let raw = match request.method {
        OptimizationMethod::EqualWeight => equal_weights(n),
        OptimizationMethod::MarketCap => match market_cap_weights(request) {
            Some(weights) => weights,
            None => {
                warnings.push(
                    "market caps missing or non-positive; falling back to equal weights"
                        .to_string(),
                );
                converged = false;
                method = OptimizationMethod::EqualWeight;
                equal_weights(n)
            }
        },
        OptimizationMethod::RiskParity => {
            let cov = covariance(&request.returns);
            match risk_parity_weights(&cov) {
                Some(weights) => weights,
                None => {
                    warnings.push(
                        "risk parity degenerate (zero-variance asset or non-convergence); \
                         falling back to equal weights"
                            .to_string(),
                    );
                    converged = false;
                    method = OptimizationMethod::EqualWeight;
                    equal_weights(n)
                }
            }
        }
        OptimizationMethod::Kelly => {
            let cov = covariance(&request.returns);
            match kelly_weights(&request.returns, &cov, request.kelly_fraction) {
                Some(weights) => weights,
                None => {
                    warnings.push(
                        "covariance singular or no positive Kelly weight; \
                         falling back to equal weights"
                            .to_string(),
                    );
                    converged = false;
                    method = OptimizationMethod::EqualWeight;
                    equal_weights(n)
                }
            }
        }
    };

    let weights = apply_constraints(&raw, constraints);

    let material = weights.iter().filter(|w| **w > MATERIAL_WEIGHT).count();
    if material < request.constraints.min_assets {
        warnings.push(format!(
            "only {material} assets above {MATERIAL_WEIGHT} weight \
             (minimum {})",
            request.constraints.min_assets
        ));
    }

    let stats = portfolio_stats(&request.returns, &weights);

    debug!(
        method = %method,
        converged = converged,
        expected_return = stats.expected_return,
        volatility = stats.volatility,
        "Optimization complete"
    );

    let weights_by_symbol: HashMap<String, f64> = request
        .symbols
        .iter()
        .cloned()
        .zip(weights.iter().copied())
        .collect();

    Ok(OptimizationResult {
        method,
        weights: weights_by_symbol,
        expected_return: stats.expected_return,
        volatility: stats.volatility,
        sharpe_ratio: stats.sharpe_ratio,
        var_95: stats.var_95,
        cvar_95: stats.cvar_95,
        diversification_ratio: stats.diversification_ratio,
        converged,
        warnings,
    })
}

fn validate(request: &OptimizationRequest) -> Result<(), OptimizerError> {
    if request.symbols.is_empty() {
        return Err(OptimizerError::InsufficientData("no symbols".to_string()));
    }
    if request.returns.len() != request.symbols.len() {
        return Err(OptimizerError::InsufficientData(format!(
            "{} return series for {} symbols",
            request.returns.len(),
            request.symbols.len()
        )));
    }
    let observations = request.returns[0].len();
    if observations < 2 {
        return Err(OptimizerError::InsufficientData(format!(
            "need at least 2 observations, got {observations}"
        )));
    }
    if request.returns.iter().any(|r| r.len() != observations) {
        return Err(OptimizerError::InsufficientData(
            "return series have unequal lengths".to_string(),
        ));
    }
    Ok(())
}

fn equal_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

fn market_cap_weights(request: &OptimizationRequest) -> Option<Vec<f64>> {
    let caps: Vec<f64> = request
        .symbols
        .iter()
        .map(|s| request.market_caps.get(s).copied().unwrap_or(0.0))
        .collect();
    if caps.iter().any(|c| *c <= 0.0) {
        return None;
    }
    let total: f64 = caps.iter().sum();
    Some(caps.into_iter().map(|c| c / total).collect())
}

/// Sample covariance matrix of per-asset return series.
#[must_use]
pub fn covariance(returns: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = returns.len();
    let observations = returns.first().map_or(0, Vec::len);
    let means: Vec<f64> = returns.iter().map(|r| mean(r)).collect();

    let mut cov = vec![vec![0.0; n]; n];
    if observations < 2 {
        return cov;
    }
    let denom = (observations - 1) as f64;

    for i in 0..n {
        for j in i..n {
            let mut sum = 0.0;
            for t in 0..observations {
                sum += (returns[i][t] - means[i]) * (returns[j][t] - means[j]);
            }
            cov[i][j] = sum / denom;
            cov[j][i] = cov[i][j];
        }
    }
    cov
}

/// Invert a square matrix by Gaussian elimination with partial pivoting.
///
/// `None` when a pivot falls below the singularity threshold.
#[must_use]
pub fn invert_matrix(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    // Augment with the identity.
    let mut aug: Vec<Vec<f64>> = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = row.clone();
            r.extend((0..n).map(|j| f64::from(u8::from(i == j))));
            r
        })
        .collect();

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|a, b| {
                aug[*a][col]
                    .abs()
                    .partial_cmp(&aug[*b][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })?;
        if aug[pivot_row][col].abs() < SINGULARITY_EPSILON {
            return None;
        }
        aug.swap(col, pivot_row);

        let pivot = aug[col][col];
        for value in &mut aug[col] {
            *value /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor == 0.0 {
                continue;
            }
            for k in 0..(2 * n) {
                aug[row][k] -= factor * aug[col][k];
            }
        }
    }

    Some(aug.into_iter().map(|row| row[n..].to_vec()).collect())
}

/// Equalize risk contributions by multiplicative iteration.
///
/// `None` when the covariance is degenerate or the iteration fails to
/// converge.
fn risk_parity_weights(cov: &[Vec<f64>]) -> Option<Vec<f64>> {
    let n = cov.len();
    if cov.iter().enumerate().any(|(i, row)| row[i] <= 0.0) {
        return None;
    }

    let mut weights = equal_weights(n);
    let target = 1.0 / n as f64;

    for _ in 0..RISK_PARITY_MAX_ITERS {
        let marginal: Vec<f64> = (0..n)
            .map(|i| (0..n).map(|j| cov[i][j] * weights[j]).sum())
            .collect();
        let total_risk: f64 = (0..n).map(|i| weights[i] * marginal[i]).sum();
        if total_risk <= 0.0 {
            return None;
        }

        let contributions: Vec<f64> = (0..n)
            .map(|i| weights[i] * marginal[i] / total_risk)
            .collect();

        let worst = contributions
            .iter()
            .map(|rc| (rc - target).abs())
            .fold(0.0, f64::max);
        if worst < RISK_PARITY_TOLERANCE {
            return Some(weights);
        }

        for i in 0..n {
            let ratio = target / contributions[i].max(RISK_PARITY_WEIGHT_FLOOR * target);
            weights[i] = (weights[i] * ratio.sqrt()).max(RISK_PARITY_WEIGHT_FLOOR);
        }
        let sum: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= sum;
        }
    }
    None
}

/// Fractional Kelly weights: `fraction * inv(cov) * mean_returns`,
/// negatives clipped, renormalized.
fn kelly_weights(returns: &[Vec<f64>], cov: &[Vec<f64>], fraction: f64) -> Option<Vec<f64>> {
    let inverse = invert_matrix(cov)?;
    let means: Vec<f64> = returns.iter().map(|r| mean(r)).collect();

    let mut weights: Vec<f64> = inverse
        .iter()
        .map(|row| {
            let full: f64 = row.iter().zip(&means).map(|(a, m)| a * m).sum();
            (full * fraction).max(0.0)
        })
        .collect();

    let sum: f64 = weights.iter().sum();
    if sum <= 0.0 {
        return None;
    }
    for w in &mut weights {
        *w /= sum;
    }
    Some(weights)
}

/// Clamp weights into bounds and redistribute the residual among
/// unclamped assets, preserving a unit sum.
fn apply_constraints(weights: &[f64], constraints: WeightConstraints) -> Vec<f64> {
    let mut weights = weights.to_vec();

    for _ in 0..CONSTRAINT_MAX_PASSES {
        let mut clamped = vec![false; weights.len()];
        let mut fixed_sum = 0.0;
        for (i, w) in weights.iter_mut().enumerate() {
            if *w <= constraints.min_weight {
                *w = constraints.min_weight;
                clamped[i] = true;
                fixed_sum += *w;
            } else if *w >= constraints.max_weight {
                *w = constraints.max_weight;
                clamped[i] = true;
                fixed_sum += *w;
            }
        }

        let free: Vec<usize> = (0..weights.len()).filter(|i| !clamped[*i]).collect();
        if free.is_empty() {
            break;
        }

        let free_sum: f64 = free.iter().map(|i| weights[*i]).sum();
        let residual = 1.0 - fixed_sum;
        if free_sum <= 0.0 {
            let share = residual / free.len() as f64;
            for i in &free {
                weights[*i] = share;
            }
        } else {
            let scale = residual / free_sum;
            for i in &free {
                weights[*i] *= scale;
            }
        }

        let in_bounds = free.iter().all(|i| {
            weights[*i] >= constraints.min_weight - 1e-12
                && weights[*i] <= constraints.max_weight + 1e-12
        });
        if in_bounds {
            break;
        }
    }
    weights
}

struct PortfolioStats {
    expected_return: f64,
    volatility: f64,
    sharpe_ratio: f64,
    var_95: f64,
    cvar_95: f64,
    diversification_ratio: f64,
}

fn portfolio_stats(returns: &[Vec<f64>], weights: &[f64]) -> PortfolioStats {
    let observations = returns.first().map_or(0, Vec::len);
    let portfolio: Vec<f64> = (0..observations)
        .map(|t| {
            weights
                .iter()
                .zip(returns)
                .map(|(w, series)| w * series[t])
                .sum()
        })
        .collect();

    let expected_return = mean(&portfolio);
    let volatility = std_dev(&portfolio);
    let sharpe_ratio = if volatility == 0.0 {
        0.0
    } else {
        expected_return / volatility
    };

    let cutoff = percentile(&portfolio, 5.0);
    let var_95 = cutoff.abs();
    let tail: Vec<f64> = portfolio.iter().copied().filter(|r| *r <= cutoff).collect();
    let cvar_95 = mean(&tail).abs();

    let weighted_vol: f64 = weights
        .iter()
        .zip(returns)
        .map(|(w, series)| w * std_dev(series))
        .sum();
    let diversification_ratio = if volatility == 0.0 {
        0.0
    } else {
        weighted_vol / volatility
    };

    if volatility == 0.0 {
        warn!("Portfolio return series has zero variance");
    }

    PortfolioStats {
        expected_return,
        volatility,
        sharpe_ratio,
        var_95,
        cvar_95,
        diversification_ratio,
    }
}

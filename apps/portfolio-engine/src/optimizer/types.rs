//! Optimizer request and result types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Weight allocation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMethod {
    /// Uniform weights.
    #[default]
    EqualWeight,
    /// Weights proportional to market capitalization.
    MarketCap,
    /// Equalize each asset's contribution to portfolio risk.
    RiskParity,
    /// Fractional Kelly allocation from mean returns and covariance.
    Kelly,
}

impl std::fmt::Display for OptimizationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EqualWeight => write!(f, "equal_weight"),
            Self::MarketCap => write!(f, "market_cap"),
            Self::RiskParity => write!(f, "risk_parity"),
            Self::Kelly => write!(f, "kelly"),
        }
    }
}

/// Per-asset weight bounds and diversification floor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeightConstraints {
    /// Minimum weight per asset.
    pub min_weight: f64,
    /// Maximum weight per asset.
    pub max_weight: f64,
    /// Minimum assets with a material (> 1%) weight before the result is
    /// flagged as under-diversified.
    pub min_assets: usize,
}

impl Default for WeightConstraints {
    fn default() -> Self {
        Self {
            min_weight: 0.0,
            max_weight: 1.0,
            min_assets: 2,
        }
    }
}

impl WeightConstraints {
    /// Whether bounds admit a full allocation across `n` assets.
    #[must_use]
    pub fn feasible_for(&self, n: usize) -> bool {
        let n = n as f64;
        self.min_weight <= self.max_weight
            && n * self.min_weight <= 1.0 + 1e-9
            && n * self.max_weight >= 1.0 - 1e-9
    }
}

/// One optimization request over aligned per-asset return series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRequest {
    /// Asset order; all parallel vectors follow it.
    pub symbols: Vec<String>,
    /// Per-asset return series, one inner vector per symbol, all equal
    /// length.
    pub returns: Vec<Vec<f64>>,
    /// Market caps per symbol, required for `MarketCap`.
    pub market_caps: HashMap<String, f64>,
    /// Allocation method.
    pub method: OptimizationMethod,
    /// Per-asset bounds.
    pub constraints: WeightConstraints,
    /// Fraction of full Kelly to apply, in `(0, 1]`.
    pub kelly_fraction: f64,
}

impl OptimizationRequest {
    /// Request with default constraints and quarter Kelly.
    #[must_use]
    pub fn new(symbols: Vec<String>, returns: Vec<Vec<f64>>, method: OptimizationMethod) -> Self {
        Self {
            symbols,
            returns,
            market_caps: HashMap::new(),
            method,
            constraints: WeightConstraints::default(),
            kelly_fraction: 0.25,
        }
    }
}

/// Result of one optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Method actually applied (after any fallback).
    pub method: OptimizationMethod,
    /// Weights per symbol, summing to 1.
    pub weights: HashMap<String, f64>,
    /// Expected per-period portfolio return.
    pub expected_return: f64,
    /// Portfolio return standard deviation.
    pub volatility: f64,
    /// Expected return over volatility; 0 when volatility is 0.
    pub sharpe_ratio: f64,
    /// Magnitude of the 5th percentile of portfolio returns.
    pub var_95: f64,
    /// Mean of portfolio returns at or below the 5th percentile, as a
    /// magnitude.
    pub cvar_95: f64,
    /// Weighted-average asset volatility over portfolio volatility.
    pub diversification_ratio: f64,
    /// Whether the method converged without fallback.
    pub converged: bool,
    /// Human-readable fallback or degradation notes.
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_feasibility() {
        let c = WeightConstraints::default();
        assert!(c.feasible_for(1));
        assert!(c.feasible_for(10));

        let tight = WeightConstraints {
            min_weight: 0.3,
            max_weight: 0.4,
            ..WeightConstraints::default()
        };
        // 3 assets: [0.9, 1.2] admits 1.0.
        assert!(tight.feasible_for(3));
        // 2 assets: max sum 0.8 < 1.
        assert!(!tight.feasible_for(2));
        // 4 assets: min sum 1.2 > 1.
        assert!(!tight.feasible_for(4));
    }

    #[test]
    fn method_serde_names() {
        let json = serde_json::to_string(&OptimizationMethod::RiskParity).unwrap();
        assert_eq!(json, "\"risk_parity\"");
        let parsed: OptimizationMethod = serde_json::from_str("\"equal_weight\"").unwrap();
        assert_eq!(parsed, OptimizationMethod::EqualWeight);
    }
}

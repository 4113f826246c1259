//! Take-profit / stop-loss grid definition
//!
//! Generates the TP × SL cross product swept by the optimizer and parses
//! grid overrides given on the command line.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{require_positive, BacktestError};

/// Threshold values to sweep, as fractional price moves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub tp: Vec<f64>,
    pub sl: Vec<f64>,
}

impl Default for ParamGrid {
    /// 7 × 6 = 42 cells, from 0.01% to 0.3%
    fn default() -> Self {
        ParamGrid {
            tp: vec![0.0001, 0.0002, 0.0003, 0.0005, 0.001, 0.002, 0.003],
            sl: vec![0.0001, 0.0002, 0.0003, 0.0005, 0.001, 0.002],
        }
    }
}

impl ParamGrid {
    pub fn custom(tp: Vec<f64>, sl: Vec<f64>) -> Self {
        ParamGrid { tp, sl }
    }

    /// Small grid for quick checks
    pub fn quick() -> Self {
        ParamGrid {
            tp: vec![0.0005, 0.001, 0.002],
            sl: vec![0.0005, 0.001],
        }
    }

    /// Get total number of grid combinations
    pub fn total_combinations(&self) -> usize {
        self.tp.len() * self.sl.len()
    }

    /// Every (tp, sl) pair, tp-major, in iteration order
    pub fn cells(&self) -> Vec<(f64, f64)> {
        self.tp
            .iter()
            .copied()
            .cartesian_product(self.sl.iter().copied())
            .collect()
    }

    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.tp.is_empty() {
            return Err(BacktestError::invalid("grid.tp", "must contain at least one value"));
        }
        if self.sl.is_empty() {
            return Err(BacktestError::invalid("grid.sl", "must contain at least one value"));
        }
        for &v in &self.tp {
            require_positive("grid.tp", v)?;
        }
        for &v in &self.sl {
            require_positive("grid.sl", v)?;
        }
        Ok(())
    }
}

/// Parse a comma-separated list of thresholds.
///
/// Plain numbers are fractions (`0.001`); a `%` suffix means percent
/// (`0.1%` == `0.001`). Returns `None` if any entry fails to parse or the
/// list is empty.
pub fn parse_value_list(s: &str) -> Option<Vec<f64>> {
    let values: Option<Vec<f64>> = s
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| match v.strip_suffix('%') {
            Some(pct) => pct.trim().parse::<f64>().ok().map(|p| p / 100.0),
            None => v.parse::<f64>().ok(),
        })
        .collect();

    values.filter(|v| !v.is_empty())
}

/// Format a threshold as a percentage for display
pub fn format_pct(value: f64) -> String {
    format!("{:.3}%", value * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_has_42_cells() {
        let grid = ParamGrid::default();
        assert_eq!(grid.total_combinations(), 42);
        assert_eq!(grid.cells().len(), 42);
        assert!(grid.validate().is_ok());
    }

    #[test]
    fn test_cells_are_tp_major() {
        let grid = ParamGrid::custom(vec![1.0, 2.0], vec![0.5, 0.25]);
        assert_eq!(
            grid.cells(),
            vec![(1.0, 0.5), (1.0, 0.25), (2.0, 0.5), (2.0, 0.25)]
        );
    }

    #[test]
    fn test_validate_rejects_empty_and_non_positive() {
        assert!(ParamGrid::custom(vec![], vec![0.001]).validate().is_err());
        assert!(ParamGrid::custom(vec![0.001], vec![]).validate().is_err());
        assert!(ParamGrid::custom(vec![0.001, -0.001], vec![0.001]).validate().is_err());
        assert!(ParamGrid::custom(vec![0.001], vec![0.0]).validate().is_err());
    }

    #[test]
    fn test_parse_value_list() {
        assert_eq!(parse_value_list("0.001, 0.002"), Some(vec![0.001, 0.002]));
        let pct = parse_value_list("0.1%,0.2 %").unwrap();
        assert!((pct[0] - 0.001).abs() < 1e-15);
        assert!((pct[1] - 0.002).abs() < 1e-15);
        assert_eq!(parse_value_list("0.001,abc"), None);
        assert_eq!(parse_value_list(" , "), None);
    }

    #[test]
    fn test_format_pct() {
        assert_eq!(format_pct(0.001), "0.100%");
    }
}

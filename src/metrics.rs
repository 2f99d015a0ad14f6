//! Magic Formula ratios
//!
//! Both functions are pure: they only divide, and report a domain error when
//! the denominator makes the ratio meaningless.

use thiserror::Error;

/// Ratio is undefined for the given inputs
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum MetricError {
    #[error("enterprise value must be positive, got {0}")]
    NonPositiveEnterpriseValue(f64),

    #[error("net fixed assets plus working capital must be positive, got {0}")]
    NonPositiveCapital(f64),
}

/// EBIT / enterprise value
pub fn earnings_yield(ebit: f64, enterprise_value: f64) -> Result<f64, MetricError> {
    if enterprise_value <= 0.0 {
        return Err(MetricError::NonPositiveEnterpriseValue(enterprise_value));
    }
    Ok(ebit / enterprise_value)
}

/// EBIT / (net fixed assets + working capital)
pub fn return_on_capital(
    ebit: f64,
    net_fixed_assets: f64,
    working_capital: f64,
) -> Result<f64, MetricError> {
    let capital = net_fixed_assets + working_capital;
    if capital <= 0.0 {
        return Err(MetricError::NonPositiveCapital(capital));
    }
    Ok(ebit / capital)
}

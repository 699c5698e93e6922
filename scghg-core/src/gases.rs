//! Greenhouse gas identifiers
//!
//! The valuation engine names gases with its own identifiers (for example
//! `CO2_Fossil`). Outputs use short display symbols instead. The mapping is a
//! fixed table and is only applied when results are written; everything
//! upstream works with engine identifiers.

use crate::errors::{ScghgError, ScghgResult};

/// Engine identifier and display symbol for each supported gas.
pub const GAS_SYMBOLS: &[(&str, &str)] = &[("CO2_Fossil", "CO2"), ("CH4", "CH4"), ("N2O", "N2O")];

/// Gases valued by default
pub fn default_gases() -> Vec<String> {
    GAS_SYMBOLS.iter().map(|(id, _)| id.to_string()).collect()
}

/// Display symbol for an engine gas identifier.
///
/// Unknown identifiers are an error rather than being passed through.
pub fn display_symbol(engine_id: &str) -> ScghgResult<&'static str> {
    GAS_SYMBOLS
        .iter()
        .find(|(id, _)| *id == engine_id)
        .map(|(_, symbol)| *symbol)
        .ok_or_else(|| {
            ScghgError::Configuration(format!(
                "unknown gas identifier {:?}; known gases are {:?}",
                engine_id,
                GAS_SYMBOLS.iter().map(|(id, _)| *id).collect::<Vec<_>>()
            ))
        })
}

/// Engine identifier for a display symbol.
pub fn engine_id(symbol: &str) -> ScghgResult<&'static str> {
    GAS_SYMBOLS
        .iter()
        .find(|(_, s)| *s == symbol)
        .map(|(id, _)| *id)
        .ok_or_else(|| ScghgError::Configuration(format!("unknown gas symbol {:?}", symbol)))
}

/// Parse a gas list written either as a bracketed list (`['CO2_Fossil', 'CH4']`)
/// or as comma separated identifiers.
pub fn parse_gas_list(raw: &str) -> Vec<String> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|g| g.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|g| !g.is_empty())
        .collect()
}

//! Sector identifiers and their display names
//!
//! Sector identifiers carry version suffixes (`mortality_v1`,
//! `CAMEL_m1_c0.20`). Outputs use a short name: composite identifiers are
//! looked up in a display-name table, everything else is cut at the first
//! underscore.

use indexmap::IndexMap;

/// Suffix marking a domestic (US-only) sector identifier
pub const DOMESTIC_SUFFIX: &str = "_USA";

/// Display names for composite sector identifiers
pub fn default_display_names() -> IndexMap<String, String> {
    IndexMap::from([("CAMEL_m1_c0.20".to_string(), "combined".to_string())])
}

/// Short display name for `sector`.
///
/// A trailing domestic suffix is ignored.
pub fn short_name(sector: &str, display_names: &IndexMap<String, String>) -> String {
    let base = base_sector(sector);
    if let Some(name) = display_names.get(base) {
        return name.clone();
    }
    base.split('_').next().unwrap_or(base).to_string()
}

/// The sector identifier without any domestic suffix
pub fn base_sector(sector: &str) -> &str {
    sector.strip_suffix(DOMESTIC_SUFFIX).unwrap_or(sector)
}

/// The domestic variant of a sector identifier
pub fn domestic_sector(sector: &str) -> String {
    format!("{}{}", base_sector(sector), DOMESTIC_SUFFIX)
}

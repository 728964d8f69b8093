//! Station name normalisation.

/// Canonical form of a station name for lookups.
///
/// Lowercases, drops apostrophes, turns every other run of
/// non-alphanumeric characters into a single space and trims.
///
/// ```
/// use rail_store::stations::normalize_name;
///
/// assert_eq!(normalize_name("London King's Cross"), "london kings cross");
/// assert_eq!(normalize_name("  Bristol Temple-Meads "), "bristol temple meads");
/// ```
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut gap = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if gap && !out.is_empty() {
                out.push(' ');
            }
            gap = false;
            out.extend(c.to_lowercase());
        } else if c != '\'' && c != '\u{2019}' {
            gap = true;
        }
    }
    out
}

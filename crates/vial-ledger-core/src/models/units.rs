//! Unit spelling canonicalization.
//!
//! Only spelling and case are normalized (`cc` → `mL`, `MG` → `mg`). Amounts
//! are never converted between magnitudes, so `mcg` and `mg` stay distinct.

/// Canonical spelling for a dose unit.
pub fn canonical_unit(unit: &str) -> String {
    let trimmed = unit.trim();
    let lower = trimmed.to_lowercase();
    let canonical = match lower.as_str() {
        "ml" | "cc" | "milliliter" | "milliliters" | "millilitre" => "mL",
        "l" | "liter" | "litre" => "L",
        "mg" | "milligram" | "milligrams" => "mg",
        "g" | "gm" | "gram" | "grams" => "g",
        "mcg" | "µg" | "ug" | "microgram" | "micrograms" => "mcg",
        "u" | "unit" | "units" | "iu" => "units",
        "meq" => "mEq",
        _ => return lower,
    };
    canonical.to_string()
}

/// Whether two unit spellings denote the same unit.
pub fn units_match(a: &str, b: &str) -> bool {
    canonical_unit(a) == canonical_unit(b)
}

use unicode_normalization::UnicodeNormalization;

/// Width of a district administrative code (UBIGEO).
pub const ADMIN_CODE_WIDTH: usize = 6;

/// Zero-pads an administrative code to [`ADMIN_CODE_WIDTH`] characters.
///
/// Codes read from numeric columns lose their leading zeros (`10101`), so
/// both tables go through this before any join. Longer codes are kept as-is.
pub fn pad_admin_code(raw: &str) -> String {
    let code = raw.trim();
    if code.len() >= ADMIN_CODE_WIDTH {
        return code.to_string();
    }
    format!("{:0>width$}", code, width = ADMIN_CODE_WIDTH)
}

/// Uppercases a free-text name and strips diacritics.
///
/// Letters are decomposed (NFKD) and everything outside ASCII is dropped, so
/// `Niño` becomes `NINO`. The output is ASCII, which makes this idempotent.
pub fn normalize_name(raw: &str) -> String {
    raw.to_uppercase().nfkd().filter(char::is_ascii).collect()
}

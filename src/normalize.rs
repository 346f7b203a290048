//! Name and contact cleaning shared by every ingestion path.
//!
//! `normalize_name` is the single join key between the primary workbook, the
//! raw workbook sheets and the member registry. Every lookup, insert and
//! comparison goes through it.

use regex::Regex;
use std::sync::OnceLock;

/// Placeholder stored for a roster member without a usable phone number.
pub const MISSING_PHONE: &str = "미입력";
/// Placeholder stored for a roster row without a usable name.
pub const MISSING_NAME: &str = "이름미상";

/// Trims the value and removes every whitespace character inside it.
/// Returns `None` for an absent value or one that is blank after cleaning.
pub fn normalize_name(raw: Option<&str>) -> Option<String> {
    let cleaned: String = raw?.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Display-name cleaning for the member roster: trim only.
pub fn clean_display_name(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => MISSING_NAME.to_string(),
    }
}

fn phone_noise() -> &'static Regex {
    static PHONE_NOISE: OnceLock<Regex> = OnceLock::new();
    PHONE_NOISE.get_or_init(|| Regex::new(r"[-\s]").expect("static phone regex"))
}

/// Strips dashes and whitespace from a phone number.
pub fn clean_phone(raw: Option<&str>) -> String {
    let cleaned = match raw {
        Some(phone) => phone_noise().replace_all(phone.trim(), "").into_owned(),
        None => String::new(),
    };
    if cleaned.is_empty() {
        MISSING_PHONE.to_string()
    } else {
        cleaned
    }
}

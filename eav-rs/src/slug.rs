//! Attribute slug generation and validation.
//!
//! A slug is the identifier an attribute is addressed by in proxies and
//! query keys (`eav__<slug>`), so it must be a lower-case identifier that
//! cannot be confused with the `__` path separator.

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};

use eav_rs_core::ValidationError;

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));
static VALID_SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9]*(_[a-z0-9]+)*$").expect("valid regex"));

const PREFIX: &str = "attr_";
const DIGEST_LEN: usize = 8;
const RANDOM_LEN: usize = 8;
const RANDOM_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Derives a slug from an attribute name.
///
/// The name is lower-cased and every run of characters outside `[a-z0-9]`
/// becomes a single `_`. A name starting with a digit is prefixed with
/// `attr_`. When non-ASCII letters or digits had to be dropped, a short
/// digest of the full name is appended so that names differing only in
/// those characters still get distinct slugs. A name with nothing usable
/// left yields `rand_` followed by random characters.
///
/// # Examples
///
/// ```
/// use eav_rs::slug::generate_slug;
///
/// assert_eq!(generate_slug("Date of Birth", 50), "date_of_birth");
/// assert_eq!(generate_slug("Pregnant?", 50), "pregnant");
/// assert_eq!(generate_slug("2nd opinion", 50), "attr_2nd_opinion");
/// assert!(generate_slug("???", 50).starts_with("rand_"));
/// ```
pub fn generate_slug(name: &str, max_length: usize) -> String {
    let lowered = name.to_lowercase();
    let dropped = lowered.chars().any(|c| !c.is_ascii() && c.is_alphanumeric());
    let ascii: String = lowered.chars().filter(char::is_ascii).collect();

    let mut base = SEPARATORS
        .replace_all(&ascii, "_")
        .trim_matches('_')
        .to_string();
    if base.starts_with(|c: char| c.is_ascii_digit()) {
        base.insert_str(0, PREFIX);
    }

    let slug = if dropped {
        let digest = name_digest(name);
        let head = truncate(&base, max_length.saturating_sub(DIGEST_LEN + 1));
        if head.is_empty() {
            format!("{PREFIX}{digest}")
        } else {
            format!("{head}_{digest}")
        }
    } else if base.is_empty() {
        random_slug()
    } else {
        base
    };
    truncate(&slug, max_length)
}

/// Checks that `slug` is a valid attribute slug of at most `max_length`
/// characters.
///
/// # Errors
///
/// Returns a [`ValidationError`] with code `invalid_slug` or `max_length`.
pub fn validate_slug(slug: &str, max_length: usize) -> Result<(), ValidationError> {
    if !VALID_SLUG.is_match(slug) {
        return Err(ValidationError::new(
            format!(
                "'{slug}' is not a valid slug. Slugs must be all lower case, start with a \
                 letter, and contain only letters, numbers, or single underscores."
            ),
            "invalid_slug",
        )
        .with_param("value", slug));
    }
    if slug.len() > max_length {
        return Err(ValidationError::new(
            format!("Ensure this value has at most {max_length} characters (it has {}).", slug.len()),
            "max_length",
        )
        .with_param("limit_value", max_length.to_string()));
    }
    Ok(())
}

fn name_digest(name: &str) -> String {
    let hash = Sha256::digest(name.as_bytes());
    hash.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
        .chars()
        .take(DIGEST_LEN)
        .collect()
}

fn random_slug() -> String {
    let mut rng = rand::thread_rng();
    let tail: String = (0..RANDOM_LEN)
        .map(|_| char::from(RANDOM_CHARS[rng.gen_range(0..RANDOM_CHARS.len())]))
        .collect();
    format!("rand_{tail}")
}

/// Cuts an ASCII slug to `max` characters without leaving a trailing `_`.
fn truncate(slug: &str, max: usize) -> String {
    let cut = if slug.len() > max { &slug[..max] } else { slug };
    cut.trim_end_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names() {
        assert_eq!(generate_slug("Age", 50), "age");
        assert_eq!(generate_slug("Has fever?", 50), "has_fever");
        assert_eq!(generate_slug("  blood--type  ", 50), "blood_type");
        assert_eq!(generate_slug("ECG_result", 50), "ecg_result");
    }

    #[test]
    fn test_digit_prefix() {
        assert_eq!(generate_slug("1st visit", 50), "attr_1st_visit");
    }

    #[test]
    fn test_dropped_characters_add_digest() {
        let a = generate_slug("Größe", 50);
        let b = generate_slug("Grüße", 50);
        assert!(a.starts_with("gr"));
        assert_ne!(a, b);
        assert!(validate_slug(&a, 50).is_ok());
        assert_eq!(generate_slug("日本", 50).len(), PREFIX.len() + DIGEST_LEN);
    }

    #[test]
    fn test_random_fallback() {
        let slug = generate_slug("!!!", 50);
        assert!(slug.starts_with("rand_"));
        assert_eq!(slug.len(), "rand_".len() + RANDOM_LEN);
        assert!(validate_slug(&slug, 50).is_ok());
    }

    #[test]
    fn test_truncation() {
        let slug = generate_slug("a very long attribute name indeed", 12);
        assert_eq!(slug, "a_very_long");
        let slug = generate_slug("ünïcode attribute with a long name", 20);
        assert!(slug.len() <= 20);
        assert!(validate_slug(&slug, 20).is_ok());
    }

    #[test]
    fn test_validate_slug() {
        assert!(validate_slug("color", 50).is_ok());
        assert!(validate_slug("blood_type2", 50).is_ok());
        for bad in ["Color", "1st", "_st", "a__b", "trailing_", "with space", ""] {
            let err = validate_slug(bad, 50).unwrap_err();
            assert_eq!(err.code, "invalid_slug", "{bad}");
        }
        assert_eq!(validate_slug("abcdef", 5).unwrap_err().code, "max_length");
    }
}

//! Slug derivation and validation.
//!
//! Slugs are trimmed, non-empty identifiers composed of lowercase ASCII
//! letters, digits, and single hyphens.

/// Derive a slug from a display name: `"The Forest Hiker"` → `"the-forest-hiker"`.
///
/// Runs of anything other than ASCII letters and digits collapse to a single
/// hyphen; leading and trailing hyphens are dropped.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_hyphen = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Return `true` when `value` is a valid slug.
pub fn is_valid_slug(value: &str) -> bool {
    is_trimmed_non_empty(value) && has_allowed_slug_chars(value) && !value.contains("--")
}

fn is_trimmed_non_empty(value: &str) -> bool {
    !value.is_empty() && value.trim_matches(|c: char| c.is_whitespace() || c == '-') == value
}

fn has_allowed_slug_chars(value: &str) -> bool {
    value
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
}

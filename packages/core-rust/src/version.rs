//! Version of the built-in API and versioned path construction.

/// Version prefix under which the built-in API (events, operations) is mounted.
pub const API_VERSION: &str = "1.0";

/// Joins path segments under the built-in API version prefix.
///
/// `path(&["operations", id])` yields `/1.0/operations/<id>`.
#[must_use]
pub fn path(parts: &[&str]) -> String {
    versioned_path(API_VERSION, parts)
}

/// Joins path segments under an arbitrary version prefix.
#[must_use]
pub fn versioned_path(version: &str, parts: &[&str]) -> String {
    let mut out = String::from("/");
    out.push_str(version);
    for part in parts {
        let trimmed = part.trim_matches('/');
        if trimmed.is_empty() {
            continue;
        }
        out.push('/');
        out.push_str(trimmed);
    }
    out
}

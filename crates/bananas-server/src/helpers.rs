//! Small helpers for CDN-facing names.

use bananas_index::ContentEntry;

/// Keep `[A-Za-z0-9.]`, coalesce runs of anything else into a single `_`
/// and trim leading and trailing `.` and `_`.
fn safe_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for letter in name.chars() {
        if letter.is_ascii_alphanumeric() || letter == '.' {
            out.push(letter);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches(['.', '_']).to_string()
}

/// The CDN filename of an entry (without the `.tar.gz` suffix).
pub fn safe_filename(entry: &ContentEntry) -> String {
    format!(
        "{}-{}-{}",
        entry.unique_id.to_hex(),
        safe_name(&entry.name),
        safe_name(&entry.version)
    )
}

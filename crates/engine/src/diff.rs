//! Text diffing between stored versions.

use similar::TextDiff;

/// Unified diff with 3 lines of context.
pub fn unified_diff(old: &str, new: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header("previous", "current")
        .to_string()
}

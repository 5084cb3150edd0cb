//! Unified Diff Generation
//!
//! Produces hunk-level unified diffs over newline-separated segments.
//! Splitting on `\n` (keeping the possibly-empty final segment) makes
//! text -> segments -> text an exact round trip, so patches survive files
//! with or without a trailing newline.

use similar::{ChangeTag, TextDiff};

/// Context lines emitted around each change.
const CONTEXT: usize = 3;

/// Compute a unified-diff patch turning `old` into `new`.
///
/// Deterministic for identical inputs. Returns an empty string when the
/// texts are equal. The output carries `@@` hunk headers only (no file
/// headers) since the owning [`crate::types::FileChange`] names the target.
pub fn diff(old: &str, new: &str) -> String {
    let old_segs: Vec<&str> = old.split('\n').collect();
    let new_segs: Vec<&str> = new.split('\n').collect();

    let text_diff = TextDiff::from_slices(&old_segs, &new_segs);

    let mut out = String::new();
    for group in text_diff.grouped_ops(CONTEXT) {
        // Ranges covered by this group on each side.
        let old_start = group.first().map(|op| op.old_range().start).unwrap_or(0);
        let old_end = group.last().map(|op| op.old_range().end).unwrap_or(0);
        let new_start = group.first().map(|op| op.new_range().start).unwrap_or(0);
        let new_end = group.last().map(|op| op.new_range().end).unwrap_or(0);

        let old_len = old_end - old_start;
        let new_len = new_end - new_start;

        // Unified-diff convention: 1-based starts; a zero-length range
        // names the line before it.
        let old_disp = if old_len == 0 { old_start } else { old_start + 1 };
        let new_disp = if new_len == 0 { new_start } else { new_start + 1 };

        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            old_disp, old_len, new_disp, new_len
        ));

        for op in &group {
            for change in text_diff.iter_changes(op) {
                let prefix = match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                };
                out.push(prefix);
                out.push_str(change.value());
                out.push('\n');
            }
        }
    }

    out
}

//! Strict Patch Application
//!
//! Parses unified-diff hunks and replays them against a text. Context and
//! deletion lines must match the target at the hunk's stated position; any
//! drift fails with a typed error instead of a best-effort guess.

use thiserror::Error;

/// Failure to apply a patch. `ContextMismatch` means the target file has
/// drifted since the patch was computed.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("malformed patch: {0}")]
    Malformed(String),
    #[error("context mismatch: {0}")]
    ContextMismatch(String),
}

// ---------------------------------------------------------------------------
// Hunk model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

#[derive(Debug, Clone)]
struct Hunk {
    /// 0-based index into the old text's segments where this hunk starts.
    old_start: usize,
    old_len: usize,
    new_len: usize,
    lines: Vec<HunkLine>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse `@@ -a,b +c,d @@` into (old_start_0based, old_len, new_len).
fn parse_header(line: &str) -> Result<(usize, usize, usize), PatchError> {
    let malformed = || PatchError::Malformed(format!("bad hunk header: {line}"));

    let body = line
        .strip_prefix("@@ ")
        .and_then(|rest| rest.find(" @@").map(|i| &rest[..i]))
        .ok_or_else(malformed)?;

    let mut parts = body.split(' ');
    let old_part = parts.next().ok_or_else(malformed)?;
    let new_part = parts.next().ok_or_else(malformed)?;

    let parse_range = |part: &str, sign: char| -> Result<(usize, usize), PatchError> {
        let rest = part
            .strip_prefix(sign)
            .ok_or_else(|| PatchError::Malformed(format!("bad range in header: {line}")))?;
        let (start_s, len_s) = match rest.split_once(',') {
            Some((s, l)) => (s, l),
            None => (rest, "1"),
        };
        let start: usize = start_s
            .parse()
            .map_err(|_| PatchError::Malformed(format!("bad range in header: {line}")))?;
        let len: usize = len_s
            .parse()
            .map_err(|_| PatchError::Malformed(format!("bad range in header: {line}")))?;
        Ok((start, len))
    };

    let (old_disp, old_len) = parse_range(old_part, '-')?;
    let (_, new_len) = parse_range(new_part, '+')?;

    // A zero-length range names the line before it; otherwise starts are
    // 1-based.
    let old_start = if old_len == 0 {
        old_disp
    } else {
        old_disp
            .checked_sub(1)
            .ok_or_else(|| PatchError::Malformed(format!("zero start in header: {line}")))?
    };

    Ok((old_start, old_len, new_len))
}

fn parse(patch: &str) -> Result<Vec<Hunk>, PatchError> {
    let mut hunks: Vec<Hunk> = Vec::new();

    for raw in patch.lines() {
        // File headers are tolerated before the first hunk only. Inside a
        // hunk body, "--- x" is a deletion of the line "-- x" (and
        // "+++ x" an insertion of "++ x"), never a header.
        if hunks.is_empty() && (raw.starts_with("--- ") || raw.starts_with("+++ ")) {
            continue;
        }
        if raw.starts_with("@@") {
            let (old_start, old_len, new_len) = parse_header(raw)?;
            hunks.push(Hunk {
                old_start,
                old_len,
                new_len,
                lines: Vec::new(),
            });
            continue;
        }
        if raw.starts_with('\\') {
            // "\ No newline at end of file" -- the segment model already
            // encodes trailing-newline state, so the marker carries no
            // extra information here.
            continue;
        }

        let hunk = hunks
            .last_mut()
            .ok_or_else(|| PatchError::Malformed("patch line before first hunk header".into()))?;

        match raw.as_bytes().first() {
            Some(b' ') => hunk.lines.push(HunkLine::Context(raw[1..].to_string())),
            Some(b'-') => hunk.lines.push(HunkLine::Remove(raw[1..].to_string())),
            Some(b'+') => hunk.lines.push(HunkLine::Add(raw[1..].to_string())),
            _ => {
                return Err(PatchError::Malformed(format!(
                    "unrecognized patch line: {raw:?}"
                )))
            }
        }
    }

    // Cross-check hunk line counts against the header.
    for hunk in &hunks {
        let old_count = hunk
            .lines
            .iter()
            .filter(|l| matches!(l, HunkLine::Context(_) | HunkLine::Remove(_)))
            .count();
        let new_count = hunk
            .lines
            .iter()
            .filter(|l| matches!(l, HunkLine::Context(_) | HunkLine::Add(_)))
            .count();
        if old_count != hunk.old_len || new_count != hunk.new_len {
            return Err(PatchError::Malformed(format!(
                "hunk at -{} declares {}/{} lines but carries {}/{}",
                hunk.old_start + 1,
                hunk.old_len,
                hunk.new_len,
                old_count,
                new_count
            )));
        }
    }

    Ok(hunks)
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Apply `patch` to `original`, returning the new content.
///
/// Never mutates in place. Fails with [`PatchError::ContextMismatch`] if any
/// hunk's context or deletion lines differ from the target at the expected
/// offset, and with [`PatchError::Malformed`] if the patch itself cannot be
/// parsed. An empty patch returns the original unchanged.
pub fn apply(original: &str, patch: &str) -> Result<String, PatchError> {
    if patch.is_empty() {
        return Ok(original.to_string());
    }

    let hunks = parse(patch)?;
    let old: Vec<&str> = original.split('\n').collect();

    let mut out: Vec<String> = Vec::with_capacity(old.len());
    let mut cursor = 0usize;

    for hunk in &hunks {
        if hunk.old_start < cursor {
            return Err(PatchError::Malformed(format!(
                "hunk at -{} overlaps the previous hunk",
                hunk.old_start + 1
            )));
        }
        if hunk.old_start > old.len() {
            return Err(PatchError::ContextMismatch(format!(
                "hunk at -{} starts beyond end of file ({} lines)",
                hunk.old_start + 1,
                old.len()
            )));
        }

        // Untouched span before the hunk.
        out.extend(old[cursor..hunk.old_start].iter().map(|s| s.to_string()));

        let mut idx = hunk.old_start;
        for line in &hunk.lines {
            match line {
                HunkLine::Context(expected) => {
                    match old.get(idx) {
                        Some(actual) if *actual == expected => {}
                        Some(actual) => {
                            return Err(PatchError::ContextMismatch(format!(
                                "line {}: expected {:?}, found {:?}",
                                idx + 1,
                                expected,
                                actual
                            )))
                        }
                        None => {
                            return Err(PatchError::ContextMismatch(format!(
                                "line {}: expected {:?}, found end of file",
                                idx + 1,
                                expected
                            )))
                        }
                    }
                    out.push(expected.clone());
                    idx += 1;
                }
                HunkLine::Remove(expected) => {
                    match old.get(idx) {
                        Some(actual) if *actual == expected => {}
                        Some(actual) => {
                            return Err(PatchError::ContextMismatch(format!(
                                "line {}: cannot remove {:?}, found {:?}",
                                idx + 1,
                                expected,
                                actual
                            )))
                        }
                        None => {
                            return Err(PatchError::ContextMismatch(format!(
                                "line {}: cannot remove {:?} past end of file",
                                idx + 1,
                                expected
                            )))
                        }
                    }
                    idx += 1;
                }
                HunkLine::Add(text) => {
                    out.push(text.clone());
                }
            }
        }
        cursor = idx;
    }

    // Untouched tail.
    out.extend(old[cursor..].iter().map(|s| s.to_string()));

    Ok(out.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::diff;

    #[test]
    fn test_round_trip() {
        let cases = [
            ("a\nb\nc\n", "a\nx\nc\n"),
            ("", "hello\n"),
            ("hello\n", ""),
            ("one\ntwo\nthree", "one\ntwo\nthree\nfour"),
            ("a\nb", "a\nb\n"),
            ("old", "new"),
        ];
        for (old, new) in cases {
            let patch = diff(old, new);
            assert_eq!(apply(old, &patch).unwrap(), new, "forward {old:?} -> {new:?}");
            let inverse = diff(new, old);
            assert_eq!(apply(new, &inverse).unwrap(), old, "inverse {new:?} -> {old:?}");
        }
    }

    #[test]
    fn test_empty_patch_is_identity() {
        assert_eq!(apply("x\ny\n", "").unwrap(), "x\ny\n");
    }

    #[test]
    fn test_drifted_target_fails_context() {
        let patch = diff("a\nb\nc\n", "a\nB\nc\n");
        let err = apply("a\nDRIFTED\nc\n", &patch).unwrap_err();
        assert!(matches!(err, PatchError::ContextMismatch(_)));
    }

    #[test]
    fn test_truncated_target_fails_context() {
        let patch = diff("a\nb\nc\nd\n", "a\nb\nc\nD\n");
        let err = apply("a\nb\n", &patch).unwrap_err();
        assert!(matches!(err, PatchError::ContextMismatch(_)));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let err = apply("a\n", "@@ not a header @@\n x\n").unwrap_err();
        assert!(matches!(err, PatchError::Malformed(_)));
    }

    #[test]
    fn test_line_before_header_rejected() {
        let err = apply("a\n", " stray context\n").unwrap_err();
        assert!(matches!(err, PatchError::Malformed(_)));
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let patch = "@@ -1,2 +1,1 @@\n-a\n+b\n";
        let err = apply("a\nx\n", patch).unwrap_err();
        assert!(matches!(err, PatchError::Malformed(_)));
    }

    #[test]
    fn test_round_trip_of_dash_and_plus_prefixed_lines() {
        // A deleted "-- ..." line serializes as "--- ..." and an added
        // "++ ..." line as "+++ ..."; neither is a file header.
        let old = "-- users by id\nselect 1;\n";
        let new = "select 2;\n";
        let patch = diff(old, new);
        assert_eq!(apply(old, &patch).unwrap(), new);
        let inverse = diff(new, old);
        assert_eq!(apply(new, &inverse).unwrap(), old);

        let old = "a\n";
        let new = "++ count\na\n";
        let patch = diff(old, new);
        assert_eq!(apply(old, &patch).unwrap(), new);
    }

    #[test]
    fn test_file_headers_tolerated() {
        let inner = diff("a\nb\n", "a\nc\n");
        let patch = format!("--- a/f.rs\n+++ b/f.rs\n{inner}");
        assert_eq!(apply("a\nb\n", &patch).unwrap(), "a\nc\n");
    }

    #[test]
    fn test_multi_hunk_apply() {
        let old: String = (0..40).map(|i| format!("line{i}\n")).collect();
        let new = old.replace("line2\n", "LINE2\n").replace("line35\n", "LINE35\n");
        let patch = diff(&old, &new);
        assert_eq!(apply(&old, &patch).unwrap(), new);
    }

    #[test]
    fn test_never_best_effort_on_offset_drift() {
        // Same line exists one position later; strict apply must not scan.
        let patch = "@@ -2,1 +2,1 @@\n-b\n+B\n";
        let err = apply("x\na\nb\n", patch).unwrap_err();
        assert!(matches!(err, PatchError::ContextMismatch(_)));
    }
}

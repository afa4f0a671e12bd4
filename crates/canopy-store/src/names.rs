//! Branch naming rules.
//!
//! A branch name is one or more `/`-separated segments. Segments are
//! ASCII: letters, digits, `-`, `_`, and `.`, and must begin with a
//! letter or digit. The segments `.` and `..` are reserved, and whole
//! names are capped at [`MAX_BRANCH_NAME_LEN`] bytes. Everything else
//! (spaces, punctuation, non-ASCII) is rejected up front rather than
//! leaking into wire headers and log lines.

use crate::error::{StoreError, StoreResult};

/// Longest accepted branch name, in bytes.
pub const MAX_BRANCH_NAME_LEN: usize = 255;

fn name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Validate a branch name, returning `Ok(())` if acceptable.
pub fn validate_branch_name(name: &str) -> StoreResult<()> {
    let fail = |reason: String| {
        Err(StoreError::InvalidBranchName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return fail("name is empty".into());
    }
    if name.len() > MAX_BRANCH_NAME_LEN {
        return fail(format!("name exceeds {MAX_BRANCH_NAME_LEN} bytes"));
    }
    for segment in name.split('/') {
        if segment.is_empty() {
            return fail("empty segment (leading, trailing, or doubled '/')".into());
        }
        if segment == "." || segment == ".." {
            return fail(format!("segment {segment:?} is reserved"));
        }
        if !segment.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return fail("segments must begin with an ASCII letter or digit".into());
        }
        if let Some(bad) = segment.chars().find(|c| !name_char(*c)) {
            return fail(format!("character {bad:?} is not allowed"));
        }
    }

    Ok(())
}

//! Unified-diff parsing down to line ranges.
//!
//! Only headers are read. Hunk bodies are skipped; the coverage engine works
//! purely on `@@ -a,b +c,d @@` ranges.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::types::{FileEntry, HunkRange};

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@@ -(\d+),?(\d*) \+(\d+),?(\d*) @@").expect("hunk header regex is valid")
});

/// Extracts every hunk header in `diff`.
///
/// A missing count means one line. An explicit zero count (pure insertion or
/// deletion point) is normalized to one. Headers with unparsable numbers are
/// skipped with a warning.
pub fn parse_hunk_ranges(diff: &str) -> Vec<HunkRange> {
    HUNK_HEADER
        .captures_iter(diff)
        .filter_map(|caps| {
            let field = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or("");
            match parse_header_fields(field(1), field(2), field(3), field(4)) {
                Ok(range) => Some(range),
                Err(err) => {
                    tracing::warn!(header = %field(0), error = %err, "malformed hunk header");
                    None
                }
            }
        })
        .collect()
}

fn parse_header_fields(
    old_start: &str,
    old_count: &str,
    new_start: &str,
    new_count: &str,
) -> std::result::Result<HunkRange, std::num::ParseIntError> {
    let count = |s: &str| if s.is_empty() { Ok(1) } else { s.parse::<u32>() };
    Ok(HunkRange::new(
        old_start.parse()?,
        count(old_count)?,
        new_start.parse()?,
        count(new_count)?,
    ))
}

/// Splits raw `git diff` output into per-file entries.
///
/// A file starts at its `diff --git` line. Its path comes from the `+++ b/`
/// line, or the `--- a/` line for a deletion, and only falls back to the
/// `diff --git` header when neither is present (mode-only or binary
/// changes). Git's C-style quoted paths are unquoted. An entry whose path
/// cannot be recovered is dropped with a warning: a wrong path would look
/// unchanged to the tree diff and be credited as covered. LF and CRLF line
/// endings are both accepted.
///
/// # Errors
///
/// Returns [`Error::EmptyDiff`] if `diff` contains no text.
pub fn parse_unified_diff(diff: &str) -> Result<Vec<FileEntry>> {
    if diff.trim().is_empty() {
        return Err(Error::EmptyDiff);
    }

    let mut files: Vec<FileEntry> = Vec::new();
    let mut current: Option<PendingFile> = None;
    for line in diff.lines().map(|l| l.trim_end_matches('\r')) {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some(done) = current.take() {
                files.extend(done.finish());
            }
            current = Some(PendingFile::new(header_path(rest)));
            continue;
        }
        let Some(file) = current.as_mut() else {
            continue;
        };
        if line.starts_with("@@") {
            file.in_header = false;
            file.hunks.extend(parse_hunk_ranges(line));
        } else if file.in_header {
            if let Some(path) = line.strip_prefix("--- ") {
                file.old_path = side_path(path, "a/");
            } else if let Some(path) = line.strip_prefix("+++ ") {
                file.new_path = side_path(path, "b/");
            }
        }
    }
    if let Some(done) = current.take() {
        files.extend(done.finish());
    }
    Ok(files)
}

/// One file's header fields and hunks while its section is being read.
struct PendingFile {
    header_path: Option<String>,
    old_path: Option<String>,
    new_path: Option<String>,
    /// True until the first hunk header; `---`/`+++` lines after that are
    /// hunk content.
    in_header: bool,
    hunks: Vec<HunkRange>,
}

impl PendingFile {
    fn new(header_path: Option<String>) -> Self {
        Self { header_path, old_path: None, new_path: None, in_header: true, hunks: Vec::new() }
    }

    fn finish(self) -> Option<FileEntry> {
        match self.new_path.or(self.old_path).or(self.header_path) {
            Some(path) => Some(FileEntry::new(path, self.hunks)),
            None => {
                tracing::warn!(hunks = self.hunks.len(), "dropping diff entry with no recoverable path");
                None
            }
        }
    }
}

/// Path from a `---`/`+++` line, without its `a/`/`b/` prefix.
///
/// `None` for `/dev/null` (the file does not exist on that side) and for
/// anything that cannot be decoded.
fn side_path(raw: &str, prefix: &str) -> Option<String> {
    let path = if raw.starts_with('"') {
        unquote(raw)?
    } else {
        // Git appends a tab after names that contain spaces.
        raw.split('\t').next().unwrap_or_default().to_owned()
    };
    if path == "/dev/null" {
        return None;
    }
    path.strip_prefix(prefix).filter(|p| !p.is_empty()).map(str::to_owned)
}

/// New-side path from the `a/<old> b/<new>` part of a `diff --git` header.
///
/// Unquoted headers are ambiguous when paths contain spaces, so only the
/// forms git actually emits are accepted: a quoted `b/` side, or identical
/// old and new paths.
fn header_path(header: &str) -> Option<String> {
    if header.ends_with('"') {
        let start = header.rfind(" \"").map(|i| i + 1)?;
        return unquote(&header[start..])?
            .strip_prefix("b/")
            .filter(|p| !p.is_empty())
            .map(str::to_owned);
    }
    let rest = header.strip_prefix("a/")?;
    // "<p> b/<p>": the path is exactly half of what remains after " b/".
    let len = rest.len().checked_sub(3)? / 2;
    let (old, new) = (rest.get(..len)?, rest.get(len..)?);
    (!old.is_empty() && new.strip_prefix(" b/") == Some(old)).then(|| old.to_owned())
}

/// Decodes a git C-style quoted path: `"t\303\251st.rs"` is `tést.rs`.
fn unquote(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;
    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.bytes();
    while let Some(b) = chars.next() {
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        let escaped = match chars.next()? {
            b'n' => b'\n',
            b't' => b'\t',
            b'r' => b'\r',
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'v' => 0x0b,
            d @ b'0'..=b'7' => {
                let mut value = u32::from(d - b'0');
                for _ in 0..2 {
                    let next = chars.next()?;
                    if !(b'0'..=b'7').contains(&next) {
                        return None;
                    }
                    value = value * 8 + u32::from(next - b'0');
                }
                u8::try_from(value).ok()?
            }
            other => other,
        };
        bytes.push(escaped);
    }
    String::from_utf8(bytes).ok()
}

//! A parser for the file-identity parts of unified diffs, in both git
//! (`diff --git`) and plain (`---`/`+++`) form. Hunk bodies are checked
//! against their headers but otherwise not interpreted.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::trace;

static HUNK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@")
        .expect("hunk header pattern is a valid regex")
});

const DEV_NULL: &str = "/dev/null";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Modified,
    Added,
    Deleted,
    Renamed,
    Copied,
}

/// One file section of a patch. `src` is `None` for a created file and
/// `dst` is `None` for a deleted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub src: Option<String>,
    pub dst: Option<String>,
    pub kind: ChangeKind,
    pub binary: bool,
}

impl FileChange {
    fn new(src: Option<String>, dst: Option<String>) -> Self {
        Self {
            src,
            dst,
            kind: ChangeKind::Modified,
            binary: false,
        }
    }

    /// The destination path, then the source path, skipping absent ones.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        [self.dst.as_deref(), self.src.as_deref()]
            .into_iter()
            .flatten()
            .filter(|path| !path.is_empty())
    }

    fn infer_kind(&mut self) {
        if self.kind != ChangeKind::Modified {
            return;
        }
        self.kind = match (&self.src, &self.dst) {
            (None, Some(_)) => ChangeKind::Added,
            (Some(_), None) => ChangeKind::Deleted,
            _ => ChangeKind::Modified,
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    pub files: Vec<FileChange>,
}

/// Input that is not a syntactically valid patch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct PatchParseError {
    pub line: usize,
    pub message: String,
}

/// Parse a patch. Text before the first file header (mail headers, commit
/// message, diffstat) and after a `-- ` signature line is ignored, so the
/// output of `git format-patch` is accepted as is. Input without any file
/// section is an empty patch.
pub fn parse_patch(input: &[u8]) -> Result<Patch, PatchParseError> {
    Parser::new(input).parse()
}

struct Parser<'a> {
    lines: Vec<&'a [u8]>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8]) -> Self {
        let mut lines = Vec::new();
        let mut start = 0;
        for end in memchr::memchr_iter(b'\n', input) {
            lines.push(&input[start..end]);
            start = end + 1;
        }
        if start < input.len() {
            lines.push(&input[start..]);
        }
        Self { lines, pos: 0 }
    }

    fn parse(mut self) -> Result<Patch, PatchParseError> {
        let mut files = Vec::new();
        while let Some(line) = self.peek() {
            let line = trim_cr(line);
            if line.starts_with(b"diff --git ") {
                files.push(self.parse_git_section()?);
            } else if line.starts_with(b"--- ") && self.peek_at(1).is_some_and(is_new_header) {
                files.push(self.parse_unified_section()?);
            } else if line.starts_with(b"@@ ") {
                return Err(self.error("hunk header outside of a file section"));
            } else if line == b"-- " {
                break;
            } else {
                self.next();
            }
        }
        Ok(Patch { files })
    }

    fn parse_git_section(&mut self) -> Result<FileChange, PatchParseError> {
        let header = self.next_text().unwrap_or_default();
        let rest = header.strip_prefix("diff --git ").unwrap_or_default();
        let (src, dst) = split_git_header(rest)
            .ok_or_else(|| self.error_at(self.pos - 1, "unsplittable diff --git header"))?;
        let mut file = FileChange::new(Some(src), Some(dst));

        while let Some(line) = self.peek_text() {
            if let Some(path) = line.strip_prefix("rename from ") {
                file.src = Some(header_path(path));
                file.kind = ChangeKind::Renamed;
            } else if let Some(path) = line.strip_prefix("rename to ") {
                file.dst = Some(header_path(path));
                file.kind = ChangeKind::Renamed;
            } else if let Some(path) = line.strip_prefix("copy from ") {
                file.src = Some(header_path(path));
                file.kind = ChangeKind::Copied;
            } else if let Some(path) = line.strip_prefix("copy to ") {
                file.dst = Some(header_path(path));
                file.kind = ChangeKind::Copied;
            } else if line.starts_with("new file mode ") {
                file.src = None;
                file.kind = ChangeKind::Added;
            } else if line.starts_with("deleted file mode ") {
                file.dst = None;
                file.kind = ChangeKind::Deleted;
            } else if ["old mode ", "new mode ", "index ", "similarity index ", "dissimilarity index "]
                .iter()
                .any(|prefix| line.starts_with(prefix))
            {
                // nothing to record
            } else if line.starts_with("Binary files ") {
                file.binary = true;
                self.next();
                break;
            } else if line.starts_with("GIT binary patch") {
                file.binary = true;
                self.next();
                self.skip_binary_body();
                break;
            } else if line.starts_with("--- ") {
                let (src, dst) = self.parse_file_headers(true)?;
                if file.kind != ChangeKind::Added {
                    file.src = src;
                }
                if file.kind != ChangeKind::Deleted {
                    file.dst = dst;
                }
                self.parse_hunks()?;
                break;
            } else {
                break;
            }
            self.next();
        }

        file.infer_kind();
        trace!(src = ?file.src, dst = ?file.dst, kind = ?file.kind, "parsed git file section");
        Ok(file)
    }

    fn parse_unified_section(&mut self) -> Result<FileChange, PatchParseError> {
        let (src, dst) = self.parse_file_headers(false)?;
        let mut file = FileChange::new(src, dst);
        self.parse_hunks()?;
        file.infer_kind();
        trace!(src = ?file.src, dst = ?file.dst, kind = ?file.kind, "parsed unified file section");
        Ok(file)
    }

    // Consumes a `---` line and the `+++` line that must follow it.
    fn parse_file_headers(
        &mut self,
        strip_prefixes: bool,
    ) -> Result<(Option<String>, Option<String>), PatchParseError> {
        let old = self.next_text().unwrap_or_default();
        let old = old.strip_prefix("--- ").unwrap_or_default();
        let new = match self.peek_text() {
            Some(line) if line.starts_with("+++ ") => line,
            _ => return Err(self.error("expected `+++` header after `---` header")),
        };
        let new = new.strip_prefix("+++ ").unwrap_or_default();

        let src = file_header_path(old, strip_prefixes.then_some("a/"));
        let dst = file_header_path(new, strip_prefixes.then_some("b/"));
        self.next();
        Ok((src, dst))
    }

    fn parse_hunks(&mut self) -> Result<(), PatchParseError> {
        while let Some(line) = self.peek() {
            if !line.starts_with(b"@@") {
                break;
            }
            self.parse_hunk()?;
        }
        Ok(())
    }

    fn parse_hunk(&mut self) -> Result<(), PatchParseError> {
        let header = self.peek_text().unwrap_or_default();
        let caps = HUNK_HEADER
            .captures(&header)
            .ok_or_else(|| self.error("malformed hunk header"))?;
        let count = |idx: usize| -> Result<usize, PatchParseError> {
            caps.get(idx)
                .map_or(Ok(1), |m| m.as_str().parse())
                .map_err(|_| self.error("hunk line count out of range"))
        };
        let mut old_remaining = count(2)?;
        let mut new_remaining = count(4)?;
        self.next();

        while old_remaining > 0 || new_remaining > 0 {
            let Some(line) = self.peek() else {
                return Err(self.error("patch ends inside a hunk"));
            };
            // A bare `\r` is a whitespace-stripped empty context line.
            match trim_cr(line).first().copied() {
                Some(b' ') | None => {
                    if old_remaining == 0 || new_remaining == 0 {
                        return Err(self.error("hunk has more context lines than its header declares"));
                    }
                    old_remaining -= 1;
                    new_remaining -= 1;
                }
                Some(b'-') => {
                    if old_remaining == 0 {
                        return Err(self.error("hunk removes more lines than its header declares"));
                    }
                    old_remaining -= 1;
                }
                Some(b'+') => {
                    if new_remaining == 0 {
                        return Err(self.error("hunk adds more lines than its header declares"));
                    }
                    new_remaining -= 1;
                }
                Some(b'\\') => {}
                Some(_) => return Err(self.error("unexpected line inside a hunk")),
            }
            self.next();
        }

        // "\ No newline at end of file" may trail the last line.
        while let Some(line) = self.peek() {
            if !line.starts_with(b"\\") {
                break;
            }
            self.next();
        }
        Ok(())
    }

    fn skip_binary_body(&mut self) {
        while let Some(line) = self.peek() {
            let line = trim_cr(line);
            if line.starts_with(b"diff --git ") || line == b"-- " {
                break;
            }
            self.next();
        }
    }

    fn peek(&self) -> Option<&'a [u8]> {
        self.lines.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<&'a [u8]> {
        self.lines.get(self.pos + offset).copied()
    }

    fn peek_text(&self) -> Option<Cow<'a, str>> {
        self.peek().map(text)
    }

    fn next(&mut self) -> Option<&'a [u8]> {
        let line = self.peek()?;
        self.pos += 1;
        Some(line)
    }

    fn next_text(&mut self) -> Option<Cow<'a, str>> {
        self.next().map(text)
    }

    fn error(&self, message: &str) -> PatchParseError {
        self.error_at(self.pos, message)
    }

    fn error_at(&self, pos: usize, message: &str) -> PatchParseError {
        PatchParseError {
            line: pos + 1,
            message: message.to_owned(),
        }
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn text(line: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(trim_cr(line))
}

fn is_new_header(line: &[u8]) -> bool {
    line.starts_with(b"+++ ")
}

// A path from a `---`/`+++` header: `/dev/null` means no file and anything
// after a tab is a timestamp.
fn file_header_path(raw: &str, prefix: Option<&str>) -> Option<String> {
    let path = if raw.starts_with('"') {
        unquote(raw).map(|(path, _)| path)?
    } else {
        raw.split('\t').next().unwrap_or_default().trim_end().to_owned()
    };
    if path == DEV_NULL || path.is_empty() {
        return None;
    }
    match prefix.and_then(|prefix| path.strip_prefix(prefix)) {
        Some(stripped) => Some(stripped.to_owned()),
        None => Some(path),
    }
}

// A path from a `rename from`/`copy to` style header, which carries no prefix.
fn header_path(raw: &str) -> String {
    if raw.starts_with('"') {
        if let Some((path, _)) = unquote(raw) {
            return path;
        }
    }
    raw.to_owned()
}

// Split the `a/<src> b/<dst>` part of a `diff --git` line.
fn split_git_header(rest: &str) -> Option<(String, String)> {
    let strip = |path: &str, prefix: &str| path.strip_prefix(prefix).unwrap_or(path).to_owned();

    if rest.starts_with('"') {
        let (src, remainder) = unquote(rest)?;
        let remainder = remainder.trim_start();
        let dst = if remainder.starts_with('"') {
            unquote(remainder)?.0
        } else {
            remainder.to_owned()
        };
        return Some((strip(src.as_str(), "a/"), strip(dst.as_str(), "b/")));
    }

    if let Some(dst_start) = rest.find(" \"") {
        let (dst, _) = unquote(&rest[dst_start + 1..])?;
        return Some((strip(&rest[..dst_start], "a/"), strip(dst.as_str(), "b/")));
    }

    // Unless the file was renamed both halves name the same path, so an
    // even split resolves names that contain spaces.
    if rest.len() % 2 == 1 {
        let mid = rest.len() / 2;
        if rest.as_bytes()[mid] == b' ' {
            let (src, dst) = (strip(&rest[..mid], "a/"), strip(&rest[mid + 1..], "b/"));
            if src == dst {
                return Some((src, dst));
            }
        }
    }

    let split = rest.find(" b/").or_else(|| rest.find(' '))?;
    Some((strip(&rest[..split], "a/"), strip(&rest[split + 1..], "b/")))
}

// Decode a C-style quoted string as written by git for unusual file names.
// Returns the decoded value and whatever follows the closing quote.
fn unquote(quoted: &str) -> Option<(String, &str)> {
    let bytes = quoted.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut idx = 1;
    while idx < bytes.len() {
        match bytes[idx] {
            b'"' => {
                let value = String::from_utf8_lossy(&decoded).into_owned();
                return Some((value, &quoted[idx + 1..]));
            }
            b'\\' => {
                let escaped = *bytes.get(idx + 1)?;
                idx += 2;
                match escaped {
                    b'n' => decoded.push(b'\n'),
                    b't' => decoded.push(b'\t'),
                    b'r' => decoded.push(b'\r'),
                    b'a' => decoded.push(0x07),
                    b'b' => decoded.push(0x08),
                    b'f' => decoded.push(0x0c),
                    b'v' => decoded.push(0x0b),
                    b'0'..=b'7' => {
                        let digits = bytes.get(idx - 1..idx + 2)?;
                        let value = digits.iter().try_fold(0u16, |acc, &d| match d {
                            b'0'..=b'7' => Some(acc * 8 + u16::from(d - b'0')),
                            _ => None,
                        })?;
                        decoded.push(u8::try_from(value).ok()?);
                        idx += 2;
                    }
                    other => decoded.push(other),
                }
            }
            byte => {
                decoded.push(byte);
                idx += 1;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(src: Option<&str>, dst: Option<&str>, kind: ChangeKind) -> FileChange {
        FileChange {
            src: src.map(str::to_owned),
            dst: dst.map(str::to_owned),
            kind,
            binary: false,
        }
    }

    #[test]
    fn test_modification() {
        let patch = b"diff --git a/src/x.go b/src/x.go
index 83db48f..bf269f4 100644
--- a/src/x.go
+++ b/src/x.go
@@ -1,3 +1,4 @@
 package x
+
 func A() {}
-func B() {}
+func C() {}
";
        assert_eq!(
            parse_patch(patch).unwrap().files,
            vec![change(Some("src/x.go"), Some("src/x.go"), ChangeKind::Modified)]
        );
    }

    #[test]
    fn test_git_extended_headers() {
        let patch = b"From 1234 Mon Sep 17 00:00:00 2001
Subject: [PATCH] shuffle things around

---
 new/y.go | 0
 1 file changed

diff --git a/old/y.go b/new/y.go
similarity index 100%
rename from old/y.go
rename to new/y.go
diff --git a/docs/new.md b/docs/new.md
new file mode 100644
index 0000000..e69de29
--- /dev/null
+++ b/docs/new.md
@@ -0,0 +1 @@
+hello
diff --git a/gone.txt b/gone.txt
deleted file mode 100644
index e69de29..0000000
diff --git a/bin/tool b/bin/tool
old mode 100644
new mode 100755
diff --git a/a.rs b/b.rs
similarity index 90%
copy from a.rs
copy to b.rs
--- a/a.rs
+++ b/b.rs
@@ -1 +1 @@
-one
+two
\\ No newline at end of file
--
2.39.0
";
        assert_eq!(
            parse_patch(patch).unwrap().files,
            vec![
                change(Some("old/y.go"), Some("new/y.go"), ChangeKind::Renamed),
                change(None, Some("docs/new.md"), ChangeKind::Added),
                change(Some("gone.txt"), None, ChangeKind::Deleted),
                change(Some("bin/tool"), Some("bin/tool"), ChangeKind::Modified),
                change(Some("a.rs"), Some("b.rs"), ChangeKind::Copied),
            ]
        );
    }

    #[test]
    fn test_binary_sections() {
        let patch = b"diff --git a/logo.png b/logo.png
index 1111111..2222222 100644
Binary files a/logo.png and b/logo.png differ
diff --git a/icon.png b/icon.png
new file mode 100644
index 0000000000000000000000000000000000000000..3333333333333333333333333333333333333333
GIT binary patch
literal 5
McmZQzU|?ck000310RR91

literal 0
HcmV?d00001

diff --git a/README b/README
--- a/README
+++ b/README
@@ -1 +1 @@
-a
+b
";
        let files = parse_patch(patch).unwrap().files;
        assert_eq!(files.len(), 3);
        assert!(files[0].binary);
        assert_eq!(files[0].dst.as_deref(), Some("logo.png"));
        assert!(files[1].binary);
        assert_eq!(files[1].kind, ChangeKind::Added);
        assert!(!files[2].binary);
        assert_eq!(files[2].src.as_deref(), Some("README"));
    }

    #[test]
    fn test_plain_unified_diff() {
        let patch = b"diff -ru orig/lib.c new/lib.c
--- orig/lib.c\t2024-01-01 10:00:00.000000000 +0000
+++ new/lib.c\t2024-01-02 10:00:00.000000000 +0000
@@ -1,2 +1,2 @@
 int a;
-int b;
+int c;
--- /dev/null
+++ new/extra.c
@@ -0,0 +1 @@
+int d;
";
        assert_eq!(
            parse_patch(patch).unwrap().files,
            vec![
                change(Some("orig/lib.c"), Some("new/lib.c"), ChangeKind::Modified),
                change(None, Some("new/extra.c"), ChangeKind::Added),
            ]
        );
    }

    #[test]
    fn test_crlf_and_missing_trailing_newline() {
        let patch = b"diff --git a/w.txt b/w.txt\r\n--- a/w.txt\r\n+++ b/w.txt\r\n@@ -1 +1 @@\r\n-x\r\n+y";
        assert_eq!(
            parse_patch(patch).unwrap().files,
            vec![change(Some("w.txt"), Some("w.txt"), ChangeKind::Modified)]
        );
    }

    #[test]
    fn test_crlf_stripped_empty_context_line() {
        let patch = b"--- a/w.txt\r\n+++ b/w.txt\r\n@@ -1,3 +1,3 @@\r\n a\r\n\r\n-x\r\n+y\r\n";
        assert_eq!(
            parse_patch(patch).unwrap().files,
            vec![change(Some("w.txt"), Some("w.txt"), ChangeKind::Modified)]
        );
    }

    #[test]
    fn test_quoted_and_spaced_paths() {
        let patch = b"diff --git \"a/dir/tab\\there\" \"b/dir/tab\\there\"
--- \"a/dir/tab\\there\"
+++ \"b/dir/tab\\there\"
@@ -1 +1 @@
-a
+b
diff --git a/my file.txt b/my file.txt
index 1..2 100644
diff --git \"a/caf\\303\\251\" \"b/caf\\303\\251\"
deleted file mode 100644
";
        assert_eq!(
            parse_patch(patch).unwrap().files,
            vec![
                change(Some("dir/tab\there"), Some("dir/tab\there"), ChangeKind::Modified),
                change(Some("my file.txt"), Some("my file.txt"), ChangeKind::Modified),
                change(Some("café"), None, ChangeKind::Deleted),
            ]
        );
    }

    #[test]
    fn test_empty_input_is_empty_patch() {
        assert_eq!(parse_patch(b"").unwrap(), Patch::default());
        assert_eq!(
            parse_patch(b"just some text\n--- not a header\n").unwrap(),
            Patch::default()
        );
    }

    #[test]
    fn test_invalid_patches() {
        let examples: [(&[u8], usize); 7] = [
            (b"@@ -1 +1 @@\n-a\n+b\n", 1),
            (b"diff --git a/x b/x\n--- a/x\n@@ -1 +1 @@\n", 3),
            (b"diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n", 6),
            (b"diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -x +1 @@\n", 4),
            (b"diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n-b\n", 6),
            (b"diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -2 +2 @@\n?a\n", 5),
            (b"diff --git nospace\n", 1),
        ];
        for (input, line) in examples {
            let err = parse_patch(input).unwrap_err();
            assert_eq!(
                err.line,
                line,
                "unexpected error for {:?}: {}",
                String::from_utf8_lossy(input),
                err
            );
        }
    }

    #[test]
    fn test_file_change_paths() {
        let renamed = change(Some("old/y.go"), Some("new/y.go"), ChangeKind::Renamed);
        assert_eq!(renamed.paths().collect::<Vec<_>>(), vec!["new/y.go", "old/y.go"]);
        let added = change(None, Some("n.go"), ChangeKind::Added);
        assert_eq!(added.paths().collect::<Vec<_>>(), vec!["n.go"]);
    }
}

use std::{fmt, fs, path::Path};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::{paths, Error, Result};

/// Canonical name of an ownership declaration file. Matched
/// case-insensitively, see [`is_declaration_file`].
pub const DECLARATION_FILE_NAME: &str = "MAINTAINERS";

// [#] [target:] Full Name [<email>] [(@handle)] [anything]
static RECORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^[ \t]*(?P<disabled>#?)[ \t]*",
        r"(?:(?P<target>[^: \t]*)[ \t]*:)?",
        // A `(` inside the name is fine unless it opens the `(@handle)`.
        r"[ \t]*(?P<full_name>[a-zA-Z](?:[^<(]|\([^@<])*)",
        r"(?:<(?P<email>[^>]*)>)?",
        r"[ \t]*(?:\(@(?P<username>[^)]+)\))?",
        r".*$",
    ))
    .expect("maintainer record grammar is a valid regex")
});

/// One parsed line of a MAINTAINERS file.
///
/// Records are plain values: once parsed they are never mutated, and are
/// shared by reference between every directory and file they govern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Maintainer {
    pub username: String,
    pub email: String,
    pub full_name: String,
    /// Sub-scope label, collapsed to its final path component.
    pub target: Option<String>,
    /// `false` when the line is disabled with a leading `#`.
    pub active: bool,
    /// The line as it appeared in the file.
    pub raw: String,
}

impl fmt::Display for Maintainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.active {
            f.write_str("#")?;
        }
        if let Some(target) = &self.target {
            write!(f, "{}: ", target)?;
        }
        f.write_str(&self.full_name)?;
        if !self.email.is_empty() {
            write!(f, " <{}>", self.email)?;
        }
        if !self.username.is_empty() {
            write!(f, " (@{})", self.username)?;
        }
        Ok(())
    }
}

/// A line that carries neither an email nor a handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed maintainer record `{raw}`: expected an email or a handle")]
pub struct MalformedRecord {
    pub raw: String,
}

/// A malformed record together with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {record}")]
pub struct ParseError {
    pub line: usize,
    pub record: MalformedRecord,
}

/// Whether a directory entry name denotes a MAINTAINERS file.
pub fn is_declaration_file(name: &str) -> bool {
    name.eq_ignore_ascii_case(DECLARATION_FILE_NAME)
}

/// Parse a single declaration line.
pub fn parse_line(line: &str) -> std::result::Result<Maintainer, MalformedRecord> {
    let malformed = || MalformedRecord {
        raw: line.to_owned(),
    };
    let caps = RECORD.captures(line).ok_or_else(malformed)?;
    let field = |name: &str| {
        caps.name(name)
            .map(|m| m.as_str().trim_matches(|c| c == ' ' || c == '\t'))
            .unwrap_or_default()
            .to_owned()
    };

    let maintainer = Maintainer {
        username: field("username"),
        email: field("email"),
        full_name: field("full_name"),
        target: normalize_target(&field("target")),
        active: caps.name("disabled").map_or(true, |m| m.as_str().is_empty()),
        raw: line.to_owned(),
    };
    if maintainer.username.is_empty() && maintainer.email.is_empty() {
        return Err(malformed());
    }
    Ok(maintainer)
}

/// Parse the contents of a MAINTAINERS file. Blank lines are skipped; the
/// first malformed line rejects the whole file.
pub fn parse(source: &str) -> std::result::Result<Vec<Maintainer>, ParseError> {
    source
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            parse_line(line).map_err(|record| ParseError {
                line: idx + 1,
                record,
            })
        })
        .collect()
}

/// Read and parse a MAINTAINERS file from disk.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<Maintainer>> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| Error::TreeRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&source).map_err(|source| Error::FileFormat {
        path: path.to_path_buf(),
        source,
    })
}

fn normalize_target(target: &str) -> Option<String> {
    if target.is_empty() {
        return None;
    }
    let cleaned = paths::clean_path(target);
    match cleaned.rsplit('/').next() {
        Some(last) if !last.is_empty() => Some(last.to_owned()),
        _ => None,
    }
}

//! Lexical helpers for repository-relative paths. Paths use `/` as the
//! separator regardless of platform and `.` names the repository root.

/// Normalize a path lexically: repeated separators collapse, `.` segments
/// disappear and `..` cancels the segment before it. Leading `..` segments
/// survive in relative paths and are dropped at the root of absolute ones.
/// An empty result becomes `.`.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if rooted => {}
                _ => segments.push(".."),
            },
            _ => segments.push(segment),
        }
    }

    let joined = segments.join("/");
    if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_owned()
    } else {
        joined
    }
}

/// The directory holding `path`: everything before the final separator, or
/// `.` for a root-level entry. Expects a cleaned path.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}

/// Append a child name to a directory, eliding the root `.`.
pub fn join(dir: &str, name: &str) -> String {
    if dir == "." || dir.is_empty() {
        name.to_owned()
    } else {
        format!("{}/{}", dir, name)
    }
}

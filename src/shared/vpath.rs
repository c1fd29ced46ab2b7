//! Virtual path arithmetic for session filesystems.
//!
//! Virtual paths are always absolute, `/`-separated and normalized: no `.`
//! or `..` components, no repeated or trailing slashes. The root is `/`.
//! `..` at the root stays at the root, so a virtual path can never name
//! anything outside the session's filesystem.

use crate::errors::SandboxError;

pub const ROOT: &str = "/";

/// Resolves `input` against `base` (itself a normalized virtual path).
pub fn normalize(base: &str, input: &str) -> Result<String, SandboxError> {
    if input.contains('\0') {
        return Err(SandboxError::invalid_input("path", "path contains NUL byte"));
    }

    let mut parts: Vec<&str> = Vec::new();
    if !input.starts_with('/') {
        parts.extend(base.split('/').filter(|segment| !segment.is_empty()));
    }

    for segment in input.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    Ok(format!("/{}", parts.join("/")))
}

pub fn join(base: &str, name: &str) -> String {
    if base == ROOT {
        format!("/{name}")
    } else {
        format!("{base}/{name}")
    }
}

pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

pub fn file_name(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

/// `path` itself followed by every ancestor up to and including the root.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut chain = vec![path];
    let mut current = path;
    while let Some(next) = parent(current) {
        chain.push(next);
        current = next;
    }
    chain
}

/// Path of `path` relative to `root`, or `None` when `path` is not inside it.
/// Returns an empty string when both are equal.
pub fn strip_root<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    if root == path {
        return Some("");
    }
    if root == ROOT {
        return path.strip_prefix('/');
    }
    path.strip_prefix(root)?.strip_prefix('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_relative_and_absolute_inputs() {
        assert_eq!(normalize("/a/b", "c").unwrap(), "/a/b/c");
        assert_eq!(normalize("/a/b", "../c/./d").unwrap(), "/a/c/d");
        assert_eq!(normalize("/a/b", "/x//y/").unwrap(), "/x/y");
        assert_eq!(normalize("/a", "").unwrap(), "/a");
    }

    #[test]
    fn parent_segments_never_escape_root() {
        assert_eq!(normalize("/", "../../etc").unwrap(), "/etc");
        assert_eq!(normalize("/a", "../../..").unwrap(), "/");
    }

    #[test]
    fn rejects_nul_bytes() {
        assert!(normalize("/", "a\0b").is_err());
    }

    #[test]
    fn ancestors_walk_to_root() {
        assert_eq!(ancestors("/a/b/c"), vec!["/a/b/c", "/a/b", "/a", "/"]);
        assert_eq!(ancestors("/"), vec!["/"]);
    }

    #[test]
    fn strip_root_requires_component_boundary() {
        assert_eq!(strip_root("/a", "/a/b/c"), Some("b/c"));
        assert_eq!(strip_root("/a", "/a"), Some(""));
        assert_eq!(strip_root("/a", "/ab"), None);
        assert_eq!(strip_root("/", "/x"), Some("x"));
    }

    #[test]
    fn join_and_file_name() {
        assert_eq!(join("/", "r"), "/r");
        assert_eq!(join("/r", "f"), "/r/f");
        assert_eq!(file_name("/r/f"), Some("f"));
        assert_eq!(file_name("/"), None);
    }
}

//! ## path
//!
//! Share-relative path utilities

use std::path::{Component, Path};

/// Normalize `path` relative to the share root.
///
/// Both `/` and `\` separate components; `.` is dropped and `..` pops the previous
/// component. Returns `None` when the path would climb above the share root.
/// The root itself normalizes to the empty string.
pub fn normalize(path: &str) -> Option<String> {
    let mut components: Vec<&str> = Vec::new();
    for component in path.split(['/', '\\']) {
        match component {
            "" | "." => {}
            ".." => {
                components.pop()?;
            }
            name => components.push(name),
        }
    }
    Some(components.join("/"))
}

/// Absolutize `target` against the working directory `wrkdir`, as a `/`-rooted path
pub fn absolutize(wrkdir: &Path, target: &Path) -> String {
    let mut joined = if target.has_root() {
        String::new()
    } else {
        wrkdir.to_string_lossy().to_string()
    };
    for component in target.components() {
        if let Component::Normal(name) = component {
            joined.push('/');
            joined.push_str(&name.to_string_lossy());
        } else if component == Component::ParentDir {
            joined.push_str("/..");
        }
    }
    joined
}

/// Split a normalized path into its parent and its file name
pub fn split(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}

#[cfg(test)]
mod test {

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn should_normalize_path() {
        assert_eq!(normalize(".").as_deref(), Some(""));
        assert_eq!(normalize("/").as_deref(), Some(""));
        assert_eq!(normalize("hello.txt").as_deref(), Some("hello.txt"));
        assert_eq!(normalize("./docs//a.txt").as_deref(), Some("docs/a.txt"));
        assert_eq!(normalize("docs\\sub\\..\\b.txt").as_deref(), Some("docs/b.txt"));
        assert_eq!(normalize("/docs/").as_deref(), Some("docs"));
    }

    #[test]
    fn should_not_escape_share_root() {
        assert!(normalize("..").is_none());
        assert!(normalize("docs/../../etc/passwd").is_none());
        assert!(normalize("\\..\\secret").is_none());
    }

    #[test]
    fn should_absolutize_path() {
        assert_eq!(absolutize(Path::new("/docs"), Path::new("a.txt")), "/docs/a.txt");
        assert_eq!(absolutize(Path::new("/docs"), Path::new("/b.txt")), "/b.txt");
        assert_eq!(absolutize(Path::new("/docs"), Path::new("../c.txt")), "/docs/../c.txt");
        assert_eq!(
            normalize(&absolutize(Path::new("/docs"), Path::new("../c.txt"))).as_deref(),
            Some("c.txt")
        );
    }

    #[test]
    fn should_split_path() {
        assert_eq!(split("docs/a.txt"), ("docs", "a.txt"));
        assert_eq!(split("a.txt"), ("", "a.txt"));
    }
}

//! Logical path helpers
//!
//! Logical paths always start with `/`, never end with one and contain no
//! empty segments. The primary-store key is the path without the leading slash.

/// Normalize a user-supplied path
pub fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Append a child name to a directory path
pub fn join(dir: &str, name: &str) -> String {
    normalize(&format!("{}/{}", dir, name))
}

/// Parent directory of a normalized path (`/` for top-level entries)
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

/// Last path component
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Primary-store object key for a logical path
pub fn to_key(path: &str) -> &str {
    path.trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("inbox//report.pdf/"), "/inbox/report.pdf");
        assert_eq!(normalize("/inbox"), "/inbox");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("///"), "/");
    }

    #[test]
    fn test_join_and_parent() {
        assert_eq!(join("/inbox", "report.pdf"), "/inbox/report.pdf");
        assert_eq!(join("/", "top.txt"), "/top.txt");
        assert_eq!(parent("/inbox/report.pdf"), "/inbox");
        assert_eq!(parent("/top.txt"), "/");
        assert_eq!(parent("/"), "/");
    }

    #[test]
    fn test_key_and_base_name() {
        assert_eq!(to_key("/inbox/report.pdf"), "inbox/report.pdf");
        assert_eq!(base_name("/inbox/report.pdf"), "report.pdf");
    }
}

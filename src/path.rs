//! Archive path helpers
//!
//! Archive paths are forward-slash separated, case-sensitive and never
//! absolute. References found inside documents are resolved against the
//! directory of the document that contains them.

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// Collapse empty, `.` and `..` segments.
///
/// `..` above the archive root is dropped; the result never starts with `/`.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    parts.join("/")
}

/// Directory component of an archive path (`""` for root-level files).
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Split `href` at the first `#`.
///
/// An empty fragment (`"a.xhtml#"`) is reported as `None`.
pub fn split_fragment(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, fragment)) if !fragment.is_empty() => (path, Some(fragment)),
        Some((path, _)) => (path, None),
        None => (href, None),
    }
}

/// Whether `href` carries a URI scheme (`data:`, `http:`, `mailto:` ...).
pub fn has_scheme(href: &str) -> bool {
    let Some((scheme, _)) = href.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Resolve `href` against the directory of `base_file` and normalize.
///
/// Any fragment is dropped. A leading `/` means the archive root. An empty
/// reference resolves to `base_file` itself.
pub fn resolve_relative(base_file: &str, href: &str) -> String {
    let (href, _) = split_fragment(href);
    if href.is_empty() {
        return normalize_path(base_file);
    }
    if let Some(rooted) = href.strip_prefix('/') {
        return normalize_path(rooted);
    }

    let base_dir = parent_dir(base_file);
    if base_dir.is_empty() {
        normalize_path(href)
    } else {
        normalize_path(&format!("{}/{}", base_dir, href))
    }
}

/// Resolve `href` like [`resolve_relative`], keeping its fragment.
pub fn resolve_with_fragment(base_file: &str, href: &str) -> String {
    let path = resolve_relative(base_file, href);
    match split_fragment(href).1 {
        Some(fragment) => format!("{}#{}", path, fragment),
        None => path,
    }
}

/// Decode `%XX` escapes in a reference; malformed escapes are kept verbatim.
pub fn percent_decode(href: &str) -> String {
    if !href.contains('%') {
        return href.to_string();
    }
    let bytes = href.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = core::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("OEBPS/./text/../images/a.png"), "OEBPS/images/a.png");
        assert_eq!(normalize_path("/OEBPS//a.xhtml"), "OEBPS/a.xhtml");
        assert_eq!(normalize_path("../../a.xhtml"), "a.xhtml");
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve_relative("EPUB/package.opf", "text/ch1.xhtml"),
            "EPUB/text/ch1.xhtml"
        );
        assert_eq!(resolve_relative("OEBPS/content.opf", "../toc.ncx"), "toc.ncx");
        assert_eq!(resolve_relative("package.opf", "chapter.xhtml#p1"), "chapter.xhtml");
        assert_eq!(
            resolve_relative("EPUB/package.opf", "/META-INF/container.xml"),
            "META-INF/container.xml"
        );
        assert_eq!(
            resolve_relative("OEBPS/chapter1.xhtml", "images/cover.jpg"),
            "OEBPS/images/cover.jpg"
        );
        assert_eq!(
            resolve_relative("OEBPS/chapter1.xhtml", "../images/cover.jpg"),
            "images/cover.jpg"
        );
        assert_eq!(
            resolve_relative("OEBPS/text/nav.xhtml", "#toc"),
            "OEBPS/text/nav.xhtml"
        );
    }

    #[test]
    fn test_resolve_with_fragment() {
        assert_eq!(
            resolve_with_fragment("OEBPS/nav/toc.ncx", "../text/ch2.xhtml#stave2"),
            "OEBPS/text/ch2.xhtml#stave2"
        );
        assert_eq!(
            resolve_with_fragment("OEBPS/nav.xhtml", "ch1.xhtml"),
            "OEBPS/ch1.xhtml"
        );
    }

    #[test]
    fn test_split_fragment() {
        assert_eq!(split_fragment("a.xhtml#s1"), ("a.xhtml", Some("s1")));
        assert_eq!(split_fragment("a.xhtml#"), ("a.xhtml", None));
        assert_eq!(split_fragment("a.xhtml"), ("a.xhtml", None));
        assert_eq!(split_fragment("#top"), ("", Some("top")));
    }

    #[test]
    fn test_has_scheme() {
        assert!(has_scheme("data:image/png;base64,AAAA"));
        assert!(has_scheme("http://example.com/a.png"));
        assert!(has_scheme("mailto:someone@example.com"));
        assert!(!has_scheme("images/a.png"));
        assert!(!has_scheme("../a:b.png"));
        assert!(!has_scheme("#frag"));
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("images/my%20cover.jpg"), "images/my cover.jpg");
        assert_eq!(percent_decode("a%zzb"), "a%zzb");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("plain.xhtml"), "plain.xhtml");
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("OEBPS/text/ch1.xhtml"), "OEBPS/text");
        assert_eq!(parent_dir("content.opf"), "");
    }
}

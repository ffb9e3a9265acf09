//! Chapter rewriting for isolated rendering
//!
//! A content document is streamed through quick-xml once and serialized back
//! to HTML text with its presentation stripped and its relative resource
//! references replaced by `data:` URIs read from the [`Book`], so the result
//! renders without access to the archive.

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::book::Book;
use crate::error::EpubError;
use crate::path::{has_scheme, percent_decode, resolve_relative, split_fragment};
use crate::xml::{find_attr, raw_attr_value, Nesting};

/// Style block appended to the document head.
pub const RESET_STYLE: &str = "body { margin: 0; }";

/// HTML elements that never have content and serialize as `<tag/>`.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// What to do with hyperlink-style `href` references.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HyperlinkPolicy {
    /// Rewrite to the normalized archive path, fragment kept.
    #[default]
    Resolve,
    /// Inline the target like an embedded resource.
    Inline,
}

/// Rewrite configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RewriteOptions {
    /// Treatment of `href` on elements other than SVG `<image>`.
    pub hyperlinks: HyperlinkPolicy,
}

impl RewriteOptions {
    /// Set the hyperlink policy.
    pub fn with_hyperlinks(mut self, policy: HyperlinkPolicy) -> Self {
        self.hyperlinks = policy;
        self
    }
}

/// Why a reference was left as written
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewriteDiagnosticKind {
    /// The resolved path does not exist in the archive.
    AssetNotFound,
    /// No media type could be determined for the resource.
    UnknownMediaType,
}

/// A reference the rewriter could not inline
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewriteDiagnostic {
    /// Failure kind
    pub kind: RewriteDiagnosticKind,
    /// Attribute name as written (`src`, `xlink:href` ...)
    pub attribute: String,
    /// Attribute value as written
    pub reference: String,
    /// Normalized archive path the reference resolved to
    pub path: String,
}

/// Self-contained chapter document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewrittenDocument {
    /// Serialized markup, starting with `<!DOCTYPE html>`
    pub html: String,
    /// Anchor to scroll to after load
    pub fragment: Option<String>,
    /// References that were left unmodified
    pub diagnostics: Vec<RewriteDiagnostic>,
}

impl RewrittenDocument {
    /// The document as a `data:text/html;base64,...` URI.
    pub fn to_data_uri(&self) -> String {
        format!("data:text/html;base64,{}", BASE64.encode(self.html.as_bytes()))
    }
}

/// Guess a media type from a path's extension.
pub fn mime_from_path(path: &str) -> Option<&'static str> {
    mime_guess::from_path(path).first_raw()
}

/// How an attribute reference is treated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RefKind {
    Embedded,
    Hyperlink,
}

fn reference_kind(element: &[u8], attribute: &[u8]) -> Option<RefKind> {
    match (element, attribute) {
        (_, b"src") | (b"video", b"poster") | (b"image", b"href") => Some(RefKind::Embedded),
        (_, b"href") => Some(RefKind::Hyperlink),
        _ => None,
    }
}

struct Rewriter<'a> {
    book: &'a Book,
    doc_path: &'a str,
    options: &'a RewriteOptions,
    diagnostics: Vec<RewriteDiagnostic>,
}

impl Rewriter<'_> {
    /// New value for a reference attribute, or `None` to keep it as written.
    fn rewrite_reference(&mut self, kind: RefKind, attribute: &str, value: &str) -> Option<String> {
        let reference = value.trim();
        if reference.is_empty() || reference.starts_with('#') || has_scheme(reference) {
            return None;
        }
        let (target, fragment) = split_fragment(reference);
        if target.to_ascii_lowercase().ends_with(".css") {
            return None;
        }
        let path = resolve_relative(self.doc_path, &percent_decode(target));

        if kind == RefKind::Hyperlink && self.options.hyperlinks == HyperlinkPolicy::Resolve {
            return Some(match fragment {
                Some(fragment) => format!("{}#{}", path, fragment),
                None => path,
            });
        }

        let bytes = match self.book.read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("[REWRITE] {}: {} (from '{}')", self.doc_path, err, reference);
                self.diagnose(RewriteDiagnosticKind::AssetNotFound, attribute, value, path);
                return None;
            }
        };
        let Some(mime) = mime_from_path(&path).or_else(|| self.book.media_type_of(&path)) else {
            log::warn!("[REWRITE] {}: unknown media type for '{}'", self.doc_path, path);
            self.diagnose(RewriteDiagnosticKind::UnknownMediaType, attribute, value, path);
            return None;
        };
        Some(format!("data:{};base64,{}", mime, BASE64.encode(bytes)))
    }

    fn diagnose(&mut self, kind: RewriteDiagnosticKind, attribute: &str, value: &str, path: String) {
        self.diagnostics.push(RewriteDiagnostic {
            kind,
            attribute: attribute.to_string(),
            reference: value.to_string(),
            path,
        });
    }

    /// Serialize a start tag, dropping `style` and rewriting references.
    fn push_tag(
        &mut self,
        reader: &Reader<&[u8]>,
        e: &BytesStart<'_>,
        out: &mut String,
    ) -> Result<(), String> {
        let name = decode_name(e.name().into_inner())?;
        let local = e.local_name();
        out.push('<');
        out.push_str(name);

        for attr in e.attributes() {
            let attr = attr.map_err(|e| format!("Attr error: {:?}", e))?;
            let attr_local = attr.key.local_name();
            if attr_local.as_ref() == b"style" {
                continue;
            }
            let key = decode_name(attr.key.as_ref())?;
            let raw = raw_attr_value(reader, &attr)?;
            // Unexpandable references (`&nbsp;`) keep the value as written.
            let value = quick_xml::escape::unescape(&raw).ok();
            let rewritten = reference_kind(local.as_ref(), attr_local.as_ref()).and_then(|kind| {
                self.rewrite_reference(kind, key, value.as_deref().unwrap_or(&*raw))
            });
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            match rewritten.as_deref().or(value.as_deref()) {
                Some(value) => out.push_str(&escape(value)),
                None => out.push_str(&raw.replace('"', "&quot;")),
            }
            out.push('"');
        }
        Ok(())
    }
}

fn is_void(local: &[u8]) -> bool {
    VOID_ELEMENTS.iter().any(|name| name.as_bytes() == local)
}

fn decode_name(raw: &[u8]) -> Result<&str, String> {
    core::str::from_utf8(raw).map_err(|e| format!("Decode error: {:?}", e))
}

/// `<link rel="... stylesheet ...">` or `<style>`
fn is_stylesheet(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Result<bool, String> {
    match e.local_name().as_ref() {
        b"style" => Ok(true),
        b"link" => Ok(find_attr(reader, e, b"rel")?.is_some_and(|rel| {
            rel.split_whitespace()
                .any(|token| token.eq_ignore_ascii_case("stylesheet"))
        })),
        _ => Ok(false),
    }
}

fn push_reset_style(out: &mut String, prefix: Option<&str>) {
    let tag = match prefix {
        Some(prefix) => format!("{}:style", prefix),
        None => "style".to_string(),
    };
    out.push_str(&format!("<{}>{}</{}>", tag, RESET_STYLE, tag));
}

/// Namespace prefix of a qualified element name.
fn prefix_of(name: &[u8]) -> Option<String> {
    let name = core::str::from_utf8(name).ok()?;
    name.split_once(':').map(|(prefix, _)| prefix.to_string())
}

/// Rewrite one content document.
///
/// `target` is the chapter's archive path, optionally with a `#fragment`
/// that is carried into [`RewrittenDocument::fragment`]. Malformed markup
/// fails with the recoverable `ChapterParse`; missing assets only produce
/// diagnostics.
pub fn rewrite_chapter(
    book: &Book,
    markup: &[u8],
    target: &str,
    options: &RewriteOptions,
) -> Result<RewrittenDocument, EpubError> {
    let (doc_path, fragment) = split_fragment(target);
    let parse_error = |message: String| {
        log::warn!("[REWRITE] Could not parse '{}': {}", doc_path, message);
        EpubError::ChapterParse {
            path: doc_path.to_string(),
            message,
        }
    };

    let mut rewriter = Rewriter {
        book,
        doc_path,
        options,
        diagnostics: Vec::new(),
    };

    let mut reader = Reader::from_reader(markup);
    reader.config_mut().trim_text(false);

    let mut out = String::with_capacity(markup.len() + 64);
    out.push_str("<!DOCTYPE html>");

    let mut buf = Vec::new();
    let mut nesting = Nesting::default();
    // Depth inside an element being dropped (style block, stylesheet link)
    let mut skip_depth = 0usize;
    // Nesting depth of the open <head>, and its namespace prefix
    let mut head: Option<(usize, Option<String>)> = None;
    // Depth inside <svg>/<math>, where self-closing tags are kept
    let mut foreign_depth = 0usize;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| parse_error(format!("XML parse error: {:?}", e)))?;
        match event {
            Event::Start(e) => {
                nesting.start();
                if skip_depth > 0 {
                    skip_depth += 1;
                } else if head.is_some() && is_stylesheet(&reader, &e).map_err(parse_error)? {
                    skip_depth = 1;
                } else {
                    let local = e.local_name();
                    if local.as_ref() == b"head" && head.is_none() {
                        head = Some((nesting.depth(), prefix_of(e.name().as_ref())));
                    }
                    if foreign_depth > 0 || matches!(local.as_ref(), b"svg" | b"math") {
                        foreign_depth += 1;
                    }
                    rewriter
                        .push_tag(&reader, &e, &mut out)
                        .map_err(parse_error)?;
                    // `</br>` reads as a second `<br>` to an HTML parser.
                    out.push_str(if foreign_depth == 0 && is_void(local.as_ref()) {
                        "/>"
                    } else {
                        ">"
                    });
                }
            }
            Event::Empty(e) => {
                nesting.empty();
                let dropped = skip_depth > 0
                    || (head.is_some() && is_stylesheet(&reader, &e).map_err(parse_error)?);
                if !dropped {
                    rewriter
                        .push_tag(&reader, &e, &mut out)
                        .map_err(parse_error)?;
                    let name = decode_name(e.name().into_inner()).map_err(parse_error)?;
                    let local = decode_name(e.local_name().into_inner()).map_err(parse_error)?;
                    if local == "head" {
                        out.push('>');
                        push_reset_style(&mut out, prefix_of(e.name().as_ref()).as_deref());
                        out.push_str(&format!("</{}>", name));
                    } else if foreign_depth > 0 || is_void(local.as_bytes()) {
                        out.push_str("/>");
                    } else {
                        out.push_str(&format!("></{}>", name));
                    }
                }
            }
            Event::End(e) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                } else {
                    if let Some((depth, prefix)) = &head {
                        if *depth == nesting.depth() {
                            push_reset_style(&mut out, prefix.as_deref());
                        }
                    }
                    let void = foreign_depth == 0 && is_void(e.local_name().as_ref());
                    foreign_depth = foreign_depth.saturating_sub(1);
                    if !void {
                        let name = decode_name(e.name().into_inner()).map_err(parse_error)?;
                        out.push_str(&format!("</{}>", name));
                    }
                }
                if head.as_ref().is_some_and(|(depth, _)| *depth == nesting.depth()) {
                    head = None;
                }
                nesting.end();
            }
            Event::Text(e) => {
                nesting.text(&e).map_err(|msg| parse_error(msg.to_string()))?;
                if skip_depth == 0 && nesting.depth() > 0 {
                    out.push_str(&e.decode().map_err(|e| parse_error(format!("{:?}", e)))?);
                }
            }
            Event::GeneralRef(e) => {
                if skip_depth == 0 {
                    let name = e.decode().map_err(|e| parse_error(format!("{:?}", e)))?;
                    out.push('&');
                    out.push_str(&name);
                    out.push(';');
                }
            }
            Event::CData(e) => {
                if skip_depth == 0 {
                    let text = String::from_utf8_lossy(&e);
                    out.push_str(&escape(&*text));
                }
            }
            Event::Comment(e) => {
                if skip_depth == 0 && nesting.depth() > 0 {
                    out.push_str("<!--");
                    out.push_str(&String::from_utf8_lossy(&e));
                    out.push_str("-->");
                }
            }
            Event::Eof => break,
            // XML declaration, DOCTYPE and processing instructions
            _ => {}
        }
        buf.clear();
    }

    nesting
        .finish()
        .map_err(|msg| parse_error(msg.to_string()))?;

    log::debug!(
        "[REWRITE] '{}': {} bytes, {} unresolved references",
        doc_path,
        out.len(),
        rewriter.diagnostics.len()
    );
    Ok(RewrittenDocument {
        html: out,
        fragment: fragment.map(str::to_string),
        diagnostics: rewriter.diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::tests::build_stored_zip;

    const CONTAINER: &[u8] = br#"<container><rootfiles>
<rootfile full-path="OEBPS/content.opf"/>
</rootfiles></container>"#;

    const OPF: &[u8] = br#"<package><manifest>
<item id="c1" href="chapter1.xhtml" media-type="application/xhtml+xml"/>
<item id="c2" href="text/chapter2.xhtml" media-type="application/xhtml+xml"/>
<item id="cover" href="images/cover.jpg" media-type="image/jpeg"/>
<item id="fig" href="images/figure" media-type="image/png"/>
<item id="blob" href="data/blob" media-type=""/>
</manifest><spine><itemref idref="c1"/><itemref idref="c2"/></spine></package>"#;

    const JPEG: &[u8] = b"\xff\xd8\xff\xe0fakejpeg";

    fn book() -> Book {
        Book::from_bytes(build_stored_zip(&[
            ("mimetype", b"application/epub+zip"),
            ("META-INF/container.xml", CONTAINER),
            ("OEBPS/content.opf", OPF),
            ("OEBPS/chapter1.xhtml", b"<html/>"),
            ("OEBPS/text/chapter2.xhtml", b"<html/>"),
            ("OEBPS/images/cover.jpg", JPEG),
            ("OEBPS/images/figure", b"\x89PNG"),
            ("OEBPS/data/blob", b"\x00\x01"),
        ]))
        .unwrap()
    }

    fn rewrite(markup: &str, target: &str) -> RewrittenDocument {
        rewrite_chapter(&book(), markup.as_bytes(), target, &RewriteOptions::default()).unwrap()
    }

    /// Text content with all markup removed.
    fn text_of(html: &str) -> String {
        let mut text = String::new();
        let mut in_tag = false;
        for c in html.chars() {
            match c {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => text.push(c),
                _ => {}
            }
        }
        text
    }

    #[test]
    fn test_strips_presentation() {
        let doc = rewrite(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <title>Ch</title>
  <link rel="stylesheet" type="text/css" href="style.css"/>
  <link rel="alternate stylesheet" href="alt.css"></link>
  <style type="text/css">p { color: red; }</style>
  <meta charset="utf-8"/>
</head>
<body style="margin: 4em"><p style="color: blue" class="x">Hello <b>bold</b></p></body>
</html>"#,
            "OEBPS/chapter1.xhtml",
        );

        assert!(doc.html.starts_with("<!DOCTYPE html><html"));
        assert!(!doc.html.contains("<?xml"));
        assert!(!doc.html.contains("stylesheet"));
        assert!(!doc.html.contains("color: red"));
        assert!(!doc.html.contains("style=\""));
        assert!(doc.html.contains("<style>body { margin: 0; }</style></head>"));
        assert!(doc.html.contains("<meta charset=\"utf-8\"/>"));
        assert!(doc.html.contains("<p class=\"x\">Hello <b>bold</b></p>"));
        assert_eq!(doc.fragment, None);
        assert!(doc.diagnostics.is_empty());
    }

    #[test]
    fn test_text_round_trip() {
        let source = r#"<html xmlns="http://www.w3.org/1999/xhtml"><head><title>T</title></head>
<body><h1>Stave One</h1><p>Marley was dead: to begin with. There is no doubt
whatever about that &amp; more.</p><ul><li>one</li><li>two</li></ul></body></html>"#;
        let doc = rewrite(source, "OEBPS/chapter1.xhtml");
        let expected = text_of(source);
        let actual = text_of(&doc.html).replacen("body { margin: 0; }", "", 1);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_inlines_images() {
        let doc = rewrite(
            r#"<html><head/><body>
<img src="images/cover.jpg" alt="cover"/>
<img src="images/missing.png"/>
<img src="http://example.com/a.png"/>
<img src="data:image/png;base64,AAAA"/>
</body></html>"#,
            "OEBPS/chapter1.xhtml",
        );

        let expected = format!("src=\"data:image/jpeg;base64,{}\"", BASE64.encode(JPEG));
        assert!(doc.html.contains(&expected));
        assert!(doc.html.contains("src=\"images/missing.png\""));
        assert!(doc.html.contains("src=\"http://example.com/a.png\""));
        assert!(doc.html.contains("src=\"data:image/png;base64,AAAA\""));
        assert_eq!(
            doc.diagnostics,
            [RewriteDiagnostic {
                kind: RewriteDiagnosticKind::AssetNotFound,
                attribute: "src".to_string(),
                reference: "images/missing.png".to_string(),
                path: "OEBPS/images/missing.png".to_string(),
            }]
        );
        // Empty head still receives the reset style
        assert!(doc.html.contains("<head><style>body { margin: 0; }</style></head>"));
    }

    #[test]
    fn test_resolves_relative_to_chapter_directory() {
        let doc = rewrite(
            r#"<html><body><img src="../images/cover.jpg"/></body></html>"#,
            "OEBPS/text/chapter2.xhtml",
        );
        assert!(doc.html.contains("src=\"data:image/jpeg;base64,"));
        assert!(doc.diagnostics.is_empty());
    }

    #[test]
    fn test_svg_image_and_media_type_fallback() {
        let doc = rewrite(
            r#"<html><body>
<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink">
  <image xlink:href="images/figure" width="10" height="10"/>
</svg>
<object src="data/blob"></object>
</body></html>"#,
            "OEBPS/chapter1.xhtml",
        );
        assert!(doc.html.contains("xlink:href=\"data:image/png;base64,"));
        assert!(doc.html.contains("height=\"10\"/>"));
        assert!(doc.html.contains("src=\"data/blob\""));
        assert_eq!(doc.diagnostics.len(), 1);
        assert_eq!(
            doc.diagnostics[0].kind,
            RewriteDiagnosticKind::UnknownMediaType
        );
    }

    #[test]
    fn test_hyperlink_policy() {
        let markup = r##"<html><body>
<a href="text/chapter2.xhtml#s1">next</a>
<a href="#local">here</a>
<a href="mailto:someone@example.com">mail</a>
<link rel="stylesheet" href="extra.css"/>
</body></html>"##;

        let doc = rewrite(markup, "OEBPS/chapter1.xhtml#top");
        assert!(doc.html.contains("href=\"OEBPS/text/chapter2.xhtml#s1\""));
        assert!(doc.html.contains("href=\"#local\""));
        assert!(doc.html.contains("href=\"mailto:someone@example.com\""));
        assert!(doc.html.contains("href=\"extra.css\""));
        assert_eq!(doc.fragment.as_deref(), Some("top"));

        let inline = RewriteOptions::default().with_hyperlinks(HyperlinkPolicy::Inline);
        let doc = rewrite_chapter(&book(), markup.as_bytes(), "OEBPS/chapter1.xhtml", &inline)
            .unwrap();
        let expected = format!(
            "href=\"data:application/xhtml+xml;base64,{}\"",
            BASE64.encode(b"<html/>")
        );
        assert!(doc.html.contains(&expected));
    }

    #[test]
    fn test_non_void_empty_elements_are_expanded() {
        let doc = rewrite(
            r#"<html><body><div id="a"/><br/><p>x</p></body></html>"#,
            "OEBPS/chapter1.xhtml",
        );
        assert!(doc.html.contains("<div id=\"a\"></div><br/>"));
    }

    #[test]
    fn test_void_end_tags_are_dropped() {
        let doc = rewrite(
            r#"<html><body><p>a<br></br>b<img src="images/cover.jpg"></img></p></body></html>"#,
            "OEBPS/chapter1.xhtml",
        );
        assert!(doc.html.contains("<p>a<br/>b<img src=\"data:image/jpeg;base64,"));
        assert!(!doc.html.contains("</br>"));
        assert!(!doc.html.contains("</img>"));
        assert!(doc.html.ends_with("</p></body></html>"));
    }

    #[test]
    fn test_attribute_entities_kept_as_written() {
        let doc = rewrite(
            r#"<html><body><img src="images/cover.jpg" alt="A&nbsp;B"/><p title="x &amp; y" class='say "hi"'>t</p></body></html>"#,
            "OEBPS/chapter1.xhtml",
        );
        assert!(doc.html.contains("alt=\"A&nbsp;B\""));
        assert!(!doc.html.contains("&amp;nbsp;"));
        assert!(doc.html.contains("title=\"x &amp; y\""));
        assert!(doc.html.contains("class=\"say &quot;hi&quot;\""));
    }

    #[test]
    fn test_entities_and_cdata_survive() {
        let doc = rewrite(
            r#"<html><body><p>A&nbsp;B &lt;c&gt; <![CDATA[x < y]]></p></body></html>"#,
            "OEBPS/chapter1.xhtml",
        );
        assert!(doc.html.contains("<p>A&nbsp;B &lt;c&gt; x &lt; y</p>"));
    }

    #[test]
    fn test_malformed_chapter() {
        for markup in [
            "<html><body><p>unclosed</body></html>",
            "<html><body><p>truncated",
            "not markup at all",
        ] {
            let err = rewrite_chapter(
                &book(),
                markup.as_bytes(),
                "OEBPS/chapter1.xhtml",
                &RewriteOptions::default(),
            )
            .unwrap_err();
            assert!(matches!(err, EpubError::ChapterParse { ref path, .. } if path == "OEBPS/chapter1.xhtml"));
            assert!(err.is_recoverable());
        }
    }

    #[test]
    fn test_data_uri() {
        let doc = RewrittenDocument {
            html: "<!DOCTYPE html><p>hi</p>".to_string(),
            fragment: None,
            diagnostics: Vec::new(),
        };
        assert_eq!(
            doc.to_data_uri(),
            format!("data:text/html;base64,{}", BASE64.encode("<!DOCTYPE html><p>hi</p>"))
        );
    }

    #[test]
    fn test_mime_from_path() {
        assert_eq!(mime_from_path("OEBPS/images/cover.JPG"), Some("image/jpeg"));
        assert_eq!(mime_from_path("images/figure.svg"), Some("image/svg+xml"));
        assert_eq!(mime_from_path("text/c1.xhtml"), Some("application/xhtml+xml"));
        assert_eq!(mime_from_path("images.d/figure"), None);
        assert_eq!(mime_from_path("noext"), None);
    }
}

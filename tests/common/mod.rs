//! In-memory EPUB fixtures shared by the integration tests.

#![allow(dead_code)]

pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// 1x1 JPEG header bytes; only the bytes matter, not the pixels.
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

const SIG_LOCAL_FILE_HEADER: u32 = 0x04034b50;
const SIG_CD_ENTRY: u32 = 0x02014b50;
const SIG_EOCD: u32 = 0x06054b50;

/// Build a ZIP archive. Entries flagged `true` are deflated, the rest stored.
pub fn build_zip(files: &[(&str, &[u8], bool)]) -> Vec<u8> {
    let mut zip = Vec::new();
    let mut central = Vec::new();

    for (filename, content, deflate) in files {
        let (method, data) = if *deflate {
            (8u16, miniz_oxide::deflate::compress_to_vec(content, 6))
        } else {
            (0u16, content.to_vec())
        };
        let name = filename.as_bytes();
        let crc = crc32fast::hash(content);
        let local_offset = zip.len() as u32;

        zip.extend_from_slice(&SIG_LOCAL_FILE_HEADER.to_le_bytes());
        zip.extend_from_slice(&20u16.to_le_bytes());
        zip.extend_from_slice(&0u16.to_le_bytes());
        zip.extend_from_slice(&method.to_le_bytes());
        zip.extend_from_slice(&0u32.to_le_bytes()); // mod time + date
        zip.extend_from_slice(&crc.to_le_bytes());
        zip.extend_from_slice(&(data.len() as u32).to_le_bytes());
        zip.extend_from_slice(&(content.len() as u32).to_le_bytes());
        zip.extend_from_slice(&(name.len() as u16).to_le_bytes());
        zip.extend_from_slice(&0u16.to_le_bytes());
        zip.extend_from_slice(name);
        zip.extend_from_slice(&data);

        central.extend_from_slice(&SIG_CD_ENTRY.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&method.to_le_bytes());
        central.extend_from_slice(&0u32.to_le_bytes());
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(content.len() as u32).to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&[0u8; 12]); // extra, comment, disk, attrs
        central.extend_from_slice(&local_offset.to_le_bytes());
        central.extend_from_slice(name);
    }

    let cd_offset = zip.len() as u32;
    zip.extend_from_slice(&central);
    zip.extend_from_slice(&SIG_EOCD.to_le_bytes());
    zip.extend_from_slice(&0u32.to_le_bytes()); // disk numbers
    zip.extend_from_slice(&(files.len() as u16).to_le_bytes());
    zip.extend_from_slice(&(files.len() as u16).to_le_bytes());
    zip.extend_from_slice(&(central.len() as u32).to_le_bytes());
    zip.extend_from_slice(&cd_offset.to_le_bytes());
    zip.extend_from_slice(&0u16.to_le_bytes());
    zip
}

/// Minimal XHTML chapter with `body` as its body markup.
pub fn chapter(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{title}</title><link rel="stylesheet" href="../styles/book.css"/><style>p {{ color: red; }}</style></head>
<body>{body}</body>
</html>"#
    )
}

/// Package document with `items` as (id, href, media-type, properties) and
/// `spine` as idrefs.
pub fn package(items: &[(&str, &str, &str, &str)], spine: &[&str], toc: Option<&str>) -> String {
    let mut manifest = String::new();
    for (id, href, media_type, properties) in items {
        manifest.push_str(&format!(
            r#"    <item id="{id}" href="{href}" media-type="{media_type}""#
        ));
        if !properties.is_empty() {
            manifest.push_str(&format!(r#" properties="{properties}""#));
        }
        manifest.push_str("/>\n");
    }
    let mut itemrefs = String::new();
    for idref in spine {
        itemrefs.push_str(&format!("    <itemref idref=\"{idref}\"/>\n"));
    }
    let toc_attr = toc.map(|id| format!(r#" toc="{id}""#)).unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:fixture</dc:identifier>
    <dc:title>A Christmas Carol</dc:title>
    <dc:creator>Charles Dickens</dc:creator>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine{toc_attr}>
{itemrefs}  </spine>
</package>"#
    )
}

/// Archive with the standard `mimetype` and container entries prepended.
pub fn epub<S: AsRef<str>>(files: &[(S, Vec<u8>)]) -> Vec<u8> {
    let mut entries: Vec<(&str, &[u8], bool)> = vec![
        ("mimetype", b"application/epub+zip".as_slice(), false),
        ("META-INF/container.xml", CONTAINER_XML.as_bytes(), true),
    ];
    for (name, data) in files {
        entries.push((name.as_ref(), data.as_slice(), true));
    }
    build_zip(&entries)
}

/// Spine documents of the Christmas Carol fixture, in reading order.
pub const CAROL_SPINE: &[(&str, &str)] = &[
    ("cover", "text/cover.xhtml"),
    ("title", "text/title.xhtml"),
    ("preface", "text/preface.xhtml"),
    ("contents", "text/contents.xhtml"),
    ("stave1", "text/stave1.xhtml"),
    ("stave2", "text/stave2.xhtml"),
    ("stave3", "text/stave3.xhtml"),
    ("stave4", "text/stave4.xhtml"),
    ("stave5", "text/stave5.xhtml"),
];

/// Navigation document producing 24 flattened entries; entry 12 is
/// "STAVE TWO.".
pub fn carol_nav() -> String {
    let mut list = String::new();
    for (label, href) in [
        ("Cover", "cover.xhtml"),
        ("Title Page", "title.xhtml"),
        ("Preface", "preface.xhtml"),
        ("Contents", "contents.xhtml"),
    ] {
        list.push_str(&format!(
            r#"<li><a href="../text/{href}">{label}</a></li>"#
        ));
    }
    let staves: [(&str, &str, usize); 5] = [
        ("STAVE ONE.", "stave1.xhtml", 7),
        ("STAVE TWO.", "stave2.xhtml", 5),
        ("STAVE THREE.", "stave3.xhtml", 3),
        ("STAVE FOUR.", "stave4.xhtml", 0),
        ("STAVE FIVE.", "stave5.xhtml", 0),
    ];
    for (label, href, sections) in staves {
        list.push_str(&format!(r#"<li><a href="../text/{href}">{label}</a>"#));
        if sections > 0 {
            list.push_str("<ol>");
            for n in 1..=sections {
                list.push_str(&format!(
                    r##"<li><a href="../text/{href}#s{n}">Part {n}</a></li>"##
                ));
            }
            list.push_str("</ol>");
        }
        list.push_str("</li>");
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Contents</title></head>
<body>
  <nav epub:type="landmarks"><ol><li><a href="../text/cover.xhtml">Cover</a></li></ol></nav>
  <nav epub:type="toc" id="toc"><h1>Contents</h1><ol>{list}</ol></nav>
</body>
</html>"#
    )
}

/// The Christmas Carol fixture: nine spine documents, an XHTML nav, one
/// image referenced from STAVE ONE. and a stylesheet.
pub fn carol_epub() -> Vec<u8> {
    let mut items: Vec<(&str, &str, &str, &str)> = vec![
        ("nav", "nav/nav.xhtml", "application/xhtml+xml", "nav"),
        ("css", "styles/book.css", "text/css", ""),
        ("marley", "images/marley.jpg", "image/jpeg", ""),
    ];
    for (id, href) in CAROL_SPINE {
        items.push((*id, *href, "application/xhtml+xml", ""));
    }
    let spine: Vec<&str> = CAROL_SPINE.iter().map(|(id, _)| *id).collect();

    let mut files: Vec<(String, Vec<u8>)> = vec![
        (
            "OEBPS/content.opf".to_string(),
            package(&items, &spine, None).into_bytes(),
        ),
        ("OEBPS/nav/nav.xhtml".to_string(), carol_nav().into_bytes()),
        (
            "OEBPS/styles/book.css".to_string(),
            b"body { font-family: serif; }".to_vec(),
        ),
        ("OEBPS/images/marley.jpg".to_string(), JPEG_BYTES.to_vec()),
    ];
    for (id, href) in CAROL_SPINE {
        let body = match *id {
            "stave1" => r#"<h2 id="s1">MARLEY'S GHOST.</h2><p>Marley was dead: to begin with.</p><img src="../images/marley.jpg" alt="Marley"/><img src="../images/missing.png" alt="Lost"/>"#.to_string(),
            "stave2" => r#"<h2 id="s1">THE FIRST OF THE THREE SPIRITS.</h2><p>When Scrooge awoke, it was so dark.</p>"#.to_string(),
            other => format!("<p>{other}</p>"),
        };
        files.push((
            format!("OEBPS/{href}"),
            chapter(id, &body).into_bytes(),
        ));
    }

    epub(&files)
}

use std::env;
use std::process::ExitCode;

use mu_epub_view::metadata::EpubMetadata;
use mu_epub_view::rewrite::{
    rewrite_chapter, HyperlinkPolicy, RewriteDiagnostic, RewriteDiagnosticKind, RewriteOptions,
};
use mu_epub_view::{Book, EpubError};

/// Minimal JSON value for CLI output.
#[derive(Clone, Debug)]
enum Json {
    Null,
    Bool(bool),
    Num(usize),
    Str(String),
    Arr(Vec<Json>),
    Obj(Vec<(String, Json)>),
}

impl From<bool> for Json {
    fn from(v: bool) -> Self {
        Json::Bool(v)
    }
}

impl From<usize> for Json {
    fn from(v: usize) -> Self {
        Json::Num(v)
    }
}

impl From<&str> for Json {
    fn from(v: &str) -> Self {
        Json::Str(v.to_string())
    }
}

impl From<String> for Json {
    fn from(v: String) -> Self {
        Json::Str(v)
    }
}

impl<T: Into<Json>> From<Option<T>> for Json {
    fn from(v: Option<T>) -> Self {
        v.map_or(Json::Null, Into::into)
    }
}

impl<T: Into<Json>> From<Vec<T>> for Json {
    fn from(v: Vec<T>) -> Self {
        Json::Arr(v.into_iter().map(Into::into).collect())
    }
}

fn obj<const N: usize>(fields: [(&str, Json); N]) -> Json {
    Json::Obj(
        fields
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    )
}

impl Json {
    fn render(&self, pretty: bool) -> String {
        let mut out = String::new();
        self.write(&mut out, pretty.then_some(0));
        out
    }

    /// `indent` is the current depth in pretty mode, `None` for compact output.
    fn write(&self, out: &mut String, indent: Option<usize>) {
        match self {
            Json::Null => out.push_str("null"),
            Json::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
            Json::Num(v) => out.push_str(&v.to_string()),
            Json::Str(v) => write_string(out, v),
            Json::Arr(items) => {
                write_seq(out, indent, ('[', ']'), items, |out, item, inner| {
                    item.write(out, inner)
                });
            }
            Json::Obj(fields) => {
                write_seq(out, indent, ('{', '}'), fields, |out, (key, value), inner| {
                    write_string(out, key);
                    out.push_str(if inner.is_some() { ": " } else { ":" });
                    value.write(out, inner);
                });
            }
        }
    }
}

fn write_seq<T>(
    out: &mut String,
    indent: Option<usize>,
    (open, close): (char, char),
    items: &[T],
    mut write_item: impl FnMut(&mut String, &T, Option<usize>),
) {
    out.push(open);
    let inner = indent.map(|depth| depth + 1);
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        if let Some(depth) = inner {
            out.push('\n');
            out.push_str(&"  ".repeat(depth));
        }
        write_item(out, item, inner);
    }
    if let (Some(depth), false) = (indent, items.is_empty()) {
        out.push('\n');
        out.push_str(&"  ".repeat(depth));
    }
    out.push(close);
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c <= '\u{1f}' => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn main() -> ExitCode {
    match run(env::args().skip(1).collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {}", msg);
            ExitCode::FAILURE
        }
    }
}

fn run(mut args: Vec<String>) -> Result<(), String> {
    let pretty = take_flag(&mut args, "--pretty");
    if args.is_empty() || take_flag(&mut args, "--help") || take_flag(&mut args, "-h") {
        print_help();
        return Ok(());
    }

    let command = args.remove(0);
    let output = match command.as_str() {
        "metadata" => {
            let (path, book) = open_book(&args, "metadata")?;
            obj([
                ("epub", path.into()),
                ("package", book.package_path().into()),
                ("metadata", metadata_json(book.metadata())),
            ])
        }
        "spine" => {
            let (path, book) = open_book(&args, "spine")?;
            let spine = book
                .spine()
                .items()
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    obj([
                        ("index", index.into()),
                        ("idref", item.idref.as_str().into()),
                        ("path", item.path.as_str().into()),
                        ("linear", item.linear.into()),
                    ])
                })
                .collect::<Vec<_>>();
            obj([
                ("epub", path.into()),
                ("count", spine.len().into()),
                ("spine", spine.into()),
            ])
        }
        "toc" => {
            let (path, book) = open_book(&args, "toc")?;
            let toc = book
                .toc()
                .iter()
                .map(|entry| {
                    obj([
                        ("title", entry.title.as_str().into()),
                        ("url", entry.url.as_str().into()),
                        ("depth", entry.depth.into()),
                        ("spine_index", book.spine_index_of(&entry.url).into()),
                    ])
                })
                .collect::<Vec<_>>();
            obj([
                ("epub", path.into()),
                ("count", toc.len().into()),
                ("toc", toc.into()),
            ])
        }
        "chapter" => {
            let raw = take_flag(&mut args, "--raw");
            let options = if take_flag(&mut args, "--inline-links") {
                RewriteOptions::default().with_hyperlinks(HyperlinkPolicy::Inline)
            } else {
                RewriteOptions::default()
            };
            let selector = take_selector(&mut args)?;
            let (path, book) = open_book(&args, "chapter")?;
            let target = selector.resolve(&book)?;

            let markup = book.read(&target).map_err(display_err)?;
            let doc = rewrite_chapter(&book, &markup, &target, &options).map_err(display_err)?;
            if raw {
                print!("{}", doc.html);
                return Ok(());
            }
            let diagnostics = doc.diagnostics.iter().map(diagnostic_json).collect::<Vec<_>>();
            obj([
                ("epub", path.into()),
                ("chapter", target.into()),
                ("fragment", doc.fragment.into()),
                ("diagnostics", diagnostics.into()),
                ("html", doc.html.into()),
            ])
        }
        _ => {
            return Err(format!(
                "unknown command '{}'; run `mu-epub-view --help` for usage",
                command
            ));
        }
    };

    println!("{}", output.render(pretty));
    Ok(())
}

fn open_book(args: &[String], command: &str) -> Result<(String, Book), String> {
    let path = args
        .first()
        .cloned()
        .ok_or_else(|| format!("{} requires <epub_path>", command))?;
    let book = Book::open(&path).map_err(display_err)?;
    Ok((path, book))
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|a| a != flag);
    args.len() != before
}

/// Remove `flag <value>` from `args` and return the value.
fn take_option(args: &mut Vec<String>, flag: &str) -> Result<Option<String>, String> {
    let Some(pos) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        return Err(format!("{} requires a value", flag));
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

/// Which chapter `chapter` renders.
#[derive(Clone, Debug)]
enum ChapterSelector {
    Index(usize),
    Path(String),
}

impl ChapterSelector {
    fn resolve(self, book: &Book) -> Result<String, String> {
        match self {
            ChapterSelector::Index(index) => book
                .spine()
                .path(index)
                .map(str::to_string)
                .ok_or_else(|| {
                    format!(
                        "spine index {} out of range ({} entries)",
                        index,
                        book.spine().len()
                    )
                }),
            ChapterSelector::Path(path) => Ok(path),
        }
    }
}

fn take_selector(args: &mut Vec<String>) -> Result<ChapterSelector, String> {
    let index = take_option(args, "--index")?;
    let path = take_option(args, "--path")?;
    match (index, path) {
        (Some(_), Some(_)) => {
            Err("use only one selector: --index <n> or --path <archive_path>".to_string())
        }
        (Some(value), None) => value
            .parse::<usize>()
            .map(ChapterSelector::Index)
            .map_err(|_| format!("invalid --index value '{}'", value)),
        (None, Some(path)) => Ok(ChapterSelector::Path(path)),
        (None, None) => Ok(ChapterSelector::Index(0)),
    }
}

fn metadata_json(metadata: &EpubMetadata) -> Json {
    let manifest = metadata
        .manifest
        .iter()
        .map(|item| {
            obj([
                ("id", item.id.as_str().into()),
                ("href", item.href.as_str().into()),
                ("path", item.path.as_str().into()),
                ("media_type", item.media_type.as_str().into()),
                ("properties", item.properties.as_deref().into()),
            ])
        })
        .collect::<Vec<_>>();

    obj([
        ("title", metadata.title.as_str().into()),
        ("author", metadata.author.as_str().into()),
        ("language", metadata.language.as_str().into()),
        ("identifier", metadata.identifier.as_deref().into()),
        ("publisher", metadata.publisher.as_deref().into()),
        ("date", metadata.date.as_deref().into()),
        ("description", metadata.description.as_deref().into()),
        ("subjects", metadata.subjects.clone().into()),
        ("cover_id", metadata.cover_id.as_deref().into()),
        ("manifest_count", manifest.len().into()),
        ("manifest", manifest.into()),
    ])
}

fn diagnostic_json(diag: &RewriteDiagnostic) -> Json {
    let kind = match diag.kind {
        RewriteDiagnosticKind::AssetNotFound => "asset_not_found",
        RewriteDiagnosticKind::UnknownMediaType => "unknown_media_type",
    };
    obj([
        ("kind", kind.into()),
        ("attribute", diag.attribute.as_str().into()),
        ("reference", diag.reference.as_str().into()),
        ("path", diag.path.as_str().into()),
    ])
}

fn display_err(err: EpubError) -> String {
    err.to_string()
}

fn print_help() {
    let help = r#"mu-epub-view - inspect and render EPUB files

USAGE:
  mu-epub-view [--pretty] <command> [args...]

COMMANDS:
  metadata <epub_path>
  spine <epub_path>
  toc <epub_path>
  chapter <epub_path> [--index <n> | --path <archive_path>] [--raw] [--inline-links]

NOTES:
  - Output is JSON by default.
  - `chapter` renders spine entry 0 unless a selector is given, with
    embedded assets inlined as data URIs.
  - `chapter --raw` emits the document markup only.
"#;
    println!("{}", help);
}

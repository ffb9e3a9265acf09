//! Reading session over a [`Book`]
//!
//! A [`Rendition`] tracks the current spine position and pushes rewritten
//! chapters into a host document through a [`HostAdapter`]: each chapter is
//! loaded into one `iframe` as a `data:` URI. The table of contents and the
//! previous/next controls are built and kept in sync through the same
//! adapter.

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::book::Book;
use crate::error::EpubError;
use crate::host::{HostAdapter, NavAction};
use crate::path::split_fragment;
use crate::rewrite::{rewrite_chapter, RewriteOptions};

/// Inline style of the chapter frame.
pub const IFRAME_STYLE: &str = "width: 100%; height: 100%; border: none;";

/// Placeholder shown when chapter markup cannot be parsed.
pub const PARSE_ERROR_TEXT: &str = "Error loading chapter: Could not parse XML.";

/// Spine position of a reading session.
///
/// Starts at index 0 with nothing shown. Only explicit navigation moves it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenditionState {
    current: usize,
    shown: bool,
}

impl RenditionState {
    /// Index of the current spine entry.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Whether a spine chapter has been displayed.
    pub fn is_showing(&self) -> bool {
        self.shown
    }

    /// Move to `index` and mark it shown.
    pub fn go_to(&mut self, index: usize) {
        self.current = index;
        self.shown = true;
    }

    /// Advance within a spine of `len` entries; `None` at the last entry.
    pub fn next(&mut self, len: usize) -> Option<usize> {
        if self.current + 1 < len {
            self.go_to(self.current + 1);
            Some(self.current)
        } else {
            None
        }
    }

    /// Step back; `None` at index 0.
    pub fn previous(&mut self) -> Option<usize> {
        if self.current > 0 {
            self.go_to(self.current - 1);
            Some(self.current)
        } else {
            None
        }
    }
}

/// Interactive view of a book inside a host document
pub struct Rendition<H: HostAdapter> {
    book: Arc<Book>,
    host: H,
    target: H::Handle,
    iframe: H::Handle,
    options: RewriteOptions,
    state: RenditionState,
    /// TOC anchors and the url each one displays
    toc_links: Vec<(H::Handle, String)>,
    /// Heading and list of the rendered TOC
    toc_nodes: Vec<H::Handle>,
    /// Previous and next buttons
    controls: Option<(H::Handle, H::Handle)>,
}

impl<H: HostAdapter> Rendition<H> {
    /// Bind a book to the host element `target_id`.
    pub fn new(book: Arc<Book>, host: H, target_id: &str) -> Result<Self, EpubError> {
        Self::with_options(book, host, target_id, RewriteOptions::default())
    }

    /// Bind a book with explicit rewrite options.
    pub fn with_options(
        book: Arc<Book>,
        mut host: H,
        target_id: &str,
        options: RewriteOptions,
    ) -> Result<Self, EpubError> {
        let target = lookup(&mut host, target_id)?;
        let iframe = host.create_element("iframe");
        host.set_attribute(&iframe, "style", IFRAME_STYLE);

        Ok(Self {
            book,
            host,
            target,
            iframe,
            options,
            state: RenditionState::default(),
            toc_links: Vec::new(),
            toc_nodes: Vec::new(),
            controls: None,
        })
    }

    /// Display a chapter.
    ///
    /// `None` shows the first spine entry. A target whose path is in the
    /// spine becomes the current position; any other target is rendered
    /// without moving it. An empty spine makes this a no-op.
    pub fn display(&mut self, target: Option<&str>) -> Result<(), EpubError> {
        let spine = self.book.spine();
        if spine.is_empty() {
            return Ok(());
        }
        let target = match target {
            Some(target) => target.to_string(),
            None => spine.path(0).unwrap_or_default().to_string(),
        };

        match self.book.spine_index_of(&target) {
            Some(index) => self.state.go_to(index),
            None => log::debug!("[RENDITION] '{}' is outside the spine", target),
        }
        self.render(&target)
    }

    /// Show the next spine entry; no-op at the last one.
    pub fn next(&mut self) -> Result<(), EpubError> {
        match self.state.next(self.book.spine().len()) {
            Some(index) => self.render_index(index),
            None => Ok(()),
        }
    }

    /// Show the previous spine entry; no-op at the first one.
    pub fn previous(&mut self) -> Result<(), EpubError> {
        match self.state.previous() {
            Some(index) => self.render_index(index),
            None => Ok(()),
        }
    }

    /// Carry out an action wired with [`HostAdapter::on_click`].
    pub fn dispatch(&mut self, action: NavAction) -> Result<(), EpubError> {
        match action {
            NavAction::Display(url) => self.display(Some(&url)),
            NavAction::Next => self.next(),
            NavAction::Previous => self.previous(),
        }
    }

    /// Render the table of contents into `container_id`.
    ///
    /// Produces `<h3>Contents</h3><ul><li><a href="#">title</a></li>...</ul>`
    /// with each anchor wired to display its entry.
    pub fn display_toc(&mut self, container_id: &str) -> Result<(), EpubError> {
        let container = lookup(&mut self.host, container_id)?;
        for node in self.toc_nodes.drain(..) {
            self.host.remove_element(&node);
        }
        self.host.clear_children(&container);

        let heading = self.host.create_element("h3");
        self.host.set_text_content(&heading, "Contents");
        self.host.append_child(&container, &heading);

        let list = self.host.create_element("ul");
        self.toc_links.clear();
        for entry in self.book.toc() {
            let item = self.host.create_element("li");
            let anchor = self.host.create_element("a");
            self.host.set_attribute(&anchor, "href", "#");
            self.host.set_text_content(&anchor, &entry.title);
            self.host
                .on_click(&anchor, NavAction::Display(entry.url.clone()));
            self.host.append_child(&item, &anchor);
            self.host.append_child(&list, &item);
            self.toc_links.push((anchor, entry.url.clone()));
        }
        self.host.append_child(&container, &list);
        self.toc_nodes = alloc::vec![heading, list];
        log::debug!("[RENDITION] TOC rendered with {} entries", self.toc_links.len());

        self.update_controls();
        Ok(())
    }

    /// Wire the previous/next buttons and sync their state.
    pub fn setup_controls(&mut self, prev_id: &str, next_id: &str) -> Result<(), EpubError> {
        let prev = lookup(&mut self.host, prev_id)?;
        let next = lookup(&mut self.host, next_id)?;
        self.host.on_click(&prev, NavAction::Previous);
        self.host.on_click(&next, NavAction::Next);
        self.controls = Some((prev, next));
        self.update_controls();
        Ok(())
    }

    /// Sync the controls and TOC highlight with the current position.
    ///
    /// `prev` is disabled at the first entry and `next` at the last; the TOC
    /// anchors pointing into the current chapter get `class="active"`.
    pub fn update_controls(&mut self) {
        let len = self.book.spine().len();
        let current = self.state.current();

        if let Some((prev, next)) = &self.controls {
            set_flag(&mut self.host, prev, "disabled", current == 0);
            set_flag(&mut self.host, next, "disabled", current + 1 >= len);
        }

        let current_path = self.book.spine().path(current).unwrap_or_default();
        for (anchor, url) in &self.toc_links {
            let class = if split_fragment(url).0 == current_path {
                "active"
            } else {
                ""
            };
            self.host.set_attribute(anchor, "class", class);
        }
    }

    /// Index of the current spine entry.
    pub fn current_index(&self) -> usize {
        self.state.current()
    }

    /// Whether a spine chapter has been displayed.
    pub fn is_showing(&self) -> bool {
        self.state.is_showing()
    }

    /// Navigation state.
    pub fn state(&self) -> RenditionState {
        self.state
    }

    /// The book being read.
    pub fn book(&self) -> &Arc<Book> {
        &self.book
    }

    /// Host adapter.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Host adapter, mutably.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The chapter frame element.
    pub fn iframe(&self) -> &H::Handle {
        &self.iframe
    }

    fn render_index(&mut self, index: usize) -> Result<(), EpubError> {
        let path = self
            .book
            .spine()
            .path(index)
            .map(str::to_string)
            .unwrap_or_default();
        self.render(&path)
    }

    /// Rewrite `target` and load it into the frame.
    ///
    /// Errors still leave the controls in sync so the reader can move on.
    fn render(&mut self, target: &str) -> Result<(), EpubError> {
        let result = self.load(target);
        self.update_controls();
        result
    }

    fn load(&mut self, target: &str) -> Result<(), EpubError> {
        let (path, _) = split_fragment(target);
        let book = Arc::clone(&self.book);

        let markup = match book.read(path) {
            Ok(markup) => markup,
            Err(err) => {
                log::warn!("[RENDITION] Chapter '{}' unavailable: {}", path, err);
                let text = format!("Error loading chapter: {} not found.", path);
                self.host.set_text_content(&self.target, &text);
                return Err(err);
            }
        };

        let doc = match rewrite_chapter(&book, &markup, target, &self.options) {
            Ok(doc) => doc,
            Err(err) => {
                log::warn!("[RENDITION] {}", err);
                self.host.set_text_content(&self.target, PARSE_ERROR_TEXT);
                return Err(err);
            }
        };

        self.host
            .set_attribute(&self.iframe, "src", &doc.to_data_uri());
        match &doc.fragment {
            Some(fragment) => {
                let script = format!(
                    "this.contentWindow.location.hash = '#{}'",
                    encode_fragment(fragment)
                );
                self.host.set_attribute(&self.iframe, "onload", &script);
            }
            None => self.host.remove_attribute(&self.iframe, "onload"),
        }
        self.host.clear_children(&self.target);
        self.host.append_child(&self.target, &self.iframe);
        log::debug!("[RENDITION] Displayed '{}'", target);
        Ok(())
    }
}

/// Percent-encode a fragment for the `onload` script.
///
/// Only unreserved characters pass through, so the value can neither close
/// the script's string literal nor the attribute around it.
fn encode_fragment(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    for byte in fragment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'~' | b':' | b'-') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn lookup<H: HostAdapter>(host: &mut H, id: &str) -> Result<H::Handle, EpubError> {
    host.get_element_by_id(id)
        .ok_or_else(|| EpubError::ElementNotFound { id: id.to_string() })
}

fn set_flag<H: HostAdapter>(host: &mut H, element: &H::Handle, name: &str, on: bool) {
    if on {
        host.set_attribute(element, name, name);
    } else {
        host.remove_attribute(element, name);
    }
}

//! Host document adapter
//!
//! The rendition never touches a concrete UI. Everything it needs from the
//! host document goes through [`HostAdapter`]: element lookup and creation,
//! text and attribute mutation, child insertion, and click wiring. Clicks
//! come back to the rendition as [`NavAction`] values passed to
//! [`Rendition::dispatch`](crate::rendition::Rendition::dispatch).
//!
//! [`MemoryHost`] is a small in-memory element tree implementing the trait,
//! for headless use and tests.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// Navigation requested by a wired host element
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NavAction {
    /// Display a chapter path, optionally with `#fragment`
    Display(String),
    /// Advance to the next spine entry
    Next,
    /// Go back to the previous spine entry
    Previous,
}

/// Capability set a host document provides to a rendition.
pub trait HostAdapter {
    /// Reference to a host element.
    type Handle: Clone;

    /// Look up an element by its `id`.
    fn get_element_by_id(&mut self, id: &str) -> Option<Self::Handle>;

    /// Create a detached element.
    fn create_element(&mut self, tag: &str) -> Self::Handle;

    /// Replace the element's content with `text`.
    fn set_text_content(&mut self, element: &Self::Handle, text: &str);

    /// Set an attribute value.
    fn set_attribute(&mut self, element: &Self::Handle, name: &str, value: &str);

    /// Remove an attribute if present.
    fn remove_attribute(&mut self, element: &Self::Handle, name: &str);

    /// Append `child` as the last child of `parent`.
    fn append_child(&mut self, parent: &Self::Handle, child: &Self::Handle);

    /// Remove every child of the element.
    fn clear_children(&mut self, element: &Self::Handle);

    /// Discard an element created by the rendition, along with its subtree.
    ///
    /// Called for nodes the rendition replaces, such as a previous table of
    /// contents. Hosts whose documents collect detached nodes on their own
    /// can keep the default no-op.
    fn remove_element(&mut self, element: &Self::Handle) {
        let _ = element;
    }

    /// Wire a click on `element` to `action`.
    ///
    /// The host is expected to suppress the default click behaviour and hand
    /// `action` to the rendition.
    fn on_click(&mut self, element: &Self::Handle, action: NavAction);
}

/// Index of an element inside a [`MemoryHost`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(usize);

/// One element of a [`MemoryHost`] tree
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryElement {
    /// Tag name
    pub tag: String,
    /// Attributes by name
    pub attributes: BTreeMap<String, String>,
    /// Text set with `set_text_content`
    pub text: String,
    /// Child elements in order
    pub children: Vec<ElementId>,
    /// Action wired with `on_click`
    pub on_click: Option<NavAction>,
}

/// In-memory element tree implementing [`HostAdapter`]
///
/// Slots of removed elements are reused by later `create_element` calls, so
/// an [`ElementId`] must not be used after its element was removed.
#[derive(Clone, Debug, Default)]
pub struct MemoryHost {
    elements: Vec<MemoryElement>,
    free: Vec<usize>,
}

impl MemoryHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level element carrying `id`, like static markup in a page.
    pub fn add_element(&mut self, tag: &str, id: &str) -> ElementId {
        let handle = self.create_element(tag);
        self.set_attribute(&handle, "id", id);
        handle
    }

    /// Element carrying the `id` attribute `id`.
    pub fn find_by_id(&self, id: &str) -> Option<ElementId> {
        self.elements
            .iter()
            .position(|el| el.attributes.get("id").is_some_and(|v| v == id))
            .map(ElementId)
    }

    /// Element data for `id`; `None` for unknown or removed ids.
    pub fn element(&self, id: ElementId) -> Option<&MemoryElement> {
        if self.free.contains(&id.0) {
            return None;
        }
        self.elements.get(id.0)
    }

    /// Number of elements currently allocated.
    pub fn live_elements(&self) -> usize {
        self.elements.len() - self.free.len()
    }

    /// Attribute value of an element.
    pub fn attribute(&self, id: ElementId, name: &str) -> Option<&str> {
        self.element(id)
            .and_then(|el| el.attributes.get(name))
            .map(String::as_str)
    }

    /// Children of an element (empty for unknown ids).
    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.element(id)
            .map(|el| el.children.as_slice())
            .unwrap_or(&[])
    }

    /// Concatenated text of the element and its descendants.
    pub fn text_content(&self, id: ElementId) -> String {
        let mut text = String::new();
        self.collect_text(id, &mut text);
        text
    }

    fn collect_text(&self, id: ElementId, out: &mut String) {
        if let Some(el) = self.element(id) {
            out.push_str(&el.text);
            for child in &el.children {
                self.collect_text(*child, out);
            }
        }
    }

    /// Action a click on the element would dispatch.
    pub fn click(&self, id: ElementId) -> Option<NavAction> {
        self.element(id).and_then(|el| el.on_click.clone())
    }

    /// Descendants of `root` with tag `tag`, in document order.
    pub fn descendants_by_tag(&self, root: ElementId, tag: &str) -> Vec<ElementId> {
        let mut found = Vec::new();
        self.collect_by_tag(root, tag, &mut found);
        found
    }

    fn collect_by_tag(&self, id: ElementId, tag: &str, out: &mut Vec<ElementId>) {
        for child in self.children(id) {
            if self.element(*child).is_some_and(|el| el.tag == tag) {
                out.push(*child);
            }
            self.collect_by_tag(*child, tag, out);
        }
    }

    fn element_mut(&mut self, id: &ElementId) -> Option<&mut MemoryElement> {
        if self.free.contains(&id.0) {
            return None;
        }
        self.elements.get_mut(id.0)
    }

    fn detach(&mut self, child: &ElementId) {
        for el in &mut self.elements {
            el.children.retain(|c| c != child);
        }
    }
}

impl HostAdapter for MemoryHost {
    type Handle = ElementId;

    fn get_element_by_id(&mut self, id: &str) -> Option<ElementId> {
        self.find_by_id(id)
    }

    fn create_element(&mut self, tag: &str) -> ElementId {
        let element = MemoryElement {
            tag: tag.to_string(),
            ..MemoryElement::default()
        };
        match self.free.pop() {
            Some(slot) => {
                self.elements[slot] = element;
                ElementId(slot)
            }
            None => {
                self.elements.push(element);
                ElementId(self.elements.len() - 1)
            }
        }
    }

    fn set_text_content(&mut self, element: &ElementId, text: &str) {
        if let Some(el) = self.element_mut(element) {
            el.children.clear();
            el.text = text.to_string();
        }
    }

    fn set_attribute(&mut self, element: &ElementId, name: &str, value: &str) {
        if let Some(el) = self.element_mut(element) {
            el.attributes.insert(name.to_string(), value.to_string());
        }
    }

    fn remove_attribute(&mut self, element: &ElementId, name: &str) {
        if let Some(el) = self.element_mut(element) {
            el.attributes.remove(name);
        }
    }

    fn append_child(&mut self, parent: &ElementId, child: &ElementId) {
        // An element has one parent; appending moves it.
        self.detach(child);
        if let Some(el) = self.element_mut(parent) {
            el.children.push(*child);
        }
    }

    fn clear_children(&mut self, element: &ElementId) {
        if let Some(el) = self.element_mut(element) {
            el.children.clear();
            el.text.clear();
        }
    }

    fn remove_element(&mut self, element: &ElementId) {
        if self.element(*element).is_none() {
            return;
        }
        self.detach(element);
        let mut pending = alloc::vec![*element];
        while let Some(id) = pending.pop() {
            if let Some(el) = self.element_mut(&id) {
                pending.extend(core::mem::take(el).children);
                self.free.push(id.0);
            }
        }
    }

    fn on_click(&mut self, element: &ElementId, action: NavAction) {
        if let Some(el) = self.element_mut(element) {
            el.on_click = Some(action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_host_tree() {
        let mut host = MemoryHost::new();
        let root = host.add_element("div", "viewer");
        assert_eq!(host.get_element_by_id("viewer"), Some(root));
        assert_eq!(host.get_element_by_id("missing"), None);

        let list = host.create_element("ul");
        let item = host.create_element("li");
        host.set_text_content(&item, "One");
        host.append_child(&list, &item);
        host.append_child(&root, &list);

        assert_eq!(host.children(root), &[list]);
        assert_eq!(host.text_content(root), "One");
        assert_eq!(host.descendants_by_tag(root, "li"), [item]);
    }

    #[test]
    fn test_removed_slots_are_reused() {
        let mut host = MemoryHost::new();
        let root = host.add_element("div", "toc");
        let list = host.create_element("ul");
        let item = host.create_element("li");
        host.set_text_content(&item, "One");
        host.append_child(&list, &item);
        host.append_child(&root, &list);
        assert_eq!(host.live_elements(), 3);

        host.remove_element(&list);
        host.remove_element(&list);
        assert_eq!(host.live_elements(), 1);
        assert!(host.children(root).is_empty());
        assert_eq!(host.element(item), None);

        let a = host.create_element("ul");
        let b = host.create_element("li");
        assert_eq!(host.live_elements(), 3);
        assert!([a, b].contains(&list) && [a, b].contains(&item));
        assert_eq!(host.text_content(b), "");
        assert_eq!(host.find_by_id("toc"), Some(root));
    }

    #[test]
    fn test_memory_host_mutation() {
        let mut host = MemoryHost::new();
        let root = host.add_element("div", "a");
        let button = host.create_element("button");

        host.set_attribute(&button, "disabled", "disabled");
        assert_eq!(host.attribute(button, "disabled"), Some("disabled"));
        host.remove_attribute(&button, "disabled");
        assert_eq!(host.attribute(button, "disabled"), None);

        host.on_click(&button, NavAction::Next);
        assert_eq!(host.click(button), Some(NavAction::Next));

        host.append_child(&root, &button);
        host.append_child(&root, &button);
        assert_eq!(host.children(root).len(), 1);

        host.set_text_content(&root, "Error");
        assert!(host.children(root).is_empty());
        host.clear_children(&root);
        assert_eq!(host.text_content(root), "");
    }
}

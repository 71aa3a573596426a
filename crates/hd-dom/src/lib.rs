//! Owned DOM tree: an arena of nodes addressed by index.

pub mod selector;
pub mod serialize;

pub use selector::SelectorList;
pub use serialize::format_doctype;
pub use serialize::inner_html;
pub use serialize::outer_html;

/// ID used to address nodes in the DOM arena.
pub type NodeId = usize;

/// Single element attribute, names are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Document type declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Doctype {
    pub name: String,
    pub public_id: String,
    pub system_id: String,
}

impl Doctype {
    pub fn html() -> Self {
        Self {
            name: "html".to_owned(),
            public_id: String::new(),
            system_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub tag: String,
    pub attrs: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Doctype(Doctype),
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn element(&self) -> Option<&ElementData> {
        match &self.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }
}

/// Arena-backed document. Node `0` is always the document node.
///
/// Removing a node only unlinks it from its parent; the slot stays in the
/// arena, unreachable from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Document)],
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.create_element_with_attrs(tag, Vec::new())
    }

    pub fn create_element_with_attrs(&mut self, tag: &str, attrs: Vec<Attribute>) -> NodeId {
        self.push(NodeKind::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attrs,
        }))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Comment(text.into()))
    }

    pub fn create_doctype(&mut self, doctype: Doctype) -> NodeId {
        self.push(NodeKind::Doctype(doctype))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node::new(kind));
        self.nodes.len() - 1
    }

    /// Appends `child` as the last child of `parent`, unlinking it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if parent >= self.nodes.len() || child >= self.nodes.len() || parent == child {
            return;
        }
        if self.is_ancestor(child, parent) {
            return;
        }

        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Unlinks a node (and its subtree) from the tree.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get(id).and_then(|node| node.parent) else {
            return;
        };

        self.nodes[parent].children.retain(|candidate| *candidate != id);
        self.nodes[id].parent = None;
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|parent| self.is_element(*parent))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(
            self.nodes.get(id).map(|node| &node.kind),
            Some(NodeKind::Element(_))
        )
    }

    /// Returns true while `id` is still reachable from the document node.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root() {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn is_ancestor(&self, ancestor: NodeId, of: NodeId) -> bool {
        let mut current = self.parent(of);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|data| data.tag.as_str())
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.nodes.get(id).and_then(Node::element)
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match self.nodes.get_mut(id).map(|node| &mut node.kind) {
            Some(NodeKind::Element(data)) => Some(data),
            _ => None,
        }
    }

    pub fn attrs(&self, id: NodeId) -> &[Attribute] {
        self.element(id)
            .map(|data| data.attrs.as_slice())
            .unwrap_or_default()
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attrs(id)
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
            .map(|attr| attr.value.as_str())
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        let Some(data) = self.element_mut(id) else {
            return;
        };

        match data
            .attrs
            .iter_mut()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => existing.value = value.to_owned(),
            None => data.attrs.push(Attribute {
                name: name.to_ascii_lowercase(),
                value: value.to_owned(),
            }),
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> bool {
        let Some(data) = self.element_mut(id) else {
            return false;
        };

        let before = data.attrs.len();
        data.attrs.retain(|attr| !attr.name.eq_ignore_ascii_case(name));
        before != data.attrs.len()
    }

    /// Removes every attribute for which `predicate` returns true; returns the removed names.
    pub fn remove_attrs_where(
        &mut self,
        id: NodeId,
        mut predicate: impl FnMut(&str) -> bool,
    ) -> Vec<String> {
        let Some(data) = self.element_mut(id) else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        data.attrs.retain(|attr| {
            if predicate(&attr.name) {
                removed.push(attr.name.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Pre-order descendants of `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    pub fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|candidate| self.is_element(*candidate))
            .collect()
    }

    pub fn elements_by_tag(&self, scope: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|candidate| {
                self.tag(*candidate)
                    .is_some_and(|name| name.eq_ignore_ascii_case(tag))
            })
            .collect()
    }

    pub fn query_selector_all(&self, scope: NodeId, selectors: &SelectorList) -> Vec<NodeId> {
        self.descendant_elements(scope)
            .into_iter()
            .filter(|candidate| selectors.matches(self, *candidate))
            .collect()
    }

    /// Parses `selectors` and runs it; unsupported selector syntax matches nothing.
    pub fn select(&self, scope: NodeId, selectors: &str) -> Vec<NodeId> {
        match SelectorList::parse(selectors) {
            Some(parsed) => self.query_selector_all(scope, &parsed),
            None => Vec::new(),
        }
    }

    pub fn doctype(&self) -> Option<&Doctype> {
        self.children(self.root())
            .iter()
            .find_map(|id| match self.nodes.get(*id).map(|node| &node.kind) {
                Some(NodeKind::Doctype(doctype)) => Some(doctype),
                _ => None,
            })
    }

    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|id| self.is_element(*id))
    }

    pub fn head(&self) -> Option<NodeId> {
        self.child_of_document_element("head")
    }

    pub fn body(&self) -> Option<NodeId> {
        self.child_of_document_element("body")
    }

    fn child_of_document_element(&self, tag: &str) -> Option<NodeId> {
        let html = self.document_element()?;
        self.children(html)
            .iter()
            .copied()
            .find(|id| self.tag(*id) == Some(tag))
    }

    /// Returns `<head>`, creating it as the first child of the document element when missing.
    pub fn ensure_head(&mut self) -> Option<NodeId> {
        if let Some(head) = self.head() {
            return Some(head);
        }

        let html = self.document_element()?;
        let head = self.create_element("head");
        self.nodes[head].parent = Some(html);
        self.nodes[html].children.insert(0, head);
        Some(head)
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(Node {
                kind: NodeKind::Text(text),
                ..
            }) = self.nodes.get(node)
            {
                out.push_str(text);
            }
        }
        out
    }

    pub fn title(&self) -> String {
        self.elements_by_tag(self.root(), "title")
            .first()
            .map(|id| collapse_whitespace(&self.text_content(*id)))
            .unwrap_or_default()
    }

    /// Copies the subtree rooted at `id` into a fresh, compact arena.
    ///
    /// Cloning the document node yields a full detached copy; cloning an
    /// element yields a document whose only child is that element.
    pub fn clone_subtree(&self, id: NodeId) -> Document {
        let mut out = Document::new();
        if id >= self.nodes.len() {
            return out;
        }

        let mut pending: Vec<(NodeId, NodeId)> = Vec::new();
        if id == self.root() {
            for child in self.children(id).iter().rev() {
                pending.push((*child, out.root()));
            }
        } else {
            pending.push((id, out.root()));
        }

        while let Some((source, target_parent)) = pending.pop() {
            let copy = out.push(self.nodes[source].kind.clone());
            out.nodes[copy].parent = Some(target_parent);
            out.nodes[target_parent].children.push(copy);
            for child in self.children(source).iter().rev() {
                pending.push((*child, copy));
            }
        }

        out
    }
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::Document;
    use super::Doctype;

    fn sample() -> Document {
        let mut doc = Document::new();
        let root = doc.root();
        let doctype = doc.create_doctype(Doctype::html());
        doc.append_child(root, doctype);
        let html = doc.create_element("html");
        doc.append_child(root, html);
        let head = doc.create_element("head");
        doc.append_child(html, head);
        let title = doc.create_element("title");
        doc.append_child(head, title);
        let text = doc.create_text("  Saved \n Page ");
        doc.append_child(title, text);
        let body = doc.create_element("body");
        doc.append_child(html, body);
        let img = doc.create_element("img");
        doc.set_attr(img, "SRC", "/a.png");
        doc.append_child(body, img);
        doc
    }

    #[test]
    fn finds_structural_elements() {
        let doc = sample();
        assert!(doc.document_element().is_some());
        assert!(doc.head().is_some());
        assert!(doc.body().is_some());
        assert_eq!(doc.title(), "Saved Page");
        assert_eq!(doc.doctype(), Some(&Doctype::html()));
    }

    #[test]
    fn attributes_are_case_insensitive() {
        let mut doc = sample();
        let imgs = doc.elements_by_tag(doc.root(), "img");
        assert_eq!(imgs.len(), 1);
        let img = imgs[0];
        assert_eq!(doc.attr(img, "src"), Some("/a.png"));

        doc.set_attr(img, "Src", "/b.png");
        assert_eq!(doc.attrs(img).len(), 1);
        assert_eq!(doc.attr(img, "src"), Some("/b.png"));
        assert!(doc.remove_attr(img, "src"));
        assert!(!doc.has_attr(img, "src"));
    }

    #[test]
    fn detached_nodes_are_unreachable() {
        let mut doc = sample();
        let img = doc.elements_by_tag(doc.root(), "img")[0];
        doc.detach(img);
        assert!(!doc.is_attached(img));
        assert!(doc.elements_by_tag(doc.root(), "img").is_empty());
    }

    #[test]
    fn clone_subtree_is_independent_and_compact() {
        let mut live = sample();
        let img = live.elements_by_tag(live.root(), "img")[0];
        live.detach(img);

        let mut copy = live.clone_subtree(live.root());
        assert_eq!(copy.title(), "Saved Page");
        assert!(copy.elements_by_tag(copy.root(), "img").is_empty());
        assert!(copy.arena_len() < live.arena_len());

        let body = copy.body();
        assert!(body.is_some());
        if let Some(body) = body {
            copy.set_attr(body, "class", "copy");
        }
        let live_body = live.body();
        assert!(live_body.is_some_and(|id| live.attr(id, "class").is_none()));
    }

    #[test]
    fn ensure_head_creates_missing_head() {
        let mut doc = Document::new();
        let root = doc.root();
        let html = doc.create_element("html");
        doc.append_child(root, html);
        let body = doc.create_element("body");
        doc.append_child(html, body);

        let head = doc.ensure_head();
        assert!(head.is_some());
        assert_eq!(doc.children(html).first().copied(), head);
    }

    #[test]
    fn append_child_rejects_cycles() {
        let mut doc = sample();
        let html = match doc.document_element() {
            Some(value) => value,
            None => panic!("missing document element"),
        };
        let body = match doc.body() {
            Some(value) => value,
            None => panic!("missing body"),
        };
        doc.append_child(body, html);
        assert_eq!(doc.parent(html), Some(doc.root()));
    }
}

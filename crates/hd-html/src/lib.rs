//! Forgiving HTML parser producing an owned [`hd_dom::Document`].
//!
//! The tree builder always yields `html > head + body`, moves metadata that
//! appears before `<body>` into `<head>`, keeps comments and the doctype, and
//! treats script-like elements as raw text.

mod entities;
mod tokenizer;

use hd_dom::Attribute;
use hd_dom::Document;
use hd_dom::NodeId;
use hd_dom::serialize::is_void_element;

pub use entities::decode_entities;
use tokenizer::Token;
use tokenizer::tokenize;

const HEAD_CONTENT: &[&str] = &[
    "base", "link", "meta", "noscript", "script", "style", "template", "title",
];

const CLOSES_PARAGRAPH: &[&str] = &[
    "address", "article", "aside", "blockquote", "div", "dl", "fieldset", "figure", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "main", "nav", "ol", "p", "pre",
    "section", "table", "ul",
];

#[derive(Debug, Default)]
pub struct HtmlParser;

impl HtmlParser {
    pub fn parse(&self, input: &str) -> Document {
        let mut builder = TreeBuilder::new();
        for token in tokenize(input) {
            builder.push(token);
        }
        builder.finish()
    }
}

/// Convenience wrapper around [`HtmlParser::parse`].
pub fn parse_document(input: &str) -> Document {
    HtmlParser.parse(input)
}

struct TreeBuilder {
    doc: Document,
    html: Option<NodeId>,
    head: Option<NodeId>,
    body: Option<NodeId>,
    stack: Vec<NodeId>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            doc: Document::new(),
            html: None,
            head: None,
            body: None,
            stack: Vec::new(),
        }
    }

    fn push(&mut self, token: Token) {
        match token {
            Token::Doctype(doctype) => {
                if self.html.is_none() && self.doc.doctype().is_none() {
                    let node = self.doc.create_doctype(doctype);
                    let root = self.doc.root();
                    self.doc.append_child(root, node);
                }
            }
            Token::Comment(text) => {
                let node = self.doc.create_comment(text);
                let parent = self.current();
                self.doc.append_child(parent, node);
            }
            Token::Text(text) => self.text(text),
            Token::Start {
                name,
                attrs,
                self_closing,
            } => self.start_tag(name, attrs, self_closing),
            Token::End { name } => self.end_tag(&name),
        }
    }

    fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or(self.doc.root())
    }

    fn ensure_html(&mut self) -> NodeId {
        if let Some(html) = self.html {
            return html;
        }

        let html = self.doc.create_element("html");
        let root = self.doc.root();
        self.doc.append_child(root, html);
        self.html = Some(html);
        self.stack.clear();
        self.stack.push(html);
        html
    }

    fn ensure_head(&mut self) -> NodeId {
        if let Some(head) = self.head {
            return head;
        }

        let html = self.ensure_html();
        let head = self.doc.create_element("head");
        self.doc.append_child(html, head);
        self.head = Some(head);
        head
    }

    fn ensure_body(&mut self) -> NodeId {
        if let Some(body) = self.body {
            return body;
        }

        self.ensure_head();
        let html = self.ensure_html();
        let body = self.doc.create_element("body");
        self.doc.append_child(html, body);
        self.body = Some(body);
        self.stack.retain(|open| *open == html);
        self.stack.push(body);
        body
    }

    fn in_head(&self) -> bool {
        self.head.is_some_and(|head| self.stack.contains(&head))
    }

    fn leave_head(&mut self) {
        if self.in_head() {
            self.pop_until(|builder, open| Some(open) == builder.head);
        }
    }

    fn text(&mut self, text: String) {
        if self.body.is_none() && !self.current_is_content() {
            if text.trim().is_empty() {
                return;
            }
            self.leave_head();
            self.ensure_body();
        }

        let parent = self.current();
        let node = self.doc.create_text(text);
        self.doc.append_child(parent, node);
    }

    /// True when the insertion point is an element nested below `<head>` or `<body>`.
    fn current_is_content(&self) -> bool {
        let current = self.current();
        current != self.doc.root() && Some(current) != self.html && Some(current) != self.head
    }

    fn start_tag(&mut self, name: String, attrs: Vec<Attribute>, self_closing: bool) {
        match name.as_str() {
            "html" => {
                let html = self.ensure_html();
                self.merge_attrs(html, attrs);
                return;
            }
            "head" => {
                if self.body.is_none() {
                    let head = self.ensure_head();
                    self.merge_attrs(head, attrs);
                    self.stack.retain(|open| Some(*open) == self.html);
                    self.stack.push(head);
                }
                return;
            }
            "body" => {
                let body = self.ensure_body();
                self.merge_attrs(body, attrs);
                return;
            }
            _ => {}
        }

        if self.body.is_none() && !self.current_is_content() {
            if HEAD_CONTENT.contains(&name.as_str()) {
                let head = self.ensure_head();
                if !self.stack.contains(&head) {
                    self.stack.push(head);
                }
            } else {
                self.leave_head();
                self.ensure_body();
            }
        }

        self.close_implied(&name);

        let parent = self.current();
        let node = self.doc.create_element_with_attrs(&name, attrs);
        self.doc.append_child(parent, node);
        if !self_closing && !is_void_element(&name) {
            self.stack.push(node);
        }
    }

    fn close_implied(&mut self, name: &str) {
        let current_tag = self.doc.tag(self.current()).unwrap_or_default().to_owned();
        let implied = match name {
            "li" => current_tag == "li",
            "option" => current_tag == "option",
            "dt" | "dd" => current_tag == "dt" || current_tag == "dd",
            "tr" => current_tag == "tr" || current_tag == "td" || current_tag == "th",
            "td" | "th" => current_tag == "td" || current_tag == "th",
            _ => current_tag == "p" && CLOSES_PARAGRAPH.contains(&name),
        };

        if implied {
            if name == "tr" && current_tag != "tr" {
                self.stack.pop();
            }
            self.stack.pop();
        }
    }

    fn end_tag(&mut self, name: &str) {
        match name {
            "html" | "body" => return,
            "head" => {
                self.leave_head();
                return;
            }
            _ => {}
        }

        let open = self
            .stack
            .iter()
            .rposition(|open| self.doc.tag(*open) == Some(name));
        if let Some(index) = open {
            // Never pop the structural elements through a stray end tag.
            let floor = self
                .stack
                .iter()
                .rposition(|open| Some(*open) == self.body || Some(*open) == self.html)
                .map(|index| index.saturating_add(1))
                .unwrap_or(0);
            if index >= floor {
                self.stack.truncate(index);
            }
        }
    }

    fn pop_until(&mut self, stop: impl Fn(&Self, NodeId) -> bool) {
        while let Some(open) = self.stack.pop() {
            if stop(self, open) {
                break;
            }
        }
    }

    fn merge_attrs(&mut self, node: NodeId, attrs: Vec<Attribute>) {
        for attr in attrs {
            if !self.doc.has_attr(node, &attr.name) {
                self.doc.set_attr(node, &attr.name, &attr.value);
            }
        }
    }

    fn finish(mut self) -> Document {
        self.ensure_body();
        self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::parse_document;
    use hd_dom::Doctype;
    use hd_dom::format_doctype;
    use hd_dom::outer_html;

    #[test]
    fn builds_html_head_body_skeleton() {
        let doc = parse_document("<title> Hoard </title><p>Hi");
        assert_eq!(doc.title(), "Hoard");
        let head = doc.head();
        let body = doc.body();
        assert!(head.is_some());
        assert!(body.is_some());
        let html = doc.document_element();
        assert!(html.is_some_and(|id| outer_html(&doc, id)
            == "<html><head><title> Hoard </title></head><body><p>Hi</p></body></html>"));
    }

    #[test]
    fn keeps_doctype_identifiers() {
        let doc = parse_document(
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD HTML 4.01//EN\" \"http://www.w3.org/TR/html4/strict.dtd\"><html></html>",
        );
        let expected = Doctype {
            name: "html".to_owned(),
            public_id: "-//W3C//DTD HTML 4.01//EN".to_owned(),
            system_id: "http://www.w3.org/TR/html4/strict.dtd".to_owned(),
        };
        assert_eq!(doc.doctype(), Some(&expected));
        assert_eq!(
            format_doctype(doc.doctype()),
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD HTML 4.01//EN\"\"http://www.w3.org/TR/html4/strict.dtd\">"
        );
    }

    #[test]
    fn missing_doctype_is_none() {
        let doc = parse_document("<html><body></body></html>");
        assert!(doc.doctype().is_none());
        assert_eq!(format_doctype(doc.doctype()), "<!DOCTYPE html>");
    }

    #[test]
    fn raw_text_is_not_parsed_as_markup() {
        let doc = parse_document(
            "<html><head><style>a > b { content: \"</p>\" }</style></head><body><script>if (a < b) {}</script></body></html>",
        );
        let styles = doc.elements_by_tag(doc.root(), "style");
        assert_eq!(styles.len(), 1);
        assert_eq!(doc.text_content(styles[0]), "a > b { content: \"</p>\" }");
        let scripts = doc.elements_by_tag(doc.root(), "script");
        assert_eq!(scripts.len(), 1);
        assert_eq!(doc.text_content(scripts[0]), "if (a < b) {}");
    }

    #[test]
    fn metadata_before_body_goes_to_head() {
        let doc = parse_document(
            "<!doctype html><meta charset=utf-8><link rel=stylesheet href=a.css><div>x</div>",
        );
        let head = match doc.head() {
            Some(value) => value,
            None => panic!("missing head"),
        };
        assert_eq!(doc.children(head).len(), 2);
        let links = doc.elements_by_tag(head, "link");
        assert_eq!(links.len(), 1);
        assert_eq!(doc.attr(links[0], "href"), Some("a.css"));
    }

    #[test]
    fn implied_end_tags_and_stray_end_tags() {
        let doc = parse_document("<ul><li>a<li>b</ul><p>one<p>two</span></div>");
        let body = match doc.body() {
            Some(value) => value,
            None => panic!("missing body"),
        };
        assert_eq!(
            hd_dom::inner_html(&doc, body),
            "<ul><li>a</li><li>b</li></ul><p>one</p><p>two</p>"
        );
    }

    #[test]
    fn decodes_entities_in_text_and_attributes() {
        let doc = parse_document("<p title=\"a &amp; b\">x&nbsp;y &lt;z&gt; &#x41;&#66;</p>");
        let p = doc.elements_by_tag(doc.root(), "p")[0];
        assert_eq!(doc.attr(p, "title"), Some("a & b"));
        assert_eq!(doc.text_content(p), "x\u{a0}y <z> AB");
    }

    #[test]
    fn comments_survive() {
        let doc = parse_document("<body><!-- keep --><p>x</p></body>");
        let body = match doc.body() {
            Some(value) => value,
            None => panic!("missing body"),
        };
        assert_eq!(hd_dom::inner_html(&doc, body), "<!-- keep --><p>x</p>");
    }
}

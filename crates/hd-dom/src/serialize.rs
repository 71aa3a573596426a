use crate::Doctype;
use crate::Document;
use crate::NodeId;
use crate::NodeKind;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

pub fn is_raw_text_element(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&tag)
}

/// Renders a doctype declaration; an absent doctype renders as `<!DOCTYPE html>`.
///
/// The public identifier is written as ` PUBLIC "…"` and the system identifier
/// follows it as `"…"` with no separating space.
pub fn format_doctype(doctype: Option<&Doctype>) -> String {
    let Some(doctype) = doctype else {
        return "<!DOCTYPE html>".to_owned();
    };

    let mut out = format!("<!DOCTYPE {}", doctype.name);
    if !doctype.public_id.is_empty() {
        out.push_str(&format!(" PUBLIC \"{}\"", doctype.public_id));
    }
    if !doctype.system_id.is_empty() {
        out.push_str(&format!("\"{}\"", doctype.system_id));
    }
    out.push('>');
    out
}

/// Serializes a node and its subtree. Doctype nodes are skipped; callers
/// prepend [`format_doctype`] themselves.
pub fn outer_html(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, id, &mut out);
    out
}

pub fn inner_html(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    for child in doc.children(id) {
        write_node(doc, *child, &mut out);
    }
    out
}

fn write_node(doc: &Document, id: NodeId, out: &mut String) {
    let Some(node) = doc.node(id) else {
        return;
    };

    match &node.kind {
        NodeKind::Document => {
            for child in node.children() {
                write_node(doc, *child, out);
            }
        }
        NodeKind::Doctype(_) => {}
        NodeKind::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeKind::Text(text) => {
            let raw = doc
                .parent(id)
                .and_then(|parent| doc.tag(parent))
                .is_some_and(is_raw_text_element);
            if raw {
                out.push_str(text);
            } else {
                escape_text(text, out);
            }
        }
        NodeKind::Element(data) => {
            out.push('<');
            out.push_str(&data.tag);
            for attr in &data.attrs {
                out.push(' ');
                out.push_str(&attr.name);
                out.push_str("=\"");
                escape_attr(&attr.value, out);
                out.push('"');
            }
            out.push('>');

            if is_void_element(&data.tag) {
                return;
            }

            for child in node.children() {
                write_node(doc, *child, out);
            }
            out.push_str("</");
            out.push_str(&data.tag);
            out.push('>');
        }
    }
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::format_doctype;
    use super::outer_html;
    use crate::Doctype;
    use crate::Document;

    #[test]
    fn doctype_formats() {
        assert_eq!(format_doctype(None), "<!DOCTYPE html>");
        assert_eq!(format_doctype(Some(&Doctype::html())), "<!DOCTYPE html>");

        let legacy = Doctype {
            name: "html".to_owned(),
            public_id: "-//W3C//DTD XHTML 1.0 Strict//EN".to_owned(),
            system_id: "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd".to_owned(),
        };
        assert_eq!(
            format_doctype(Some(&legacy)),
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\"\"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\">"
        );

        let system_only = Doctype {
            name: "svg".to_owned(),
            public_id: String::new(),
            system_id: "a.dtd".to_owned(),
        };
        assert_eq!(format_doctype(Some(&system_only)), "<!DOCTYPE svg\"a.dtd\">");
    }

    #[test]
    fn serializes_void_raw_text_and_escapes() {
        let mut doc = Document::new();
        let root = doc.root();
        let div = doc.create_element("div");
        doc.set_attr(div, "title", "a \"b\" & c");
        doc.append_child(root, div);
        let text = doc.create_text("1 < 2 & 3");
        doc.append_child(div, text);
        let br = doc.create_element("br");
        doc.append_child(div, br);
        let style = doc.create_element("style");
        doc.append_child(div, style);
        let css = doc.create_text("a > b { color: red }");
        doc.append_child(style, css);

        assert_eq!(
            outer_html(&doc, div),
            "<div title=\"a &quot;b&quot; &amp; c\">1 &lt; 2 &amp; 3<br><style>a > b { color: red }</style></div>"
        );
    }
}

//! Reading and editing an element's inline `style` attribute.

use hd_css::CssParser;
use hd_css::Declarations;
use hd_dom::Document;
use hd_dom::NodeId;

pub(crate) fn inline_declarations(doc: &Document, node: NodeId) -> Declarations {
    doc.attr(node, "style")
        .map(|style| CssParser.parse_declarations(style))
        .unwrap_or_default()
}

pub(crate) fn set_inline_property(doc: &mut Document, node: NodeId, property: &str, value: &str) {
    let mut declarations = inline_declarations(doc, node);
    declarations.set(property, value);
    doc.set_attr(node, "style", &declarations.css_text());
}

#[cfg(test)]
mod tests {
    use super::inline_declarations;
    use super::set_inline_property;
    use hd_dom::Attribute;
    use hd_dom::Document;

    #[test]
    fn overwrites_or_appends_properties() {
        let mut doc = Document::new();
        let node = doc.create_element_with_attrs(
            "div",
            vec![Attribute {
                name: "style".to_owned(),
                value: "position: fixed; color: red".to_owned(),
            }],
        );

        set_inline_property(&mut doc, node, "position", "static");
        set_inline_property(&mut doc, node, "display", "none");

        assert_eq!(
            doc.attr(node, "style"),
            Some("position: static; color: red; display: none;")
        );
        assert_eq!(inline_declarations(&doc, node).get("display"), Some("none"));
    }
}

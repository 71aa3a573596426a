//! Passes that make the snapshot inert: active content, event handlers,
//! lazy-load indirection and hidden elements.

use crate::config::HiddenElementPolicy;
use crate::page::LiveStyleSheet;
use crate::style_attr::inline_declarations;
use crate::style_attr::set_inline_property;
use hd_css::CssRule;
use hd_dom::Document;
use hd_dom::NodeId;
use hd_dom::SelectorList;

const ACTIVE_CONTENT: &[&str] = &["noscript", "object", "iframe", "script"];
const REMOVED_ATTRIBUTES: &[&str] = &["data-ga"];
const LAZY_ATTRIBUTES: &[(&str, &str)] = &[("data-src", "src"), ("data-srcset", "srcset")];
/// Never judged hidden: their `display` says nothing about visible content.
const HIDDEN_EXEMPT: &[&str] = &["style", "svg", "g"];

/// Removes elements that would run or embed live content. Returns how many went.
pub fn remove_active_content(doc: &mut Document) -> usize {
    let mut removed = 0;
    for tag in ACTIVE_CONTENT {
        for node in doc.elements_by_tag(doc.root(), tag) {
            if doc.is_attached(node) {
                doc.detach(node);
                removed += 1;
            }
        }
    }
    removed
}

/// Copies `data-src`/`data-srcset` over `src`/`srcset` on every image.
pub fn promote_lazy_images(doc: &mut Document) {
    for img in doc.elements_by_tag(doc.root(), "img") {
        for (lazy, eager) in LAZY_ATTRIBUTES {
            let Some(value) = doc.attr(img, lazy).map(str::to_owned) else {
                continue;
            };
            doc.set_attr(img, eager, &value);
            doc.remove_attr(img, lazy);
        }
    }
}

/// Strips `on*` handler attributes and analytics hooks from every element.
pub fn strip_event_handlers(doc: &mut Document) -> usize {
    let mut removed = 0;
    for node in doc.descendant_elements(doc.root()) {
        removed += doc
            .remove_attrs_where(node, |name| {
                name.starts_with("on") || REMOVED_ATTRIBUTES.contains(&name)
            })
            .len();
    }
    removed
}

/// `display` declarations from author stylesheets, in cascade order.
///
/// Only top-level style rules (and those of loaded imports) are kept;
/// rules inside `@media` blocks apply conditionally and are skipped.
#[derive(Debug, Clone, Default)]
pub struct DisplayRules {
    rules: Vec<(SelectorList, String)>,
}

impl DisplayRules {
    pub fn from_sheets(sheets: &[LiveStyleSheet]) -> Self {
        let mut out = Self::default();
        for live in sheets {
            if let Some(rules) = live.sheet.rules.as_deref() {
                out.collect(rules);
            }
        }
        out
    }

    fn collect(&mut self, rules: &[CssRule]) {
        for rule in rules {
            match rule {
                CssRule::Import(import) => {
                    if let Some(nested) = import.sheet.as_deref().and_then(|sheet| sheet.rules.as_deref()) {
                        self.collect(nested);
                    }
                }
                CssRule::Style(style) => {
                    let Some(display) = style.declarations.get("display") else {
                        continue;
                    };
                    // Selectors the engine cannot match are ignored.
                    if let Some(selectors) = SelectorList::parse(&style.selector) {
                        self.rules.push((selectors, display.trim().to_ascii_lowercase()));
                    }
                }
                _ => {}
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Effective `display` of `node`: inline style, then the last matching
    /// author rule, then the `hidden` attribute.
    pub fn display_of(&self, doc: &Document, node: NodeId) -> Option<String> {
        if let Some(inline) = inline_declarations(doc, node).get("display") {
            return Some(inline.trim().to_ascii_lowercase());
        }
        let authored = self
            .rules
            .iter()
            .rev()
            .find(|(selectors, _)| selectors.matches(doc, node))
            .map(|(_, display)| display.clone());
        if authored.is_some() {
            return authored;
        }
        doc.has_attr(node, "hidden").then(|| "none".to_owned())
    }

    pub fn is_hidden(&self, doc: &Document, node: NodeId) -> bool {
        self.display_of(doc, node).as_deref() == Some("none")
    }
}

/// Applies `policy` to every hidden element inside `<body>`. Returns how
/// many elements were affected.
pub fn apply_hidden_policy(doc: &mut Document, rules: &DisplayRules, policy: HiddenElementPolicy) -> usize {
    let Some(body) = doc.body() else {
        return 0;
    };

    let mut affected = 0;
    for node in doc.descendant_elements(body) {
        if !doc.is_attached(node) {
            continue;
        }
        let exempt = doc.tag(node).is_some_and(|tag| HIDDEN_EXEMPT.contains(&tag));
        if exempt || !rules.is_hidden(doc, node) {
            continue;
        }

        match policy {
            HiddenElementPolicy::Strip => doc.detach(node),
            HiddenElementPolicy::PreserveHidden => set_inline_property(doc, node, "display", "none"),
        }
        affected += 1;
    }
    affected
}

//! Detached working copy of the live document.

use crate::page::LivePage;
use hd_dom::Document;
use hd_dom::format_doctype;
use hd_dom::outer_html;
use uuid::Uuid;

/// Data attribute linking an inline `<style>` to its flattened attachment.
pub const STYLESHEET_KEY_ATTR: &str = "data-hoard-stylesheet";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub doctype: String,
    pub document: Document,
}

impl Snapshot {
    /// Doctype line, a newline, then the document element's markup.
    pub fn serialize(&self) -> String {
        let markup = self
            .document
            .document_element()
            .map(|html| outer_html(&self.document, html))
            .unwrap_or_default();
        format!("{}\n{}", self.doctype, markup)
    }
}

/// Key recorded on an inline stylesheet's owner, if it has been tagged.
pub fn inline_sheet_key(page: &LivePage, index: usize) -> Option<String> {
    let live = page.stylesheets.get(index)?;
    if !live.is_inline() {
        return None;
    }
    page.document
        .attr(live.owner?, STYLESHEET_KEY_ATTR)
        .map(str::to_owned)
}

/// Tags every inline stylesheet's owner with a fresh key, then copies the
/// document element into a detached document.
///
/// The key attribute is the only change made to the live page.
pub fn build_snapshot(page: &mut LivePage) -> Snapshot {
    for live in &page.stylesheets {
        if !live.is_inline() {
            continue;
        }
        let Some(owner) = live.owner else {
            continue;
        };
        if page.document.has_attr(owner, STYLESHEET_KEY_ATTR) {
            continue;
        }
        let key = format!("~~{}", Uuid::new_v4().simple());
        page.document.set_attr(owner, STYLESHEET_KEY_ATTR, &key);
    }

    let document = match page.document.document_element() {
        Some(html) => page.document.clone_subtree(html),
        None => Document::new(),
    };

    Snapshot {
        doctype: format_doctype(page.document.doctype()),
        document,
    }
}

#[cfg(test)]
mod tests {
    use super::STYLESHEET_KEY_ATTR;
    use super::build_snapshot;
    use super::inline_sheet_key;
    use crate::fetch::MemoryFetcher;
    use crate::page::LivePage;
    use crate::page::PageLoader;
    use hd_net::url::WebUrl;

    fn page(markup: &str) -> LivePage {
        let url = match WebUrl::parse("https://example.com/") {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let mut fetcher = MemoryFetcher::new();
        PageLoader::new(&mut fetcher).load_markup(url, markup)
    }

    #[test]
    fn tags_inline_sheets_and_copies_them() {
        let mut live = page("<!DOCTYPE html><html><head><style>p{}</style><style>a{}</style></head><body><p>x</p></body></html>");
        let snapshot = build_snapshot(&mut live);

        let first = inline_sheet_key(&live, 0);
        let second = inline_sheet_key(&live, 1);
        assert!(first.as_deref().is_some_and(|key| key.starts_with("~~")));
        assert_ne!(first, second);

        let copied: Vec<Option<String>> = snapshot
            .document
            .elements_by_tag(snapshot.document.root(), "style")
            .into_iter()
            .map(|node| snapshot.document.attr(node, STYLESHEET_KEY_ATTR).map(str::to_owned))
            .collect();
        assert_eq!(copied, vec![first, second]);
    }

    #[test]
    fn snapshot_is_detached_from_the_live_page() {
        let mut live = page("<html><body><p id=a>x</p></body></html>");
        let mut snapshot = build_snapshot(&mut live);
        let before = live.document.clone();

        let paragraphs = snapshot.document.select(snapshot.document.root(), "#a");
        assert_eq!(paragraphs.len(), 1);
        snapshot.document.detach(paragraphs[0]);

        assert_eq!(live.document, before);
        assert_eq!(live.document.select(live.document.root(), "#a").len(), 1);
    }

    #[test]
    fn serialization_prefixes_the_doctype() {
        let mut live = page(r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd"><html><body></body></html>"#);
        let snapshot = build_snapshot(&mut live);
        let text = snapshot.serialize();
        assert!(text.starts_with(
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\"\"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\">\n<html>"
        ));

        let mut bare = page("<p>no doctype</p>");
        assert!(build_snapshot(&mut bare).serialize().starts_with("<!DOCTYPE html>\n<html>"));
    }
}

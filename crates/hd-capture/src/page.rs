//! The live page a capture reads from: parsed markup plus its stylesheets in
//! document order, each with the rules a browser would expose for it.

use crate::fetch::ResourceFetcher;
use hd_core::HoardError;
use hd_core::HoardResult;
use hd_css::CssRule;
use hd_css::StyleSheet;
use hd_dom::Document;
use hd_dom::NodeId;
use hd_html::parse_document;
use hd_net::url::WebUrl;

const MAX_IMPORT_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveStyleSheet {
    /// The `<style>` or `<link>` element the sheet belongs to.
    pub owner: Option<NodeId>,
    pub sheet: StyleSheet,
}

impl LiveStyleSheet {
    pub fn href(&self) -> Option<&str> {
        self.sheet.href.as_deref()
    }

    pub fn is_inline(&self) -> bool {
        self.sheet.href.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivePage {
    pub url: WebUrl,
    pub document: Document,
    pub stylesheets: Vec<LiveStyleSheet>,
}

impl LivePage {
    pub fn title(&self) -> String {
        self.document.title()
    }
}

/// Builds [`LivePage`]s, loading same-origin stylesheets and their imports.
/// Cross-origin sheets are kept with inaccessible rules.
pub struct PageLoader<'f, F: ResourceFetcher> {
    fetcher: &'f mut F,
}

impl<'f, F: ResourceFetcher> PageLoader<'f, F> {
    pub fn new(fetcher: &'f mut F) -> Self {
        Self { fetcher }
    }

    pub fn load(&mut self, raw_url: &str) -> HoardResult<LivePage> {
        let url = WebUrl::parse(raw_url)?;
        let fetched = self.fetcher.fetch(&url).map_err(|error| {
            HoardError::new(
                "capture.document.unfetchable",
                format!("cannot load `{url}`: {error}"),
            )
        })?;
        tracing::info!(url = %fetched.url, bytes = fetched.bytes.len(), "page loaded");
        let markup = fetched.text();
        Ok(self.load_markup(fetched.url, &markup))
    }

    /// Parses already-fetched markup served from `url`.
    pub fn load_markup(&mut self, url: WebUrl, markup: &str) -> LivePage {
        let document = parse_document(markup);
        let mut stylesheets = Vec::new();

        for node in document.descendant_elements(document.root()) {
            match document.tag(node) {
                Some("style") => {
                    let mut sheet = StyleSheet::parse(None, &document.text_content(node));
                    let mut visiting = Vec::new();
                    self.load_imports(&mut sheet, &url, 0, &mut visiting);
                    stylesheets.push(LiveStyleSheet {
                        owner: Some(node),
                        sheet,
                    });
                }
                Some("link") if is_stylesheet_link(&document, node) => {
                    let Some(href) = document.attr(node, "href").filter(|href| !href.trim().is_empty()) else {
                        continue;
                    };
                    let absolute = match url.join(href) {
                        Ok(value) => value,
                        Err(error) => {
                            tracing::warn!(href, %error, "skipping unresolvable stylesheet link");
                            continue;
                        }
                    };
                    let mut visiting = vec![absolute.as_str().to_owned()];
                    let sheet = self.load_linked(&url, &absolute, 0, &mut visiting);
                    stylesheets.push(LiveStyleSheet {
                        owner: Some(node),
                        sheet,
                    });
                }
                _ => {}
            }
        }

        LivePage {
            url,
            document,
            stylesheets,
        }
    }

    /// Sheets whose origin differs from `origin_of`'s are not fetched.
    fn load_linked(
        &mut self,
        origin_of: &WebUrl,
        href: &WebUrl,
        depth: usize,
        visiting: &mut Vec<String>,
    ) -> StyleSheet {
        let href_text = Some(href.as_str().to_owned());
        if !href.same_origin(origin_of) {
            tracing::debug!(href = %href, "cross-origin stylesheet rules are inaccessible");
            return StyleSheet::inaccessible(href_text);
        }

        match self.fetcher.fetch(href) {
            Ok(fetched) => {
                let mut sheet = StyleSheet::parse(href_text, &fetched.text());
                self.load_imports(&mut sheet, href, depth + 1, visiting);
                sheet
            }
            Err(error) => {
                tracing::warn!(href = %href, %error, "stylesheet failed to load");
                StyleSheet::inaccessible(href_text)
            }
        }
    }

    fn load_imports(
        &mut self,
        sheet: &mut StyleSheet,
        base: &WebUrl,
        depth: usize,
        visiting: &mut Vec<String>,
    ) {
        let Some(rules) = sheet.rules.as_mut() else {
            return;
        };
        for rule in rules.iter_mut() {
            let CssRule::Import(import) = rule else {
                continue;
            };
            let Ok(absolute) = base.join(&import.href) else {
                continue;
            };
            if depth >= MAX_IMPORT_DEPTH || visiting.iter().any(|seen| seen == absolute.as_str()) {
                tracing::debug!(href = %absolute, "import not followed");
                continue;
            }

            visiting.push(absolute.as_str().to_owned());
            let imported = self.load_linked(base, &absolute, depth, visiting);
            visiting.pop();
            import.sheet = Some(Box::new(imported));
        }
    }
}

/// A `link` whose `rel` applies it as a stylesheet (`alternate` sheets are not).
pub(crate) fn is_stylesheet_link(document: &Document, node: NodeId) -> bool {
    let Some(rel) = document.attr(node, "rel") else {
        return false;
    };
    let mut tokens = rel.split_ascii_whitespace();
    let is_stylesheet = tokens
        .clone()
        .any(|token| token.eq_ignore_ascii_case("stylesheet"));
    is_stylesheet && !tokens.any(|token| token.eq_ignore_ascii_case("alternate"))
}

#[cfg(test)]
mod tests {
    use super::PageLoader;
    use crate::fetch::MemoryFetcher;
    use hd_css::CssRule;

    const PAGE: &str = r#"<!DOCTYPE html><html><head>
<title> Sample  page </title>
<link rel="stylesheet" href="/site.css">
<link rel="stylesheet" href="https://cdn.example/lib.css">
<link rel="alternate stylesheet" href="/alt.css">
<style>p { color: red }</style>
</head><body><p>hi</p></body></html>"#;

    #[test]
    fn loads_sheets_in_document_order() {
        let mut fetcher = MemoryFetcher::new()
            .with("https://example.com/", "text/html", PAGE.as_bytes())
            .with("https://example.com/site.css", "text/css", b"@import \"base.css\"; a { color: blue }")
            .with("https://example.com/base.css", "text/css", b"body { margin: 0 }");

        let page = PageLoader::new(&mut fetcher).load("https://example.com/");
        assert!(page.is_ok());
        let page = match page {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };

        assert_eq!(page.title(), "Sample page");
        let hrefs: Vec<Option<&str>> = page.stylesheets.iter().map(|sheet| sheet.href()).collect();
        assert_eq!(
            hrefs,
            vec![
                Some("https://example.com/site.css"),
                Some("https://cdn.example/lib.css"),
                None
            ]
        );
        assert!(page.stylesheets[0].sheet.is_accessible());
        assert!(!page.stylesheets[1].sheet.is_accessible());
        assert!(page.stylesheets[2].is_inline());

        let Some(rules) = page.stylesheets[0].sheet.rules.as_ref() else {
            panic!("same-origin sheet should be readable");
        };
        let CssRule::Import(import) = &rules[0] else {
            panic!("expected @import first");
        };
        assert!(import.sheet.as_ref().is_some_and(|sheet| sheet.is_accessible()));

        assert_eq!(fetcher.request_count("https://cdn.example/lib.css"), 0);
        assert_eq!(fetcher.request_count("https://example.com/alt.css"), 0);
    }

    #[test]
    fn circular_imports_terminate() {
        let mut fetcher = MemoryFetcher::new()
            .with("https://example.com/a.css", "text/css", b"@import \"b.css\";")
            .with("https://example.com/b.css", "text/css", b"@import \"a.css\";");
        let url = match hd_net::url::WebUrl::parse("https://example.com/") {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let page = PageLoader::new(&mut fetcher)
            .load_markup(url, r#"<link rel="stylesheet" href="a.css"><p>x</p>"#);
        assert_eq!(page.stylesheets.len(), 1);
        assert_eq!(fetcher.request_count("https://example.com/a.css"), 1);
        assert_eq!(fetcher.request_count("https://example.com/b.css"), 1);
    }

    #[test]
    fn unfetchable_document_is_fatal() {
        let mut fetcher = MemoryFetcher::new();
        let page = PageLoader::new(&mut fetcher).load("https://example.com/missing");
        assert!(matches!(page, Err(ref error) if error.code == "capture.document.unfetchable"));
    }
}

//! The capture orchestrator: snapshot, clean, flatten, upload, finalize.

use crate::config::CaptureConfig;
use crate::fetch::ResourceFetcher;
use crate::hooks::SiteHookRegistry;
use crate::page::LivePage;
use crate::page::is_stylesheet_link;
use crate::resolver::AttachmentRef;
use crate::resolver::Resolver;
use crate::sanitize::DisplayRules;
use crate::sanitize::apply_hidden_policy;
use crate::sanitize::promote_lazy_images;
use crate::sanitize::remove_active_content;
use crate::sanitize::strip_event_handlers;
use crate::snapshot::STYLESHEET_KEY_ATTR;
use crate::snapshot::build_snapshot;
use crate::snapshot::inline_sheet_key;
use crate::stylesheet::SheetKey;
use crate::stylesheet::StylesheetWalker;
use hd_archive::TransactionClient;
use hd_archive::endpoint::ArchiveEndpoint;
use hd_core::HoardError;
use hd_core::HoardResult;
use hd_css::values::parse_srcset;
use hd_css::values::serialize_srcset;
use hd_dom::Document;
use hd_net::url::WebUrl;

const FAVICON_PATH: &str = "/favicon.ico";
const UNTITLED: &str = "untitled";

const DROPPED_LINK_RELS: &[&str] = &["dns-prefetch", "preconnect", "preload", "amphtml"];
const SITE_VERIFICATION: &str = "site-verification";
const APPLE_TOUCH_ICON: &str = "apple-touch-icon";

/// What the caller learns about a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub success: bool,
    pub document_id: String,
    /// Where the archive shows the document.
    pub full_url: String,
    /// False when finalize failed or answered without `ok`; the uploads stand.
    pub finalized: bool,
}

/// Captures `page` into the transaction already open on `archive`.
///
/// Only a missing transaction or a failed document upload aborts the
/// capture. Every per-resource failure is logged and leaves the original
/// reference in place.
pub fn capture<E: ArchiveEndpoint, F: ResourceFetcher>(
    page: &mut LivePage,
    archive: &mut TransactionClient<E>,
    fetcher: &mut F,
    config: &CaptureConfig,
    hooks: &SiteHookRegistry,
) -> HoardResult<CaptureOutcome> {
    let Some(transaction) = archive.transaction().cloned() else {
        return Err(HoardError::new(
            "capture.transaction.not_open",
            "capture needs an open archive transaction",
        ));
    };
    tracing::info!(url = %page.url, txid = %transaction.txid, "capture started");

    let mut snapshot = build_snapshot(page);
    let fired = hooks.apply(&mut snapshot.document, page.url.as_str());
    if !fired.is_empty() {
        tracing::debug!(hooks = ?fired, "site hooks applied");
    }
    let active = remove_active_content(&mut snapshot.document);
    tracing::debug!(removed = active, "active content removed");
    promote_lazy_images(&mut snapshot.document);

    let display_rules = DisplayRules::from_sheets(&page.stylesheets);
    let title = page.title();

    let mut resolver = Resolver::new(page.url.clone(), archive, fetcher);
    let doc = &mut snapshot.document;

    rewrite_images(doc, &mut resolver);
    flatten_live_sheets(page, &mut resolver);
    let mut icon = rewrite_links(doc, &mut resolver);
    replace_inline_styles(doc, &resolver);
    rewrite_metas(doc, &mut resolver);
    let handlers = strip_event_handlers(doc);
    let hidden = apply_hidden_policy(doc, &display_rules, config.hidden_elements);
    tracing::debug!(handlers, hidden, policy = ?config.hidden_elements, "snapshot sanitized");

    let html = snapshot.serialize();
    let filename = format!("{}.html", if title.is_empty() { UNTITLED } else { title.as_str() });
    let summary = resolver.archive().upload_draft(&filename, html.as_bytes())?;
    if !summary.is_clean() {
        tracing::error!(rejected = summary.rejected, chunks = summary.chunks, "document upload partly rejected");
    }

    if icon.is_none() && config.favicon_fallback {
        icon = resolver.try_resolve(FAVICON_PATH, None);
    }
    let icon_id = icon.as_ref().and_then(AttachmentRef::icon_id);
    tracing::info!(
        resources = resolver.cache().resource_count(),
        stylesheets = resolver.cache().stylesheet_count(),
        bytes = html.len(),
        "document uploaded"
    );

    let (finalized, document_id) = match archive.finalize(&title, icon_id.as_deref(), &config.log_message) {
        Ok(outcome) => (outcome.ok, outcome.document_id.unwrap_or(transaction.doc_id)),
        Err(error) => {
            tracing::error!(%error, "finalize failed; the draft stays uploaded");
            (false, transaction.doc_id)
        }
    };

    let full_url = archive.view_url(&document_id);
    tracing::info!(document_id = %document_id, full_url = %full_url, finalized, "capture finished");
    Ok(CaptureOutcome {
        success: true,
        document_id,
        full_url,
        finalized,
    })
}

fn rewrite_images<E: ArchiveEndpoint, F: ResourceFetcher>(doc: &mut Document, resolver: &mut Resolver<'_, E, F>) {
    for img in doc.elements_by_tag(doc.root(), "img") {
        if let Some(src) = doc.attr(img, "src").map(str::to_owned) {
            if let Some(attachment) = resolver.try_resolve(&src, None) {
                doc.set_attr(img, "src", attachment.as_str());
            }
        }

        let Some(srcset) = doc.attr(img, "srcset").map(str::to_owned) else {
            continue;
        };
        let mut candidates = parse_srcset(&srcset);
        for candidate in &mut candidates {
            if let Some(attachment) = resolver.try_resolve(&candidate.url, None) {
                candidate.url = attachment.as_str().to_owned();
            }
        }
        doc.set_attr(img, "srcset", &serialize_srcset(&candidates));
    }
}

/// Flattens every live stylesheet in document order, filling the cache the
/// link and style passes read from.
fn flatten_live_sheets<E: ArchiveEndpoint, F: ResourceFetcher>(page: &mut LivePage, resolver: &mut Resolver<'_, E, F>) {
    for index in 0..page.stylesheets.len() {
        let key = match page.stylesheets[index].href() {
            Some(href) => match WebUrl::parse(href) {
                Ok(url) => SheetKey::Linked(url),
                Err(error) => {
                    tracing::warn!(href, %error, "stylesheet href is not a fetchable URL");
                    continue;
                }
            },
            None => match inline_sheet_key(page, index) {
                Some(key) => SheetKey::Inline(key),
                None => continue,
            },
        };

        let sheet = &mut page.stylesheets[index].sheet;
        if let Err(error) = StylesheetWalker::new(resolver).flatten(&key, sheet) {
            tracing::warn!(sheet = key.cache_key(), %error, "stylesheet could not be attached");
        }
    }
}

/// Rewrites stylesheet and icon links and drops hint links. Returns the
/// document icon.
fn rewrite_links<E: ArchiveEndpoint, F: ResourceFetcher>(
    doc: &mut Document,
    resolver: &mut Resolver<'_, E, F>,
) -> Option<AttachmentRef> {
    let mut icon: Option<AttachmentRef> = None;

    for link in doc.elements_by_tag(doc.root(), "link") {
        let rel = doc.attr(link, "rel").unwrap_or_default().trim().to_ascii_lowercase();
        let href = doc.attr(link, "href").unwrap_or_default().to_owned();

        if is_stylesheet_link(doc, link) {
            let attached = resolver
                .page_url()
                .join(href.trim())
                .ok()
                .and_then(|absolute| resolver.cache().stylesheet(absolute.as_str()).cloned());
            match attached {
                Some(attachment) => doc.set_attr(link, "href", attachment.as_str()),
                None => {
                    tracing::warn!(href = %href, "stylesheet link has no attachment");
                    doc.set_attr(link, "rel", "defunct-stylesheet");
                }
            }
        } else if DROPPED_LINK_RELS.contains(&rel.as_str()) || rel.contains(SITE_VERIFICATION) {
            doc.detach(link);
        } else if is_icon_name(&rel) {
            match resolver.try_resolve(&href, None) {
                Some(attachment) => {
                    doc.set_attr(link, "href", attachment.as_str());
                    if icon.is_none() || rel == APPLE_TOUCH_ICON {
                        icon = Some(attachment);
                    }
                }
                None => tracing::warn!(href = %href, rel = %rel, "icon link could not be attached"),
            }
        }
    }

    icon
}

/// Swaps each flattened inline `<style>` for a `<link>` at the end of `<head>`.
fn replace_inline_styles<E: ArchiveEndpoint, F: ResourceFetcher>(doc: &mut Document, resolver: &Resolver<'_, E, F>) {
    for style in doc.elements_by_tag(doc.root(), "style") {
        let Some(attachment) = doc
            .attr(style, STYLESHEET_KEY_ATTR)
            .and_then(|key| resolver.cache().stylesheet(key))
            .cloned()
        else {
            continue;
        };
        let Some(head) = doc.ensure_head() else {
            continue;
        };

        let link = doc.create_element("link");
        doc.set_attr(link, "rel", "stylesheet");
        doc.set_attr(link, "href", attachment.as_str());
        doc.append_child(head, link);
        doc.detach(style);
    }
}

fn rewrite_metas<E: ArchiveEndpoint, F: ResourceFetcher>(doc: &mut Document, resolver: &mut Resolver<'_, E, F>) {
    for meta in doc.elements_by_tag(doc.root(), "meta") {
        let lowered = |name: &str| doc.attr(meta, name).unwrap_or_default().trim().to_ascii_lowercase();
        let name = lowered("name");
        let http_equiv = lowered("http-equiv");
        let property = lowered("property");

        if name.contains(SITE_VERIFICATION) || http_equiv == "origin-trial" || name == "robots" {
            doc.detach(meta);
            continue;
        }

        let image_like = is_icon_name(&name) || name.ends_with(":image") || property.ends_with(":image");
        if !image_like {
            continue;
        }
        let content = doc.attr(meta, "content").unwrap_or_default().to_owned();
        match resolver.try_resolve(&content, None) {
            Some(attachment) => doc.set_attr(meta, "content", attachment.as_str()),
            None => tracing::warn!(content = %content, name = %name, property = %property, "meta image could not be attached"),
        }
    }
}

fn is_icon_name(name: &str) -> bool {
    matches!(name, "icon" | "shortcut icon" | APPLE_TOUCH_ICON) || name.starts_with("msapplication-")
}

#[cfg(test)]
mod tests {
    use super::capture;
    use super::is_icon_name;
    use crate::config::CaptureConfig;
    use crate::config::HiddenElementPolicy;
    use crate::fetch::MemoryFetcher;
    use crate::hooks::SiteHookRegistry;
    use crate::page::PageLoader;
    use hd_archive::InMemoryArchive;
    use hd_archive::TransactionClient;
    use hd_net::url::WebUrl;

    const PAGE: &str = "https://example.com/post";

    fn url(raw: &str) -> WebUrl {
        match WebUrl::parse(raw) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    fn open_archive(inner: InMemoryArchive) -> TransactionClient<InMemoryArchive> {
        let mut client = TransactionClient::new(inner, "key");
        assert!(client.open(PAGE).is_ok());
        client
    }

    fn document_text(client: &TransactionClient<InMemoryArchive>) -> String {
        let doc_id = client
            .transaction()
            .map(|transaction| transaction.doc_id.clone())
            .unwrap_or_default();
        client
            .endpoint()
            .document(&doc_id)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }

    #[test]
    fn recognizes_icon_relations() {
        assert!(is_icon_name("icon"));
        assert!(is_icon_name("shortcut icon"));
        assert!(is_icon_name("apple-touch-icon"));
        assert!(is_icon_name("msapplication-tileimage"));
        assert!(!is_icon_name("stylesheet"));
    }

    #[test]
    fn refuses_to_run_without_a_transaction() {
        let mut fetcher = MemoryFetcher::new();
        let mut page = PageLoader::new(&mut fetcher).load_markup(url(PAGE), "<p>x</p>");
        let mut archive = TransactionClient::new(InMemoryArchive::default(), "key");

        let outcome = capture(
            &mut page,
            &mut archive,
            &mut fetcher,
            &CaptureConfig::default(),
            &SiteHookRegistry::new(),
        );
        assert!(matches!(outcome, Err(ref error) if error.code == "capture.transaction.not_open"));
        assert!(archive.endpoint().calls().is_empty());
    }

    #[test]
    fn housekeeping_rewrites_links_metas_and_styles() {
        let markup = r#"<!DOCTYPE html><html><head><title>Post</title>
<link rel="preconnect" href="https://cdn.example">
<link rel="google-site-verification" href="x">
<link rel="icon" href="/favicon.png">
<link rel="apple-touch-icon" href="/touch.png">
<link rel="stylesheet" href="/site.css">
<meta name="robots" content="noindex">
<meta http-equiv="origin-trial" content="token">
<meta property="og:image" content="/share.png">
<style>p { color: red }</style>
<script>track()</script>
</head><body onload="boot()"><p>Hello</p></body></html>"#;
        let mut fetcher = MemoryFetcher::new()
            .with("https://example.com/site.css", "text/css", b"body { margin: 0 }")
            .with("https://example.com/favicon.png", "image/png", b"P1")
            .with("https://example.com/touch.png", "image/png", b"P2")
            .with("https://example.com/share.png", "image/png", b"P3");
        let mut page = PageLoader::new(&mut fetcher).load_markup(url(PAGE), markup);
        let mut archive = open_archive(InMemoryArchive::default());

        let outcome = capture(
            &mut page,
            &mut archive,
            &mut fetcher,
            &CaptureConfig::default(),
            &SiteHookRegistry::new(),
        );
        assert!(outcome.is_ok());
        let outcome = match outcome {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert!(outcome.success);
        assert!(outcome.finalized);

        let html = document_text(&archive);
        assert!(html.starts_with("<!DOCTYPE html>\n<html>"), "{html}");
        for gone in ["preconnect", "site-verification", "robots", "origin-trial", "<script", "onload", "<style"] {
            assert!(!html.contains(gone), "`{gone}` survived in {html}");
        }
        assert!(html.contains(r#"<meta property="og:image" content="att/a"#));
        assert!(!html.contains("/favicon.png"));
        assert!(!html.contains("/site.css"));
        assert_eq!(html.matches(r#"<link rel="stylesheet" href="att/a"#).count(), 2);

        let finalized = archive.endpoint().finalized().cloned();
        let Some(finalized) = finalized else {
            panic!("draft was not finalized");
        };
        assert_eq!(finalized.doc_title, "Post");
        let touch = archive
            .endpoint()
            .calls_to("api/upload-attachment")
            .iter()
            .find(|call| call.form.file_bytes("attachment") == Some(b"P2".as_slice()))
            .and_then(|call| call.form.text_value("att_id"))
            .map(|att_id| format!("a{att_id}"));
        assert_eq!(touch.as_deref(), Some(finalized.icon_id.as_str()));
    }

    #[test]
    fn unmatched_stylesheet_links_are_marked_defunct() {
        let markup = r#"<html><head><link rel="stylesheet" href="/missing.css"></head><body></body></html>"#;
        let mut fetcher = MemoryFetcher::new();
        let mut page = PageLoader::new(&mut fetcher).load_markup(url(PAGE), markup);
        page.stylesheets.clear();
        let mut archive = open_archive(InMemoryArchive::default());

        let outcome = capture(
            &mut page,
            &mut archive,
            &mut fetcher,
            &CaptureConfig::default(),
            &SiteHookRegistry::new(),
        );
        assert!(outcome.is_ok());
        assert!(document_text(&archive).contains(r#"rel="defunct-stylesheet""#));
    }

    #[test]
    fn favicon_fallback_and_hidden_policy_follow_config() {
        let markup = r#"<html><head><title>T</title><style>.ad { display: none }</style></head><body><div class="ad">ad</div><p>text</p></body></html>"#;
        let mut fetcher = MemoryFetcher::new().with("https://example.com/favicon.ico", "image/vnd.microsoft.icon", b"ICO");
        let mut page = PageLoader::new(&mut fetcher).load_markup(url(PAGE), markup);
        let mut archive = open_archive(InMemoryArchive::default());
        let config = CaptureConfig {
            hidden_elements: HiddenElementPolicy::Strip,
            ..CaptureConfig::default()
        };

        let outcome = capture(&mut page, &mut archive, &mut fetcher, &config, &SiteHookRegistry::new());
        assert!(outcome.is_ok());

        let html = document_text(&archive);
        assert!(!html.contains("class=\"ad\""), "{html}");
        assert!(html.contains("<p>text</p>"));
        assert_eq!(fetcher.request_count("https://example.com/favicon.ico"), 1);
        let icon_id = archive
            .endpoint()
            .finalized()
            .map(|draft| draft.icon_id.clone())
            .unwrap_or_default();
        assert!(!icon_id.is_empty());
        assert!(!icon_id.contains('.'));
    }

    #[test]
    fn finalize_failure_still_reports_the_uploaded_document() {
        let mut fetcher = MemoryFetcher::new();
        let mut page = PageLoader::new(&mut fetcher).load_markup(url(PAGE), "<title>T</title><p>x</p>");
        let mut archive = open_archive(InMemoryArchive::default().failing("api/finalize-draft"));
        let config = CaptureConfig {
            favicon_fallback: false,
            ..CaptureConfig::default()
        };

        let outcome = capture(&mut page, &mut archive, &mut fetcher, &config, &SiteHookRegistry::new());
        let outcome = match outcome {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert!(outcome.success);
        assert!(!outcome.finalized);
        let doc_id = archive
            .transaction()
            .map(|transaction| transaction.doc_id.clone())
            .unwrap_or_default();
        assert_eq!(outcome.document_id, doc_id);
        assert_eq!(outcome.full_url, format!("http://archive.invalid/documents/view/g{doc_id}/"));
        assert!(document_text(&archive).contains("<p>x</p>"));
    }

    #[test]
    fn document_upload_failure_aborts() {
        let mut fetcher = MemoryFetcher::new();
        let mut page = PageLoader::new(&mut fetcher).load_markup(url(PAGE), "<p>x</p>");
        let mut archive = open_archive(InMemoryArchive::default().failing("api/upload-draft"));

        let outcome = capture(
            &mut page,
            &mut archive,
            &mut fetcher,
            &CaptureConfig::default(),
            &SiteHookRegistry::new(),
        );
        assert!(outcome.is_err());
        assert!(archive.endpoint().calls_to("api/finalize-draft").is_empty());
    }
}

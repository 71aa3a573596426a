//! Stylesheet Rule Walker: rebuilds a stylesheet's text with every resource
//! reference pointing at an attachment, then uploads it as one.
//!
//! Declarations are rewritten in place to produce the text and put back
//! right after, so the live rules end up exactly as they started.

use crate::fetch::ResourceFetcher;
use crate::resolver::AttachmentRef;
use crate::resolver::ResolveError;
use crate::resolver::Resolver;
use hd_archive::AttachmentSlot;
use hd_archive::endpoint::ArchiveEndpoint;
use hd_css::CssRule;
use hd_css::FontFaceRule;
use hd_css::ImportRule;
use hd_css::MediaRule;
use hd_css::StyleRule;
use hd_css::StyleSheet;
use hd_css::values::FontSrcTerm;
use hd_css::values::find_urls;
use hd_css::values::parse_font_src;
use hd_css::values::replace_urls;
use hd_css::values::serialize_url;
use hd_net::url::WebUrl;

/// Declarations whose values may reference images.
const URL_PROPERTIES: &[&str] = &[
    "background-image",
    "list-style-image",
    "content",
    "cursor",
    "background",
    "list-style",
];

const MEDIA_INDENT: &str = "    ";

/// Identifies a stylesheet in the attachment cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetKey {
    /// Key stored on an inline `<style>` element.
    Inline(String),
    Linked(WebUrl),
}

impl SheetKey {
    pub fn cache_key(&self) -> &str {
        match self {
            Self::Inline(key) => key,
            Self::Linked(href) => href.as_str(),
        }
    }
}

pub struct StylesheetWalker<'r, 'a, E: ArchiveEndpoint, F: ResourceFetcher> {
    resolver: &'r mut Resolver<'a, E, F>,
}

impl<'r, 'a, E: ArchiveEndpoint, F: ResourceFetcher> StylesheetWalker<'r, 'a, E, F> {
    pub fn new(resolver: &'r mut Resolver<'a, E, F>) -> Self {
        Self { resolver }
    }

    /// Flattens `sheet` into a new attachment, once per key.
    ///
    /// The cache entry is recorded before any rule is visited, so an import
    /// cycle ends at the pending filename. Cross-origin sheets are proxied,
    /// downloaded back and parsed, since their rules are unreadable here.
    pub fn flatten(
        &mut self,
        key: &SheetKey,
        sheet: &mut StyleSheet,
    ) -> Result<AttachmentRef, ResolveError> {
        if let Some(hit) = self.resolver.cache().stylesheet(key.cache_key()) {
            return Ok(hit.clone());
        }
        tracing::debug!(sheet = key.cache_key(), "attaching stylesheet");

        let page_url = self.resolver.page_url().clone();
        let (slot, body) = match key {
            SheetKey::Linked(href) if !href.same_origin(&page_url) => {
                let slot = self
                    .resolver
                    .archive()
                    .proxy_attachment(href.as_str())
                    .map_err(ResolveError::Protocol)?;
                self.record(key, &slot);

                let downloaded = match self.resolver.archive().download_attachment(&slot.attachment_id) {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        tracing::error!(href = %href, %error, "proxied stylesheet could not be downloaded");
                        return Ok(AttachmentRef::new(slot.filename));
                    }
                };
                let mut proxied =
                    StyleSheet::parse(Some(href.as_str().to_owned()), &String::from_utf8_lossy(&downloaded));
                let body = match proxied.rules.as_mut() {
                    Some(rules) => self.flatten_rules(rules, href),
                    None => String::new(),
                };
                (slot, body)
            }
            _ => {
                let slot = self
                    .resolver
                    .archive()
                    .register_attachment("css")
                    .map_err(ResolveError::Protocol)?;
                self.record(key, &slot);

                let base = match key {
                    SheetKey::Linked(href) => href.clone(),
                    SheetKey::Inline(_) => page_url,
                };
                let body = match sheet.rules.as_mut() {
                    Some(rules) => self.flatten_rules(rules, &base),
                    None => {
                        tracing::warn!(sheet = key.cache_key(), "stylesheet rules are not readable; uploading an empty body");
                        String::new()
                    }
                };
                (slot, body)
            }
        };

        match self.resolver.archive().upload_attachment(&slot, body.as_bytes()) {
            Ok(summary) if !summary.is_clean() => {
                tracing::error!(sheet = key.cache_key(), rejected = summary.rejected, "stylesheet upload partly rejected");
            }
            Ok(_) => {}
            Err(error) => {
                tracing::error!(sheet = key.cache_key(), %error, "stylesheet upload failed");
            }
        }

        Ok(AttachmentRef::new(slot.filename))
    }

    /// Reassembles `rules` in source order, one rule per line.
    pub fn flatten_rules(&mut self, rules: &mut [CssRule], base: &WebUrl) -> String {
        let mut out = String::new();
        for rule in rules.iter_mut() {
            out.push_str(&self.flatten_rule(rule, base));
        }
        out
    }

    fn record(&mut self, key: &SheetKey, slot: &AttachmentSlot) {
        self.resolver
            .cache_mut()
            .record_stylesheet(key.cache_key(), AttachmentRef::new(slot.filename.clone()));
    }

    fn flatten_rule(&mut self, rule: &mut CssRule, base: &WebUrl) -> String {
        match rule {
            CssRule::Import(import) => match self.flatten_import(import, base) {
                Some(text) => text,
                None => format!("{}\n", import.css_text()),
            },
            CssRule::Style(style) => self.flatten_style(style, base),
            CssRule::Media(media) => self.flatten_media(media, base),
            CssRule::FontFace(font_face) => self.flatten_font_face(font_face, base),
            CssRule::Other(text) => format!("{text}\n"),
        }
    }

    fn flatten_import(&mut self, import: &mut ImportRule, base: &WebUrl) -> Option<String> {
        let absolute = match base.join(&import.href) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(href = %import.href, %error, "import left as written");
                return None;
            }
        };

        let key = SheetKey::Linked(absolute.clone());
        let mut unloaded = StyleSheet::inaccessible(Some(absolute.as_str().to_owned()));
        let sheet = match import.sheet.as_deref_mut() {
            Some(loaded) => loaded,
            None => {
                tracing::warn!(href = %absolute, "imported stylesheet was never loaded; import not followed");
                &mut unloaded
            }
        };

        match self.flatten(&key, sheet) {
            Ok(attachment) => {
                let mut text = format!("@import {}", serialize_url(attachment.from_attachment()));
                if !import.media.is_empty() {
                    text.push(' ');
                    text.push_str(&import.media);
                }
                text.push_str(";\n");
                Some(text)
            }
            Err(error) => {
                tracing::warn!(href = %absolute, %error, "import left as written");
                None
            }
        }
    }

    fn flatten_style(&mut self, rule: &mut StyleRule, base: &WebUrl) -> String {
        let mut originals: Vec<(&str, String)> = Vec::new();

        for property in URL_PROPERTIES {
            let Some(value) = rule.declarations.get(property).map(str::to_owned) else {
                continue;
            };
            if find_urls(&value).is_empty() {
                continue;
            }

            let rewritten = replace_urls(&value, |reference| {
                self.resolver
                    .try_resolve(reference, Some(base))
                    .map(|attachment| attachment.from_attachment().to_owned())
            });
            if rewritten != value {
                rule.declarations.set(property, &rewritten);
                originals.push((property, value));
            }
        }

        let text = format!("{}\n", rule.css_text());

        for (property, value) in originals.into_iter().rev() {
            rule.declarations.set(property, &value);
        }
        text
    }

    fn flatten_media(&mut self, rule: &mut MediaRule, base: &WebUrl) -> String {
        let mut out = format!("@media {} {{\n", rule.condition);
        for child in rule.rules.iter_mut() {
            out.push_str(MEDIA_INDENT);
            out.push_str(&self.flatten_rule(child, base));
        }
        out.push_str("}\n");
        out
    }

    /// Rewrites the `src` list term by term. `local()` terms pass through;
    /// unresolvable and unrecognized terms are dropped.
    fn flatten_font_face(&mut self, rule: &mut FontFaceRule, base: &WebUrl) -> String {
        let Some(original) = rule.declarations.get("src").map(str::to_owned) else {
            return format!("{}\n", rule.css_text());
        };

        let mut kept = Vec::new();
        for term in parse_font_src(&original) {
            match term {
                FontSrcTerm::Url { url, hints } => match self.resolver.resolve(&url, Some(base)) {
                    Ok(Some(attachment)) => kept.push(
                        FontSrcTerm::Url {
                            url: attachment.from_attachment().to_owned(),
                            hints,
                        }
                        .css_text(),
                    ),
                    Ok(None) => kept.push(FontSrcTerm::Url { url, hints }.css_text()),
                    Err(error) => {
                        tracing::warn!(url = %url, %error, "font source dropped");
                    }
                },
                FontSrcTerm::Local(text) => kept.push(text),
                FontSrcTerm::Unknown(text) => {
                    tracing::warn!(term = %text, "unknown font source type");
                }
            }
        }

        rule.declarations.set("src", &kept.join(", "));
        let text = format!("{}\n", rule.css_text());
        rule.declarations.set("src", &original);
        text
    }
}

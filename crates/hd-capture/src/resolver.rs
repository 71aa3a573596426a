//! Resource Resolver and the per-capture Attachment Cache.
//!
//! Every distinct absolute URL is registered with the archive at most once
//! per capture. Same-origin resources are fetched here and uploaded;
//! cross-origin ones are handed to the archive's proxy and never fetched
//! directly.

use crate::fetch::ResourceFetcher;
use hd_archive::TransactionClient;
use hd_archive::endpoint::ArchiveEndpoint;
use hd_archive::strip_attachment_prefix;
use hd_core::HoardError;
use hd_net::media_type_of;
use hd_net::url::WebUrl;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Served filename of an attachment, e.g. `att/a0f3c9e21b.png`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentRef(String);

impl AttachmentRef {
    pub fn new(filename: impl Into<String>) -> Self {
        Self(filename.into())
    }

    /// Reference as used from the captured document.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reference as used from inside another attachment, which is served
    /// from the attachment directory itself.
    pub fn from_attachment(&self) -> &str {
        strip_attachment_prefix(&self.0)
    }

    /// The bare id the archive expects as a document icon.
    pub fn icon_id(&self) -> Option<String> {
        static ICON_ID: OnceLock<Option<Regex>> = OnceLock::new();
        let pattern = ICON_ID
            .get_or_init(|| Regex::new(r"^(att/)?(\w+)(\.\w+)?").ok())
            .as_ref()?;
        pattern
            .captures(&self.0)
            .and_then(|captures| captures.get(2))
            .map(|id| id.as_str().to_owned())
    }
}

impl fmt::Display for AttachmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The reference does not resolve to a fetchable http(s) URL.
    InvalidUrl(HoardError),
    Fetch(HoardError),
    UnknownContentType { url: String, content_type: String },
    /// The archive refused or garbled a register, proxy or upload call.
    Protocol(HoardError),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl(error) => write!(f, "invalid reference: {error}"),
            Self::Fetch(error) => write!(f, "fetch failed: {error}"),
            Self::UnknownContentType { url, content_type } => {
                write!(f, "unknown mime type `{content_type}` for `{url}`")
            }
            Self::Protocol(error) => write!(f, "archive call failed: {error}"),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Maps a declared content type to the extension the archive stores it under.
pub fn extension_for_content_type(content_type: &str) -> Option<String> {
    let media_type = media_type_of(content_type);
    if let Some(subtype) = media_type.strip_prefix("image/") {
        return match subtype {
            "" => None,
            "svg+xml" => Some("svg".to_owned()),
            "vnd.microsoft.icon" => Some("ico".to_owned()),
            other => Some(other.to_owned()),
        };
    }
    media_type
        .strip_prefix("font/")
        .filter(|subtype| !subtype.is_empty())
        .map(str::to_owned)
}

/// Capture-scoped memo of issued attachments.
///
/// Resources are keyed by absolute URL. Stylesheets are keyed by absolute
/// URL or, for inline sheets, by the key on their owner element.
#[derive(Debug, Clone, Default)]
pub struct AttachmentCache {
    resources: HashMap<String, AttachmentRef>,
    stylesheets: HashMap<String, AttachmentRef>,
}

impl AttachmentCache {
    pub fn resource(&self, absolute_url: &str) -> Option<&AttachmentRef> {
        self.resources.get(absolute_url)
    }

    pub fn stylesheet(&self, key: &str) -> Option<&AttachmentRef> {
        self.stylesheets.get(key)
    }

    pub fn record_resource(&mut self, absolute_url: &str, attachment: AttachmentRef) {
        self.resources.insert(absolute_url.to_owned(), attachment);
    }

    pub fn record_stylesheet(&mut self, key: &str, attachment: AttachmentRef) {
        self.stylesheets.insert(key.to_owned(), attachment);
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn stylesheet_count(&self) -> usize {
        self.stylesheets.len()
    }
}

pub struct Resolver<'a, E: ArchiveEndpoint, F: ResourceFetcher> {
    page_url: WebUrl,
    archive: &'a mut TransactionClient<E>,
    fetcher: &'a mut F,
    cache: AttachmentCache,
}

impl<'a, E: ArchiveEndpoint, F: ResourceFetcher> Resolver<'a, E, F> {
    pub fn new(page_url: WebUrl, archive: &'a mut TransactionClient<E>, fetcher: &'a mut F) -> Self {
        Self {
            page_url,
            archive,
            fetcher,
            cache: AttachmentCache::default(),
        }
    }

    pub fn page_url(&self) -> &WebUrl {
        &self.page_url
    }

    pub fn cache(&self) -> &AttachmentCache {
        &self.cache
    }

    pub(crate) fn cache_mut(&mut self) -> &mut AttachmentCache {
        &mut self.cache
    }

    pub(crate) fn archive(&mut self) -> &mut TransactionClient<E> {
        &mut *self.archive
    }

    /// Resolves `reference` against `relative_to` (the page URL by default).
    ///
    /// Empty and `data:` references resolve to `Ok(None)` and stay inline.
    pub fn resolve(
        &mut self,
        reference: &str,
        relative_to: Option<&WebUrl>,
    ) -> Result<Option<AttachmentRef>, ResolveError> {
        let reference = reference.trim();
        if reference.is_empty() || is_data_url(reference) {
            return Ok(None);
        }

        let base = relative_to.unwrap_or(&self.page_url);
        let absolute = base.join(reference).map_err(ResolveError::InvalidUrl)?;

        if let Some(hit) = self.cache.resource(absolute.as_str()) {
            tracing::debug!(url = %absolute, attachment = %hit, "attachment cache hit");
            return Ok(Some(hit.clone()));
        }

        if !absolute.same_origin(&self.page_url) {
            let slot = self
                .archive
                .proxy_attachment(absolute.as_str())
                .map_err(ResolveError::Protocol)?;
            let attachment = AttachmentRef::new(slot.filename);
            tracing::debug!(url = %absolute, attachment = %attachment, "proxied cross-origin resource");
            self.cache.record_resource(absolute.as_str(), attachment.clone());
            return Ok(Some(attachment));
        }

        let fetched = self.fetcher.fetch(&absolute).map_err(ResolveError::Fetch)?;
        let content_type = fetched.content_type.clone().unwrap_or_default();
        let Some(ext) = extension_for_content_type(&content_type) else {
            return Err(ResolveError::UnknownContentType {
                url: absolute.as_str().to_owned(),
                content_type,
            });
        };

        let slot = self
            .archive
            .register_attachment(&ext)
            .map_err(ResolveError::Protocol)?;
        let attachment = AttachmentRef::new(slot.filename.clone());
        self.cache.record_resource(absolute.as_str(), attachment.clone());

        // The slot exists from here on, so a failed upload keeps the reference.
        match self.archive.upload_attachment(&slot, &fetched.bytes) {
            Ok(summary) if summary.is_clean() => {}
            Ok(summary) => {
                tracing::error!(url = %absolute, rejected = summary.rejected, "attachment upload partly rejected");
            }
            Err(error) => {
                tracing::error!(url = %absolute, %error, "attachment upload failed");
            }
        }

        tracing::debug!(url = %absolute, attachment = %attachment, "attached same-origin resource");
        Ok(Some(attachment))
    }

    /// [`Self::resolve`] for call sites that keep the original reference on failure.
    pub fn try_resolve(&mut self, reference: &str, relative_to: Option<&WebUrl>) -> Option<AttachmentRef> {
        match self.resolve(reference, relative_to) {
            Ok(resolved) => resolved,
            Err(error) => {
                tracing::warn!(reference, %error, "error attaching resource");
                None
            }
        }
    }
}

fn is_data_url(reference: &str) -> bool {
    reference
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

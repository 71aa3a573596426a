//! TLS policy for page and archive connections.
//!
//! The policy decides whether a URL may be fetched at all (`https_only`)
//! and, for `https` URLs, which protocol versions and trust anchors the
//! handshake uses. The rustls configuration built from it is shared by
//! every connection a [`crate::connect::DirectConnector`] opens.

use crate::url::Scheme;
use crate::url::WebUrl;
use hd_core::HoardError;
use hd_core::HoardResult;

#[cfg(feature = "tls-rustls")]
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    V1_2,
    V1_3,
}

/// Which trust anchors verify server certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustStoreMode {
    /// Embedded Mozilla roots only.
    WebPkiOnly,
    /// Embedded roots plus the operating-system store, so archives behind
    /// a local CA still verify.
    WebPkiAndOs,
}

/// What one `https` connection needs to know to start its handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsHandshakeConfig {
    pub server_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPolicy {
    pub minimum_version: TlsVersion,
    pub maximum_version: TlsVersion,
    /// Refuse plain `http://` URLs outright.
    pub https_only: bool,
    pub trust_store_mode: TrustStoreMode,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self {
            minimum_version: TlsVersion::V1_2,
            maximum_version: TlsVersion::V1_3,
            https_only: false,
            trust_store_mode: TrustStoreMode::WebPkiAndOs,
        }
    }
}

impl TlsPolicy {
    pub fn with_https_only(mut self, https_only: bool) -> Self {
        self.https_only = https_only;
        self
    }

    pub fn with_trust_store_mode(mut self, mode: TrustStoreMode) -> Self {
        self.trust_store_mode = mode;
        self
    }

    pub fn validate(&self) -> HoardResult<()> {
        if self.minimum_version > self.maximum_version {
            return Err(HoardError::new(
                "net.tls.invalid_version_range",
                format!(
                    "TLS floor {:?} is above ceiling {:?}",
                    self.minimum_version, self.maximum_version
                ),
            ));
        }
        Ok(())
    }

    /// `None` for plain `http`, an error when `https_only` forbids it.
    pub fn handshake_config_for(&self, url: &WebUrl) -> HoardResult<Option<TlsHandshakeConfig>> {
        match url.scheme() {
            Scheme::Https => Ok(Some(TlsHandshakeConfig {
                server_name: url.host().to_owned(),
            })),
            Scheme::Http if self.https_only => Err(HoardError::new(
                "net.tls.https_only",
                format!("refusing plain-text fetch of `{url}` in HTTPS-only mode"),
            )),
            Scheme::Http => Ok(None),
        }
    }

    /// Builds the rustls client configuration this policy describes.
    #[cfg(feature = "tls-rustls")]
    pub(crate) fn rustls_config(&self) -> HoardResult<Arc<rustls::ClientConfig>> {
        self.validate()?;
        let versions = self.rustls_versions();
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let mut config = rustls::ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&versions)
            .map_err(|error| {
                HoardError::new(
                    "net.tls.config_versions_invalid",
                    format!("rustls rejected the version set: {error}"),
                )
            })?
            .with_root_certificates(self.trust_anchors()?)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }

    #[cfg(feature = "tls-rustls")]
    fn rustls_versions(&self) -> Vec<&'static rustls::SupportedProtocolVersion> {
        let mut versions = Vec::with_capacity(2);
        if self.maximum_version >= TlsVersion::V1_3 {
            versions.push(&rustls::version::TLS13);
        }
        if self.minimum_version <= TlsVersion::V1_2 {
            versions.push(&rustls::version::TLS12);
        }
        versions
    }

    #[cfg(feature = "tls-rustls")]
    fn trust_anchors(&self) -> HoardResult<rustls::RootCertStore> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        if self.trust_store_mode == TrustStoreMode::WebPkiAndOs {
            let native = rustls_native_certs::load_native_certs();
            if !native.errors.is_empty() {
                tracing::debug!(errors = native.errors.len(), "some system roots were unreadable");
            }
            let (added, ignored) = roots.add_parsable_certificates(native.certs);
            tracing::debug!(added, ignored, "loaded system trust anchors");
        }

        if roots.is_empty() {
            return Err(HoardError::new(
                "net.tls.root_store_empty",
                "no trust anchors to verify server certificates with",
            ));
        }
        Ok(roots)
    }
}

#[cfg(test)]
mod tests {
    use super::TlsPolicy;
    use super::TlsVersion;
    use crate::url::WebUrl;

    fn url(input: &str) -> WebUrl {
        match WebUrl::parse(input) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    #[test]
    fn inverted_version_range_is_rejected() {
        let policy = TlsPolicy {
            minimum_version: TlsVersion::V1_3,
            maximum_version: TlsVersion::V1_2,
            ..TlsPolicy::default()
        };
        assert!(matches!(policy.validate(), Err(ref error) if error.code == "net.tls.invalid_version_range"));
    }

    #[test]
    fn only_https_urls_get_a_handshake() {
        let policy = TlsPolicy::default();
        let secure = policy.handshake_config_for(&url("https://archive.example/api/whoami"));
        assert!(matches!(secure, Ok(Some(ref config)) if config.server_name == "archive.example"));
        let plain = policy.handshake_config_for(&url("http://localhost:3000/api/whoami"));
        assert!(matches!(plain, Ok(None)));
    }

    #[test]
    fn https_only_refuses_plain_pages() {
        let policy = TlsPolicy::default().with_https_only(true);
        let refused = policy.handshake_config_for(&url("http://example.com/"));
        assert!(matches!(refused, Err(ref error) if error.code == "net.tls.https_only"));
    }

    #[cfg(feature = "tls-rustls")]
    #[test]
    fn version_range_selects_rustls_versions() {
        assert_eq!(TlsPolicy::default().rustls_versions().len(), 2);
        let modern = TlsPolicy {
            minimum_version: TlsVersion::V1_3,
            ..TlsPolicy::default()
        };
        assert_eq!(modern.rustls_versions().len(), 1);
    }
}

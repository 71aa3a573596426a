//! Networking: URL model, HTTP/1.1 messages and client, TLS policy, multipart forms.

pub mod client;
pub mod connect;
pub mod http;
pub mod multipart;
pub mod tls;
pub mod url;
mod wire;

use crate::client::HttpClient;
use crate::connect::Connector;
use crate::http::HttpMethod;
use crate::http::HttpRequest;
use crate::multipart::MultipartForm;
use crate::tls::TlsHandshakeConfig;
use crate::tls::TlsPolicy;
use crate::url::WebUrl;
use hd_core::HoardError;
use hd_core::HoardResult;
use std::time::Duration;

pub use crate::http::Header;
pub use crate::http::HttpResponse;
pub use crate::http::HttpStatusCode;
pub use crate::http::HttpVersion;
pub use crate::http::media_type_of;
pub use crate::tls::TlsVersion;
pub use crate::tls::TrustStoreMode;
pub use crate::url::Scheme;

const DEFAULT_USER_AGENT: &str = concat!("hoard-capture/", env!("CARGO_PKG_VERSION"));
const DEFAULT_ACCEPT_HEADER: &str = "*/*";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Request prepared by the network layer before transport execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub request: HttpRequest,
    pub tls: Option<TlsHandshakeConfig>,
}

/// A response together with the URL it was finally served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub final_url: WebUrl,
    pub response: HttpResponse,
}

/// Request factory shared by page loading, resource fetching and the archive client.
#[derive(Debug, Clone)]
pub struct NetStack {
    pub tls_policy: TlsPolicy,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for NetStack {
    fn default() -> Self {
        Self::new(TlsPolicy::default())
    }
}

impl NetStack {
    pub fn new(tls_policy: TlsPolicy) -> Self {
        Self {
            tls_policy,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_owned();
        self
    }

    pub fn parse_url(&self, raw_url: &str) -> HoardResult<WebUrl> {
        WebUrl::parse(raw_url)
    }

    pub fn prepare_get(&self, raw_url: &str) -> HoardResult<PreparedRequest> {
        let url = WebUrl::parse(raw_url)?;
        let tls = self.tls_policy.handshake_config_for(&url)?;

        let request = self
            .base_request(HttpMethod::Get, url)?
            .header("Accept", DEFAULT_ACCEPT_HEADER)?
            .header("Accept-Language", DEFAULT_ACCEPT_LANGUAGE)?
            .header("Accept-Encoding", "gzip, deflate, br")?
            .build()?;

        Ok(PreparedRequest { request, tls })
    }

    pub fn prepare_post_multipart(
        &self,
        raw_url: &str,
        form: &MultipartForm,
    ) -> HoardResult<PreparedRequest> {
        let url = WebUrl::parse(raw_url)?;
        let tls = self.tls_policy.handshake_config_for(&url)?;

        let request = self
            .base_request(HttpMethod::Post, url)?
            .header("Accept", "application/json, */*")?
            .header("Accept-Encoding", "gzip, deflate, br")?
            .header("Content-Type", &form.content_type())?
            .body(form.encode())
            .build()?;

        Ok(PreparedRequest { request, tls })
    }

    fn base_request(
        &self,
        method: HttpMethod,
        url: WebUrl,
    ) -> HoardResult<crate::http::HttpRequestBuilder> {
        HttpRequest::builder(method, url).header("User-Agent", &self.user_agent)
    }

    pub fn client(&self) -> HoardResult<HttpClient> {
        HttpClient::new(self.tls_policy.clone(), self.timeout)
    }

    /// GETs `raw_url`, following up to `max_redirects` `Location` hops.
    pub fn fetch<C: Connector>(
        &self,
        client: &mut HttpClient<C>,
        raw_url: &str,
        max_redirects: usize,
    ) -> HoardResult<FetchedResponse> {
        let mut current = self.parse_url(raw_url)?;
        let mut redirects_followed = 0_usize;

        loop {
            let prepared = self.prepare_get(current.as_str())?;
            let response = client.execute(&prepared)?;

            if !response.status.is_redirect() {
                return Ok(FetchedResponse {
                    final_url: current,
                    response,
                });
            }

            let location = response.header("location").ok_or_else(|| {
                HoardError::new(
                    "net.redirect.location_missing",
                    format!(
                        "redirect {} from `{current}` has no Location header",
                        response.status.as_u16()
                    ),
                )
            })?;

            if redirects_followed >= max_redirects {
                return Err(HoardError::new(
                    "net.redirect.limit_exceeded",
                    format!("more than {max_redirects} redirects starting at `{raw_url}`"),
                ));
            }
            redirects_followed += 1;

            let next = current.join(location)?;
            tracing::debug!(from = %current, to = %next, "following redirect");
            current = next;
        }
    }
}

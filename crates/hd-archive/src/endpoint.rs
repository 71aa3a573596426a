//! Transport seam between the transaction client and the archive service.

use hd_core::HoardError;
use hd_core::HoardResult;
use hd_net::NetStack;
use hd_net::client::HttpClient;
use hd_net::multipart::MultipartForm;
use hd_net::url::WebUrl;

/// Posts multipart forms to service endpoints such as `api/new-attachment`.
pub trait ArchiveEndpoint {
    /// Returns the raw response body of a successful (2xx) post.
    fn post(&mut self, endpoint: &str, form: &MultipartForm) -> HoardResult<Vec<u8>>;

    /// Base URL the service is reachable under, ending in `/`.
    fn base_url(&self) -> &str;
}

/// Archive service reached over HTTP(S).
pub struct HttpArchiveEndpoint {
    base: WebUrl,
    stack: NetStack,
    client: HttpClient,
}

impl HttpArchiveEndpoint {
    pub fn new(base_url: &str, stack: NetStack) -> HoardResult<Self> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_owned()
        } else {
            format!("{base_url}/")
        };
        let base = WebUrl::parse(&normalized)?;
        let client = stack.client()?;
        Ok(Self {
            base,
            stack,
            client,
        })
    }
}

impl ArchiveEndpoint for HttpArchiveEndpoint {
    fn post(&mut self, endpoint: &str, form: &MultipartForm) -> HoardResult<Vec<u8>> {
        let url = self.base.join(endpoint)?;
        let prepared = self.stack.prepare_post_multipart(url.as_str(), form)?;
        let response = self.client.execute(&prepared)?;

        if !response.status.is_success() {
            let status = response.status.as_u16();
            tracing::error!(endpoint, status, "archive service rejected request");
            return Err(HoardError::new(
                "archive.http.status",
                format!("`{endpoint}` answered {status}: {}", response.body_text().trim()),
            ));
        }

        Ok(response.body)
    }

    fn base_url(&self) -> &str {
        self.base.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::ArchiveEndpoint;
    use super::HttpArchiveEndpoint;
    use hd_net::NetStack;

    #[test]
    fn base_url_gains_trailing_slash() {
        let endpoint = HttpArchiveEndpoint::new("https://hoard.example/base", NetStack::default());
        assert!(endpoint.is_ok());
        let endpoint = match endpoint {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(endpoint.base_url(), "https://hoard.example/base/");
    }

    #[test]
    fn rejects_unsupported_base_scheme() {
        let endpoint = HttpArchiveEndpoint::new("ftp://hoard.example/", NetStack::default());
        assert!(endpoint.is_err());
    }
}

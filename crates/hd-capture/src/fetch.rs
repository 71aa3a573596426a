//! Fetching page resources: the document, linked stylesheets and same-origin assets.

use hd_core::HoardError;
use hd_core::HoardResult;
use hd_net::NetStack;
use hd_net::client::HttpClient;
use hd_net::url::WebUrl;
use std::collections::BTreeMap;

/// Body of a fetched resource plus the metadata the pipeline cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    /// Where the body was finally served from, after redirects.
    pub url: WebUrl,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FetchedResource {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

pub trait ResourceFetcher {
    fn fetch(&mut self, url: &WebUrl) -> HoardResult<FetchedResource>;
}

/// Fetches over HTTP(S), following redirects.
pub struct HttpResourceFetcher {
    stack: NetStack,
    client: HttpClient,
    max_redirects: usize,
}

impl HttpResourceFetcher {
    pub fn new(stack: NetStack, max_redirects: usize) -> HoardResult<Self> {
        let client = stack.client()?;
        Ok(Self {
            stack,
            client,
            max_redirects,
        })
    }
}

impl ResourceFetcher for HttpResourceFetcher {
    fn fetch(&mut self, url: &WebUrl) -> HoardResult<FetchedResource> {
        let fetched = self
            .stack
            .fetch(&mut self.client, url.as_str(), self.max_redirects)?;

        let status = fetched.response.status;
        if !status.is_success() {
            return Err(HoardError::new(
                "capture.fetch.status",
                format!("`{url}` answered {}", status.as_u16()),
            ));
        }

        Ok(FetchedResource {
            content_type: fetched.response.header("content-type").map(str::to_owned),
            url: fetched.final_url,
            bytes: fetched.response.body,
        })
    }
}

/// Serves resources from a fixed table and records every request.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    resources: BTreeMap<String, (String, Vec<u8>)>,
    requests: Vec<String>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.resources
            .insert(url.to_owned(), (content_type.to_owned(), bytes.to_vec()));
        self
    }

    pub fn requests(&self) -> &[String] {
        &self.requests
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .iter()
            .filter(|requested| requested.as_str() == url)
            .count()
    }
}

impl ResourceFetcher for MemoryFetcher {
    fn fetch(&mut self, url: &WebUrl) -> HoardResult<FetchedResource> {
        self.requests.push(url.as_str().to_owned());
        match self.resources.get(url.as_str()) {
            Some((content_type, bytes)) => Ok(FetchedResource {
                url: url.clone(),
                content_type: Some(content_type.clone()),
                bytes: bytes.clone(),
            }),
            None => Err(HoardError::new(
                "capture.fetch.status",
                format!("`{url}` answered 404"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryFetcher;
    use super::ResourceFetcher;
    use hd_net::url::WebUrl;

    fn url(raw: &str) -> WebUrl {
        match WebUrl::parse(raw) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    #[test]
    fn memory_fetcher_serves_and_records() {
        let mut fetcher = MemoryFetcher::new().with("https://example.com/a.png", "image/png", b"png");
        let fetched = fetcher.fetch(&url("https://example.com/a.png"));
        assert!(fetched.is_ok());
        let fetched = match fetched {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(fetched.content_type.as_deref(), Some("image/png"));

        let missing = fetcher.fetch(&url("https://example.com/b.png"));
        assert!(matches!(missing, Err(ref error) if error.code == "capture.fetch.status"));
        assert_eq!(fetcher.request_count("https://example.com/a.png"), 1);
        assert_eq!(fetcher.requests().len(), 2);
    }
}

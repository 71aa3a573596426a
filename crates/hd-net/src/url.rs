//! Fetchable URLs: absolute `http`/`https`, no credentials, no fragment.

use hd_core::HoardError;
use hd_core::HoardResult;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

/// A URL the capture may request over the network.
///
/// Page references that resolve to anything else (`data:`, `mailto:`,
/// `javascript:`) fail to convert, which is how callers tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WebUrl {
    inner: Url,
    scheme: Scheme,
}

impl WebUrl {
    pub fn parse(input: &str) -> HoardResult<Self> {
        let parsed = Url::parse(input.trim()).map_err(|error| {
            HoardError::new("net.url.invalid", format!("`{input}` is not a URL: {error}"))
        })?;
        Self::try_from(parsed)
    }

    /// Resolves `reference` the way a document resolves its relative links.
    pub fn join(&self, reference: &str) -> HoardResult<Self> {
        let joined = self.inner.join(reference.trim()).map_err(|error| {
            HoardError::new(
                "net.url.invalid",
                format!("`{reference}` does not resolve against `{self}`: {error}"),
            )
        })?;
        Self::try_from(joined)
    }

    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Lowercased host (the `url` crate normalizes it on parse).
    pub fn host(&self) -> &str {
        self.inner.host_str().unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.inner.port().unwrap_or(self.scheme.default_port())
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::Https
    }

    pub fn path(&self) -> &str {
        self.inner.path()
    }

    /// `host` or `host:port`, omitting the scheme's default port.
    pub fn authority(&self) -> String {
        match self.inner.port() {
            Some(port) => format!("{}:{port}", self.host()),
            None => self.host().to_owned(),
        }
    }

    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme.as_str(), self.authority())
    }

    pub fn same_origin(&self, other: &WebUrl) -> bool {
        self.scheme == other.scheme && self.host() == other.host() && self.port() == other.port()
    }

    /// The request target sent on the wire.
    pub fn path_and_query(&self) -> String {
        let mut target = self.inner.path().to_owned();
        if target.is_empty() {
            target.push('/');
        }
        if let Some(query) = self.inner.query() {
            target.push('?');
            target.push_str(query);
        }
        target
    }
}

impl TryFrom<Url> for WebUrl {
    type Error = HoardError;

    fn try_from(mut inner: Url) -> HoardResult<Self> {
        let Some(scheme) = Scheme::from_name(inner.scheme()) else {
            return Err(HoardError::new(
                "net.url.scheme_unsupported",
                format!("`{inner}` is not an http or https URL"),
            ));
        };
        if inner.host_str().is_none_or(str::is_empty) {
            return Err(HoardError::new(
                "net.url.host_missing",
                format!("`{inner}` names no host"),
            ));
        }
        if !inner.username().is_empty() || inner.password().is_some() {
            return Err(HoardError::new(
                "net.url.credentials_disallowed",
                "URLs carrying `user:password@` are refused",
            ));
        }
        // Fragments never reach the server and never distinguish resources.
        inner.set_fragment(None);
        Ok(Self { inner, scheme })
    }
}

impl std::fmt::Display for WebUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

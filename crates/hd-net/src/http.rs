//! HTTP request and response messages.

use crate::url::WebUrl;
use hd_core::HoardError;
use hd_core::HoardResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
        }
    }

    fn allows_body(self) -> bool {
        self == Self::Post
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl HttpVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http10 => "HTTP/1.0",
            Self::Http11 => "HTTP/1.1",
        }
    }
}

/// One header line, checked so it cannot split the message it is written into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: &str, value: &str) -> HoardResult<Self> {
        let name_ok = !name.is_empty() && name.bytes().all(is_token_byte);
        if !name_ok {
            return Err(HoardError::new(
                "net.http.header_name_invalid",
                format!("`{name}` is not a valid header name"),
            ));
        }
        if value.bytes().any(|byte| byte == b'\r' || byte == b'\n' || byte == 0) {
            return Err(HoardError::new(
                "net.http.header_value_invalid",
                format!("value of `{name}` contains a line break or NUL"),
            ));
        }
        Ok(Self {
            name: name.to_owned(),
            value: value.to_owned(),
        })
    }
}

/// Header lines in wire order; lookups ignore name case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn push(&mut self, header: Header) {
        self.0.push(header);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.all(name).next()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Every value of `name`, in order.
    pub fn all<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.0
            .iter()
            .filter(move |header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
    }

    /// Comma-separated tokens across every `name` header, lowercased.
    pub fn tokens(&self, name: &str) -> Vec<String> {
        self.all(name)
            .flat_map(|value| value.split(','))
            .map(|token| token.trim().to_ascii_lowercase())
            .filter(|token| !token.is_empty())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }
}

impl FromIterator<Header> for Headers {
    fn from_iter<I: IntoIterator<Item = Header>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: WebUrl,
    pub version: HttpVersion,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn builder(method: HttpMethod, url: WebUrl) -> HttpRequestBuilder {
        HttpRequestBuilder {
            request: HttpRequest {
                method,
                url,
                version: HttpVersion::Http11,
                headers: Headers::default(),
                body: Vec::new(),
            },
        }
    }

    pub fn request_target(&self) -> String {
        self.url.path_and_query()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequestBuilder {
    request: HttpRequest,
}

impl HttpRequestBuilder {
    pub fn header(mut self, name: &str, value: &str) -> HoardResult<Self> {
        self.request.headers.push(Header::new(name, value)?);
        Ok(self)
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.request.body = body;
        self
    }

    /// Checks the message and fills in `Host` and `Content-Length`.
    pub fn build(self) -> HoardResult<HttpRequest> {
        let mut request = self.request;
        let method = request.method;
        if !method.allows_body() && !request.body.is_empty() {
            return Err(HoardError::new(
                "net.http.body_disallowed",
                format!("{} to `{}` carries a body", method.as_str(), request.url),
            ));
        }

        for name in ["host", "content-length"] {
            if request.headers.all(name).nth(1).is_some() {
                return Err(HoardError::new(
                    "net.http.duplicate_header",
                    format!("`{name}` is set more than once"),
                ));
            }
        }

        if !request.headers.contains("host") {
            let host = Header::new("Host", &request.url.authority())?;
            request.headers.push(host);
        }
        // Uploads declare their length even when empty.
        if method.allows_body() && !request.headers.contains("content-length") {
            let length = Header::new("Content-Length", &request.body.len().to_string())?;
            request.headers.push(length);
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HttpStatusCode(u16);

impl HttpStatusCode {
    pub fn new(code: u16) -> HoardResult<Self> {
        if !(100..=599).contains(&code) {
            return Err(HoardError::new(
                "net.http.status_invalid",
                format!("`{code}` is outside the 100-599 status range"),
            ));
        }
        Ok(Self(code))
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 / 100 == 2
    }

    pub fn is_redirect(self) -> bool {
        matches!(self.0, 301 | 302 | 303 | 307 | 308)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub version: HttpVersion,
    pub status: HttpStatusCode,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The media type without parameters, lowercased (`image/png`).
    pub fn media_type(&self) -> Option<String> {
        self.header("content-type").map(media_type_of)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Strips parameters from a `Content-Type` value and lowercases it.
pub fn media_type_of(content_type: &str) -> String {
    let essence = match content_type.split_once(';') {
        Some((essence, _)) => essence,
        None => content_type,
    };
    essence.trim().to_ascii_lowercase()
}

fn is_token_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte)
}

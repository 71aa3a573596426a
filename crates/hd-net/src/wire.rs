//! HTTP/1.1 on the wire: request serialization and response framing.

use crate::http::Header;
use crate::http::Headers;
use crate::http::HttpMethod;
use crate::http::HttpRequest;
use crate::http::HttpResponse;
use crate::http::HttpStatusCode;
use crate::http::HttpVersion;
use brotli::Decompressor;
use flate2::read::DeflateDecoder;
use flate2::read::GzDecoder;
use flate2::read::ZlibDecoder;
use hd_core::HoardError;
use hd_core::HoardResult;
use std::io::Read;
use std::io::Write;

const HEAD_LIMIT: usize = 128 * 1024;
const CHUNK_LINE_LIMIT: usize = 8 * 1024;
const READ_SIZE: usize = 8 * 1024;

/// A response plus whether its connection can carry another request.
pub(crate) struct Exchange {
    pub response: HttpResponse,
    pub reusable: bool,
}

pub(crate) fn write_request<W: Write + ?Sized>(out: &mut W, request: &HttpRequest) -> HoardResult<()> {
    let mut head = format!(
        "{} {} {}\r\n",
        request.method.as_str(),
        request.request_target(),
        request.version.as_str()
    );
    for header in request.headers.iter() {
        head.push_str(&header.name);
        head.push_str(": ");
        head.push_str(&header.value);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    out.write_all(head.as_bytes())
        .and_then(|()| out.write_all(&request.body))
        .and_then(|()| out.flush())
        .map_err(|error| {
            HoardError::new(
                "net.http.write_failed",
                format!("sending {} {} failed: {error}", request.method.as_str(), request.url),
            )
        })
}

pub(crate) fn read_response<S: Read + ?Sized>(stream: &mut S, method: HttpMethod) -> HoardResult<Exchange> {
    let mut reader = FrameReader::new(stream);
    let head = reader.head()?;
    let mut lines = head.split("\r\n");
    let (version, status) = parse_status_line(lines.next().unwrap_or_default())?;
    let headers = lines
        .filter(|line| !line.is_empty())
        .map(parse_header_line)
        .collect::<HoardResult<Headers>>()?;

    let framing = Framing::of(method, status, &headers)?;
    let body = match framing {
        Framing::Empty => Vec::new(),
        Framing::Length(len) => reader.exactly(len)?,
        Framing::Chunked => reader.chunked()?,
        Framing::UntilClose => reader.rest()?,
    };
    let body = if framing == Framing::Empty {
        body
    } else {
        decode_body(&headers, body)?
    };

    let response = HttpResponse {
        version,
        status,
        headers,
        body,
    };
    let reusable = framing != Framing::UntilClose && keeps_alive(&response);
    Ok(Exchange { response, reusable })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Empty,
    Length(usize),
    Chunked,
    UntilClose,
}

impl Framing {
    fn of(method: HttpMethod, status: HttpStatusCode, headers: &Headers) -> HoardResult<Self> {
        let code = status.as_u16();
        if method == HttpMethod::Head || (100..200).contains(&code) || code == 204 || code == 304 {
            return Ok(Self::Empty);
        }

        let transfer = headers.tokens("transfer-encoding");
        if !transfer.is_empty() {
            if transfer.iter().all(|token| token == "chunked") {
                return Ok(Self::Chunked);
            }
            return Err(HoardError::new(
                "net.http.transfer_encoding_unsupported",
                format!("cannot decode transfer encoding `{}`", transfer.join(", ")),
            ));
        }

        let mut length = None;
        for value in headers.all("content-length") {
            let parsed = value.trim().parse::<usize>().map_err(|error| {
                HoardError::new(
                    "net.http.content_length_invalid",
                    format!("Content-Length `{value}` is not a byte count: {error}"),
                )
            })?;
            if length.is_some_and(|seen| seen != parsed) {
                return Err(HoardError::new(
                    "net.http.content_length_conflict",
                    "response declares two different Content-Length values",
                ));
            }
            length = Some(parsed);
        }
        Ok(length.map_or(Self::UntilClose, Self::Length))
    }
}

/// Buffered reads over a stream that may hold more than one response.
///
/// Bytes past the head are kept in `pending` and served before the stream.
struct FrameReader<'s, S: Read + ?Sized> {
    stream: &'s mut S,
    pending: Vec<u8>,
}

impl<'s, S: Read + ?Sized> FrameReader<'s, S> {
    fn new(stream: &'s mut S) -> Self {
        Self {
            stream,
            pending: Vec::new(),
        }
    }

    /// Pulls one read from the stream into `pending`. `false` at EOF.
    fn fill(&mut self, context: &str) -> HoardResult<bool> {
        let mut scratch = [0_u8; READ_SIZE];
        let read = self.stream.read(&mut scratch).map_err(|error| {
            HoardError::new(
                "net.http.read_failed",
                format!("reading {context} failed: {error}"),
            )
        })?;
        self.pending.extend_from_slice(&scratch[..read]);
        Ok(read > 0)
    }

    fn take(&mut self, len: usize) -> Vec<u8> {
        let rest = self.pending.split_off(len);
        std::mem::replace(&mut self.pending, rest)
    }

    /// The status line and headers, without the blank line that ends them.
    fn head(&mut self) -> HoardResult<String> {
        loop {
            if let Some(end) = self.pending.windows(4).position(|window| window == b"\r\n\r\n") {
                let head = self.take(end + 4);
                return Ok(String::from_utf8_lossy(&head[..end]).into_owned());
            }
            if self.pending.len() > HEAD_LIMIT {
                return Err(HoardError::new(
                    "net.http.head_too_large",
                    format!("response head is longer than {HEAD_LIMIT} bytes"),
                ));
            }
            if !self.fill("response head")? {
                return Err(HoardError::new(
                    "net.http.unexpected_eof",
                    "connection closed before the response head was complete",
                ));
            }
        }
    }

    fn exactly(&mut self, len: usize) -> HoardResult<Vec<u8>> {
        while self.pending.len() < len {
            if !self.fill("response body")? {
                return Err(HoardError::new(
                    "net.http.unexpected_eof",
                    format!("body ended after {} of {len} bytes", self.pending.len()),
                ));
            }
        }
        Ok(self.take(len))
    }

    fn rest(&mut self) -> HoardResult<Vec<u8>> {
        while self.fill("close-delimited body")? {}
        Ok(std::mem::take(&mut self.pending))
    }

    fn line(&mut self) -> HoardResult<String> {
        loop {
            if let Some(end) = self.pending.windows(2).position(|window| window == b"\r\n") {
                let line = self.take(end + 2);
                return Ok(String::from_utf8_lossy(&line[..end]).into_owned());
            }
            if self.pending.len() > CHUNK_LINE_LIMIT {
                return Err(HoardError::new(
                    "net.http.chunk_line_too_large",
                    format!("chunk size line is longer than {CHUNK_LINE_LIMIT} bytes"),
                ));
            }
            if !self.fill("chunk size line")? {
                return Err(HoardError::new(
                    "net.http.unexpected_eof",
                    "connection closed inside a chunked body",
                ));
            }
        }
    }

    fn chunked(&mut self) -> HoardResult<Vec<u8>> {
        let mut body = Vec::new();
        loop {
            let line = self.line()?;
            let size = line.split(';').next().unwrap_or_default().trim();
            if size.is_empty() {
                continue;
            }
            let size = usize::from_str_radix(size, 16).map_err(|error| {
                HoardError::new(
                    "net.http.chunk_size_invalid",
                    format!("chunk size `{size}` is not hexadecimal: {error}"),
                )
            })?;
            if size == 0 {
                // Trailers run to the first empty line.
                while !self.line()?.is_empty() {}
                return Ok(body);
            }

            let chunk = self.exactly(size + 2)?;
            if !chunk.ends_with(b"\r\n") {
                return Err(HoardError::new(
                    "net.http.chunk_terminator_invalid",
                    "chunk data is not followed by CRLF",
                ));
            }
            body.extend_from_slice(&chunk[..size]);
        }
    }
}

fn parse_status_line(line: &str) -> HoardResult<(HttpVersion, HttpStatusCode)> {
    let mut parts = line.splitn(3, ' ');
    let version = match parts.next() {
        Some("HTTP/1.1") => HttpVersion::Http11,
        Some("HTTP/1.0") => HttpVersion::Http10,
        _ => {
            return Err(HoardError::new(
                "net.http.version_unsupported",
                format!("not an HTTP/1.x status line: `{line}`"),
            ));
        }
    };
    let code = parts.next().unwrap_or_default();
    let code = code.parse::<u16>().map_err(|error| {
        HoardError::new(
            "net.http.status_line_invalid",
            format!("status code `{code}` is not a number: {error}"),
        )
    })?;
    Ok((version, HttpStatusCode::new(code)?))
}

fn parse_header_line(line: &str) -> HoardResult<Header> {
    let Some((name, value)) = line.split_once(':') else {
        return Err(HoardError::new(
            "net.http.header_invalid",
            format!("header line without a colon: `{line}`"),
        ));
    };
    Header::new(name.trim(), value.trim())
}

fn keeps_alive(response: &HttpResponse) -> bool {
    let connection = response.headers.tokens("connection");
    if connection.iter().any(|token| token == "close") {
        return false;
    }
    match response.version {
        HttpVersion::Http11 => true,
        HttpVersion::Http10 => connection.iter().any(|token| token == "keep-alive"),
    }
}

/// Undoes `Content-Encoding`, last-applied coding first.
fn decode_body(headers: &Headers, body: Vec<u8>) -> HoardResult<Vec<u8>> {
    let mut body = body;
    for coding in headers.tokens("content-encoding").iter().rev() {
        body = match coding.as_str() {
            "identity" => body,
            "gzip" | "x-gzip" => inflate(GzDecoder::new(body.as_slice()), coding)?,
            // Servers disagree on whether `deflate` carries the zlib wrapper.
            "deflate" => match inflate(ZlibDecoder::new(body.as_slice()), coding) {
                Ok(decoded) => decoded,
                Err(_) => inflate(DeflateDecoder::new(body.as_slice()), coding)?,
            },
            "br" => inflate(Decompressor::new(body.as_slice(), READ_SIZE), coding)?,
            other => {
                return Err(HoardError::new(
                    "net.http.content_encoding_unsupported",
                    format!("cannot decode content encoding `{other}`"),
                ));
            }
        };
    }
    Ok(body)
}

fn inflate<D: Read>(mut decoder: D, coding: &str) -> HoardResult<Vec<u8>> {
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded).map_err(|error| {
        HoardError::new(
            "net.http.decode_failed",
            format!("`{coding}` body is corrupt: {error}"),
        )
    })?;
    Ok(decoded)
}

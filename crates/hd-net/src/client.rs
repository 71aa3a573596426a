//! Blocking HTTP/1.1 client with per-origin keep-alive.

use crate::PreparedRequest;
use crate::connect::BoxedStream;
use crate::connect::Connector;
use crate::connect::DirectConnector;
use crate::connect::KeepAlive;
use crate::http::HttpResponse;
use crate::tls::TlsPolicy;
use crate::wire::Exchange;
use crate::wire::read_response;
use crate::wire::write_request;
use hd_core::HoardError;
use hd_core::HoardResult;
use std::time::Duration;

pub struct HttpClient<C = DirectConnector> {
    connector: C,
    idle: KeepAlive,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(tls_policy: TlsPolicy, timeout: Duration) -> HoardResult<Self> {
        Ok(Self::with_connector(DirectConnector::new(tls_policy)?, timeout))
    }
}

impl<C: Connector> HttpClient<C> {
    pub fn with_connector(connector: C, timeout: Duration) -> Self {
        Self {
            connector,
            idle: KeepAlive::default(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn idle_connections(&self) -> usize {
        self.idle.idle_count()
    }

    /// Sends one request and reads the whole response.
    ///
    /// A parked connection the server has since closed fails on first use;
    /// the request is then sent once more on a fresh connection.
    pub fn execute(&mut self, prepared: &PreparedRequest) -> HoardResult<HttpResponse> {
        let url = &prepared.request.url;
        if url.is_secure() != prepared.tls.is_some() {
            return Err(HoardError::new(
                "net.http.tls_mismatch",
                format!("TLS settings do not match the scheme of `{url}`"),
            ));
        }

        let origin = url.origin();
        if let Some(stream) = self.idle.take(&origin) {
            match self.exchange(stream, prepared) {
                Ok(response) => return Ok(response),
                Err(error) => tracing::debug!(code = error.code, %origin, "parked connection went stale"),
            }
        }

        let stream = self
            .connector
            .open(url, prepared.tls.as_ref(), self.timeout)?;
        self.exchange(stream, prepared)
    }

    fn exchange(&mut self, mut stream: BoxedStream, prepared: &PreparedRequest) -> HoardResult<HttpResponse> {
        let request = &prepared.request;
        write_request(&mut *stream, request)?;
        let Exchange { response, reusable } = read_response(&mut *stream, request.method)?;
        if reusable {
            self.idle.park(request.url.origin(), stream);
        }
        Ok(response)
    }
}

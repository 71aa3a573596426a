//! Opening connections to page and archive origins, and keeping idle ones.

use crate::tls::TlsHandshakeConfig;
use crate::tls::TlsPolicy;
use crate::url::WebUrl;
use hd_core::HoardError;
use hd_core::HoardResult;
use std::collections::HashMap;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::net::ToSocketAddrs;
use std::time::Duration;

#[cfg(feature = "tls-rustls")]
use std::sync::Arc;
#[cfg(feature = "tls-rustls")]
use std::sync::OnceLock;

/// A byte stream an HTTP exchange can run over.
pub trait Stream: Read + Write + Send {}

impl<T: Read + Write + Send> Stream for T {}

pub type BoxedStream = Box<dyn Stream>;

/// Opens a fresh stream to the origin of `url`.
///
/// `tls` is present exactly when the URL is `https`; the connector wraps
/// the socket before handing it back.
pub trait Connector {
    fn open(
        &self,
        url: &WebUrl,
        tls: Option<&TlsHandshakeConfig>,
        timeout: Duration,
    ) -> HoardResult<BoxedStream>;
}

/// Resolves through the system resolver and dials each address in turn.
pub struct DirectConnector {
    policy: TlsPolicy,
    #[cfg(feature = "tls-rustls")]
    rustls: OnceLock<Arc<rustls::ClientConfig>>,
}

impl DirectConnector {
    pub fn new(policy: TlsPolicy) -> HoardResult<Self> {
        policy.validate()?;
        Ok(Self {
            policy,
            #[cfg(feature = "tls-rustls")]
            rustls: OnceLock::new(),
        })
    }

    pub fn policy(&self) -> &TlsPolicy {
        &self.policy
    }

    fn dial(&self, url: &WebUrl, timeout: Duration) -> HoardResult<TcpStream> {
        let addresses = resolve(url)?;
        let mut failures = Vec::new();
        for address in addresses {
            match dial_one(address, timeout) {
                Ok(stream) => return Ok(stream),
                Err(error) => failures.push(format!("{address}: {error}")),
            }
        }
        Err(HoardError::new(
            "net.connect.failed",
            format!("could not reach {} ({})", url.origin(), failures.join("; ")),
        ))
    }

    #[cfg(feature = "tls-rustls")]
    fn secure(&self, mut socket: TcpStream, handshake: &TlsHandshakeConfig) -> HoardResult<BoxedStream> {
        let config = match self.rustls.get() {
            Some(config) => Arc::clone(config),
            None => {
                let built = self.policy.rustls_config()?;
                Arc::clone(self.rustls.get_or_init(|| built))
            }
        };

        let server_name = rustls::pki_types::ServerName::try_from(handshake.server_name.clone())
            .map_err(|error| {
                HoardError::new(
                    "net.tls.server_name_invalid",
                    format!("`{}` is not a valid TLS server name: {error}", handshake.server_name),
                )
            })?;
        let mut session = rustls::ClientConnection::new(config, server_name).map_err(|error| {
            HoardError::new(
                "net.tls.connection_init_failed",
                format!("TLS session for `{}` could not start: {error}", handshake.server_name),
            )
        })?;
        session.complete_io(&mut socket).map_err(|error| {
            HoardError::new(
                "net.tls.handshake_failed",
                format!("TLS handshake with `{}` failed: {error}", handshake.server_name),
            )
        })?;
        Ok(Box::new(rustls::StreamOwned::new(session, socket)))
    }

    #[cfg(not(feature = "tls-rustls"))]
    fn secure(&self, _socket: TcpStream, handshake: &TlsHandshakeConfig) -> HoardResult<BoxedStream> {
        Err(HoardError::new(
            "net.tls.backend_unavailable",
            format!(
                "cannot reach `{}` over TLS: build hd-net with the `tls-rustls` feature",
                handshake.server_name
            ),
        ))
    }
}

impl Connector for DirectConnector {
    fn open(
        &self,
        url: &WebUrl,
        tls: Option<&TlsHandshakeConfig>,
        timeout: Duration,
    ) -> HoardResult<BoxedStream> {
        let socket = self.dial(url, timeout)?;
        match tls {
            Some(handshake) => self.secure(socket, handshake),
            None => Ok(Box::new(socket)),
        }
    }
}

fn resolve(url: &WebUrl) -> HoardResult<Vec<SocketAddr>> {
    let addresses: Vec<SocketAddr> = (url.host(), url.port())
        .to_socket_addrs()
        .map_err(|error| {
            HoardError::new(
                "net.dns.resolve_failed",
                format!("cannot resolve `{}`: {error}", url.host()),
            )
        })?
        .collect();
    if addresses.is_empty() {
        return Err(HoardError::new(
            "net.dns.no_results",
            format!("`{}` resolved to no addresses", url.host()),
        ));
    }
    Ok(addresses)
}

fn dial_one(address: SocketAddr, timeout: Duration) -> std::io::Result<TcpStream> {
    let stream = TcpStream::connect_timeout(&address, timeout)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    Ok(stream)
}

/// Idle keep-alive streams, keyed by origin (`https://archive.example`).
///
/// A capture talks to the archive origin dozens of times in a row, so
/// reusing its stream saves a TCP and TLS handshake per attachment.
pub struct KeepAlive {
    per_origin: usize,
    idle: HashMap<String, Vec<BoxedStream>>,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self::new(2)
    }
}

impl KeepAlive {
    pub fn new(per_origin: usize) -> Self {
        Self {
            per_origin,
            idle: HashMap::new(),
        }
    }

    /// Takes the most recently parked stream for `origin`.
    pub fn take(&mut self, origin: &str) -> Option<BoxedStream> {
        let parked = self.idle.get_mut(origin)?;
        let stream = parked.pop();
        if parked.is_empty() {
            self.idle.remove(origin);
        }
        stream
    }

    /// Parks `stream`; it is dropped (closed) when `origin` is already full.
    pub fn park(&mut self, origin: String, stream: BoxedStream) {
        let parked = self.idle.entry(origin).or_default();
        if parked.len() < self.per_origin {
            parked.push(stream);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::BoxedStream;
    use super::DirectConnector;
    use super::KeepAlive;
    use crate::tls::TlsPolicy;
    use crate::tls::TlsVersion;
    use std::io::Cursor;
    use std::io::Read;

    fn parked(tag: u8) -> BoxedStream {
        Box::new(Cursor::new(vec![tag]))
    }

    #[test]
    fn keep_alive_caps_each_origin() {
        let mut idle = KeepAlive::new(1);
        idle.park("https://archive.example".to_owned(), parked(1));
        idle.park("https://archive.example".to_owned(), parked(2));
        idle.park("https://example.com".to_owned(), parked(3));
        assert_eq!(idle.idle_count(), 2);

        let mut first = match idle.take("https://archive.example") {
            Some(stream) => stream,
            None => panic!("archive stream was not parked"),
        };
        let mut tag = [0_u8; 1];
        assert!(first.read_exact(&mut tag).is_ok());
        assert_eq!(tag, [1]);
        assert!(idle.take("https://archive.example").is_none());
        assert_eq!(idle.idle_count(), 1);
    }

    #[test]
    fn connector_rejects_an_inverted_policy() {
        let policy = TlsPolicy {
            minimum_version: TlsVersion::V1_3,
            maximum_version: TlsVersion::V1_2,
            ..TlsPolicy::default()
        };
        assert!(DirectConnector::new(policy).is_err());
    }
}

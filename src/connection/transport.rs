//! Raw byte transport underneath a [`super::Connection`] (spec.md §4.2,
//! component C2). Grounded on
//! `lunatic-redis::connection::ActualConnection` (the Tcp/TcpTls split and
//! `is_open`/`send_bytes`/`read_response` shape), re-expressed over
//! `tokio::net::TcpStream` instead of `lunatic::net::TcpStream`.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader, ReadBuf};
use tokio::net::TcpStream;

use crate::connection::url::ConnectionAddr;
use crate::error::{ErrorKind, RedisError, RedisResult};

/// The two transport kinds a [`Transport`] can wrap. Plain TCP is always
/// available; TLS requires the `tls` feature.
enum Inner {
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    TcpTls(Box<tokio_native_tls::TlsStream<TcpStream>>),
}

impl AsyncRead for Inner {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Inner::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            Inner::TcpTls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Inner {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Inner::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            Inner::TcpTls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Inner::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(feature = "tls")]
            Inner::TcpTls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Inner::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            Inner::TcpTls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// A live byte-stream to a single server, buffered for line-oriented RESP
/// reads. Tracks `open` itself so a caller can ask `is_open()` without
/// relying on the next I/O call to discover the socket died.
pub struct Transport {
    stream: BufReader<Inner>,
    open: bool,
}

impl Transport {
    pub async fn connect(addr: &ConnectionAddr, tls: bool) -> RedisResult<Self> {
        let tcp = TcpStream::connect((addr.host.as_str(), addr.port))
            .await
            .map_err(|e| {
                RedisError::new(
                    ErrorKind::ConnectError,
                    format!("failed to connect to {addr}: {e}"),
                )
            })?;
        tcp.set_nodelay(true).ok();

        let inner = if tls {
            #[cfg(feature = "tls")]
            {
                let connector = tokio_native_tls::native_tls::TlsConnector::new()?;
                let connector = tokio_native_tls::TlsConnector::from(connector);
                let tls_stream = connector.connect(&addr.host, tcp).await.map_err(|e| {
                    RedisError::new(ErrorKind::ConnectError, format!("TLS handshake failed: {e}"))
                })?;
                Inner::TcpTls(Box::new(tls_stream))
            }
            #[cfg(not(feature = "tls"))]
            {
                return Err(RedisError::new(
                    ErrorKind::ConnectError,
                    "TLS requested but the `tls` feature is not enabled",
                ));
            }
        } else {
            Inner::Tcp(tcp)
        };

        Ok(Transport {
            stream: BufReader::new(inner),
            open: true,
        })
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> RedisResult<()> {
        use tokio::io::AsyncWriteExt;
        if !self.open {
            return Err(RedisError::from_kind(ErrorKind::ConnectionClosed));
        }
        if let Err(e) = self.stream.get_mut().write_all(bytes).await {
            self.open = false;
            return Err(e.into());
        }
        if let Err(e) = self.stream.get_mut().flush().await {
            self.open = false;
            return Err(e.into());
        }
        Ok(())
    }

    /// Marks the transport unusable without touching the socket — used
    /// when a higher layer (RESP decode) observes a fatal error so every
    /// later caller sees the same `ConnectionClosed` without re-reading.
    pub fn poison(&mut self) {
        self.open = false;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn reader(&mut self) -> &mut (impl AsyncBufRead + Unpin) {
        &mut self.stream
    }
}

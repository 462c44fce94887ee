//! A single SMTP session: transport, line framing, command exchange
//!
//! The session owns its socket for its whole life. Replies are deframed at
//! `\r\n` boundaries out of a read buffer that survives the STARTTLS
//! upgrade: bytes read after the 220 but before the handshake belong to the
//! secured channel.

use super::reply::{parse_reply_line, ReplyBuilder, ReplyError, SmtpReply, MAX_REPLY_LEN};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

/// Plaintext or TLS transport behind one object
pub(crate) trait AsyncReadAndWrite: AsyncRead + AsyncWrite + Unpin + Send {}

impl AsyncReadAndWrite for TcpStream {}
impl AsyncReadAndWrite for tokio_rustls::client::TlsStream<TcpStream> {}
impl AsyncReadAndWrite for tokio_rustls::client::TlsStream<BoxedAsyncReadAndWrite> {}

pub(crate) type BoxedAsyncReadAndWrite = Box<dyn AsyncReadAndWrite>;

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("i/o error: {0}")]
    Io(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection closed by peer")]
    PeerClosed,
    #[error("protocol violation: {0}")]
    Protocol(#[from] ReplyError),
    #[error("unexpected {code} reply at {phase}")]
    Unexpected { phase: &'static str, code: u16 },
    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),
}

/// One probe conversation with one MX host
pub(crate) struct SmtpSession {
    socket: Option<BoxedAsyncReadAndWrite>,
    host: String,
    read_buffer: Vec<u8>,
    secure: bool,
    command_timeout: Duration,
}

impl SmtpSession {
    /// Connect to `exchange`, attempting `ports` in order. A port equal to
    /// 465 is wrapped in TLS from byte zero. The first successful connect
    /// wins; exhaustion of the list is a `Connect` error.
    pub async fn connect(
        exchange: &str,
        ports: &[u16],
        connect_timeout: Duration,
        command_timeout: Duration,
        tls: &TlsConnector,
    ) -> Result<(Self, u16), SessionError> {
        for &port in ports {
            let stream = match timeout(connect_timeout, TcpStream::connect((exchange, port))).await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    debug!("connect {}:{} failed: {}", exchange, port, e);
                    continue;
                }
                Err(_) => {
                    debug!("connect {}:{} timed out after {:?}", exchange, port, connect_timeout);
                    continue;
                }
            };
            // No need for Nagle with SMTP request/response
            stream.set_nodelay(true).ok();

            let (socket, secure): (BoxedAsyncReadAndWrite, bool) = if port == 465 {
                let name = match ServerName::try_from(exchange.to_string()) {
                    Ok(name) => name,
                    Err(_) => {
                        debug!("{} is not a valid TLS server name", exchange);
                        continue;
                    }
                };
                match timeout(connect_timeout, tls.connect(name, stream)).await {
                    Ok(Ok(tls_stream)) => (Box::new(tls_stream), true),
                    Ok(Err(e)) => {
                        debug!("implicit TLS on {}:465 failed: {}", exchange, e);
                        continue;
                    }
                    Err(_) => {
                        debug!("implicit TLS on {}:465 timed out", exchange);
                        continue;
                    }
                }
            } else {
                (Box::new(stream), false)
            };

            debug!("connected to {}:{} (secure: {})", exchange, port, secure);
            return Ok((
                Self {
                    socket: Some(socket),
                    host: exchange.to_string(),
                    read_buffer: Vec::with_capacity(1024),
                    secure,
                    command_timeout,
                },
                port,
            ));
        }

        Err(SessionError::Connect(format!(
            "no port of {:?} accepted a connection on {}",
            ports, exchange
        )))
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Read one complete logical reply, accumulating continuation lines.
    pub async fn read_reply(&mut self) -> Result<SmtpReply, SessionError> {
        let line = self.read_line().await?;
        trace!("recv<-{}: {}", self.host, line);
        let first = parse_reply_line(&line)?;
        let mut builder = ReplyBuilder::new(&first);
        let mut is_final = first.is_final;

        while !is_final {
            let line = self.read_line().await?;
            trace!("recv<-{}: {}", self.host, line);
            let parsed = parse_reply_line(&line)?;
            builder.add_line(&parsed)?;
            is_final = parsed.is_final;
        }

        Ok(builder.build())
    }

    /// Write one command line and read its reply. Commands are never
    /// pipelined: each waits for its reply before the next is sent.
    pub async fn send_command(&mut self, command: &str) -> Result<SmtpReply, SessionError> {
        self.write_line(command).await?;
        self.read_reply().await
    }

    /// Upgrade the transport in place after an accepted STARTTLS. The read
    /// buffer is preserved across the upgrade and the greeting is not
    /// re-read.
    pub async fn upgrade_tls(&mut self, tls: &TlsConnector) -> Result<(), SessionError> {
        let stream = self
            .socket
            .take()
            .ok_or_else(|| SessionError::Io("socket already closed".to_string()))?;
        let name = ServerName::try_from(self.host.clone())
            .map_err(|_| SessionError::TlsHandshake(format!("{} is not a valid server name", self.host)))?;

        match timeout(self.command_timeout, tls.connect(name, stream)).await {
            Ok(Ok(tls_stream)) => {
                self.socket = Some(Box::new(tls_stream));
                self.secure = true;
                Ok(())
            }
            Ok(Err(e)) => Err(SessionError::TlsHandshake(e.to_string())),
            Err(_) => Err(SessionError::Timeout(self.command_timeout)),
        }
    }

    /// Best-effort QUIT followed by a hard close. Safe to call on any exit
    /// path; errors are swallowed.
    pub async fn quit(&mut self) {
        if self.socket.is_some() {
            let _ = self.write_line("QUIT").await;
        }
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.shutdown().await;
        }
    }

    async fn read_line(&mut self) -> Result<String, SessionError> {
        loop {
            if let Some(pos) = find_crlf(&self.read_buffer) {
                let line = String::from_utf8_lossy(&self.read_buffer[..pos]).into_owned();
                self.read_buffer.drain(..pos + 2);
                return Ok(line);
            }
            if self.read_buffer.len() > MAX_REPLY_LEN {
                self.socket.take();
                return Err(SessionError::Protocol(ReplyError::TooLong));
            }

            let mut data = [0u8; 1024];
            let size = match self.socket.as_mut() {
                Some(socket) => match timeout(self.command_timeout, socket.read(&mut data)).await {
                    Ok(Ok(size)) => size,
                    Ok(Err(e)) => {
                        self.socket.take();
                        return Err(SessionError::Io(e.to_string()));
                    }
                    Err(_) => {
                        self.socket.take();
                        return Err(SessionError::Timeout(self.command_timeout));
                    }
                },
                None => return Err(SessionError::Io("socket already closed".to_string())),
            };
            if size == 0 {
                self.socket.take();
                return Err(SessionError::PeerClosed);
            }
            self.read_buffer.extend_from_slice(&data[..size]);
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<(), SessionError> {
        trace!("send->{}: {}", self.host, line);
        let data = format!("{line}\r\n");

        match self.socket.as_mut() {
            Some(socket) => {
                let write = async {
                    socket.write_all(data.as_bytes()).await?;
                    socket.flush().await
                };
                match timeout(self.command_timeout, write).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        self.socket.take();
                        Err(SessionError::Io(e.to_string()))
                    }
                    Err(_) => {
                        self.socket.take();
                        Err(SessionError::Timeout(self.command_timeout))
                    }
                }
            }
            None => Err(SessionError::Io("socket already closed".to_string())),
        }
    }
}

fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\r\n")
}

//! Telnet transport over a plain TCP stream.
//!
//! Only enough of the telnet protocol is handled to get clean text out of a
//! console server: every option the server offers is refused, subnegotiations
//! are skipped, and doubled `IAC` bytes are unescaped.

use std::time::Duration;

use bytes::BytesMut;
use log::{debug, trace};
use memchr::memmem;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use super::Transport;
use super::config::TelnetConfig;
use crate::error::{ChannelError, Result, TransportError};

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

/// How much of the unread buffer is quoted in timeout errors.
const OBSERVED_TAIL: usize = 200;

/// Telnet transport wrapping a tokio TCP stream.
pub struct TelnetTransport {
    stream: TcpStream,
    config: TelnetConfig,
    decoder: IacDecoder,
    /// Decoded output not yet handed to a caller.
    pending: BytesMut,
}

impl TelnetTransport {
    /// Connect to the console port described by `config`.
    pub async fn connect(config: TelnetConfig) -> Result<Self> {
        debug!("connecting to {}", config.socket_addr());

        let stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.connect_timeout))?
        .map_err(|source| TransportError::ConnectionFailed {
            host: config.host.clone(),
            port: config.port,
            source,
        })?;

        stream.set_nodelay(true).map_err(TransportError::Io)?;

        Ok(Self {
            stream,
            config,
            decoder: IacDecoder::default(),
            pending: BytesMut::with_capacity(4096),
        })
    }

    /// The configuration this transport was opened with.
    pub fn config(&self) -> &TelnetConfig {
        &self.config
    }

    /// Read one chunk from the socket into `pending`.
    ///
    /// Returns `false` if the deadline passed before anything arrived.
    async fn fill(&mut self, deadline: Instant) -> Result<bool> {
        let mut raw = [0u8; 4096];
        let n = match tokio::time::timeout_at(deadline, self.stream.read(&mut raw)).await {
            Err(_) => return Ok(false),
            Ok(read) => read.map_err(TransportError::Io)?,
        };
        if n == 0 {
            return Err(TransportError::Disconnected.into());
        }

        let mut replies = Vec::new();
        self.decoder.decode(&raw[..n], &mut self.pending, &mut replies);
        if !replies.is_empty() {
            trace!("refusing telnet options: {:?}", replies);
            self.stream
                .write_all(&replies)
                .await
                .map_err(TransportError::Io)?;
        }
        Ok(true)
    }

    fn observed_tail(&self) -> String {
        let start = self.pending.len().saturating_sub(OBSERVED_TAIL);
        String::from_utf8_lossy(&self.pending[start..]).into_owned()
    }
}

impl Transport for TelnetTransport {
    async fn write(&mut self, text: &str) -> Result<()> {
        let mut out = Vec::with_capacity(text.len() + self.config.line_terminator.len());
        for &b in text.as_bytes().iter().chain(self.config.line_terminator.as_bytes()) {
            out.push(b);
            if b == IAC {
                out.push(IAC);
            }
        }
        self.stream
            .write_all(&out)
            .await
            .map_err(TransportError::Io)?;
        self.stream.flush().await.map_err(TransportError::Io)?;
        Ok(())
    }

    async fn read(&mut self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        while self.pending.is_empty() {
            if !self.fill(deadline).await? {
                return Ok(Vec::new());
            }
        }
        // Take whatever else is already waiting on the socket. A failure here
        // is left for the next read to hit, once the pending output is out.
        while self.pending.len() < max_bytes {
            match self.fill(Instant::now()).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    debug!("returning {} pending bytes before: {}", self.pending.len(), e);
                    break;
                }
            }
        }
        let n = max_bytes.min(self.pending.len());
        Ok(self.pending.split_to(n).to_vec())
    }

    async fn read_until(&mut self, delimiter: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(pos) = memmem::find(&self.pending, delimiter) {
                return Ok(self.pending.split_to(pos + delimiter.len()).to_vec());
            }
            if !self.fill(deadline).await? {
                return Err(ChannelError::PatternTimeout {
                    pattern: String::from_utf8_lossy(delimiter).into_owned(),
                    timeout,
                    observed: self.observed_tail(),
                }
                .into());
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.pending.clear();
        self.stream.shutdown().await.map_err(TransportError::Io)?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum IacState {
    #[default]
    Data,
    Iac,
    Negotiate(u8),
    Sub,
    SubIac,
}

/// Incremental telnet command filter.
///
/// Keeps its state across reads because a command sequence can be split
/// between two TCP segments.
#[derive(Debug, Default)]
struct IacDecoder {
    state: IacState,
}

impl IacDecoder {
    /// Append the text bytes of `input` to `out` and the negotiation
    /// refusals to `replies`.
    fn decode(&mut self, input: &[u8], out: &mut BytesMut, replies: &mut Vec<u8>) {
        for &b in input {
            self.state = match self.state {
                IacState::Data => match b {
                    IAC => IacState::Iac,
                    // NUL padding after a bare CR
                    0 => IacState::Data,
                    _ => {
                        out.extend_from_slice(&[b]);
                        IacState::Data
                    }
                },
                IacState::Iac => match b {
                    IAC => {
                        out.extend_from_slice(&[IAC]);
                        IacState::Data
                    }
                    DO | DONT | WILL | WONT => IacState::Negotiate(b),
                    SB => IacState::Sub,
                    _ => IacState::Data,
                },
                IacState::Negotiate(command) => {
                    match command {
                        DO => replies.extend_from_slice(&[IAC, WONT, b]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, b]),
                        _ => {}
                    }
                    IacState::Data
                }
                IacState::Sub => match b {
                    IAC => IacState::SubIac,
                    _ => IacState::Sub,
                },
                IacState::SubIac => match b {
                    SE => IacState::Data,
                    _ => IacState::Sub,
                },
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn decode_all(input: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut decoder = IacDecoder::default();
        let mut out = BytesMut::new();
        let mut replies = Vec::new();
        decoder.decode(input, &mut out, &mut replies);
        (out.to_vec(), replies)
    }

    #[test]
    fn test_plain_text_passes_through() {
        let (out, replies) = decode_all(b"Router>\r\n");
        assert_eq!(out, b"Router>\r\n");
        assert!(replies.is_empty());
    }

    #[test]
    fn test_options_are_refused() {
        // WILL ECHO, WILL SGA, DO TTYPE
        let (out, replies) = decode_all(&[IAC, WILL, 1, IAC, WILL, 3, IAC, DO, 24, b'o', b'k']);
        assert_eq!(out, b"ok");
        assert_eq!(replies, vec![IAC, DONT, 1, IAC, DONT, 3, IAC, WONT, 24]);
    }

    #[test]
    fn test_subnegotiation_is_skipped() {
        let (out, _) = decode_all(&[b'a', IAC, SB, 24, 1, IAC, SE, b'b']);
        assert_eq!(out, b"ab");
    }

    #[test]
    fn test_escaped_iac_and_nul_padding() {
        let (out, _) = decode_all(&[b'x', IAC, IAC, b'\r', 0, b'y']);
        assert_eq!(out, vec![b'x', IAC, b'\r', b'y']);
    }

    #[test]
    fn test_command_split_across_reads() {
        let mut decoder = IacDecoder::default();
        let mut out = BytesMut::new();
        let mut replies = Vec::new();
        decoder.decode(&[b'a', IAC], &mut out, &mut replies);
        decoder.decode(&[DO, 1, b'b'], &mut out, &mut replies);
        assert_eq!(out.as_ref(), b"ab");
        assert_eq!(replies, vec![IAC, WONT, 1]);
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = TelnetTransport::connect(TelnetConfig::new("127.0.0.1", port))
            .await
            .err()
            .unwrap();
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_final_output_survives_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"\r\nRouter#").await.unwrap();
            sock.shutdown().await.unwrap();
        });

        let mut transport = TelnetTransport::connect(TelnetConfig::new("127.0.0.1", port))
            .await
            .unwrap();
        server.await.unwrap();

        let out = transport.read(100, Duration::from_secs(5)).await.unwrap();
        assert_eq!(out, b"\r\nRouter#");

        let err = transport
            .read(100, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Transport(TransportError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_round_trip_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(&[IAC, WILL, 1]).await.unwrap();
            sock.write_all(b"Router>").await.unwrap();
            let mut buf = [0u8; 64];
            let mut received = Vec::new();
            while !received.ends_with(b"en\n") {
                let n = sock.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
            }
            sock.write_all(b"\r\nRouter#").await.unwrap();
            received
        });

        let mut transport = TelnetTransport::connect(TelnetConfig::new("127.0.0.1", port))
            .await
            .unwrap();
        let out = transport
            .read_until(b">", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out, b"Router>");

        transport.write("en").await.unwrap();
        let out = transport
            .read_until(b"#", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out, b"\r\nRouter#");

        let received = server.await.unwrap();
        // The refusal of WILL ECHO precedes the command
        assert_eq!(&received[..3], &[IAC, DONT, 1]);
        assert!(received.ends_with(b"en\n"));
    }
}

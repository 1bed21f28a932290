//! UDP control channel between this machine and the remote host.
//!
//! One socket is used for both directions. Replies go to a fixed peer when one
//! is configured; otherwise to the IP of the last sender at the configured
//! reply port, which is how the remote host listens (it sends from an
//! ephemeral port but receives on a fixed one).

use crate::config::ControlConfig;
use crate::error::{CaptureError, CaptureResult, ProtocolError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// One received datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Payload bytes exactly as received
    pub payload: Vec<u8>,
    /// Sender address
    pub from: SocketAddr,
}

impl Datagram {
    /// Payload as text, without the trailing NUL padding C senders leave.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotUtf8`] if the payload is not UTF-8.
    pub fn text(&self) -> Result<&str, ProtocolError> {
        let end = self
            .payload
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        std::str::from_utf8(&self.payload[..end]).map_err(|_| ProtocolError::NotUtf8)
    }
}

/// Datagram control channel bound to an explicit local endpoint.
pub struct ControlChannel {
    socket: UdpSocket,
    config: ControlConfig,
    last_sender: Option<SocketAddr>,
    recv_buffer: Vec<u8>,
}

impl ControlChannel {
    /// Bind the control socket.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the address cannot be bound.
    pub async fn bind(config: ControlConfig) -> CaptureResult<Self> {
        let socket = UdpSocket::bind(config.bind).await?;
        tracing::info!(
            local = %socket.local_addr()?,
            reply_port = config.reply_port,
            peer = ?config.peer,
            "Control channel bound"
        );

        Ok(Self {
            recv_buffer: vec![0u8; config.max_datagram],
            socket,
            config,
            last_sender: None,
        })
    }

    /// Address the socket is actually bound to.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the OS cannot report the address.
    pub fn local_addr(&self) -> CaptureResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Wait for the next datagram. Blocks indefinitely.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the receive fails.
    pub async fn recv(&mut self) -> CaptureResult<Datagram> {
        tracing::debug!("Waiting for data...");
        let (len, from) = self.socket.recv_from(&mut self.recv_buffer).await?;
        Ok(self.accept(len, from))
    }

    /// Wait at most `timeout` for the next datagram.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the receive fails.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> CaptureResult<Option<Datagram>> {
        match tokio::time::timeout(timeout, self.socket.recv_from(&mut self.recv_buffer)).await {
            Ok(result) => {
                let (len, from) = result?;
                Ok(Some(self.accept(len, from)))
            }
            Err(_) => Ok(None),
        }
    }

    fn accept(&mut self, len: usize, from: SocketAddr) -> Datagram {
        if len == self.recv_buffer.len() {
            tracing::warn!(
                %from,
                max = self.recv_buffer.len(),
                "Datagram filled the receive buffer and may be truncated"
            );
        }
        tracing::info!(%from, bytes = len, "Received packet");
        self.last_sender = Some(from);
        Datagram {
            payload: self.recv_buffer[..len].to_vec(),
            from,
        }
    }

    /// Fix the reply address, or go back to replying to the last sender.
    pub fn set_peer(&mut self, peer: Option<SocketAddr>) {
        self.config.peer = peer;
    }

    /// Address replies are sent to.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoPeer`] when no peer is configured and nothing
    /// has been received yet.
    pub fn reply_target(&self) -> CaptureResult<SocketAddr> {
        if let Some(peer) = self.config.peer {
            return Ok(peer);
        }
        self.last_sender
            .map(|sender| SocketAddr::new(sender.ip(), self.config.reply_port))
            .ok_or(CaptureError::NoPeer)
    }

    /// Send raw bytes to the reply target.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no reply target or the send fails.
    pub async fn send(&self, payload: &[u8]) -> CaptureResult<()> {
        let target = self.reply_target()?;
        self.socket.send_to(payload, target).await?;
        tracing::info!(%target, bytes = payload.len(), "Message sent");
        Ok(())
    }

    /// Send a text message to the reply target.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no reply target or the send fails.
    pub async fn send_text(&self, text: &str) -> CaptureResult<()> {
        self.send(text.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback(peer: Option<SocketAddr>, reply_port: u16) -> ControlConfig {
        ControlConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            reply_port,
            peer,
            max_datagram: 512,
        }
    }

    #[test]
    fn test_datagram_text_strips_nul_padding() {
        let datagram = Datagram {
            payload: b"1\0\0\0".to_vec(),
            from: "127.0.0.1:9090".parse().unwrap(),
        };
        assert_eq!(datagram.text().unwrap(), "1");
    }

    #[test]
    fn test_datagram_text_rejects_invalid_utf8() {
        let datagram = Datagram {
            payload: vec![0xff, 0xfe],
            from: "127.0.0.1:9090".parse().unwrap(),
        };
        assert_eq!(datagram.text(), Err(ProtocolError::NotUtf8));
    }

    #[tokio::test]
    async fn test_send_without_peer_fails() {
        let channel = ControlChannel::bind(loopback(None, 9090)).await.unwrap();
        let err = channel.send_text("hello").await.unwrap_err();
        assert!(matches!(err, CaptureError::NoPeer));
    }

    #[tokio::test]
    async fn test_reply_goes_to_sender_ip_at_reply_port() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let reply_port = listener.local_addr().unwrap().port();

        let mut channel = ControlChannel::bind(loopback(None, reply_port)).await.unwrap();
        let server_addr = channel.local_addr().unwrap();

        // sender uses a different (ephemeral) port than the one it listens on
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"ping", server_addr).await.unwrap();

        let datagram = channel.recv().await.unwrap();
        assert_eq!(datagram.payload, b"ping");
        assert_eq!(
            channel.reply_target().unwrap(),
            SocketAddr::new(datagram.from.ip(), reply_port)
        );

        channel.send_text("pong").await.unwrap();
        let mut buf = [0u8; 16];
        let (len, _) = listener.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"pong");
    }

    #[tokio::test]
    async fn test_fixed_peer_overrides_sender() {
        let fixed: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let mut channel = ControlChannel::bind(loopback(Some(fixed), 9090)).await.unwrap();
        assert_eq!(channel.reply_target().unwrap(), fixed);

        channel.set_peer(None);
        assert!(matches!(channel.reply_target(), Err(CaptureError::NoPeer)));
    }

    #[tokio::test]
    async fn test_recv_timeout_expires() {
        let mut channel = ControlChannel::bind(loopback(None, 9090)).await.unwrap();
        let got = channel
            .recv_timeout(Duration::from_millis(20))
            .await
            .unwrap();
        assert!(got.is_none());
    }
}

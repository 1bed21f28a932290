//! The other end of the control channel.
//!
//! [`RemoteHost`] plays the stimulus host: it sends a start command, waits
//! for the ready reply, and later sends the run flag and waits for the
//! acknowledgement. The `send` subcommand and the integration tests drive the
//! service through it.

use crate::config::ControlConfig;
use crate::control::{ControlChannel, ACK_REPLY, READY_REPLY};
use crate::error::{CaptureError, CaptureResult, ProtocolError};
use crate::session::{CaptureParams, RunFlag};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Stimulus-host side of the control protocol.
pub struct RemoteHost {
    channel: ControlChannel,
    timeout: Duration,
}

impl RemoteHost {
    /// Bind `local` and address every message to `service`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if `local` cannot be bound.
    pub async fn connect(
        local: SocketAddr,
        service: SocketAddr,
        timeout: Duration,
    ) -> CaptureResult<Self> {
        let channel = ControlChannel::bind(ControlConfig {
            bind: local,
            reply_port: service.port(),
            peer: Some(service),
            ..ControlConfig::default()
        })
        .await?;
        Ok(Self { channel, timeout })
    }

    /// Address replies from the service arrive on.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the OS cannot report the address.
    pub fn local_addr(&self) -> CaptureResult<SocketAddr> {
        self.channel.local_addr()
    }

    /// Send raw text, bypassing the command formatter.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails.
    pub async fn send_raw(&self, text: &str) -> CaptureResult<()> {
        self.channel.send_text(text).await
    }

    /// Send a start command and wait for the ready reply.
    ///
    /// # Errors
    ///
    /// Fails on timeout or when the reply is not the ready message.
    pub async fn request_capture(&mut self, params: &CaptureParams) -> CaptureResult<()> {
        let command = params.to_command();
        tracing::info!(command = %command, "Requesting capture");
        self.channel.send_text(&command).await?;
        self.wait_reply(READY_REPLY).await
    }

    /// Send the run flag and wait for the acknowledgement.
    ///
    /// # Errors
    ///
    /// Fails on timeout or when the reply is not the acknowledgement.
    pub async fn finish_session(&mut self, flag: RunFlag) -> CaptureResult<()> {
        self.channel.send_text(&flag.0.to_string()).await?;
        self.wait_reply(ACK_REPLY).await
    }

    /// Wait for one reply and check it is `expected`.
    ///
    /// # Errors
    ///
    /// Fails on timeout or when a different reply arrives.
    pub async fn wait_reply(&mut self, expected: &'static str) -> CaptureResult<()> {
        let datagram = self.channel.recv_timeout(self.timeout).await?.ok_or_else(|| {
            CaptureError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no reply within {:?}", self.timeout),
            ))
        })?;

        let text = datagram.text()?;
        if text == expected {
            tracing::info!(reply = text, "Reply received");
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedReply {
                expected,
                got: text.to_string(),
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Stimulus;
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn test_request_capture_rejects_wrong_reply() {
        let service = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let service_addr = service.local_addr().unwrap();
        let mut remote = RemoteHost::connect(
            "127.0.0.1:0".parse().unwrap(),
            service_addr,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let params = CaptureParams {
            stimulus: Stimulus::Saved { signal: 1 },
            freq: 5,
            fps: 100,
            num_images: 4,
            pulse_time: 10,
            delay_time: 0.0,
        };

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, from) = service.recv_from(&mut buf).await.unwrap();
            service.send_to(b"Busy.", from).await.unwrap();
            String::from_utf8(buf[..len].to_vec()).unwrap()
        });

        let err = remote.request_capture(&params).await.unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Protocol(ProtocolError::UnexpectedReply { .. })
        ));
        assert!(responder.await.unwrap().starts_with("S, 1, 5, 100, 4"));
    }

    #[tokio::test]
    async fn test_times_out_without_reply() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut remote = RemoteHost::connect(
            "127.0.0.1:0".parse().unwrap(),
            silent.local_addr().unwrap(),
            Duration::from_millis(20),
        )
        .await
        .unwrap();

        let err = remote.finish_session(RunFlag(0)).await.unwrap_err();
        assert!(matches!(err, CaptureError::Io(e) if e.kind() == io::ErrorKind::TimedOut));
    }
}

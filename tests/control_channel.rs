//! Control channel behaviour between two real sockets.

use grabsync::config::ControlConfig;
use grabsync::control::{parse_capture_command, parse_run_flag, ControlChannel};
use grabsync::session::RunFlag;
use std::time::Duration;

fn loopback() -> ControlConfig {
    ControlConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        ..ControlConfig::default()
    }
}

async fn pair() -> (ControlChannel, ControlChannel) {
    let mut a = ControlChannel::bind(loopback()).await.unwrap();
    let mut b = ControlChannel::bind(loopback()).await.unwrap();
    a.set_peer(Some(b.local_addr().unwrap()));
    b.set_peer(Some(a.local_addr().unwrap()));
    (a, b)
}

#[tokio::test]
async fn payload_arrives_byte_identical() {
    let (a, mut b) = pair().await;

    let payloads: [&[u8]; 4] = [
        b"S, 4, 30, 1000, 1500, 20, 0.250000",
        b"1\0\0\0",
        &[0xde, 0xad, 0xbe, 0xef, 0x00, 0x7f],
        b"Start sequence AVI.",
    ];
    for payload in payloads {
        a.send(payload).await.unwrap();
        let got = b
            .recv_timeout(Duration::from_secs(5))
            .await
            .unwrap()
            .expect("datagram");
        assert_eq!(got.payload, payload);
        assert_eq!(got.from, a.local_addr().unwrap());
    }
}

#[tokio::test]
async fn text_commands_parse_after_transport() {
    let (a, mut b) = pair().await;

    a.send_text("E, 12, 3, 5, 90, 500, 200, 15, 1.5").await.unwrap();
    let datagram = b.recv().await.unwrap();
    let params = parse_capture_command(datagram.text().unwrap()).unwrap();
    assert_eq!(params.num_images, 200);

    // a C sender transmits the whole zero-padded buffer
    let mut padded = b"0".to_vec();
    padded.resize(512, 0);
    a.send(&padded).await.unwrap();
    let datagram = b.recv().await.unwrap();
    assert_eq!(datagram.payload.len(), 512);
    assert_eq!(parse_run_flag(datagram.text().unwrap()).unwrap(), RunFlag(0));
}

#[tokio::test]
async fn replies_follow_the_last_sender() {
    // the peer listens on a fixed port and sends from another one
    let mut listener = ControlChannel::bind(loopback()).await.unwrap();
    let mut config = loopback();
    config.reply_port = listener.local_addr().unwrap().port();
    let mut service = ControlChannel::bind(config).await.unwrap();
    let sender = ControlChannel::bind(ControlConfig {
        peer: Some(service.local_addr().unwrap()),
        ..loopback()
    })
    .await
    .unwrap();

    sender.send_text("ping").await.unwrap();
    service.recv().await.unwrap();
    service.send_text("pong").await.unwrap();

    let reply = listener
        .recv_timeout(Duration::from_secs(5))
        .await
        .unwrap()
        .expect("reply");
    assert_eq!(reply.payload, b"pong");
}

#[tokio::test]
async fn no_reply_target_before_first_datagram() {
    let service = ControlChannel::bind(loopback()).await.unwrap();
    assert!(service.send_text("nobody").await.is_err());
}

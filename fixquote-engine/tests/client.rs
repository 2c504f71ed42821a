/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! End-to-end tests of the quote client against an in-memory counterparty.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use fixquote_core::error::{FixError, QuoteError, SessionError, TransportError};
use fixquote_core::field::Field;
use fixquote_core::message::{MsgType, WireMessage};
use fixquote_core::types::{CompId, Phase, SeqNum};
use fixquote_engine::{
    ClientBuilder, ClientConfig, ClientCredentials, ClientEvent, QuoteClient, StaticTokenProvider,
};
use fixquote_quote::{FeeSource, QuoteConfig, QuoteRequestParams};
use fixquote_session::{DisconnectReason, SessionConfig};
use fixquote_tagvalue::{MessageEncoder, decode_bytes};
use fixquote_transport::{BoxedStream, Connector, FrameCodec};
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

/// Hands out one end of an in-memory pipe.
struct DuplexConnector(Mutex<Option<DuplexStream>>);

#[async_trait]
impl Connector for DuplexConnector {
    async fn connect(&self, _host: &str, _port: u16) -> Result<BoxedStream, TransportError> {
        let stream = self
            .0
            .lock()
            .unwrap()
            .take()
            .ok_or(TransportError::Closed)?;
        Ok(Box::new(stream))
    }
}

/// The acceptor side, scripted by each test.
struct Counterparty {
    io: Framed<DuplexStream, FrameCodec>,
    encoder: MessageEncoder,
    seq: u64,
}

impl Counterparty {
    async fn recv(&mut self) -> Option<WireMessage> {
        match self.io.next().await {
            Some(Ok(frame)) => Some(decode_bytes(frame).unwrap()),
            _ => None,
        }
    }

    /// Next message that is not liveness traffic; TestRequests are answered.
    async fn recv_app(&mut self) -> Option<WireMessage> {
        loop {
            let msg = self.recv().await?;
            match msg.msg_type() {
                MsgType::Heartbeat => {}
                MsgType::TestRequest => {
                    let id = msg.get(112).unwrap_or_default().to_string();
                    self.send(MsgType::Heartbeat, &[Field::new(112, id)]).await;
                }
                _ => return Some(msg),
            }
        }
    }

    async fn send(&mut self, msg_type: MsgType, body: &[Field]) {
        self.seq += 1;
        let frame: Bytes = self
            .encoder
            .encode(&msg_type, body, SeqNum::new(self.seq))
            .unwrap();
        self.io.send(frame).await.unwrap();
    }

    async fn accept_logon(&mut self) -> WireMessage {
        let logon = self.recv().await.unwrap();
        assert_eq!(*logon.msg_type(), MsgType::Logon);
        self.send(
            MsgType::Logon,
            &[Field::new(98, "0"), Field::new(108, "30")],
        )
        .await;
        logon
    }

    async fn drain(&mut self) {
        while self.recv().await.is_some() {}
    }
}

fn pair() -> (DuplexConnector, Counterparty) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let counterparty = Counterparty {
        io: Framed::new(server, FrameCodec::default()),
        encoder: MessageEncoder::new(
            "FIX.4.4",
            CompId::new("STS").unwrap(),
            CompId::new("C1").unwrap(),
        ),
        seq: 0,
    };
    (DuplexConnector(Mutex::new(Some(client))), counterparty)
}

fn config(quote_timeout: Duration) -> ClientConfig {
    ClientBuilder::new()
        .with_endpoint("sts.test", 9443)
        .with_credentials(ClientCredentials::new("C1", "s3cret"))
        .with_session(SessionConfig::new(
            CompId::new("C1").unwrap(),
            CompId::new("STS").unwrap(),
        ))
        .with_quote_config(
            QuoteConfig::new()
                .with_account("acct-1")
                .with_quote_timeout(quote_timeout),
        )
        .build()
        .unwrap()
}

fn params() -> QuoteRequestParams {
    QuoteRequestParams::builder(
        "BTC-USDC",
        Decimal::from(100_000),
        NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
    )
    .build()
    .unwrap()
}

async fn connect(connector: &DuplexConnector) -> Result<QuoteClient, FixError> {
    QuoteClient::connect_with(
        config(Duration::from_secs(5)),
        connector,
        &StaticTokenProvider::new("tok"),
    )
    .await
}

#[tokio::test(start_paused = true)]
async fn test_connect_quote_logout() {
    let (connector, mut cp) = pair();
    let server = tokio::spawn(async move {
        let logon = cp.accept_logon().await;
        assert_eq!(logon.get(34), Some("1"));
        assert_eq!(logon.get(553), Some("C1"));
        assert_eq!(logon.get(554), Some("tok"));
        assert_eq!(logon.get(141), Some("Y"));

        let request = cp.recv_app().await.unwrap();
        assert_eq!(*request.msg_type(), MsgType::QuoteRequest);
        assert_eq!(request.get(311), Some("BTC-USDC"));
        assert_eq!(request.get(1), Some("acct-1"));
        let id = request.get(131).unwrap().to_string();

        cp.send(MsgType::Quote, &[Field::new(131, "ghost"), Field::new(9655, "1")])
            .await;
        cp.send(
            MsgType::Quote,
            &[
                Field::new(131, id),
                Field::new(117, "Q-1"),
                Field::new(612, "100000"),
                Field::new(9655, "0.05"),
            ],
        )
        .await;

        let logout = cp.recv_app().await.unwrap();
        assert_eq!(*logout.msg_type(), MsgType::Logout);
        assert_eq!(logout.get(58), Some("done"));
        cp.send(MsgType::Logout, &[]).await;
    });

    let mut client = connect(&connector).await.unwrap();
    assert_eq!(client.phase(), Phase::LoggedIn);
    assert_eq!(client.heartbeat_interval(), Duration::from_secs(30));
    let mut events = client.events();

    let result = client.quote(params()).await.unwrap();
    assert_eq!(result.quote_id.as_deref(), Some("Q-1"));
    assert_eq!(result.strike, Some(Decimal::from(100_000)));
    assert_eq!(result.fee, Some("0.05".parse().unwrap()));
    assert_eq!(result.fee_source, Some(FeeSource::Premium));

    client.logout(Some("done")).await.unwrap();
    assert_eq!(client.phase(), Phase::Disconnected);
    server.await.unwrap();

    match events.recv().await.unwrap() {
        ClientEvent::Orphaned {
            correlation_id,
            msg_type,
        } => {
            assert_eq!(correlation_id.as_deref(), Some("ghost"));
            assert_eq!(msg_type, MsgType::Quote);
        }
        other => panic!("expected orphan, got {other:?}"),
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        ClientEvent::Disconnected(DisconnectReason::LogoutCompleted)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_quote_timeout() {
    let (connector, mut cp) = pair();
    let server = tokio::spawn(async move {
        cp.accept_logon().await;
        let request = cp.recv_app().await.unwrap();
        assert_eq!(*request.msg_type(), MsgType::QuoteRequest);
        // Never answer, not even the Logout.
        cp.drain().await;
    });

    let mut client = connect(&connector).await.unwrap();
    let mut events = client.events();
    let err = client.quote(params()).await.unwrap_err();
    assert!(matches!(
        err,
        QuoteError::Timeout {
            timeout_ms: 5000,
            ..
        }
    ));
    assert!(client.is_logged_in());

    client.logout(None).await.unwrap();
    server.await.unwrap();
    assert!(matches!(
        events.recv().await.unwrap(),
        ClientEvent::Disconnected(DisconnectReason::LogoutGraceExpired)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_logon_refused() {
    let (connector, mut cp) = pair();
    let server = tokio::spawn(async move {
        cp.recv().await.unwrap();
        cp.send(MsgType::Logout, &[Field::new(58, "invalid token")])
            .await;
        cp.drain().await;
    });

    let err = connect(&connector).await.unwrap_err();
    assert!(matches!(
        err,
        FixError::Session(SessionError::LogonFailed { ref reason }) if reason == "invalid token"
    ));
    server.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_logon_timeout() {
    let (connector, mut cp) = pair();
    let server = tokio::spawn(async move { cp.drain().await });

    let err = connect(&connector).await.unwrap_err();
    assert!(matches!(
        err,
        FixError::Session(SessionError::LogonFailed { .. })
    ));
    server.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_transport_loss_fails_pending_quote() {
    let (connector, mut cp) = pair();
    let server = tokio::spawn(async move {
        cp.accept_logon().await;
        cp.recv_app().await.unwrap();
        // Dropping the counterparty closes the pipe.
    });

    let client = connect(&connector).await.unwrap();
    let mut events = client.events();
    let err = client.quote(params()).await.unwrap_err();
    assert_eq!(
        err,
        QuoteError::SessionClosed {
            reason: "transport closed".to_string()
        }
    );
    server.await.unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        ClientEvent::Disconnected(DisconnectReason::TransportClosed)
    ));
    let mut phase = client.subscribe_phase();
    phase
        .wait_for(|phase| *phase == Phase::Disconnected)
        .await
        .unwrap();
    assert_eq!(
        client.request_quote(params()).await.unwrap_err(),
        QuoteError::NotLoggedIn {
            phase: Phase::Disconnected
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_test_request_echo_and_remote_logout() {
    let (connector, mut cp) = pair();
    let server = tokio::spawn(async move {
        cp.accept_logon().await;
        cp.send(MsgType::TestRequest, &[Field::new(112, "XYZ")])
            .await;
        let heartbeat = cp.recv().await.unwrap();
        assert_eq!(*heartbeat.msg_type(), MsgType::Heartbeat);
        assert_eq!(heartbeat.get(112), Some("XYZ"));

        cp.send(MsgType::Logout, &[Field::new(58, "maintenance")])
            .await;
        let reply = cp.recv().await.unwrap();
        assert_eq!(*reply.msg_type(), MsgType::Logout);
        cp.drain().await;
    });

    let client = connect(&connector).await.unwrap();
    let mut phase = client.subscribe_phase();
    phase
        .wait_for(|phase| *phase == Phase::Disconnected)
        .await
        .unwrap();
    server.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_keep_session_alive() {
    let (connector, mut cp) = pair();
    let server = tokio::spawn(async move {
        cp.accept_logon().await;
        let heartbeat = cp.recv().await.unwrap();
        assert_eq!(*heartbeat.msg_type(), MsgType::Heartbeat);
        cp.send(MsgType::Heartbeat, &[]).await;
        let next = cp.recv_app().await.unwrap();
        assert_eq!(*next.msg_type(), MsgType::Logout);
        cp.send(MsgType::Logout, &[]).await;
    });

    let mut client = connect(&connector).await.unwrap();
    tokio::time::sleep(Duration::from_secs(45)).await;
    assert!(client.is_logged_in());
    client.logout(None).await.unwrap();
    server.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_dropping_client_logs_out() {
    let (connector, mut cp) = pair();
    let server = tokio::spawn(async move {
        cp.accept_logon().await;
        let logout = cp.recv_app().await.unwrap();
        assert_eq!(*logout.msg_type(), MsgType::Logout);
        cp.send(MsgType::Logout, &[]).await;
        cp.drain().await;
    });

    let client = connect(&connector).await.unwrap();
    drop(client);
    server.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_oversized_frame_is_dropped_and_session_continues() {
    let (connector, mut cp) = pair();
    let server = tokio::spawn(async move {
        cp.accept_logon().await;
        let request = cp.recv_app().await.unwrap();
        let id = request.get(131).unwrap().to_string();

        let mut oversized = b"8=FIX.4.4\x019=4000\x0135=S\x01131=".to_vec();
        oversized.extend_from_slice(&[b'x'; 1024]);
        cp.io.send(Bytes::from(oversized)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        cp.send(
            MsgType::Quote,
            &[Field::new(131, id), Field::new(9655, "0.02")],
        )
        .await;

        let logout = cp.recv_app().await.unwrap();
        assert_eq!(*logout.msg_type(), MsgType::Logout);
        cp.send(MsgType::Logout, &[]).await;
    });

    let mut config = config(Duration::from_secs(5));
    config.session.max_frame_size = 256;
    let mut client = QuoteClient::connect_with(config, &connector, &StaticTokenProvider::new("tok"))
        .await
        .unwrap();

    let result = client.quote(params()).await.unwrap();
    assert_eq!(result.fee, Some("0.02".parse().unwrap()));
    assert!(client.is_logged_in());

    client.logout(None).await.unwrap();
    server.await.unwrap();
}

mod common;

use common::{frame_params, next_event, stream_config, MockListenKeys, MockServer};
use gatewayx::core::errors::ExchangeError;
use gatewayx::core::kernel::{SessionEvent, SessionState, StreamSession};
use gatewayx::core::types::{AssetClass, NormalizedEvent, Pair, Subscription};
use gatewayx::exchanges::binance::BinanceCodec;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const MARK_PRICE_FRAME: &str = r#"{"stream":"btcusdt@markPrice","data":{"e":"markPriceUpdate","E":1562305380000,"s":"BTCUSDT","p":"11794.15000000","i":"11784.62659091","P":"11784.25641265","r":"0.00038167","T":1562306400000}}"#;

fn btc_mark_price() -> Subscription {
    Subscription::new(
        "btcusdt@markPrice",
        Some(Pair::new("BTC", "USDT").unwrap()),
        AssetClass::UsdMargined,
    )
}

const LISTEN_KEY_EXPIRED_FRAME: &str = r#"{"e":"listenKeyExpired","E":"1736996475556","listenKey":"key"}"#;

fn drain(transitions: &mut broadcast::Receiver<SessionState>) -> Vec<SessionState> {
    let mut seen = Vec::new();
    while let Ok(state) = transitions.try_recv() {
        seen.push(state);
    }
    seen
}

fn eth_kline() -> Subscription {
    Subscription::new(
        "ethusdt@kline_1m",
        Some(Pair::new("ETH", "USDT").unwrap()),
        AssetClass::UsdMargined,
    )
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_public_session_replays_seeded_subscriptions() {
        let server = MockServer::start().await;
        let (session, _events) = StreamSession::new(stream_config(&server), BinanceCodec::default(), None);
        let session = session.with_subscriptions([btc_mark_price(), eth_kline()]);

        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert!(!session.is_authenticated());

        let frames = server.wait_for_frames(1).await;
        assert!(frames[0].contains("\"SUBSCRIBE\""));
        assert_eq!(frame_params(&frames[0]), vec!["btcusdt@markPrice", "ethusdt@kline_1m"]);
        assert_eq!(server.paths(), vec!["/"]);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_refused_listen_key_falls_back_to_public_only() {
        let server = MockServer::start().await;
        let config = stream_config(&server).with_authentication(true);
        let listen_keys = Arc::new(MockListenKeys::refusing());
        let (session, _events) = StreamSession::new(config, BinanceCodec::default(), Some(listen_keys as _));
        let session = session.with_subscriptions([btc_mark_price()]);

        let mut transitions = session.state_transitions();
        session.start().await.unwrap();

        assert_eq!(
            drain(&mut transitions),
            vec![
                SessionState::Connecting,
                SessionState::Authenticating,
                SessionState::Connected,
                SessionState::PublicOnly,
                SessionState::Active,
            ]
        );
        assert!(session.listen_key().is_none());
        assert_eq!(session.active_loops(), 1);
        let frames = server.wait_for_frames(1).await;
        assert_eq!(frame_params(&frames[0]), vec!["btcusdt@markPrice"]);
        assert_eq!(server.paths(), vec!["/"]);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_slow_listen_key_times_out_to_public_only() {
        let server = MockServer::start().await;
        let config = stream_config(&server)
            .with_authentication(true)
            .with_listen_key_timeout(Duration::from_millis(100));
        let listen_keys = Arc::new(MockListenKeys {
            create_delay: Some(Duration::from_secs(10)),
            ..MockListenKeys::granting("never-used")
        });
        let (session, _events) = StreamSession::new(config, BinanceCodec::default(), Some(listen_keys as _));
        let mut transitions = session.state_transitions();

        tokio::time::timeout(Duration::from_secs(3), session.start())
            .await
            .expect("start must not wait for the listen key")
            .unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert!(!session.is_authenticated());
        assert!(drain(&mut transitions).contains(&SessionState::PublicOnly));
        session.stop().await;
    }

    #[tokio::test]
    async fn test_authenticated_session_dials_private_url() {
        let server = MockServer::start().await;
        let config = stream_config(&server).with_authentication(true);
        let listen_keys = Arc::new(MockListenKeys::granting("user-data-key"));
        let (session, _events) = StreamSession::new(config, BinanceCodec::default(), Some(listen_keys as _));
        let session = session.with_subscriptions([btc_mark_price()]);
        let mut transitions = session.state_transitions();

        session.start().await.unwrap();
        assert!(session.is_authenticated());
        assert_eq!(session.active_loops(), 2);
        assert_eq!(
            drain(&mut transitions),
            vec![
                SessionState::Connecting,
                SessionState::Authenticating,
                SessionState::Connected,
                SessionState::Authenticated,
                SessionState::Active,
            ]
        );

        // one connection carries user data and the public channels
        let frames = server.wait_for_frames(1).await;
        assert_eq!(server.paths(), vec!["/ws/user-data-key"]);
        assert_eq!(server.connections(), 1);
        assert_eq!(frame_params(&frames[0]), vec!["btcusdt@markPrice"]);
        assert_eq!(session.subscriptions().len(), 1);
        session.stop().await;
        assert!(session.listen_key().is_none());
    }

    #[tokio::test]
    async fn test_restart_resends_same_subscription_set() {
        let server = MockServer::start().await;
        let (session, _events) = StreamSession::new(stream_config(&server), BinanceCodec::default(), None);
        let session = session.with_subscriptions([btc_mark_price()]);

        session.start().await.unwrap();
        server.wait_for_frames(1).await;
        session.subscribe(&[eth_kline()]).await.unwrap();
        server.wait_for_frames(2).await;
        session.stop().await;

        session.start().await.unwrap();
        let frames = server.wait_for_frames(3).await;
        assert_eq!(server.connections(), 2);
        assert_eq!(frame_params(&frames[2]), vec!["btcusdt@markPrice", "ethusdt@kline_1m"]);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_stop_waits_for_both_loops() {
        let server = MockServer::start().await;
        let config = stream_config(&server).with_authentication(true);
        let listen_keys = Arc::new(MockListenKeys::granting("key"));
        let (session, _events) = StreamSession::new(config, BinanceCodec::default(), Some(listen_keys as _));

        session.start().await.unwrap();
        assert_eq!(session.active_loops(), 2);

        tokio::join!(session.stop(), session.stop(), session.stop());
        assert_eq!(session.active_loops(), 0);
        assert_eq!(session.state(), SessionState::Disconnected);

        // stopping a stopped session is a no-op
        session.stop().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_active() {
        let server = MockServer::start().await;
        let (session, _events) = StreamSession::new(stream_config(&server), BinanceCodec::default(), None);
        session.start().await.unwrap();
        let err = session.start().await.unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidState(_)));
        session.stop().await;
    }

    #[tokio::test]
    async fn test_dial_failure_leaves_session_disconnected() {
        let server = MockServer::start().await;
        let mut config = stream_config(&server);
        config.public_url = "ws://127.0.0.1:1".to_string();
        let (session, _events) = StreamSession::new(config, BinanceCodec::default(), None);
        let err = session.start().await.unwrap_err();
        assert!(matches!(err, ExchangeError::ConnectionError(_)));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.active_loops(), 0);
    }
}

#[cfg(test)]
mod event_tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_are_normalized_and_acks_dropped() {
        let server = MockServer::start().await;
        let (session, mut events) = StreamSession::new(stream_config(&server), BinanceCodec::default(), None);
        let session = session.with_subscriptions([btc_mark_price()]);
        session.start().await.unwrap();
        server.wait_for_frames(1).await;

        server.push(r#"{"result":null,"id":1}"#);
        server.push(MARK_PRICE_FRAME);

        match next_event(&mut events).await {
            SessionEvent::Data(NormalizedEvent::MarkPriceUpdate(update)) => {
                assert_eq!(update.pair, Pair::new("BTC", "USDT").unwrap());
                assert_eq!(update.exchange, "binance");
                assert!((update.mark_price - 11794.15).abs() < 1e-9);
            }
            other => panic!("unexpected event {other:?}"),
        }
        session.stop().await;
    }

    #[tokio::test]
    async fn test_bad_frame_is_reported_and_stream_continues() {
        let server = MockServer::start().await;
        let (session, mut events) = StreamSession::new(stream_config(&server), BinanceCodec::default(), None);
        session.start().await.unwrap();

        server.wait_for_connections(1).await;

        let broken = r#"{"e":"markPriceUpdate","E":1,"s":"BTCUSDT","p":"oops","i":"1","r":"0","T":1}"#;
        server.push(broken);
        server.push(MARK_PRICE_FRAME);

        match next_event(&mut events).await {
            SessionEvent::Error(err) => assert_eq!(err.raw_frame(), Some(broken)),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            next_event(&mut events).await,
            SessionEvent::Data(NormalizedEvent::MarkPriceUpdate(_))
        ));
        session.stop().await;
    }

    #[tokio::test]
    async fn test_peer_close_reports_and_disconnects() {
        let server = MockServer::start().await;
        let (session, mut events) = StreamSession::new(stream_config(&server), BinanceCodec::default(), None);
        let session = session.with_subscriptions([btc_mark_price(), eth_kline()]);
        session.start().await.unwrap();
        server.wait_for_connections(1).await;
        server.wait_for_frames(1).await;

        server.close_all();
        match next_event(&mut events).await {
            SessionEvent::ConnectionClosed { reason } => assert!(reason.contains("closed")),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Disconnected);

        // the caller may start again after a peer close; the set is replayed
        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        let frames = server.wait_for_frames(2).await;
        assert_eq!(server.connections(), 2);
        assert_eq!(frame_params(&frames[1]), vec!["btcusdt@markPrice", "ethusdt@kline_1m"]);
        assert_eq!(session.subscriptions().len(), 2);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_subscribe_requires_active_session() {
        let server = MockServer::start().await;
        let (session, _events) = StreamSession::new(stream_config(&server), BinanceCodec::default(), None);
        let err = session.subscribe(&[btc_mark_price()]).await.unwrap_err();
        assert!(matches!(err, ExchangeError::SubscriptionError(_)));
        assert!(session.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_updates_mirrored_set() {
        let server = MockServer::start().await;
        let (session, _events) = StreamSession::new(stream_config(&server), BinanceCodec::default(), None);
        let session = session.with_subscriptions([btc_mark_price(), eth_kline()]);
        session.start().await.unwrap();

        session.unsubscribe(&["btcusdt@markPrice"]).await.unwrap();
        let frames = server.wait_for_frames(2).await;
        assert!(frames[1].contains("UNSUBSCRIBE"));
        let channels: Vec<String> = session.subscriptions().into_iter().map(|s| s.channel).collect();
        assert_eq!(channels, vec!["ethusdt@kline_1m"]);
        session.stop().await;
    }
}

#[cfg(test)]
mod keepalive_tests {
    use super::*;

    #[tokio::test]
    async fn test_renewal_failures_are_reported_until_threshold() {
        let server = MockServer::start().await;
        let config = stream_config(&server)
            .with_authentication(true)
            .with_keepalive_interval(Duration::from_millis(50))
            .with_max_consecutive_renewal_failures(Some(2));
        let listen_keys = Arc::new(MockListenKeys {
            fail_renewals: true,
            ..MockListenKeys::granting("key")
        });
        let (session, mut events) =
            StreamSession::new(config, BinanceCodec::default(), Some(Arc::clone(&listen_keys) as _));
        session.start().await.unwrap();

        for _ in 0..2 {
            match next_event(&mut events).await {
                SessionEvent::Error(ExchangeError::ListenKeyRenewalError(_)) => {}
                other => panic!("unexpected event {other:?}"),
            }
        }
        match next_event(&mut events).await {
            SessionEvent::AuthenticationLost { consecutive_failures } => assert_eq!(consecutive_failures, 2),
            other => panic!("unexpected event {other:?}"),
        }

        // public data keeps flowing without the keep-alive loop
        assert_eq!(session.state(), SessionState::Active);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(listen_keys.renewals.load(Ordering::SeqCst), 2);
        assert_eq!(session.active_loops(), 1);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_replaced_listen_key_closes_connection() {
        let server = MockServer::start().await;
        let config = stream_config(&server)
            .with_authentication(true)
            .with_keepalive_interval(Duration::from_millis(50));
        let listen_keys = Arc::new(MockListenKeys::granting("old-key"));
        *listen_keys.renewed_key.lock().unwrap() = Some("new-key".to_string());
        let (session, mut events) =
            StreamSession::new(config, BinanceCodec::default(), Some(Arc::clone(&listen_keys) as _));
        let session = session.with_subscriptions([btc_mark_price()]);
        session.start().await.unwrap();

        match next_event(&mut events).await {
            SessionEvent::ConnectionClosed { reason } => assert!(reason.contains("listen key replaced")),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.listen_key().unwrap().value(), "new-key");

        // the restart dials the key the venue now hands out
        *listen_keys.create_result.lock().unwrap() = Some(Ok("new-key".to_string()));
        *listen_keys.renewed_key.lock().unwrap() = None;
        session.start().await.unwrap();
        server.wait_for_connections(2).await;
        assert_eq!(server.paths(), vec!["/ws/old-key", "/ws/new-key"]);
        let frames = server.wait_for_frames(2).await;
        assert_eq!(frame_params(&frames[1]), vec!["btcusdt@markPrice"]);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_expired_listen_key_is_not_renewed() {
        let server = MockServer::start().await;
        let config = stream_config(&server)
            .with_authentication(true)
            .with_keepalive_interval(Duration::from_millis(200));
        let listen_keys = Arc::new(MockListenKeys::granting("key"));
        let (session, mut events) =
            StreamSession::new(config, BinanceCodec::default(), Some(Arc::clone(&listen_keys) as _));
        session.start().await.unwrap();
        server.wait_for_connections(1).await;

        server.push(LISTEN_KEY_EXPIRED_FRAME);
        assert!(matches!(
            next_event(&mut events).await,
            SessionEvent::Data(NormalizedEvent::ListenKeyExpired(_))
        ));
        assert!(session.listen_key().is_none());

        // the keep-alive loop exits at its next tick without a PUT
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(listen_keys.renewals.load(Ordering::SeqCst), 0);
        assert_eq!(session.active_loops(), 1);
        assert_eq!(session.state(), SessionState::Active);
        session.stop().await;
    }
}

use gatewayx::core::config::ExchangeConfig;
use gatewayx::core::errors::ExchangeError;
use gatewayx::core::kernel::WsCodec;
use gatewayx::core::types::{AssetClass, NormalizedEvent, Pair};
use gatewayx::exchanges::binance::{build_connector, pair_formats, BinanceCodec};
use std::sync::Arc;

fn usdm() -> BinanceCodec {
    BinanceCodec::default()
}

fn coinm() -> BinanceCodec {
    BinanceCodec::new(AssetClass::CoinMargined, Arc::new(pair_formats()))
}

fn pair(base: &str, quote: &str) -> Pair {
    Pair::new(base, quote).unwrap()
}

#[cfg(test)]
mod market_events {
    use super::*;

    #[test]
    fn test_mark_price_update() {
        let frame = r#"{"e":"markPriceUpdate","E":1562305380000,"s":"BTCUSDT","p":"11794.15000000","i":"11784.62659091","P":"11784.25641265","r":"0.00038167","T":1562306400000}"#;
        let Some(NormalizedEvent::MarkPriceUpdate(update)) = usdm().handle(frame).unwrap() else {
            panic!("expected a mark price update");
        };
        assert_eq!(update.pair, pair("BTC", "USDT"));
        assert_eq!(update.asset, AssetClass::UsdMargined);
        assert!((update.funding_rate - 0.000_381_67).abs() < 1e-12);
        assert_eq!(update.event_time.timestamp_millis(), 1_562_305_380_000);
        assert_eq!(update.next_funding_time.timestamp_millis(), 1_562_306_400_000);
    }

    #[test]
    fn test_combined_stream_is_unwrapped() {
        let frame = r#"{"stream":"btcusd_perp@markPrice","data":{"e":"markPriceUpdate","E":1,"s":"BTCUSD_PERP","p":"60000.1","i":"60001.2","P":"60000.5","r":"0.0001","T":2}}"#;
        let event = coinm().handle(frame).unwrap().unwrap();
        assert_eq!(event.pair(), Some(&pair("BTC", "USD")));
        assert_eq!(event.asset(), AssetClass::CoinMargined);
    }

    #[test]
    fn test_kline_update() {
        let frame = r#"{"e":"kline","E":1638747660000,"s":"ETHUSDT","k":{"t":1638747600000,"T":1638747659999,"s":"ETHUSDT","i":"1m","f":100,"L":200,"o":"4100.00","c":"4105.50","h":"4110.00","l":"4099.00","v":"1000.5","n":101,"x":false,"q":"4102000.0","V":"500","Q":"2051000","B":"0"}}"#;
        let Some(NormalizedEvent::KlineUpdate(kline)) = usdm().handle(frame).unwrap() else {
            panic!("expected a kline update");
        };
        assert_eq!(kline.pair, pair("ETH", "USDT"));
        assert_eq!(kline.interval, "1m");
        assert_eq!(kline.trade_count, 101);
        assert!(!kline.is_closed);
        assert!((kline.close - 4105.5).abs() < 1e-9);
    }

    #[test]
    fn test_force_order_on_coin_margined() {
        let frame = r#"{"e":"forceOrder","E":1568014460893,"o":{"s":"BTCUSD_PERP","ps":"BTCUSD","S":"SELL","o":"LIMIT","f":"IOC","q":"1","p":"9425.5","ap":"9496.5","X":"FILLED","l":"1","z":"1","T":1568014460893}}"#;
        let Some(NormalizedEvent::ForceOrderUpdate(order)) = coinm().handle(frame).unwrap() else {
            panic!("expected a force order update");
        };
        assert_eq!(order.pair, pair("BTC", "USD"));
        assert_eq!(order.side, "SELL");
        assert_eq!(order.status, "FILLED");
    }
}

#[cfg(test)]
mod user_data_events {
    use super::*;

    #[test]
    fn test_account_update() {
        let frame = r#"{"e":"ACCOUNT_UPDATE","E":1564745798939,"T":1564745798938,"a":{"m":"ORDER","B":[{"a":"USDT","wb":"122624.12345678","cw":"100.12345678","bc":"50.12345678"}],"P":[{"s":"BTCUSDT","pa":"-0.5","ep":"9000","cr":"200","up":"-1.2","mt":"isolated","iw":"0","ps":"SHORT"}]}}"#;
        let Some(NormalizedEvent::AccountUpdate(update)) = usdm().handle(frame).unwrap() else {
            panic!("expected an account update");
        };
        assert_eq!(update.reason.as_deref(), Some("ORDER"));
        assert_eq!(update.balances[0].asset, "USDT");
        assert_eq!(update.balances[0].cross_wallet_balance, Some(100.123_456_78));
        assert_eq!(update.positions[0].pair, pair("BTC", "USDT"));
        assert!((update.positions[0].position_amount + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_order_trade_update() {
        let frame = r#"{"e":"ORDER_TRADE_UPDATE","E":1568879465651,"T":1568879465650,"o":{"s":"BTCUSDT","c":"TEST","S":"SELL","o":"TRAILING_STOP_MARKET","f":"GTC","q":"0.001","p":"0","ap":"0","sp":"7103.04","x":"NEW","X":"NEW","i":8886774,"l":"0","z":"0","L":"0","N":"USDT","n":"0","T":1568879465650,"t":0,"b":"0","a":"9.91","m":false,"R":false,"wt":"CONTRACT_PRICE","ot":"TRAILING_STOP_MARKET","ps":"LONG","cp":false,"AP":"7476.89","cr":"5.0","rp":"0"}}"#;
        let Some(NormalizedEvent::OrderTradeUpdate(order)) = usdm().handle(frame).unwrap() else {
            panic!("expected an order trade update");
        };
        assert_eq!(order.order_id, 8_886_774);
        assert_eq!(order.client_order_id, "TEST");
        assert_eq!(order.position_side.as_deref(), Some("LONG"));
        assert!((order.stop_price - 7103.04).abs() < 1e-9);
    }

    #[test]
    fn test_spot_execution_report_is_an_order_update() {
        let codec = BinanceCodec::new(AssetClass::Spot, Arc::new(pair_formats()));
        let frame = r#"{"e":"executionReport","E":1499405658658,"s":"ETHBTC","c":"mUvoqJxFIILMdfAW5iGSOW","S":"BUY","o":"LIMIT","f":"GTC","q":"1.00000000","p":"0.10264410","P":"0.00000000","F":"0.00000000","g":-1,"C":"","x":"NEW","X":"NEW","r":"NONE","i":4293153,"l":"0.00000000","z":"0.00000000","L":"0.00000000","n":"0","N":null,"T":1499405658657,"t":-1,"I":8641984,"w":true,"m":false,"M":false,"O":1499405658657,"Z":"0.00000000","Y":"0.00000000","Q":"0.00000000"}"#;
        let Some(NormalizedEvent::OrderTradeUpdate(order)) = codec.handle(frame).unwrap() else {
            panic!("expected an order trade update");
        };
        assert_eq!(order.pair, pair("ETH", "BTC"));
        assert_eq!(order.asset, AssetClass::Spot);
        assert!(order.commission_asset.is_none());
    }

    #[test]
    fn test_listen_key_expired() {
        let frame = r#"{"e":"listenKeyExpired","E":"1736996475556","listenKey":"WsCMN0a4KHUPTQuX6IUnqEZfB1inxmv1qR4kbf1LuEjur5VdbzqvyxqG9TSjVVxv"}"#;
        let event = usdm().handle(frame).unwrap().unwrap();
        assert!(matches!(event, NormalizedEvent::ListenKeyExpired(ref e) if e.event_time.timestamp_millis() == 1_736_996_475_556));
    }
}

#[cfg(test)]
mod classification {
    use super::*;

    #[test]
    fn test_subscription_ack_produces_nothing() {
        assert!(usdm().handle(r#"{"result":null,"id":1}"#).unwrap().is_none());
        assert!(usdm()
            .handle(r#"{"method":"SUBSCRIBE","params":["btcusdt@markPrice"],"id":1}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_unknown_event_type_is_unrecognized() {
        let frame = r#"{"e":"bookTicker","u":400900217,"s":"BNBUSDT"}"#;
        match usdm().handle(frame).unwrap() {
            Some(NormalizedEvent::Unrecognized { event_type, raw, .. }) => {
                assert_eq!(event_type.as_deref(), Some("bookTicker"));
                assert_eq!(raw, frame);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bad_payload_keeps_raw_frame() {
        let frame = r#"{"e":"markPriceUpdate","E":1,"s":"BTCUSDT","p":"not-a-number","i":"1","r":"0","T":1}"#;
        let err = usdm().handle(frame).unwrap_err();
        assert!(matches!(err, ExchangeError::DecodeError { .. }));
        assert_eq!(err.raw_frame(), Some(frame));
    }

    #[test]
    fn test_missing_field_is_a_decode_error() {
        let frame = r#"{"e":"kline","E":1,"s":"BTCUSDT"}"#;
        let err = usdm().handle(frame).unwrap_err();
        assert_eq!(err.raw_frame(), Some(frame));
    }
}

#[cfg(test)]
mod enabled_pairs {
    use super::*;

    fn spot_kline(symbol: &str) -> String {
        format!(
            r#"{{"e":"kline","E":1,"s":"{symbol}","k":{{"t":0,"T":59999,"s":"{symbol}","i":"1m","f":1,"L":2,"o":"1","c":"1","h":"1","l":"1","v":"1","n":2,"x":true,"q":"1","V":"0","Q":"0","B":"0"}}}}"#
        )
    }

    fn spot_codec(enabled: Vec<Pair>) -> BinanceCodec {
        let config = ExchangeConfig::read_only().with_enabled_pairs(AssetClass::Spot, enabled);
        build_connector(config).unwrap().codec(AssetClass::Spot)
    }

    #[test]
    fn test_enabled_pair_wins_over_quote_guess() {
        let codec = spot_codec(vec![pair("BTC", "TUSD")]);
        let Some(NormalizedEvent::KlineUpdate(kline)) = codec.handle(&spot_kline("BTCTUSD")).unwrap() else {
            panic!("expected a kline update");
        };
        assert_eq!(kline.pair, pair("BTC", "TUSD"));
    }

    #[test]
    fn test_enabled_pair_with_unlisted_quote_resolves() {
        let frame = spot_kline("BTCEUR");
        assert!(spot_codec(Vec::new()).handle(&frame).is_err());

        let codec = spot_codec(vec![pair("BTC", "EUR")]);
        let event = codec.handle(&frame).unwrap().unwrap();
        assert_eq!(event.pair(), Some(&pair("BTC", "EUR")));
    }
}

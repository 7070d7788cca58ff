use crate::core::config::Credentials;
use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::{build_url, ensure_unreserved, hmac_sha256};
use crate::core::kernel::{SignedRequest, Signer, UnsignedRequest};
use std::collections::HashMap;

pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

const RESERVED: [&str; 2] = ["timestamp", "signature"];

/// Query-string HMAC-SHA256 signing shared by spot, USD-M and COIN-M.
///
/// The signed payload is the form-encoded query with `recvWindow` and
/// `timestamp` appended, followed by the raw body. The hex digest is appended
/// as the final `signature` parameter.
pub struct BinanceSigner {
    credentials: Credentials,
    recv_window: Option<u64>,
}

impl BinanceSigner {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            recv_window: None,
        }
    }

    #[must_use]
    pub const fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window = Some(recv_window_ms);
        self
    }

    pub fn generate_signature(&self, payload: &str) -> Result<String, ExchangeError> {
        hmac_sha256(
            self.credentials.secret_key().as_bytes(),
            payload.as_bytes(),
        )
        .map(hex::encode)
    }
}

impl Signer for BinanceSigner {
    fn sign_request(
        &self,
        request: &UnsignedRequest<'_>,
        timestamp: u64,
    ) -> Result<SignedRequest, ExchangeError> {
        ensure_unreserved(request.params, &RESERVED)?;

        let mut params = request.params.to_vec();
        if let Some(window) = self.recv_window {
            if !params.iter().any(|(k, _)| k == "recvWindow") {
                params.push(("recvWindow".to_string(), window.to_string()));
            }
        }
        params.push(("timestamp".to_string(), timestamp.to_string()));

        let mut url = build_url(request.base_url, request.path, &params)?;
        let mut payload = url.query().unwrap_or_default().to_string();
        payload.push_str(&String::from_utf8_lossy(request.body));

        let signature = self.generate_signature(&payload)?;
        url.query_pairs_mut().append_pair("signature", &signature);

        Ok(SignedRequest {
            method: request.method.clone(),
            url: url.to_string(),
            headers: self.key_headers(),
            body: request.body.to_vec(),
            signature: Some(signature),
        })
    }

    fn key_headers(&self) -> HashMap<String, String> {
        HashMap::from([(
            API_KEY_HEADER.to_string(),
            self.credentials.api_key().to_string(),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    // Key pair from the public Binance API documentation
    const API_KEY: &str = "vmPUZE6mv9SD5VNHk4HlWFsOr6aKE2zvsw0MuIgwCIPy6utIco14y7Ju91duEh8A";
    const SECRET: &str = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";

    fn signer() -> BinanceSigner {
        BinanceSigner::new(Credentials::new(API_KEY, SECRET))
    }

    #[test]
    fn matches_documented_example() {
        let signature = signer()
            .generate_signature(
                "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559",
            )
            .unwrap();
        assert_eq!(
            signature,
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn signature_is_last_query_parameter() {
        let params = vec![("symbol".to_string(), "BTCUSDT".to_string())];
        let request = UnsignedRequest {
            method: &Method::GET,
            base_url: "https://fapi.binance.com",
            path: "/fapi/v2/positionRisk",
            params: &params,
            body: &[],
        };
        let signed = signer().with_recv_window(5000).sign_request(&request, 1_620_000_000_000).unwrap();
        let signature = signed.signature.clone().unwrap();
        assert_eq!(
            signed.url,
            format!(
                "https://fapi.binance.com/fapi/v2/positionRisk?symbol=BTCUSDT&recvWindow=5000&timestamp=1620000000000&signature={}",
                signature
            )
        );
        assert_eq!(signed.headers.get(API_KEY_HEADER).map(String::as_str), Some(API_KEY));
    }

    #[test]
    fn caller_cannot_supply_timestamp() {
        let params = vec![("timestamp".to_string(), "1".to_string())];
        let request = UnsignedRequest {
            method: &Method::GET,
            base_url: "https://api.binance.com",
            path: "/api/v3/account",
            params: &params,
            body: &[],
        };
        assert!(matches!(
            signer().sign_request(&request, 2),
            Err(ExchangeError::SigningError(_))
        ));
    }
}

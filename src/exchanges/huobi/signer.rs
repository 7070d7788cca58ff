use crate::core::config::Credentials;
use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::{build_url, ensure_unreserved, hmac_sha256};
use crate::core::kernel::{SignedRequest, Signer, UnsignedRequest};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::Url;
use std::collections::HashMap;

const RESERVED: [&str; 5] = [
    "AccessKeyId",
    "SignatureMethod",
    "SignatureVersion",
    "Timestamp",
    "Signature",
];

/// Signature version 2 request signing.
///
/// The key id, method, version and a second-resolution UTC timestamp are
/// merged into the query, which is sorted by key and signed as
/// `METHOD\nhost\npath\nquery`. The base64 digest goes last as `Signature`.
/// JSON bodies are not covered by the signature.
pub struct HuobiSigner {
    credentials: Credentials,
}

impl HuobiSigner {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    pub fn generate_signature(&self, payload: &str) -> Result<String, ExchangeError> {
        hmac_sha256(
            self.credentials.secret_key().as_bytes(),
            payload.as_bytes(),
        )
        .map(|mac| general_purpose::STANDARD.encode(mac))
    }
}

/// `2017-05-11T15:19:30` for the given epoch milliseconds.
pub fn format_timestamp(timestamp: u64) -> Result<String, ExchangeError> {
    i64::try_from(timestamp)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|time| time.format("%Y-%m-%dT%H:%M:%S").to_string())
        .ok_or_else(|| ExchangeError::SigningError(format!("timestamp {} out of range", timestamp)))
}

fn host(url: &Url) -> Result<String, ExchangeError> {
    let host = url
        .host_str()
        .ok_or_else(|| ExchangeError::SigningError(format!("url {} has no host", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_lowercase(),
    })
}

impl Signer for HuobiSigner {
    fn sign_request(
        &self,
        request: &UnsignedRequest<'_>,
        timestamp: u64,
    ) -> Result<SignedRequest, ExchangeError> {
        ensure_unreserved(request.params, &RESERVED)?;

        let mut params = request.params.to_vec();
        params.push(("AccessKeyId".to_string(), self.credentials.api_key().to_string()));
        params.push(("SignatureMethod".to_string(), "HmacSHA256".to_string()));
        params.push(("SignatureVersion".to_string(), "2".to_string()));
        params.push(("Timestamp".to_string(), format_timestamp(timestamp)?));
        params.sort_by(|a, b| a.0.cmp(&b.0));

        let mut url = build_url(request.base_url, request.path, &params)?;
        let payload = format!(
            "{}\n{}\n{}\n{}",
            request.method.as_str(),
            host(&url)?,
            url.path(),
            url.query().unwrap_or_default()
        );

        let signature = self.generate_signature(&payload)?;
        url.query_pairs_mut().append_pair("Signature", &signature);

        Ok(SignedRequest {
            method: request.method.clone(),
            url: url.to_string(),
            headers: self.key_headers(),
            body: request.body.to_vec(),
            signature: Some(signature),
        })
    }

    /// The key travels in the query string; there is no key header.
    fn key_headers(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

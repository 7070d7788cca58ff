use crate::core::errors::ExchangeError;
use hmac::{Hmac, Mac};
use reqwest::{Method, Url};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// A request as the dispatcher sees it before authentication.
#[derive(Debug, Clone, Copy)]
pub struct UnsignedRequest<'a> {
    pub method: &'a Method,
    pub base_url: &'a str,
    pub path: &'a str,
    pub params: &'a [(String, String)],
    pub body: &'a [u8],
}

/// A request ready for the transport. Built fresh for every call since the
/// signature covers the timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub signature: Option<String>,
}

impl SignedRequest {
    /// Public request: no signature, caller headers only.
    pub fn public(
        request: &UnsignedRequest<'_>,
        headers: HashMap<String, String>,
    ) -> Result<Self, ExchangeError> {
        let url = build_url(request.base_url, request.path, request.params)?;
        Ok(Self {
            method: request.method.clone(),
            url: url.to_string(),
            headers,
            body: request.body.to_vec(),
            signature: None,
        })
    }

    /// URL path without the query. The query may carry key material, so
    /// this is what gets logged.
    pub fn path(&self) -> String {
        Url::parse(&self.url).map_or_else(|_| "<invalid url>".to_string(), |url| url.path().to_string())
    }
}

/// Signer trait for request authentication
///
/// Implementations are pure: the timestamp comes from the caller, so the
/// same inputs always produce the same [`SignedRequest`].
pub trait Signer: Send + Sync {
    /// Sign a request at `timestamp` (milliseconds since the epoch)
    fn sign_request(
        &self,
        request: &UnsignedRequest<'_>,
        timestamp: u64,
    ) -> Result<SignedRequest, ExchangeError>;

    /// Headers that identify the API key without signing, for endpoints that
    /// only need the key
    fn key_headers(&self) -> HashMap<String, String>;
}

/// HMAC-SHA256 over `payload`.
pub fn hmac_sha256(secret: &[u8], payload: &[u8]) -> Result<Vec<u8>, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| ExchangeError::SigningError(format!("Invalid secret key: {}", e)))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Joins base URL and path and form-encodes `params` as the query, in order.
pub fn build_url(
    base_url: &str,
    path: &str,
    params: &[(String, String)],
) -> Result<Url, ExchangeError> {
    let mut url = Url::parse(&format!("{}{}", base_url.trim_end_matches('/'), path))
        .map_err(|e| ExchangeError::SigningError(format!("Invalid url {}{}: {}", base_url, path, e)))?;

    if params.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    Ok(url)
}

/// Rejects caller parameters that collide with names the signer appends.
pub fn ensure_unreserved(
    params: &[(String, String)],
    reserved: &[&str],
) -> Result<(), ExchangeError> {
    match params.iter().find(|(k, _)| reserved.contains(&k.as_str())) {
        Some((key, _)) => Err(ExchangeError::SigningError(format!(
            "parameter {} is reserved for request signing",
            key
        ))),
        None => Ok(()),
    }
}

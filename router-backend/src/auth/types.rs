use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};

/// Header set issued for exactly one HTTP call.
///
/// Not `Clone`; the executor consumes it, one set per request.
#[derive(Debug, PartialEq, Eq)]
pub struct AuthHeaders {
    headers: Vec<(String, String)>,
}

impl AuthHeaders {
    pub fn new(headers: Vec<(String, String)>) -> Self {
        Self { headers }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// SHA-256 over every `name:value` pair, hex encoded
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (k, v) in &self.headers {
            hasher.update(k.to_ascii_lowercase().as_bytes());
            hasher.update(b":");
            hasher.update(v.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    pub fn into_header_map(self) -> Result<HeaderMap, String> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (k, v) in self.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| format!("Invalid header name '{}': {}", k, e))?;
            let value = HeaderValue::from_str(&v)
                .map_err(|e| format!("Invalid value for header '{}': {}", k, e))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

/// Compute Content-Digest for an HTTP body using SHA-256.
/// Returns the header value in RFC 9530 format: `sha-256=:<base64>:`
pub fn content_digest_sha256(body: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let hash = Sha256::digest(body);
    format!("sha-256=:{}:", STANDARD.encode(hash))
}

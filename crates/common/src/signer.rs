//! Canonical request strings and HMAC-SHA256 signatures.
//!
//! Canonical layout, byte for byte:
//!
//! ```text
//! <timestamp><METHOD><path>[?<sorted query>][ <raw body>]
//! ```
//!
//! The path is percent-decoded before signing. The query segment is omitted
//! when there are no pairs. The body segment is
//! the wire body (the still-encrypted envelope JSON), separated by a single
//! space and omitted entirely when the body is empty.

use std::borrow::Cow;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// The request metadata covered by a signature.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalRequest<'a> {
    /// Timestamp header value exactly as sent.
    pub timestamp: &'a str,
    /// HTTP method, e.g. `"POST"`.
    pub method: &'a str,
    /// Request path as sent, without the query string, e.g. `"/api/v1/stores"`.
    pub path: &'a str,
    /// Raw query string (without `?`), if any.
    pub query: Option<&'a str>,
    /// Raw wire body, empty when there is none.
    pub body: &'a [u8],
}

impl CanonicalRequest<'_> {
    /// Build the canonical bytes to sign or verify.
    pub fn to_bytes(&self) -> Vec<u8> {
        let path = decoded_path(self.path);
        let sorted = self.query.map(sorted_query).unwrap_or_default();

        let mut out = Vec::with_capacity(
            self.timestamp.len()
                + self.method.len()
                + path.len()
                + sorted.len()
                + self.body.len()
                + 2,
        );
        out.extend_from_slice(self.timestamp.as_bytes());
        out.extend_from_slice(self.method.as_bytes());
        out.extend_from_slice(path.as_bytes());
        if !sorted.is_empty() {
            out.push(b'?');
            out.extend_from_slice(sorted.as_bytes());
        }
        if !self.body.is_empty() {
            out.push(b' ');
            out.extend_from_slice(self.body);
        }
        out
    }
}

/// Percent-decode a request path. `+` is left alone, and a path that does not
/// decode to UTF-8 is signed as sent.
pub fn decoded_path(raw: &str) -> Cow<'_, str> {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

/// Decode a raw query string and re-emit it with pairs sorted by key.
///
/// Pairs with equal keys keep their original relative order. Keys and values
/// are form-decoded and written back undecorated as `k=v`, joined by `&`.
pub fn sorted_query(raw: &str) -> String {
    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect();
    // `sort_by` is stable: duplicate keys stay in sent order.
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Compute the lowercase hex HMAC-SHA256 of `message` under `key`.
pub fn sign(key: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Check `supplied` against the signature of `message` under `key`.
///
/// The comparison is constant-time over the hex strings. Any difference,
/// including letter case, is a mismatch.
pub fn verify(key: &[u8], message: &[u8], supplied: &str) -> bool {
    let expected = sign(key, message);
    expected.as_bytes().ct_eq(supplied.as_bytes()).into()
}

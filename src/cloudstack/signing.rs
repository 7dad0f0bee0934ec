// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CloudStack API request signing.
//!
//! CloudStack authenticates every request with an HMAC-SHA1 signature over the
//! lower-cased, key-sorted, URL-encoded query string.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// URL-encode a query component the way CloudStack expects (spaces as `%20`).
#[must_use]
pub fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Build the canonical query string: parameters sorted by lower-cased key,
/// values URL-encoded, joined with `&`.
#[must_use]
pub fn canonical_query(params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by_key(|(key, _)| key.to_lowercase());

    sorted
        .iter()
        .map(|(key, value)| format!("{key}={}", encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Compute the base64 signature for a canonical query string.
#[must_use]
pub fn sign(query: &str, secret_key: &str) -> String {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = HmacSha1::new_from_slice(secret_key.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(query.to_lowercase().as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Produce the full signed query string, ready to append to the API URL.
#[must_use]
pub fn signed_query(params: &[(String, String)], secret_key: &str) -> String {
    let query = canonical_query(params);
    let signature = sign(&query, secret_key);
    format!("{query}&signature={}", encode(&signature))
}

#[cfg(test)]
#[path = "signing_tests.rs"]
mod signing_tests;

//! # Identity Webhook
//!
//! The identity provider pushes user lifecycle events to us through Svix.
//!
//! ## Signature
//! - Secret comes as `whsec_<base64 key>`
//! - Signed content is `{svix-id}.{svix-timestamp}.{raw body}`
//! - HMAC-SHA256 over that, base64 encoded
//! - `svix-signature` holds space separated `v1,<signature>` entries, one match is enough
//! - Timestamps further than [`TOLERANCE_SECS`] from now are replays or clock trouble, rejected
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const ID_HEADER: &str = "svix-id";
pub const TIMESTAMP_HEADER: &str = "svix-timestamp";
pub const SIGNATURE_HEADER: &str = "svix-signature";

pub const TOLERANCE_SECS: u64 = 5 * 60;

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WebhookError {
    #[error("malformed secret")]
    MalformedSecret,

    #[error("malformed timestamp")]
    MalformedTimestamp,

    #[error("timestamp outside tolerance")]
    StaleTimestamp,

    #[error("no matching signature")]
    NoMatch,
}

pub struct WebhookHeaders<'a> {
    pub id: &'a str,
    pub timestamp: &'a str,
    pub signature: &'a str,
}

fn key_from_secret(secret: &str) -> Result<Vec<u8>, WebhookError> {
    let encoded = secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret);

    STANDARD
        .decode(encoded)
        .map_err(|_| WebhookError::MalformedSecret)
}

fn mac_for(
    key: &[u8],
    headers: &WebhookHeaders<'_>,
    body: &[u8],
) -> Result<HmacSha256, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| WebhookError::MalformedSecret)?;
    mac.update(headers.id.as_bytes());
    mac.update(b".");
    mac.update(headers.timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);

    Ok(mac)
}

/// Checks the signature against `now` (unix seconds).
pub fn verify(
    secret: &str,
    headers: &WebhookHeaders<'_>,
    body: &[u8],
    now: i64,
) -> Result<(), WebhookError> {
    let timestamp: i64 = headers
        .timestamp
        .trim()
        .parse()
        .map_err(|_| WebhookError::MalformedTimestamp)?;

    if now.abs_diff(timestamp) > TOLERANCE_SECS {
        return Err(WebhookError::StaleTimestamp);
    }

    let key = key_from_secret(secret)?;

    for entry in headers.signature.split_whitespace() {
        let Some((version, signature)) = entry.split_once(',') else {
            continue;
        };
        if version != SIGNATURE_VERSION {
            continue;
        }
        let Ok(signature) = STANDARD.decode(signature) else {
            continue;
        };

        // verify_slice compares in constant time
        if mac_for(&key, headers, body)?.verify_slice(&signature).is_ok() {
            return Ok(());
        }
    }

    Err(WebhookError::NoMatch)
}

/// Produces a `v1,<signature>` entry, what the sender puts in `svix-signature`.
pub fn sign(
    secret: &str,
    headers: &WebhookHeaders<'_>,
    body: &[u8],
) -> Result<String, WebhookError> {
    let key = key_from_secret(secret)?;
    let signature = mac_for(&key, headers, body)?.finalize().into_bytes();

    Ok(format!("{SIGNATURE_VERSION},{}", STANDARD.encode(signature)))
}

/// Stripe webhook signature verification
///
/// Stripe signs each delivery with HMAC-SHA256 over `"{timestamp}.{payload}"`
/// and sends `Stripe-Signature: t=<timestamp>,v1=<hex>[,v1=<hex>...]`. More
/// than one `v1` appears while a signing secret is being rolled; any match
/// is accepted. Deliveries older than the tolerance are rejected to limit
/// replay.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default accepted clock skew, in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Missing Stripe-Signature header")]
    MissingHeader,

    #[error("Signature header has no timestamp")]
    MissingTimestamp,

    #[error("Signature header has no v1 signature")]
    MissingSignature,

    #[error("Timestamp outside the tolerance window")]
    TimestampOutOfTolerance,

    #[error("No signature matches the payload")]
    Mismatch,

    #[error("Webhook signing secret is not usable as an HMAC key")]
    InvalidSecret,
}

struct ParsedHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<ParsedHeader<'_>, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }

    Ok(ParsedHeader {
        timestamp,
        signatures,
    })
}

fn mac_for(payload: &[u8], secret: &str, timestamp: i64) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Verifies a `Stripe-Signature` header against the raw request body
///
/// `now` is the current unix time; deliveries whose timestamp differs from
/// it by more than `tolerance_secs` are rejected.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), SignatureError> {
    let parsed = parse_header(header)?;

    let within_tolerance = now
        .checked_sub(parsed.timestamp)
        .map(i64::unsigned_abs)
        .is_some_and(|drift| drift <= tolerance_secs.unsigned_abs());
    if !within_tolerance {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    let mac = mac_for(payload, secret, parsed.timestamp)?;
    let matched = parsed.signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Produces a `Stripe-Signature` header value for a payload
///
/// Used to sign test deliveries.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, SignatureError> {
    let signature = hex::encode(mac_for(payload, secret, timestamp)?.finalize().into_bytes());
    Ok(format!("t={},v1={}", timestamp, signature))
}

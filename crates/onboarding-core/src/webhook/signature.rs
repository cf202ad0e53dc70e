// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Webhook signature verification.
//!
//! Both providers sign `"{timestamp}.{raw body}"` with HMAC-SHA256 and send
//! `t=<timestamp>,v1=<hex digest>` in a header. The body must be the exact
//! bytes received.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a Stripe signature timestamp.
pub const STRIPE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signing secret is not configured")]
    MissingSecret,

    #[error("signature header is missing")]
    MissingHeader,

    #[error("signature header is malformed")]
    Malformed,

    #[error("signature timestamp outside tolerance")]
    Expired,

    #[error("signature mismatch")]
    Mismatch,
}

/// Parsed `t=..,v1=..` header.
#[derive(Debug, PartialEq, Eq)]
struct SignatureHeader<'a> {
    timestamp: &'a str,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<SignatureHeader<'_>, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = Some(value),
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !timestamp.is_empty() && !signatures.is_empty() => {
            Ok(SignatureHeader {
                timestamp,
                signatures,
            })
        }
        _ => Err(SignatureError::Malformed),
    }
}

fn mac_for(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::MissingSecret)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Constant-time check of one hex signature.
fn matches(mac: HmacSha256, signature: &str) -> bool {
    match hex::decode(signature) {
        Ok(bytes) => mac.verify_slice(&bytes).is_ok(),
        Err(_) => false,
    }
}

fn require<'a>(secret: Option<&'a str>, header: Option<&'a str>) -> Result<(&'a str, &'a str), SignatureError> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::MissingSecret)?;
    let header = header
        .filter(|h| !h.trim().is_empty())
        .ok_or(SignatureError::MissingHeader)?;
    Ok((secret, header))
}

/// Verify a `Calendly-Webhook-Signature` header.
pub fn verify_calendly(
    secret: Option<&str>,
    header: Option<&str>,
    body: &[u8],
) -> Result<(), SignatureError> {
    let (secret, header) = require(secret, header)?;
    let parsed = parse_header(header)?;
    let signature = parsed.signatures[0];

    if matches(mac_for(secret, parsed.timestamp, body)?, signature) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Verify a `Stripe-Signature` header. Any of the `v1` values may match.
pub fn verify_stripe(
    secret: Option<&str>,
    header: Option<&str>,
    body: &[u8],
) -> Result<(), SignatureError> {
    verify_stripe_at(secret, header, body, Utc::now().timestamp())
}

pub(crate) fn verify_stripe_at(
    secret: Option<&str>,
    header: Option<&str>,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let (secret, header) = require(secret, header)?;
    let parsed = parse_header(header)?;

    let timestamp: i64 = parsed
        .timestamp
        .parse()
        .map_err(|_| SignatureError::Malformed)?;
    if (now - timestamp).abs() > STRIPE_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    let mac = mac_for(secret, parsed.timestamp, body)?;
    if parsed
        .signatures
        .iter()
        .any(|signature| matches(mac.clone(), signature))
    {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Build a `t=..,v1=..` header for `body`.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let timestamp = timestamp.to_string();
    let digest = match mac_for(secret, &timestamp, body) {
        Ok(mac) => hex::encode(mac.finalize().into_bytes()),
        Err(_) => String::new(),
    };
    format!("t={timestamp},v1={digest}")
}

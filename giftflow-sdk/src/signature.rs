//! Signature algorithm and verification for the Giftflow APIs.
//!
//! Every Service API request is signed with HMAC-SHA256. The wire format for
//! the header is:
//!
//! ```text
//! Giftflow-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! The signed message is `"{timestamp}.{json_body}"`. The same primitive
//! ([`sign_payload`] / [`verify_payload`]) backs the provider callback
//! schemes, which only differ in how the timestamp and signature are carried
//! in their headers.

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "Giftflow-Signature";

/// Maximum allowed age of a signature (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Marker trait for types that can participate in body signing via
/// [`SignedObject`].
pub trait Signature: for<'de> serde::Deserialize<'de> + serde::Serialize {}

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

// ---------------------------------------------------------------------------
// SignedObject: body signing
// ---------------------------------------------------------------------------

/// A signed API body carrying its typed payload, timestamp, raw JSON, and
/// HMAC-SHA256 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedObject<T: Signature> {
    pub body: T,
    pub timestamp: i64,
    pub json: String,
    pub signature: Box<[u8]>,
}

impl<T: Signature> SignedObject<T> {
    /// Serialize `body` to JSON and sign it with the current timestamp.
    pub fn new(body: T, key: &[u8]) -> Result<Self, serde_json::Error> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let json = serde_json::to_string(&body)?;
        let signature = sign_payload(now, json.as_bytes(), key);
        Ok(Self {
            body,
            timestamp: now,
            json,
            signature,
        })
    }

    /// Reconstruct a [`SignedObject`] from a raw `Giftflow-Signature` header
    /// value and the JSON request body string.
    ///
    /// This parses the header and deserializes the body but does **not**
    /// verify the HMAC; call [`verify`](Self::verify) for that.
    pub fn from_header_and_body(
        header_value: &str,
        body_json: String,
    ) -> Result<Self, SignatureError> {
        let (timestamp, signature) = parse_signature_header(header_value)?;
        let body: T = serde_json::from_str(&body_json)?;
        Ok(Self {
            body,
            timestamp,
            json: body_json,
            signature,
        })
    }

    /// Verify the HMAC signature and timestamp freshness, consuming `self`
    /// and returning the authenticated payload.
    pub fn verify(self, key: &[u8]) -> Result<T, SignatureError> {
        verify_payload(self.timestamp, self.json.as_bytes(), &self.signature, key)?;
        check_timestamp(self.timestamp)?;
        Ok(self.body)
    }

    /// Format the full `Giftflow-Signature` header value (`{timestamp}.{b64}`).
    pub fn to_header(&self) -> String {
        format_signature_header(self.timestamp, &self.signature)
    }
}

// ---------------------------------------------------------------------------
// Raw payload signing
// ---------------------------------------------------------------------------

/// Compute `HMAC-SHA256("{timestamp}.{payload}", key)`.
pub fn sign_payload(timestamp: i64, payload: &[u8], key: &[u8]) -> Box<[u8]> {
    let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key);
    let mut ctx = ring::hmac::Context::with_key(&key);
    ctx.update(timestamp.to_string().as_bytes());
    ctx.update(b".");
    ctx.update(payload);
    ctx.sign().as_ref().to_owned().into_boxed_slice()
}

/// Verify `HMAC-SHA256("{timestamp}.{payload}", key)` in constant time.
///
/// Freshness is not checked here, see [`check_timestamp`].
pub fn verify_payload(
    timestamp: i64,
    payload: &[u8],
    signature: &[u8],
    key: &[u8],
) -> Result<(), SignatureError> {
    let mut data = Vec::with_capacity(payload.len() + 21);
    data.extend_from_slice(timestamp.to_string().as_bytes());
    data.push(b'.');
    data.extend_from_slice(payload);
    ring::hmac::verify(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
        &data,
        signature,
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Header parsing / formatting
// ---------------------------------------------------------------------------

/// Parse a `{timestamp}.{base64}` header value into
/// `(timestamp, raw_signature_bytes)`.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let (timestamp, signature) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature_bytes = decode_signature(signature.trim())?;
    Ok((timestamp, signature_bytes))
}

/// Format a `{timestamp}.{base64}` header value from its parts.
pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!("{}.{}", timestamp, encode_signature(signature))
}

/// Base64-encode raw signature bytes (RFC 4648, no padding).
pub fn encode_signature(signature: &[u8]) -> String {
    fast32::base64::RFC4648_NOPAD.encode(signature)
}

/// Decode a base64 (RFC 4648, no padding) signature.
pub fn decode_signature(encoded: &str) -> Result<Box<[u8]>, SignatureError> {
    fast32::base64::RFC4648_NOPAD
        .decode_str(encoded)
        .map(Vec::into_boxed_slice)
        .map_err(|_| SignatureError::InvalidBase64)
}

// ---------------------------------------------------------------------------
// Timestamp validation
// ---------------------------------------------------------------------------

/// Check that a signature timestamp is within [`MAX_SIGNATURE_AGE`].
pub fn check_timestamp(timestamp: i64) -> Result<(), SignatureError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if (now - timestamp).abs() > MAX_SIGNATURE_AGE {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chronicle_types::CursorPayload;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Encodes a cursor as `base64url(json).base64url(hmac_sha256(json))`.
pub fn encode(payload: &CursorPayload, secret: &[u8]) -> Result<String> {
    let json = serde_json::to_vec(payload).map_err(|e| Error::CursorInvalid(e.to_string()))?;
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("hmac accepts a key of any length");
    mac.update(&json);
    let signature = mac.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(&json),
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

/// Decodes and verifies a cursor. Falls back to the legacy unsigned format
/// (bare `base64url(json)`, no `.signature` suffix) so cursors issued before
/// signing was introduced keep working.
pub fn decode(cursor: &str, secret: &[u8]) -> Result<CursorPayload> {
    match cursor.split_once('.') {
        Some((body, signature)) => {
            let json = URL_SAFE_NO_PAD
                .decode(body)
                .map_err(|_| Error::CursorInvalid("malformed cursor body".into()))?;
            let expected = URL_SAFE_NO_PAD
                .decode(signature)
                .map_err(|_| Error::CursorInvalid("malformed cursor signature".into()))?;
            let mut mac = HmacSha256::new_from_slice(secret)
                .expect("hmac accepts a key of any length");
            mac.update(&json);
            mac.verify_slice(&expected)
                .map_err(|_| Error::CursorInvalid("cursor signature mismatch".into()))?;
            serde_json::from_slice(&json).map_err(|_| Error::CursorInvalid("malformed cursor payload".into()))
        }
        None => decode_legacy(cursor),
    }
}

/// Legacy cursors predate signing and carry no MAC to trust, so their
/// `total` is discarded rather than taken on faith (§3: "their `total`
/// field is discarded"); callers recompute it as they would for a first
/// page.
fn decode_legacy(cursor: &str) -> Result<CursorPayload> {
    let json = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| Error::CursorInvalid("not a recognised cursor".into()))?;
    let mut payload: CursorPayload = serde_json::from_slice(&json)
        .map_err(|_| Error::CursorInvalid("malformed legacy cursor".into()))?;
    payload.total = 0;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> CursorPayload {
        CursorPayload {
            sort_key: "2024-01-01T00:00:00Z".to_string(),
            id: "claude:abc".to_string(),
            total: 42,
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let secret = b"test-secret";
        let encoded = encode(&payload(), secret).unwrap();
        let decoded = decode(&encoded, secret).unwrap();
        assert_eq!(decoded.id, payload().id);
        assert_eq!(decoded.total, 42);
    }

    #[test]
    fn rejects_tampered_signature() {
        let secret = b"test-secret";
        let mut encoded = encode(&payload(), secret).unwrap();
        encoded.push('x');
        assert!(decode(&encoded, secret).is_err());
    }

    #[test]
    fn rejects_wrong_secret() {
        let encoded = encode(&payload(), b"secret-a").unwrap();
        assert!(decode(&encoded, b"secret-b").is_err());
    }

    #[test]
    fn accepts_legacy_unsigned_cursor_but_zeroes_total() {
        let json = serde_json::to_vec(&payload()).unwrap();
        let legacy = URL_SAFE_NO_PAD.encode(json);
        let decoded = decode(&legacy, b"any-secret").unwrap();
        assert_eq!(decoded.id, payload().id);
        assert_eq!(decoded.total, 0);
    }
}

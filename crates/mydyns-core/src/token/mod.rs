// # Capability Token Codec
//
// Serializes a payload into a signed, opaque string and back.
//
// ## Wire Format
//
// ```text
// base64url( issued "|" base64url(json(payload)) "|" hmac )
// ```
//
// - `issued`: Unix timestamp (seconds) at encode time
// - `hmac`: HMAC-SHA256 over `purpose "|" issued "|" payload`, 32 raw bytes
//
// The purpose is mixed into the MAC but never written into the token, so a
// token minted for one purpose does not verify under another.
//
// ## Usage
//
// ```rust,ignore
// use mydyns_core::token::{TokenCodec, TokenData, UPDATE_TOKEN_PURPOSE};
//
// let codec = TokenCodec::new(secret)?;
// let token = codec.encode(UPDATE_TOKEN_PURPOSE, &data)?;
// let decoded: TokenData = codec.decode(UPDATE_TOKEN_PURPOSE, &token)?;
// ```

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Purpose namespace for tokens accepted by the update endpoint
pub const UPDATE_TOKEN_PURPOSE: &str = "update";

const MAC_LEN: usize = 32;
const SEPARATOR: u8 = b'|';

/// Payload carried by an update token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    /// Hostname label the token may update
    #[serde(rename = "Host")]
    pub host: String,

    /// User the token was issued to
    #[serde(rename = "User")]
    pub user: String,

    /// Security value derived from the user's seed at issue time
    #[serde(rename = "Security", with = "base64_bytes", default)]
    pub security: Vec<u8>,
}

/// Signs and verifies capability tokens with a symmetric secret
pub struct TokenCodec {
    key: Vec<u8>,
    max_age_secs: u64,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("key_len", &self.key.len())
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}

impl TokenCodec {
    /// Create a codec from the operator's secret
    ///
    /// Secrets other than 32 or 64 bytes are accepted with a warning.
    /// An empty secret is rejected.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let key = secret.into();
        if key.is_empty() {
            return Err(Error::config("Token secret cannot be empty"));
        }
        if key.len() != 32 && key.len() != 64 {
            tracing::warn!(
                "Token secret size should be 32 or 64 bytes but is {} bytes",
                key.len()
            );
        }

        Ok(Self {
            key,
            max_age_secs: 0,
        })
    }

    /// Reject tokens older than `max_age_secs`; 0 disables expiry
    pub fn with_max_age(mut self, max_age_secs: u64) -> Self {
        self.max_age_secs = max_age_secs;
        self
    }

    /// Encode a value into a signed token
    pub fn encode<T: Serialize>(&self, purpose: &str, value: &T) -> Result<String> {
        let json = serde_json::to_vec(value).map_err(|e| Error::signing(e.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let issued = chrono::Utc::now().timestamp();

        let mut body = format!("{}|{}|", issued, payload).into_bytes();
        let mac = self.mac(purpose, &body[..body.len() - 1])?;
        body.extend_from_slice(&mac.finalize().into_bytes());

        Ok(URL_SAFE_NO_PAD.encode(body))
    }

    /// Decode and verify a token
    ///
    /// Fails with [`Error::InvalidToken`] on any tampering, a wrong key or
    /// purpose, an expired token, or a malformed structure.
    pub fn decode<T: DeserializeOwned>(&self, purpose: &str, token: &str) -> Result<T> {
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| Error::invalid_token("malformed encoding"))?;

        if raw.len() < MAC_LEN + 2 {
            return Err(Error::invalid_token("token too short"));
        }
        let (signed, tag) = raw.split_at(raw.len() - MAC_LEN - 1);
        if tag[0] != SEPARATOR {
            return Err(Error::invalid_token("malformed structure"));
        }

        // Authenticate before looking at any of the content
        self.mac(purpose, signed)?
            .verify_slice(&tag[1..])
            .map_err(|_| Error::invalid_token("signature mismatch"))?;

        let mut parts = signed.splitn(2, |b| *b == SEPARATOR);
        let issued = parts
            .next()
            .and_then(|s| std::str::from_utf8(s).ok())
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| Error::invalid_token("malformed timestamp"))?;
        let payload = parts
            .next()
            .ok_or_else(|| Error::invalid_token("missing payload"))?;

        if self.max_age_secs > 0 {
            let age = chrono::Utc::now().timestamp() - issued;
            if age > self.max_age_secs as i64 {
                return Err(Error::invalid_token("token expired"));
            }
        }

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| Error::invalid_token("malformed payload"))?;
        serde_json::from_slice(&json).map_err(|_| Error::invalid_token("malformed payload"))
    }

    fn mac(&self, purpose: &str, signed: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| Error::signing(e.to_string()))?;
        mac.update(purpose.as_bytes());
        mac.update(&[SEPARATOR]);
        mac.update(signed);
        Ok(mac)
    }
}

/// Raw bytes as a base64 string inside JSON
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new([7u8; 32]).unwrap()
    }

    fn sample() -> TokenData {
        TokenData {
            host: "example".to_string(),
            user: "alice".to_string(),
            security: vec![0, 1, 2, 254, 255],
        }
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        let token = codec.encode(UPDATE_TOKEN_PURPOSE, &sample()).unwrap();
        let decoded: TokenData = codec.decode(UPDATE_TOKEN_PURPOSE, &token).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_round_trip_empty_security() {
        let codec = codec();
        let data = TokenData {
            security: Vec::new(),
            ..sample()
        };
        let token = codec.encode(UPDATE_TOKEN_PURPOSE, &data).unwrap();
        let decoded: TokenData = codec.decode(UPDATE_TOKEN_PURPOSE, &token).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_token_is_single_line() {
        let token = codec().encode(UPDATE_TOKEN_PURPOSE, &sample()).unwrap();
        assert!(!token.contains('\n'));
        assert!(!token.contains('|'));
    }

    #[test]
    fn test_any_bit_flip_is_rejected() {
        let codec = codec();
        let token = codec.encode(UPDATE_TOKEN_PURPOSE, &sample()).unwrap();

        for i in 0..token.len() {
            for bit in [0x01u8, 0x02, 0x04, 0x08, 0x10, 0x20] {
                let mut bytes = token.clone().into_bytes();
                bytes[i] ^= bit;
                let mutated = String::from_utf8(bytes).unwrap();
                let result: Result<TokenData> = codec.decode(UPDATE_TOKEN_PURPOSE, &mutated);
                assert!(
                    matches!(result, Err(Error::InvalidToken(_))),
                    "flipping bit {:#x} at {} was accepted",
                    bit,
                    i
                );
            }
        }
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let token = codec().encode(UPDATE_TOKEN_PURPOSE, &sample()).unwrap();
        let other = TokenCodec::new([8u8; 32]).unwrap();
        let result: Result<TokenData> = other.decode(UPDATE_TOKEN_PURPOSE, &token);
        assert!(matches!(result, Err(Error::InvalidToken(_))));
    }

    #[test]
    fn test_wrong_purpose_is_rejected() {
        let codec = codec();
        let token = codec.encode("session", &sample()).unwrap();
        let result: Result<TokenData> = codec.decode(UPDATE_TOKEN_PURPOSE, &token);
        assert!(matches!(result, Err(Error::InvalidToken(_))));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let codec = codec();
        let long = "A".repeat(200);
        for garbage in ["", "abc", "!!!!", "dGVzdA", long.as_str()] {
            let result: Result<TokenData> = codec.decode(UPDATE_TOKEN_PURPOSE, garbage);
            assert!(matches!(result, Err(Error::InvalidToken(_))), "{}", garbage);
        }
    }

    #[test]
    fn test_max_age_rejects_old_tokens() {
        let codec = codec().with_max_age(60);

        // Hand-sign a token issued two minutes ago
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&sample()).unwrap());
        let issued = chrono::Utc::now().timestamp() - 120;
        let mut body = format!("{}|{}|", issued, payload).into_bytes();
        let mac = codec.mac(UPDATE_TOKEN_PURPOSE, &body[..body.len() - 1]).unwrap();
        body.extend_from_slice(&mac.finalize().into_bytes());
        let token = URL_SAFE_NO_PAD.encode(body);

        let result: Result<TokenData> = codec.decode(UPDATE_TOKEN_PURPOSE, &token);
        assert!(matches!(result, Err(Error::InvalidToken(_))));

        // Without expiry the same token is fine
        let result: Result<TokenData> = codec.with_max_age(0).decode(UPDATE_TOKEN_PURPOSE, &token);
        assert_eq!(result.unwrap(), sample());
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        assert!(TokenCodec::new(Vec::new()).is_err());
    }

    #[test]
    fn test_odd_secret_length_is_accepted() {
        let codec = TokenCodec::new(b"short".to_vec()).unwrap();
        let token = codec.encode(UPDATE_TOKEN_PURPOSE, &sample()).unwrap();
        let decoded: TokenData = codec.decode(UPDATE_TOKEN_PURPOSE, &token).unwrap();
        assert_eq!(decoded, sample());
    }
}

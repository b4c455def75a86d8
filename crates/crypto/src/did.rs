//! # DID
//!
//! `did:key` 形式（Ed25519）の識別子。
//! 公開鍵は multicodec `0xed 0x01` を前置し、Base58btc（multibase `z`）で表現する。

use std::fmt;
use std::str::FromStr;

use base58::{FromBase58, ToBase58};
use serde::{Deserialize, Serialize};

use crate::{CryptoError, Ed25519VerifyingKey};

/// Ed25519公開鍵のmulticodecプレフィックス
pub(crate) const ED25519_PUB_PREFIX: [u8; 2] = [0xed, 0x01];

const DID_KEY_PREFIX: &str = "did:key:z";

/// 分散識別子。エージェントとスペースの両方をこの型で表す。
///
/// `did:key` 以外のメソッド（`did:web:` 等）も保持できるが、
/// 公開鍵を取り出せるのは `did:key` のみ。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// 文字列をDIDとしてパースする。
    pub fn parse(s: &str) -> Result<Self, CryptoError> {
        let s = s.trim();
        let mut parts = s.splitn(3, ':');
        let (scheme, method, id) = (parts.next(), parts.next(), parts.next());
        match (scheme, method, id) {
            (Some("did"), Some(method), Some(id)) if !method.is_empty() && !id.is_empty() => {}
            _ => return Err(CryptoError::InvalidDid(format!("not a DID: {s}"))),
        }

        let did = Self(s.to_string());
        if s.starts_with("did:key:") {
            // did:key の場合は鍵部分まで検証しておく
            did.verifying_key()?;
        }
        Ok(did)
    }

    /// Ed25519公開鍵から `did:key` を構築する。
    pub fn from_verifying_key(key: &Ed25519VerifyingKey) -> Self {
        let mut bytes = Vec::with_capacity(34);
        bytes.extend_from_slice(&ED25519_PUB_PREFIX);
        bytes.extend_from_slice(key.as_bytes());
        Self(format!("{DID_KEY_PREFIX}{}", bytes.to_base58()))
    }

    /// `did:key` に埋め込まれたEd25519公開鍵を取り出す。
    pub fn verifying_key(&self) -> Result<Ed25519VerifyingKey, CryptoError> {
        let encoded = self
            .0
            .strip_prefix(DID_KEY_PREFIX)
            .ok_or_else(|| CryptoError::InvalidDid(format!("not a did:key: {}", self.0)))?;

        let bytes = encoded
            .from_base58()
            .map_err(|e| CryptoError::InvalidDid(format!("base58 decode failed: {e:?}")))?;

        let key_bytes: [u8; 32] = bytes
            .strip_prefix(&ED25519_PUB_PREFIX[..])
            .and_then(|rest| rest.try_into().ok())
            .ok_or_else(|| {
                CryptoError::InvalidDid(format!("not an ed25519 did:key: {}", self.0))
            })?;

        Ed25519VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| CryptoError::InvalidDid(format!("invalid ed25519 public key: {e}")))
    }

    /// `did:key` かどうか。
    pub fn is_key(&self) -> bool {
        self.0.starts_with("did:key:")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ed25519SigningKey;

    #[test]
    fn test_did_key_roundtrip() {
        let signing_key = Ed25519SigningKey::generate(&mut rand::rngs::OsRng);
        let verifying_key = signing_key.verifying_key();

        let did = Did::from_verifying_key(&verifying_key);
        assert!(did.as_str().starts_with("did:key:z6Mk"));

        let parsed = Did::parse(did.as_str()).unwrap();
        assert_eq!(parsed.verifying_key().unwrap(), verifying_key);
    }

    #[test]
    fn test_opaque_did_has_no_key() {
        let did = Did::parse("did:web:up.example.org").unwrap();
        assert!(!did.is_key());
        assert!(did.verifying_key().is_err());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(Did::parse("").is_err());
        assert!(Did::parse("did:key").is_err());
        assert!(Did::parse("space-123").is_err());
        assert!(Did::parse("did:key:zNotBase58!!").is_err());
    }
}

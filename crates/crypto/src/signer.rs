//! # エージェント署名鍵
//!
//! Gatewayがストレージネットワークに対して名乗るEd25519アイデンティティ。
//!
//! ## 受け付ける形式
//! - multibase `M`（Base64パディングあり）:
//!   `0x80 0x26 ‖ 秘密鍵(32) ‖ 0xed 0x01 ‖ 公開鍵(32)`
//! - 16進数64文字（32バイトのシード）

use base64::Engine;
use ed25519_dalek::Signer;

use crate::did::{Did, ED25519_PUB_PREFIX};
use crate::{b64, CryptoError, Ed25519Signature, Ed25519SigningKey, Ed25519VerifyingKey};

/// Ed25519秘密鍵のmulticodecプレフィックス（varint 0x1300）
const ED25519_PRIV_PREFIX: [u8; 2] = [0x80, 0x26];

/// タグ付き鍵エンコーディングのバイト長
const TAGGED_KEY_LEN: usize = 2 + 32 + 2 + 32;

/// エージェントの署名鍵。
#[derive(Clone)]
pub struct AgentSigner {
    signing_key: Ed25519SigningKey,
    did: Did,
}

impl AgentSigner {
    /// 秘密鍵からエージェントを構築する。
    pub fn from_signing_key(signing_key: Ed25519SigningKey) -> Self {
        let did = Did::from_verifying_key(&signing_key.verifying_key());
        Self { signing_key, did }
    }

    /// 新しい鍵をランダムに生成する。
    pub fn generate() -> Self {
        Self::from_signing_key(Ed25519SigningKey::generate(&mut rand::rngs::OsRng))
    }

    /// 設定値の秘密鍵文字列をパースする。
    pub fn parse(secret: &str) -> Result<Self, CryptoError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(CryptoError::InvalidKey("empty key".to_string()));
        }

        if let Some(encoded) = secret.strip_prefix('M') {
            return Self::parse_tagged(encoded);
        }

        let bytes = hex::decode(secret).map_err(|e| {
            CryptoError::InvalidKey(format!("expected multibase 'M' or 64 hex chars: {e}"))
        })?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey("hex key must be exactly 32 bytes".to_string())
        })?;
        Ok(Self::from_signing_key(Ed25519SigningKey::from_bytes(&seed)))
    }

    fn parse_tagged(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = b64()
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidKey(format!("base64 decode failed: {e}")))?;

        if bytes.len() != TAGGED_KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {TAGGED_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[..2] != ED25519_PRIV_PREFIX || bytes[34..36] != ED25519_PUB_PREFIX {
            return Err(CryptoError::InvalidKey(
                "not an ed25519 key (unexpected multicodec tag)".to_string(),
            ));
        }

        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes[2..34]);
        let signer = Self::from_signing_key(Ed25519SigningKey::from_bytes(&seed));

        // 埋め込まれた公開鍵と秘密鍵の整合性を確認
        if signer.verifying_key().as_bytes()[..] != bytes[36..] {
            return Err(CryptoError::InvalidKey(
                "embedded public key does not match secret key".to_string(),
            ));
        }
        Ok(signer)
    }

    /// multibase `M` 形式にエンコードする。`parse` の逆変換。
    pub fn encode(&self) -> String {
        let mut bytes = Vec::with_capacity(TAGGED_KEY_LEN);
        bytes.extend_from_slice(&ED25519_PRIV_PREFIX);
        bytes.extend_from_slice(&self.signing_key.to_bytes());
        bytes.extend_from_slice(&ED25519_PUB_PREFIX);
        bytes.extend_from_slice(self.verifying_key().as_bytes());
        format!("M{}", b64().encode(bytes))
    }

    pub fn did(&self) -> &Did {
        &self.did
    }

    pub fn verifying_key(&self) -> Ed25519VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        self.signing_key.sign(message)
    }
}

impl std::fmt::Debug for AgentSigner {
    // 秘密鍵はログに出さない
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSigner").field("did", &self.did).finish()
    }
}

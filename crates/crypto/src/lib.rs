//! # Upload Wall 暗号処理・ケイパビリティ
//!
//! ストレージネットワークへの委任型認可に必要なプリミティブを実装する。
//!
//! ## 構成
//! | モジュール | 内容 |
//! |-----------|------|
//! | `did` | `did:key` 形式の識別子 |
//! | `signer` | エージェントのEd25519署名鍵 |
//! | `ucan` | ケイパビリティ・委任（Delegation）・呼び出し（Invocation） |
//! | `cid` | CIDv1（raw + SHA-256） |
//!
//! ## エンコーディング規則
//! - Base58btc: `did:key` の公開鍵部
//! - Base64: 署名、委任トークン（multibase `m` / `M`）
//! - Base32 (小文字): CID（multibase `b`）

pub mod cid;
pub mod did;
pub mod signer;
pub mod ucan;

use std::time::{SystemTime, UNIX_EPOCH};

use ed25519_dalek::Verifier;
use sha2::{Digest, Sha256};

pub use cid::Cid;
pub use did::Did;
pub use ed25519_dalek::{
    Signature as Ed25519Signature, SigningKey as Ed25519SigningKey,
    VerifyingKey as Ed25519VerifyingKey,
};
pub use signer::AgentSigner;
pub use ucan::{Capability, Delegation, Invocation};

/// 暗号処理のエラー型
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// 署名鍵のパースに失敗
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    /// DIDのパースに失敗
    #[error("invalid DID: {0}")]
    InvalidDid(String),
    /// 委任・呼び出しトークンが不正
    #[error("invalid delegation: {0}")]
    InvalidDelegation(String),
    /// Ed25519署名検証エラー
    #[error("signature verification failed")]
    SignatureVerifyError,
    /// 委任先が自エージェントではない
    #[error("delegation audience {actual} does not match agent {expected}")]
    AudienceMismatch { expected: String, actual: String },
    /// 委任の有効期限切れ
    #[error("delegation expired at {0}")]
    Expired(u64),
    /// CIDのパースに失敗
    #[error("invalid CID: {0}")]
    InvalidCid(String),
}

/// Base64エンジン（Standard, パディングあり）
pub(crate) fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// Base64エンジン（Standard, パディングなし）
pub(crate) fn b64_nopad() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD_NO_PAD
}

/// Ed25519による署名検証。
pub fn ed25519_verify(
    verifying_key: &Ed25519VerifyingKey,
    message: &[u8],
    signature: &Ed25519Signature,
) -> Result<(), CryptoError> {
    verifying_key
        .verify(message, signature)
        .map_err(|_| CryptoError::SignatureVerifyError)
}

/// SHA-256ハッシュ計算。
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// 現在のUNIXタイムスタンプ（秒）。
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

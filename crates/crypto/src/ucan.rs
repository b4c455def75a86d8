//! # ケイパビリティ・委任・呼び出し
//!
//! スペースの鍵がエージェントに権限を委任し（`Delegation`）、
//! エージェントがその権限を行使する（`Invocation`）ための署名付きトークン。
//!
//! ## トークン形式
//! - JSON（フィールド順固定）。署名対象は `s` を除いたペイロードのJSONバイト列。
//! - 文字列表現は multibase `m`（Base64パディングなし）。
//!
//! ## 委任の検証
//! 1. 発行者（`iss`）の `did:key` で署名を検証
//! 2. 委任先（`aud`）が自エージェントであること
//! 3. 有効期限（`exp`）が切れていないこと
//! 4. 全ケイパビリティが同一のスペースを対象とし、発行者がそのスペース自身であること

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::did::Did;
use crate::signer::AgentSigner;
use crate::{b64, b64_nopad, ed25519_verify, CryptoError, Ed25519Signature};

/// ファイル追加のケイパビリティ名
pub const UPLOAD_ADD: &str = "upload/add";

/// ストレージスペースに対する単一の権限。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// 対象リソース（スペースのDID）
    pub with: String,
    /// 許可される操作（`upload/add`, `upload/*`, `*` 等）
    pub can: String,
}

impl Capability {
    pub fn new(with: &Did, can: impl Into<String>) -> Self {
        Self {
            with: with.to_string(),
            can: can.into(),
        }
    }

    /// 操作 `can` がこの権限で許可されるか。
    pub fn allows(&self, can: &str) -> bool {
        if self.can == "*" || self.can == can {
            return true;
        }
        match self.can.strip_suffix("/*") {
            Some(namespace) => can
                .strip_prefix(namespace)
                .is_some_and(|rest| rest.starts_with('/')),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Delegation
// ---------------------------------------------------------------------------

/// 委任の署名対象。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct DelegationPayload {
    iss: Did,
    aud: Did,
    att: Vec<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<u64>,
    /// リプレイ対策のノンス
    nnc: String,
}

/// 署名付きの委任トークン（認可プルーフ）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    #[serde(flatten)]
    payload: DelegationPayload,
    /// Base64エンコードされたEd25519署名
    s: String,
}

impl Delegation {
    /// 委任を発行する。`issuer` の鍵で署名される。
    pub fn issue(
        issuer: &AgentSigner,
        audience: &Did,
        capabilities: Vec<Capability>,
        expiration: Option<u64>,
    ) -> Result<Self, CryptoError> {
        let payload = DelegationPayload {
            iss: issuer.did().clone(),
            aud: audience.clone(),
            att: capabilities,
            exp: expiration,
            nnc: random_nonce(),
        };
        let signature = issuer.sign(&payload_bytes(&payload)?);
        Ok(Self {
            payload,
            s: b64().encode(signature.to_bytes()),
        })
    }

    /// multibase文字列からパースする。署名の検証は行わない。
    pub fn parse(encoded: &str) -> Result<Self, CryptoError> {
        let json = decode_token(encoded)?;
        serde_json::from_slice(&json)
            .map_err(|e| CryptoError::InvalidDelegation(format!("malformed delegation: {e}")))
    }

    /// multibase `m` 文字列にエンコードする。
    pub fn encode(&self) -> String {
        encode_token(self)
    }

    pub fn issuer(&self) -> &Did {
        &self.payload.iss
    }

    pub fn audience(&self) -> &Did {
        &self.payload.aud
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.payload.att
    }

    pub fn expiration(&self) -> Option<u64> {
        self.payload.exp
    }

    /// 発行者の公開鍵で署名を検証する。
    pub fn verify_signature(&self) -> Result<(), CryptoError> {
        verify_token_signature(&self.payload.iss, &payload_bytes(&self.payload)?, &self.s)
    }

    /// 全ケイパビリティが共有する対象スペースのDID。
    pub fn space(&self) -> Result<Did, CryptoError> {
        let first = self
            .payload
            .att
            .first()
            .ok_or_else(|| CryptoError::InvalidDelegation("no capabilities".to_string()))?;

        if self.payload.att.iter().any(|cap| cap.with != first.with) {
            return Err(CryptoError::InvalidDelegation(
                "capabilities target more than one space".to_string(),
            ));
        }
        Did::parse(&first.with)
    }

    /// 操作 `can` が委任されているか。
    pub fn allows(&self, can: &str) -> bool {
        self.payload.att.iter().any(|cap| cap.allows(can))
    }

    /// エージェント `agent` が時刻 `now` にこの委任を行使できるか検証し、
    /// 対象スペースのDIDを返す。
    pub fn validate_for(&self, agent: &Did, now: u64) -> Result<Did, CryptoError> {
        self.verify_signature()?;

        if &self.payload.aud != agent {
            return Err(CryptoError::AudienceMismatch {
                expected: agent.to_string(),
                actual: self.payload.aud.to_string(),
            });
        }

        if let Some(exp) = self.payload.exp {
            if exp <= now {
                return Err(CryptoError::Expired(exp));
            }
        }

        let space = self.space()?;
        if space != self.payload.iss {
            return Err(CryptoError::InvalidDelegation(format!(
                "issuer {} is not the space {space}",
                self.payload.iss
            )));
        }
        Ok(space)
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// 呼び出しの署名対象。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct InvocationPayload {
    iss: Did,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aud: Option<Did>,
    can: String,
    with: Did,
    /// 操作固有の引数
    nb: serde_json::Value,
    /// 根拠となる委任トークン（エンコード済み）
    prf: Vec<String>,
    /// 発行時刻（UNIX秒）
    iat: u64,
    nnc: String,
}

/// 委任された権限を行使する署名付きリクエスト。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    #[serde(flatten)]
    payload: InvocationPayload,
    s: String,
}

impl Invocation {
    /// 呼び出しを構築し、エージェントの鍵で署名する。
    pub fn sign(
        agent: &AgentSigner,
        audience: Option<Did>,
        can: &str,
        with: &Did,
        nb: serde_json::Value,
        proofs: &[Delegation],
    ) -> Result<Self, CryptoError> {
        let payload = InvocationPayload {
            iss: agent.did().clone(),
            aud: audience,
            can: can.to_string(),
            with: with.clone(),
            nb,
            prf: proofs.iter().map(Delegation::encode).collect(),
            iat: crate::now_secs(),
            nnc: random_nonce(),
        };
        let signature = agent.sign(&payload_bytes(&payload)?);
        Ok(Self {
            payload,
            s: b64().encode(signature.to_bytes()),
        })
    }

    pub fn parse(encoded: &str) -> Result<Self, CryptoError> {
        let json = decode_token(encoded)?;
        serde_json::from_slice(&json)
            .map_err(|e| CryptoError::InvalidDelegation(format!("malformed invocation: {e}")))
    }

    pub fn encode(&self) -> String {
        encode_token(self)
    }

    pub fn issuer(&self) -> &Did {
        &self.payload.iss
    }

    pub fn ability(&self) -> &str {
        &self.payload.can
    }

    pub fn resource(&self) -> &Did {
        &self.payload.with
    }

    pub fn arguments(&self) -> &serde_json::Value {
        &self.payload.nb
    }

    /// 添付された委任をパースして返す。
    pub fn proofs(&self) -> Result<Vec<Delegation>, CryptoError> {
        self.payload.prf.iter().map(|p| Delegation::parse(p)).collect()
    }

    pub fn verify_signature(&self) -> Result<(), CryptoError> {
        verify_token_signature(&self.payload.iss, &payload_bytes(&self.payload)?, &self.s)
    }
}

// ---------------------------------------------------------------------------
// 共通処理
// ---------------------------------------------------------------------------

fn payload_bytes<T: Serialize>(payload: &T) -> Result<Vec<u8>, CryptoError> {
    serde_json::to_vec(payload)
        .map_err(|e| CryptoError::InvalidDelegation(format!("serialization failed: {e}")))
}

fn verify_token_signature(issuer: &Did, message: &[u8], s: &str) -> Result<(), CryptoError> {
    let verifying_key = issuer.verifying_key()?;
    let sig_bytes = b64()
        .decode(s)
        .map_err(|_| CryptoError::SignatureVerifyError)?;
    let sig_arr: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| CryptoError::SignatureVerifyError)?;
    ed25519_verify(&verifying_key, message, &Ed25519Signature::from_bytes(&sig_arr))
}

fn encode_token<T: Serialize>(token: &T) -> String {
    // 構造体のシリアライズは失敗しない（マップキーは全て文字列）
    let json = serde_json::to_vec(token).unwrap_or_default();
    format!("m{}", b64_nopad().encode(json))
}

fn decode_token(encoded: &str) -> Result<Vec<u8>, CryptoError> {
    let body = encoded.trim().strip_prefix('m').ok_or_else(|| {
        CryptoError::InvalidDelegation("expected multibase 'm' (base64) token".to_string())
    })?;
    b64_nopad()
        .decode(body)
        .map_err(|e| CryptoError::InvalidDelegation(format!("base64 decode failed: {e}")))
}

fn random_nonce() -> String {
    hex::encode(rand::random::<[u8; 12]>())
}

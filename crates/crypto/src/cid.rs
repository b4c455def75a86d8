//! # CID
//!
//! コンテンツ識別子（CIDv1）。
//!
//! | 要素 | 値 |
//! |------|----|
//! | バージョン | 1 |
//! | コーデック | raw (`0x55`) |
//! | マルチハッシュ | sha2-256 (`0x12`, 32バイト) |
//! | multibase | base32 小文字 (`b`) |
//!
//! 同一のバイト列からは常に同一のCIDが得られる。

use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32_NOPAD;

use crate::{sha256, CryptoError};

const CID_V1: u8 = 0x01;
const RAW_CODEC: u8 = 0x55;
const SHA2_256: u8 = 0x12;
const DIGEST_LEN: u8 = 32;

/// コンテンツ識別子。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cid {
    digest: [u8; 32],
}

impl Cid {
    /// バイト列のCIDを計算する。
    pub fn of(data: &[u8]) -> Self {
        Self {
            digest: sha256(data),
        }
    }

    /// 文字列表現からパースする。
    pub fn parse(s: &str) -> Result<Self, CryptoError> {
        let body = s
            .strip_prefix('b')
            .ok_or_else(|| CryptoError::InvalidCid(format!("expected multibase 'b': {s}")))?;
        // 小文字表記のみ受け付ける
        if body.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(CryptoError::InvalidCid(format!("base32 must be lowercase: {s}")));
        }
        // 末尾の余りビットと最終グループの長さも検証される
        let bytes = BASE32_NOPAD
            .decode(body.to_ascii_uppercase().as_bytes())
            .map_err(|e| CryptoError::InvalidCid(format!("invalid base32 ({e}): {s}")))?;

        match bytes.as_slice() {
            [CID_V1, RAW_CODEC, SHA2_256, DIGEST_LEN, digest @ ..] if digest.len() == 32 => {
                let mut out = [0u8; 32];
                out.copy_from_slice(digest);
                Ok(Self { digest: out })
            }
            _ => Err(CryptoError::InvalidCid(format!(
                "unsupported CID (expected v1 raw sha2-256): {s}"
            ))),
        }
    }

    /// SHA-256ダイジェスト
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    /// バイナリ表現（バージョン ‖ コーデック ‖ マルチハッシュ）
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + 32);
        bytes.extend_from_slice(&[CID_V1, RAW_CODEC, SHA2_256, DIGEST_LEN]);
        bytes.extend_from_slice(&self.digest);
        bytes
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = BASE32_NOPAD.encode(&self.to_bytes());
        write!(f, "b{}", encoded.to_ascii_lowercase())
    }
}

impl FromStr for Cid {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

//! # Gateway設定・共有状態
//!
//! 環境変数（`.env` を含む）からの設定読み込みとGatewayの共有状態の定義。
//!
//! ## 環境変数
//! | 変数 | 必須 | 既定値 |
//! |------|------|--------|
//! | `KEY` | ○ | — |
//! | `PROOF` または `PROOF_PATH` | ○ | — |
//! | `SPACE_DID` | ○ | — |
//! | `PORT` | | `8787` |
//! | `BIND_ADDR` | | `0.0.0.0` |
//! | `UPLOAD_DIR` | | `uploads` |
//! | `MAX_UPLOAD_SIZE` | | 100 MiB |
//! | `STORAGE_BACKEND` | | `http`（`memory` も可） |
//! | `STORAGE_ENDPOINT` | | `http://localhost:8788` |
//!
//! 認証情報は起動時に全て検証し、不備があれば起動を拒否する。

use std::path::PathBuf;
use std::sync::Arc;

use wall_crypto::{AgentSigner, Delegation, Did};

use crate::error::GatewayError;
use crate::session::SessionCell;
use crate::storage::{MemoryStore, StorageBackend};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
/// アップロード最大サイズの既定値: 100MiB
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_STORAGE_ENDPOINT: &str = "http://localhost:8788";

/// ストレージネットワークへの認証情報。
#[derive(Debug, Clone)]
pub struct Credentials {
    /// エージェントの署名鍵（`KEY`）
    pub signer: AgentSigner,
    /// スペースからエージェントへの委任（`PROOF` / `PROOF_PATH`）
    pub proof: Delegation,
    /// アップロード先スペース（`SPACE_DID`）
    pub space: Did,
}

/// Gatewayの起動設定。
#[derive(Debug)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub port: u16,
    /// 一時ファイルの置き場所
    pub upload_dir: PathBuf,
    /// アップロード最大サイズ（バイト）
    pub max_upload_size: u64,
    pub backend: StorageBackend,
    pub credentials: Arc<Credentials>,
}

impl GatewayConfig {
    /// プロセスの環境変数から読み込む。
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のキー参照関数から読み込む。空文字列は未設定として扱う。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GatewayError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let key = get("KEY");
        let proof_inline = get("PROOF");
        let proof_path = get("PROOF_PATH");
        let space = get("SPACE_DID");

        let mut missing = Vec::new();
        if key.is_none() {
            missing.push("KEY");
        }
        if proof_inline.is_none() && proof_path.is_none() {
            missing.push("PROOF (or PROOF_PATH)");
        }
        if space.is_none() {
            missing.push("SPACE_DID");
        }
        let (Some(key), Some(space), true) = (key, space, missing.is_empty()) else {
            return Err(missing_error(&missing));
        };

        // PROOF が設定されていれば PROOF_PATH より優先する
        let proof_text = match (proof_inline, proof_path) {
            (Some(inline), _) => inline,
            (None, Some(path)) => std::fs::read_to_string(&path).map_err(|e| {
                GatewayError::Config(format!("failed to read PROOF_PATH {path}: {e}"))
            })?,
            (None, None) => return Err(missing_error(&missing)),
        };

        let credentials = parse_credentials(&key, &proof_text, &space)?;

        let port = match get("PORT") {
            Some(v) => v
                .trim()
                .parse::<u16>()
                .map_err(|e| GatewayError::Config(format!("invalid PORT {v:?}: {e}")))?,
            None => DEFAULT_PORT,
        };

        let max_upload_size = match get("MAX_UPLOAD_SIZE") {
            Some(v) => v.trim().parse::<u64>().map_err(|e| {
                GatewayError::Config(format!("invalid MAX_UPLOAD_SIZE {v:?}: {e}"))
            })?,
            None => DEFAULT_MAX_UPLOAD_SIZE,
        };

        let backend = match get("STORAGE_BACKEND").as_deref().map(str::trim) {
            None | Some("http") => StorageBackend::Http {
                endpoint: get("STORAGE_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_STORAGE_ENDPOINT.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            },
            Some("memory") => StorageBackend::Memory(Arc::new(MemoryStore::default())),
            Some(other) => {
                return Err(GatewayError::Config(format!(
                    "unknown STORAGE_BACKEND {other:?} (expected \"http\" or \"memory\")"
                )))
            }
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            port,
            upload_dir: PathBuf::from(
                get("UPLOAD_DIR").unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string()),
            ),
            max_upload_size,
            backend,
            credentials: Arc::new(credentials),
        })
    }
}

fn missing_error(missing: &[&str]) -> GatewayError {
    GatewayError::Config(format!("missing {}", missing.join(", ")))
}

/// 鍵・プルーフ・スペースIDをパースし、プルーフがこのエージェントとスペースに
/// 対して有効であることを確認する。
fn parse_credentials(key: &str, proof: &str, space: &str) -> Result<Credentials, GatewayError> {
    let signer = AgentSigner::parse(key)
        .map_err(|e| GatewayError::Config(format!("KEY could not be parsed: {e}")))?;
    let proof = Delegation::parse(proof)
        .map_err(|e| GatewayError::Config(format!("PROOF could not be parsed: {e}")))?;
    let space = Did::parse(space)
        .map_err(|e| GatewayError::Config(format!("SPACE_DID could not be parsed: {e}")))?;

    let granted = proof
        .validate_for(signer.did(), wall_crypto::now_secs())
        .map_err(|e| GatewayError::Config(format!("PROOF is not valid for this agent: {e}")))?;
    if granted != space {
        return Err(GatewayError::Config(format!(
            "PROOF grants access to {granted}, not SPACE_DID {space}"
        )));
    }

    Ok(Credentials {
        signer,
        proof,
        space,
    })
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// ストレージセッション（初回利用時に一度だけ構築）
    pub sessions: SessionCell,
    /// 一時ファイルの置き場所
    pub upload_dir: PathBuf,
    /// アップロード最大サイズ（バイト）
    pub max_upload_size: u64,
    /// GatewayのエージェントDID
    pub agent: Did,
    /// アップロード先スペースのDID
    pub space: Did,
}

impl GatewayState {
    pub fn new(config: &GatewayConfig, sessions: SessionCell) -> Self {
        Self {
            sessions,
            upload_dir: config.upload_dir.clone(),
            max_upload_size: config.max_upload_size,
            agent: config.credentials.signer.did().clone(),
            space: config.credentials.space.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use wall_crypto::Capability;

    use super::*;

    struct Fixture {
        vars: HashMap<&'static str, String>,
        space: AgentSigner,
        agent: AgentSigner,
    }

    fn fixture() -> Fixture {
        let space = AgentSigner::generate();
        let agent = AgentSigner::generate();
        let proof = Delegation::issue(
            &space,
            agent.did(),
            vec![Capability::new(space.did(), "upload/*")],
            None,
        )
        .unwrap();

        let mut vars = HashMap::new();
        vars.insert("KEY", agent.encode());
        vars.insert("PROOF", proof.encode());
        vars.insert("SPACE_DID", space.did().to_string());
        Fixture { vars, space, agent }
    }

    fn load(vars: &HashMap<&'static str, String>) -> Result<GatewayConfig, GatewayError> {
        GatewayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_complete_config_with_defaults() {
        let f = fixture();
        let config = load(&f.vars).unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.upload_dir, PathBuf::from(DEFAULT_UPLOAD_DIR));
        assert_eq!(config.max_upload_size, DEFAULT_MAX_UPLOAD_SIZE);
        assert!(matches!(
            &config.backend,
            StorageBackend::Http { endpoint } if endpoint == DEFAULT_STORAGE_ENDPOINT
        ));
        assert_eq!(config.credentials.space, *f.space.did());
        assert_eq!(config.credentials.signer.did(), f.agent.did());
    }

    /// 必須値が欠けている場合は起動できない
    #[test]
    fn test_missing_values_refuse_to_start() {
        for key in ["KEY", "PROOF", "SPACE_DID"] {
            let mut vars = fixture().vars;
            vars.remove(key);
            let err = load(&vars).unwrap_err();
            assert!(
                matches!(&err, GatewayError::Config(msg) if msg.contains(key)),
                "unexpected error for missing {key}: {err}"
            );
        }

        let err = load(&HashMap::new()).unwrap_err();
        assert_eq!(
            err,
            GatewayError::Config("missing KEY, PROOF (or PROOF_PATH), SPACE_DID".to_string())
        );
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let mut vars = fixture().vars;
        vars.insert("KEY", "   ".to_string());
        assert!(matches!(load(&vars), Err(GatewayError::Config(msg)) if msg.contains("KEY")));
    }

    #[test]
    fn test_proof_from_path() {
        let mut f = fixture();
        let proof = f.vars.remove("PROOF").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proof.ucan");
        std::fs::write(&path, proof).unwrap();
        f.vars.insert("PROOF_PATH", path.display().to_string());

        assert!(load(&f.vars).is_ok());

        f.vars
            .insert("PROOF_PATH", dir.path().join("missing").display().to_string());
        assert!(matches!(load(&f.vars), Err(GatewayError::Config(msg)) if msg.contains("PROOF_PATH")));
    }

    #[test]
    fn test_proof_for_other_space_rejected() {
        let mut vars = fixture().vars;
        let other_space = AgentSigner::generate();
        vars.insert("SPACE_DID", other_space.did().to_string());

        let err = load(&vars).unwrap_err();
        assert!(matches!(err, GatewayError::Config(msg) if msg.contains("not SPACE_DID")));
    }

    #[test]
    fn test_proof_for_other_agent_rejected() {
        let mut vars = fixture().vars;
        vars.insert("KEY", AgentSigner::generate().encode());

        let err = load(&vars).unwrap_err();
        assert!(matches!(err, GatewayError::Config(msg) if msg.contains("not valid for this agent")));
    }

    #[test]
    fn test_malformed_values() {
        let mut vars = fixture().vars;
        vars.insert("PROOF", "garbage".to_string());
        assert!(matches!(load(&vars), Err(GatewayError::Config(msg)) if msg.contains("PROOF")));

        let mut vars = fixture().vars;
        vars.insert("PORT", "eighty".to_string());
        assert!(matches!(load(&vars), Err(GatewayError::Config(msg)) if msg.contains("PORT")));

        let mut vars = fixture().vars;
        vars.insert("STORAGE_BACKEND", "s3".to_string());
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_memory_backend_and_overrides() {
        let mut vars = fixture().vars;
        vars.insert("STORAGE_BACKEND", "memory".to_string());
        vars.insert("PORT", "9000".to_string());
        vars.insert("UPLOAD_DIR", "/tmp/wall".to_string());
        vars.insert("MAX_UPLOAD_SIZE", "1024".to_string());

        let config = load(&vars).unwrap();
        assert!(matches!(config.backend, StorageBackend::Memory(_)));
        assert_eq!(config.port, 9000);
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/wall"));
        assert_eq!(config.max_upload_size, 1024);
    }
}

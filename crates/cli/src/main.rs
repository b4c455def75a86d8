//! # wall-cli
//!
//! Upload Wall のコマンドラインクライアント。
//!
//! - `upload` — ファイルをGatewayへ順にアップロードし、CIDの一覧を表示
//! - `keygen` — エージェント鍵（`KEY`）を生成
//! - `delegate` — スペース鍵からエージェントへの委任（`PROOF`）を発行
//! - `info` — Gatewayのエージェントとスペースを表示

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wall_cli::format::{format_file_size, format_relative_time};
use wall_cli::{
    HttpUploadApi, SelectedFile, UploadController, DEFAULT_API_URL, DEFAULT_TIMEOUT,
};
use wall_crypto::{AgentSigner, Capability, Delegation, Did};

#[derive(Parser, Debug)]
#[command(name = "wall-cli")]
#[command(about = "Upload files through an Upload Wall gateway and manage delegation keys")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload one or more files and print their CIDs
    Upload {
        /// Files to upload, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Gateway base URL
        #[arg(long, default_value = DEFAULT_API_URL)]
        api_url: String,

        /// Request timeout in seconds
        #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
        timeout_secs: u64,
    },

    /// Generate a new agent key for the gateway's KEY setting
    Keygen,

    /// Issue a delegation from a space key to an agent (the gateway's PROOF setting)
    Delegate {
        /// Secret key of the space (multibase or hex)
        #[arg(long)]
        space_key: String,

        /// DID of the agent receiving the capabilities
        #[arg(long)]
        audience: String,

        /// Capabilities to grant
        #[arg(long, default_value = "upload/*")]
        can: Vec<String>,

        /// Lifetime of the delegation in seconds (no expiry when omitted)
        #[arg(long)]
        ttl_secs: Option<u64>,
    },

    /// Show the gateway's agent, target space and session state
    Info {
        /// Gateway base URL
        #[arg(long, default_value = DEFAULT_API_URL)]
        api_url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().command {
        Command::Upload {
            files,
            api_url,
            timeout_secs,
        } => upload(files, &api_url, Duration::from_secs(timeout_secs)).await,
        Command::Keygen => {
            let signer = AgentSigner::generate();
            println!("KEY={}", signer.encode());
            println!("# agent DID: {}", signer.did());
            Ok(())
        }
        Command::Delegate {
            space_key,
            audience,
            can,
            ttl_secs,
        } => delegate(&space_key, &audience, can, ttl_secs),
        Command::Info { api_url } => {
            let api = HttpUploadApi::new(api_url, DEFAULT_TIMEOUT)?;
            let info = api.info().await?;
            println!("agent: {}", info.agent);
            println!("space: {}", info.space);
            println!("ready: {}", info.ready);
            Ok(())
        }
    }
}

async fn upload(files: Vec<PathBuf>, api_url: &str, timeout: Duration) -> anyhow::Result<()> {
    let api = HttpUploadApi::new(api_url, timeout)?;
    tracing::debug!(api_url = %api.base_url(), "Gatewayに接続します");
    let controller = UploadController::new(api);

    let total = files.len();
    let mut failed = 0;
    for path in files {
        let file = match SelectedFile::from_path(&path) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("✗ {e}");
                failed += 1;
                continue;
            }
        };

        // Busy は通知を残さないため、結果そのものを見る
        match controller.upload(file).await {
            Ok(record) => println!("✓ {}: {}", record.filename, record.cid),
            Err(e) => {
                eprintln!("✗ {}: {e}", path.display());
                failed += 1;
            }
        }
    }

    let uploaded = controller.files();
    if !uploaded.is_empty() {
        let now = Utc::now();
        println!();
        println!("Uploaded Files");
        for record in &uploaded {
            println!(
                "  {}  {}  {}  {}",
                record.filename,
                format_file_size(record.size),
                format_relative_time(record.uploaded_at, now),
                record.cid
            );
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} uploads failed");
    }
    Ok(())
}

fn delegate(
    space_key: &str,
    audience: &str,
    can: Vec<String>,
    ttl_secs: Option<u64>,
) -> anyhow::Result<()> {
    let space = AgentSigner::parse(space_key).context("invalid --space-key")?;
    let audience = Did::parse(audience).context("invalid --audience")?;
    let capabilities = can
        .into_iter()
        .map(|ability| Capability::new(space.did(), ability))
        .collect();
    let expiration = ttl_secs.map(|ttl| wall_crypto::now_secs() + ttl);

    let delegation = Delegation::issue(&space, &audience, capabilities, expiration)?;
    println!("SPACE_DID={}", space.did());
    println!("PROOF={}", delegation.encode());
    Ok(())
}

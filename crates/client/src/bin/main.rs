//! Headless signing client entrypoint: loads a local key file and a
//! `multisig://` connection URI, then signs automatically. Not an
//! interactive signer UI — that surface is explicitly out of scope.

use std::path::PathBuf;

use clap::Parser;
use ed25519_dalek::SigningKey;
use multisig_client::policy::AlwaysApprove;
use multisig_client::SigningClient;
use multisig_wire::SessionCredential;

#[derive(Parser, Debug)]
#[command(name = "multisig-client")]
struct Args {
    /// `multisig://<host>:<port>?s=<session_id>&p=<token>` connection URI.
    #[arg(long)]
    uri: String,

    /// Path to a file containing a 64-character hex Ed25519 signing key.
    #[arg(long)]
    key_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let credential = SessionCredential::from_uri(&args.uri)?;
    let host_and_port = args
        .uri
        .strip_prefix("multisig://")
        .and_then(|rest| rest.split_once('?'))
        .map(|(host_port, _)| host_port)
        .ok_or_else(|| anyhow::anyhow!("malformed multisig:// uri"))?;

    let key_hex = std::fs::read_to_string(&args.key_file)?;
    let key_bytes: [u8; 32] = hex::decode(key_hex.trim())?
        .try_into()
        .map_err(|_| anyhow::anyhow!("key file must contain a 32-byte Ed25519 key"))?;
    let signing_key = SigningKey::from_bytes(&key_bytes);

    let mut client = SigningClient::new(signing_key, AlwaysApprove);
    client
        .run(&format!("ws://{host_and_port}/ws"), &credential)
        .await?;

    Ok(())
}

//! Nostr signer daemon binary.
//!
//! Owns the identity store and serves signing requests over a Unix socket.
//! The other subcommands manage the stored identity offline.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use nostr_keystore::{
    grant_origin, provision, revoke_origin, BlobIdentityStore, FileBlobStore, IdentityStore,
};
use nostr_remote_signer::{ServerConfig, SignerServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Remote signing daemon for Nostr identities.
#[derive(Parser, Debug)]
#[command(name = "nostr-signer-daemon")]
#[command(about = "Origin-gated remote signer for Nostr keys")]
#[command(version)]
struct Args {
    /// Directory holding the identity record
    #[arg(long, env = "NOSTR_SIGNER_STORE", default_value = "/var/lib/nostr-signer")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve signing requests
    Serve {
        /// Path to Unix socket for client connections
        #[arg(long, env = "NOSTR_SIGNER_SOCKET", default_value = "/var/run/nostr-signer.sock")]
        socket: PathBuf,
    },
    /// Generate a new identity and print its credentials
    Provision {
        /// Replace an existing identity
        #[arg(long)]
        force: bool,
    },
    /// Allow an origin to use the identity
    Allow { origin: String },
    /// Withdraw an origin
    Revoke { origin: String },
    /// Print the public key and allowed origins
    Show,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("Identity store: {:?}", args.store);

    let store: Arc<dyn IdentityStore> =
        Arc::new(BlobIdentityStore::new(FileBlobStore::new(&args.store)));

    if let Err(e) = run(args.command, store).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command, store: Arc<dyn IdentityStore>) -> Result<(), String> {
    match command {
        Command::Serve { socket } => {
            info!("Starting nostr-signer-daemon");
            info!("Socket path: {:?}", socket);

            match store.load() {
                Ok(Some(identity)) => info!(
                    "Serving identity {} for {} origin(s)",
                    identity.public_key().to_hex(),
                    identity.allowed_origins().len()
                ),
                Ok(None) => info!("No identity provisioned yet; requests will be refused"),
                Err(e) => return Err(format!("Failed to load identity: {}", e)),
            }

            let server = SignerServer::new(ServerConfig {
                socket_path: socket,
                store,
            })
            .map_err(|e| format!("Failed to create server: {}", e))?;

            info!("Signer daemon ready, waiting for connections...");
            server
                .run()
                .await
                .map_err(|e| format!("Server error: {}", e))
        }
        Command::Provision { force } => {
            let existing = store
                .load()
                .map_err(|e| format!("Failed to load identity: {}", e))?;
            if existing.is_some() && !force {
                return Err("An identity already exists; pass --force to replace it".to_string());
            }

            let credentials =
                provision(store.as_ref()).map_err(|e| format!("Failed to provision: {}", e))?;
            println!("npub: {}", credentials.npub);
            println!("nsec: {}", credentials.nsec);
            Ok(())
        }
        Command::Allow { origin } => {
            let added = grant_origin(store.as_ref(), &origin)
                .map_err(|e| format!("Failed to allow {}: {}", origin, e))?;
            if !added {
                info!("Origin {} was already allowed", origin);
            }
            Ok(())
        }
        Command::Revoke { origin } => {
            revoke_origin(store.as_ref(), &origin)
                .map_err(|e| format!("Failed to revoke {}: {}", origin, e))?;
            Ok(())
        }
        Command::Show => {
            let identity = store
                .load()
                .map_err(|e| format!("Failed to load identity: {}", e))?
                .ok_or_else(|| "No identity found".to_string())?;
            let credentials = identity
                .credentials()
                .map_err(|e| format!("Failed to encode identity: {}", e))?;

            println!("npub: {}", credentials.npub);
            println!("pubkey: {}", identity.public_key().to_hex());
            for origin in identity.allowed_origins() {
                println!("allowed: {}", origin);
            }
            Ok(())
        }
    }
}

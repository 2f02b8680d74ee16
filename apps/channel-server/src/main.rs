//! Ephemeral Channel Server
//!
//! HTTP reference server for the secure channel: hands out the shared
//! secret through RSA-sealed handshakes and answers secure requests.

mod server;

use std::net::SocketAddr;

use channel_crypto::{ChannelResponder, KeyPair, RSA_KEY_BITS};
use channel_protocol::PublicKeyFormat;
use clap::Parser;
use tracing::info;

use crate::server::{AppState, router};

/// Command line options
#[derive(Parser)]
#[command(name = "channel-server", version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "CHANNEL_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Format of the server public key header (xml or spki-der)
    #[arg(long, env = "CHANNEL_KEY_FORMAT", default_value_t = PublicKeyFormat::Xml)]
    key_format: PublicKeyFormat,

    /// RSA modulus size of the server key pair
    #[arg(long, env = "CHANNEL_KEY_BITS", default_value_t = RSA_KEY_BITS)]
    key_bits: usize,

    /// Shared secret handed out by handshakes (random when unset)
    #[arg(long, env = "CHANNEL_SECRET", hide_env_values = true)]
    secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("channel_server=debug".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    info!("Starting channel server");

    let secret = args.secret.unwrap_or_else(ChannelResponder::generate_secret);
    let keypair = KeyPair::generate_with_bits(args.key_bits)?;
    let responder = ChannelResponder::with_keypair(keypair, secret, args.key_format)?;
    info!(
        key_bits = args.key_bits,
        key_format = %args.key_format,
        "Server key pair ready"
    );

    let app = router(AppState::new(responder));

    info!("Listening on {}", args.bind);

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Serves the authorization and quota endpoints from a TOML configuration file.
//!
//! ```sh
//! RUST_LOG=oauth2_linker=debug cargo run --example serve --features tracing -- linker.toml
//! ```

// std
use std::sync::Arc;
// crates.io
use color_eyre::{Result, eyre::eyre};
use tracing_subscriber::EnvFilter;
// self
use oauth2_linker::{config::LinkerConfig, server, session::MemorySessionAuthority};

const BIND_ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	let path = std::env::args().nth(1).ok_or_else(|| eyre!("usage: serve <config.toml>"))?;
	let config = LinkerConfig::load(&path)?;
	let linker = config.build_in_memory_linker(Arc::new(MemorySessionAuthority::default()))?;
	let providers = linker.providers().map(|provider| provider.as_str()).collect::<Vec<_>>();

	tracing::info!(?providers, public_url = %config.public_url, "linker configured");

	let listener = tokio::net::TcpListener::bind(BIND_ADDR).await?;

	tracing::info!(addr = BIND_ADDR, "listening");
	server::serve(listener, config.server_state(linker)).await?;

	Ok(())
}

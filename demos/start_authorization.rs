//! Walks through starting a custom-flow authorization, replaying a forged callback, and linking a
//! credential to an already active session without touching that session.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use url::Url;
// self
use oauth2_linker::{
	auth::{Identity, ProviderId, StateScope, TokenSet},
	csrf::{MemoryStateStore, StateStore},
	http::ReqwestHttpClient,
	link::{LinkOutcome, Linker},
	provider::{
		AuthorizationGrant, CallbackParams, ClientCredentials, CustomAdapter, ProviderDescriptor,
	},
	quota::{MemoryLedger, QuotaPolicy},
	session::{MemorySessionAuthority, RequestContext, SessionAuthority},
	store::MemoryVault,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let states: Arc<dyn StateStore> = Arc::new(MemoryStateStore::default());
	let sessions = Arc::new(MemorySessionAuthority::default());
	let descriptor = ProviderDescriptor::preset(ProviderId::TikTok).build()?;
	let adapter = CustomAdapter::new(
		descriptor,
		ClientCredentials::new("demo-client-key", "demo-secret"),
		states.clone(),
		ReqwestHttpClient::new()?,
	);
	let linker = Linker::new(
		Arc::new(MemoryVault::default()),
		Arc::new(MemoryLedger::default()),
		QuotaPolicy::default(),
		states,
		sessions.clone(),
	)
	.with_adapter(Arc::new(adapter));
	let scope = StateScope::for_client(ProviderId::TikTok, "browser-123")?;
	let redirect = Url::parse("https://app.example.com/auth/tiktok/callback")?;
	let start = linker.begin(ProviderId::TikTok, &scope, &redirect).await?;

	println!("Send your user to {}.", start.authorization_url);
	println!("State expires in {} seconds.", start.state_ttl.whole_seconds());

	// A forged callback is rejected before any token exchange happens.
	let forged = CallbackParams::success("stolen-code", "wrong");

	match linker
		.complete(ProviderId::TikTok, &scope, &forged, &redirect, &RequestContext::anonymous())
		.await
	{
		Ok(_) => eprintln!("Forged state was accepted."),
		Err(e) => println!("Forged callback rejected with `{}`.", e.message_code()),
	}

	// Linking while signed in keeps the session identity.
	let active = Identity::new("owner@example.com")?;
	let session = sessions.issue_session(&active).await?;
	let ctx = RequestContext::with_session_token(session.expose());
	let grant = AuthorizationGrant {
		provider: ProviderId::TikTok,
		identity_hint: Some(Identity::new("someone-else@example.com")?),
		subject: Some("open-id-1".into()),
		tokens: TokenSet::builder().access_token("act.demo").build()?,
	};

	if let LinkOutcome::PreserveSession { identity, provider } = linker.link(grant, &ctx).await? {
		println!("Linked {provider} to {identity}; the active session was preserved.");
	}

	Ok(())
}

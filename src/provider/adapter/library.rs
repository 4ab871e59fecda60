//! Library-mediated adapter: the `oauth2` crate performs the code exchange.
//!
//! The adapter keeps its own short-lived handshake table (state → client binding and PKCE
//! verifier). Handshakes are single use and expire after the state TTL, mirroring what the
//! session cookie of an auth library provides.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::StateScope,
	csrf::{self, STATE_TTL},
	http::ReqwestHttpClient,
	oauth::BasicFacade,
	provider::{
		AdapterFuture, AuthorizationGrant, AuthorizationStart, CallbackParams, ClientCredentials,
		DefaultProviderStrategy, ProviderAdapter, ProviderDescriptor, ProviderStrategy,
		adapter::{self, authorization_url},
	},
};

const PKCE_VERIFIER_LEN: usize = 64;

#[derive(Clone)]
struct Handshake {
	scope: StateScope,
	pkce_verifier: Option<String>,
	created_at: OffsetDateTime,
}

/// Adapter for providers supported by the `oauth2` crate.
#[derive(Clone)]
pub struct LibraryAdapter {
	descriptor: ProviderDescriptor,
	credentials: ClientCredentials,
	http_client: ReqwestHttpClient,
	strategy: Arc<dyn ProviderStrategy>,
	handshakes: Arc<Mutex<HashMap<String, Handshake>>>,
	state_ttl: Duration,
}
impl LibraryAdapter {
	/// Creates an adapter using the default error-classification strategy.
	pub fn new(
		descriptor: ProviderDescriptor,
		credentials: ClientCredentials,
		http_client: ReqwestHttpClient,
	) -> Self {
		Self {
			descriptor,
			credentials,
			http_client,
			strategy: Arc::new(DefaultProviderStrategy),
			handshakes: Default::default(),
			state_ttl: STATE_TTL,
		}
	}

	/// Overrides the error-classification strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Overrides how long a handshake stays valid.
	pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
		self.state_ttl = ttl;

		self
	}

	/// Number of handshakes awaiting a callback.
	pub fn pending_handshakes(&self) -> usize {
		self.handshakes.lock().len()
	}

	fn take_handshake(&self, scope: &StateScope, state: &str) -> Result<Handshake> {
		let mut handshakes = self.handshakes.lock();

		self.prune_expired(&mut handshakes, OffsetDateTime::now_utc());

		match handshakes.remove(state) {
			Some(handshake) if &handshake.scope == scope => Ok(handshake),
			Some(handshake) => {
				// A different client presented the state; keep it for its owner.
				handshakes.insert(state.to_owned(), handshake);

				Err(Error::InvalidState)
			},
			None => Err(Error::InvalidState),
		}
	}

	fn prune_expired(&self, handshakes: &mut HashMap<String, Handshake>, now: OffsetDateTime) {
		handshakes.retain(|_, handshake| now < handshake.created_at + self.state_ttl);
	}

	async fn fetch_profile(&self, access_token: &str) -> Result<Option<serde_json::Value>> {
		let Some(userinfo) = self.descriptor.endpoints.userinfo.as_ref() else {
			return Ok(None);
		};

		Ok(Some(self.http_client.get_bearer_json(userinfo, access_token).await?))
	}
}
impl ProviderAdapter for LibraryAdapter {
	fn descriptor(&self) -> &ProviderDescriptor {
		&self.descriptor
	}

	fn begin<'a>(
		&'a self,
		scope: &'a StateScope,
		redirect_uri: &'a Url,
	) -> AdapterFuture<'a, AuthorizationStart> {
		Box::pin(async move {
			let state = csrf::mint_token();
			let (verifier, challenge) = if self.descriptor.quirks.pkce_required {
				let verifier = random_verifier();
				let challenge = compute_pkce_challenge(&verifier);

				(Some(verifier), Some(challenge))
			} else {
				(None, None)
			};
			let url = authorization_url(
				&self.descriptor,
				&self.credentials.client_id,
				redirect_uri,
				&state,
				challenge.as_deref(),
			);

			let now = OffsetDateTime::now_utc();
			let mut handshakes = self.handshakes.lock();

			self.prune_expired(&mut handshakes, now);
			handshakes.insert(
				state.clone(),
				Handshake { scope: scope.clone(), pkce_verifier: verifier, created_at: now },
			);
			drop(handshakes);

			Ok(AuthorizationStart {
				provider: self.descriptor.id,
				authorization_url: url,
				state,
				state_ttl: self.state_ttl,
			})
		})
	}

	fn complete<'a>(
		&'a self,
		scope: &'a StateScope,
		params: &'a CallbackParams,
		redirect_uri: &'a Url,
	) -> AdapterFuture<'a, AuthorizationGrant> {
		Box::pin(async move {
			params.check_provider_error()?;

			let handshake = self.take_handshake(scope, params.require_state()?)?;
			let code = params.require_code()?;
			let facade = <BasicFacade<ReqwestHttpClient>>::from_descriptor(
				&self.descriptor,
				&self.credentials,
				Arc::new(self.http_client.clone()),
			)?;
			let tokens = facade
				.exchange_authorization_code(
					self.strategy.as_ref(),
					code,
					handshake.pkce_verifier.as_deref(),
					redirect_uri,
				)
				.await?;
			let profile = self.fetch_profile(tokens.access_token.expose()).await?;

			Ok(AuthorizationGrant {
				provider: self.descriptor.id,
				identity_hint: profile.as_ref().and_then(adapter::extract_email),
				subject: profile.as_ref().and_then(adapter::extract_subject),
				tokens,
			})
		})
	}
}
impl Debug for LibraryAdapter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LibraryAdapter")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.credentials.client_id)
			.field("pending_handshakes", &self.pending_handshakes())
			.finish()
	}
}

fn random_verifier() -> String {
	rand::rng().sample_iter(Alphanumeric).take(PKCE_VERIFIER_LEN).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(hasher.finalize())
}

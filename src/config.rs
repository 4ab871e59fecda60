//! TOML configuration for a complete linker deployment.
//!
//! ```toml
//! public_url = "https://app.example.com"
//! default_return_path = "/dashboard/settings"
//! state_ttl_secs = 600
//! vault_path = "var/linked_credentials.json"
//!
//! [providers.google]
//! client_id = "..."
//! client_secret = "..."
//!
//! [providers.tiktok]
//! client_id = "..."
//! client_secret = "..."
//! scopes = ["user.info.basic"]
//!
//! [quota.twitter.pro]
//! searches = 10
//! tweets = 100
//! ```
//!
//! Providers start from their built-in presets; any endpoint, scope list, or extra authorize
//! parameter in the file overrides the preset. The flow style and role are fixed per provider.

// std
use std::path::{Path, PathBuf};
// self
use crate::{
	_prelude::*,
	auth::ProviderId,
	csrf::{MemoryStateStore, STATE_TTL, StateStore},
	error::ConfigError,
	http::ReqwestHttpClient,
	link::Linker,
	provider::{
		ClientCredentials, CustomAdapter, LibraryAdapter, ProviderAdapter, ProviderDescriptor,
	},
	quota::{MemoryLedger, QuotaLedger, QuotaPolicy},
	server::{CookiePolicy, DEFAULT_RETURN_PATH, ServerState},
	session::SessionAuthority,
	store::{FileVault, MemoryVault, TokenVault},
};

/// Top-level configuration document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkerConfig {
	/// Externally visible origin; callback URLs are derived from it.
	pub public_url: Url,
	/// Where browsers land when `returnTo` is missing or unsafe.
	#[serde(default = "default_return_path")]
	pub default_return_path: String,
	/// Lifetime of pending authorization states, in seconds.
	#[serde(default = "default_state_ttl_secs")]
	pub state_ttl_secs: u64,
	/// Optional JSON snapshot file for the Token Vault; in-memory when absent.
	#[serde(default)]
	pub vault_path: Option<PathBuf>,
	/// Registered providers.
	#[serde(default)]
	pub providers: BTreeMap<ProviderId, ProviderConfig>,
	/// Daily quota limits; the built-in defaults apply when omitted.
	#[serde(default)]
	pub quota: QuotaPolicy,
}
impl LinkerConfig {
	/// Minimal configuration without providers.
	pub fn new(public_url: Url) -> Self {
		Self {
			public_url,
			default_return_path: default_return_path(),
			state_ttl_secs: default_state_ttl_secs(),
			vault_path: None,
			providers: BTreeMap::new(),
			quota: QuotaPolicy::default(),
		}
	}

	/// Reads and parses a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let raw = std::fs::read_to_string(path)
			.map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;

		raw.parse()
	}

	/// Registers `provider` with the given client registration.
	pub fn with_provider(mut self, provider: ProviderId, config: ProviderConfig) -> Self {
		self.providers.insert(provider, config);

		self
	}

	/// Replaces the quota policy.
	pub fn with_quota(mut self, quota: QuotaPolicy) -> Self {
		self.quota = quota;

		self
	}

	/// Pending-state lifetime.
	pub fn state_ttl(&self) -> Duration {
		i64::try_from(self.state_ttl_secs)
			.ok()
			.filter(|secs| *secs > 0)
			.map(Duration::seconds)
			.unwrap_or(STATE_TTL)
	}

	/// Builds the validated descriptor for a configured provider.
	pub fn descriptor(&self, provider: ProviderId) -> Result<ProviderDescriptor> {
		let config = self
			.providers
			.get(&provider)
			.ok_or_else(|| Error::UnsupportedProvider { provider: provider.to_string() })?;

		Ok(config.descriptor(provider)?)
	}

	/// Builds the Token Vault selected by `vault_path`.
	pub fn vault(&self) -> Result<Arc<dyn TokenVault>> {
		Ok(match self.vault_path.as_ref() {
			Some(path) => Arc::new(FileVault::open(path)?),
			None => Arc::new(MemoryVault::default()),
		})
	}

	/// Wires a [`Linker`] with one adapter per configured provider.
	pub fn build_linker(
		&self,
		vault: Arc<dyn TokenVault>,
		ledger: Arc<dyn QuotaLedger>,
		states: Arc<dyn StateStore>,
		sessions: Arc<dyn SessionAuthority>,
		http_client: ReqwestHttpClient,
	) -> Result<Linker> {
		let mut linker = Linker::new(vault, ledger, self.quota.clone(), states.clone(), sessions);

		for (provider, config) in &self.providers {
			let descriptor = config.descriptor(*provider)?;
			let credentials = config.credentials();
			let adapter: Arc<dyn ProviderAdapter> = if descriptor.is_custom_flow() {
				Arc::new(CustomAdapter::new(
					descriptor,
					credentials,
					states.clone(),
					http_client.clone(),
				))
			} else {
				Arc::new(
					LibraryAdapter::new(descriptor, credentials, http_client.clone())
						.with_state_ttl(self.state_ttl()),
				)
			};

			linker = linker.with_adapter(adapter);
		}

		Ok(linker)
	}

	/// Wires a [`Linker`] over the configured vault and in-memory ledger and state store.
	pub fn build_in_memory_linker(&self, sessions: Arc<dyn SessionAuthority>) -> Result<Linker> {
		self.build_linker(
			self.vault()?,
			Arc::new(MemoryLedger::default()),
			Arc::new(MemoryStateStore::with_ttl(self.state_ttl())),
			sessions,
			ReqwestHttpClient::new()?,
		)
	}

	/// Router state for `linker`; cookies are marked `Secure` behind an HTTPS origin.
	pub fn server_state(&self, linker: Linker) -> ServerState {
		ServerState::new(linker, self.public_url.clone())
			.with_default_return_path(self.default_return_path.clone())
			.with_cookie_policy(CookiePolicy {
				secure: self.public_url.scheme() == "https",
				flow_ttl: self.state_ttl(),
			})
	}
}
impl FromStr for LinkerConfig {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(toml::from_str(s)?)
	}
}

/// Client registration and preset overrides for one provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
	/// Client identifier (`client_key` on TikTok).
	pub client_id: String,
	/// Client secret.
	pub client_secret: String,
	/// Overrides the preset authorization endpoint.
	#[serde(default)]
	pub authorization_endpoint: Option<Url>,
	/// Overrides the preset token endpoint.
	#[serde(default)]
	pub token_endpoint: Option<Url>,
	/// Overrides the preset profile endpoint.
	#[serde(default)]
	pub userinfo_endpoint: Option<Url>,
	/// Replaces the preset scopes.
	#[serde(default)]
	pub scopes: Option<Vec<String>>,
	/// Added to (or replacing) the preset extra authorize parameters.
	#[serde(default)]
	pub extra_authorize_params: BTreeMap<String, String>,
}
impl ProviderConfig {
	/// Registration without overrides.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: client_secret.into(),
			authorization_endpoint: None,
			token_endpoint: None,
			userinfo_endpoint: None,
			scopes: None,
			extra_authorize_params: BTreeMap::new(),
		}
	}

	/// Client registration as adapter credentials.
	pub fn credentials(&self) -> ClientCredentials {
		ClientCredentials::new(self.client_id.clone(), self.client_secret.clone())
	}

	/// Applies the overrides to the provider preset and validates the result.
	pub fn descriptor(&self, provider: ProviderId) -> Result<ProviderDescriptor, ConfigError> {
		let mut builder = ProviderDescriptor::preset(provider);

		if let Some(url) = self.authorization_endpoint.clone() {
			builder = builder.authorization_endpoint(url);
		}
		if let Some(url) = self.token_endpoint.clone() {
			builder = builder.token_endpoint(url);
		}
		if let Some(url) = self.userinfo_endpoint.clone() {
			builder = builder.userinfo_endpoint(url);
		}
		if let Some(scopes) = self.scopes.clone() {
			builder = builder.scopes(scopes);
		}
		for (key, value) in &self.extra_authorize_params {
			builder = builder.extra_authorize_param(key.clone(), value.clone());
		}

		Ok(builder.build()?)
	}
}
impl Debug for ProviderConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProviderConfig")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("authorization_endpoint", &self.authorization_endpoint)
			.field("token_endpoint", &self.token_endpoint)
			.field("userinfo_endpoint", &self.userinfo_endpoint)
			.field("scopes", &self.scopes)
			.field("extra_authorize_params", &self.extra_authorize_params)
			.finish()
	}
}

fn default_return_path() -> String {
	DEFAULT_RETURN_PATH.into()
}

fn default_state_ttl_secs() -> u64 {
	STATE_TTL.whole_seconds().unsigned_abs()
}

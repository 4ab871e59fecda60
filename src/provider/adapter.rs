//! Provider adapters: one contract over library-mediated and hand-rolled authorization flows.
//!
//! Both adapter kinds validate callbacks in the same order: a provider-sent `error` parameter
//! short-circuits, then the `state` is checked (and consumed), then the `code` must be present.
//! Only after all three checks does any network exchange happen.

mod custom;
mod library;

pub use custom::CustomAdapter;
pub use library::LibraryAdapter;

// self
use crate::{
	_prelude::*,
	auth::{Identity, ProviderId, StateScope, TokenSecret, TokenSet},
	provider::ProviderDescriptor,
};

/// Boxed future returned by [`ProviderAdapter`] calls.
pub type AdapterFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

const EMAIL_POINTERS: [&str; 3] = ["/email", "/data/user/email", "/data/email"];
const SUBJECT_POINTERS: [&str; 4] = ["/sub", "/id", "/data/id", "/data/user/open_id"];

/// OAuth client registration for one provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientCredentials {
	/// Client identifier (`client_key` on some platforms).
	pub client_id: String,
	/// Client secret; redacted in debug output.
	pub client_secret: TokenSecret,
}
impl ClientCredentials {
	/// Creates a credential pair.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
		Self { client_id: client_id.into(), client_secret: TokenSecret::new(client_secret) }
	}
}

/// Query parameters delivered to the callback endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackParams {
	/// Authorization code.
	pub code: Option<String>,
	/// Echoed state token.
	pub state: Option<String>,
	/// Provider-sent OAuth error code.
	pub error: Option<String>,
	/// Provider-sent error description; logged nowhere and never forwarded.
	pub error_description: Option<String>,
}
impl CallbackParams {
	/// Successful callback carrying `code` and `state`.
	pub fn success(code: impl Into<String>, state: impl Into<String>) -> Self {
		Self { code: Some(code.into()), state: Some(state.into()), ..Default::default() }
	}

	/// Fails with [`Error::ProviderDenied`] when the provider reported an error.
	pub fn check_provider_error(&self) -> Result<()> {
		match self.error.as_deref().filter(|code| !code.is_empty()) {
			Some(code) => Err(Error::ProviderDenied { code: code.to_owned() }),
			None => Ok(()),
		}
	}

	/// Returns the non-empty state parameter or fails with [`Error::InvalidState`].
	pub fn require_state(&self) -> Result<&str> {
		self.state.as_deref().filter(|state| !state.is_empty()).ok_or(Error::InvalidState)
	}

	/// Returns the non-empty code parameter or fails with [`Error::MissingCode`].
	pub fn require_code(&self) -> Result<&str> {
		self.code.as_deref().filter(|code| !code.is_empty()).ok_or(Error::MissingCode)
	}
}

/// Result of [`ProviderAdapter::begin`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationStart {
	/// Provider being authorized.
	pub provider: ProviderId,
	/// URL the browser must be redirected to.
	pub authorization_url: Url,
	/// State embedded in the URL.
	pub state: String,
	/// How long the state remains valid.
	pub state_ttl: Duration,
}

/// Normalized output of a completed authorization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationGrant {
	/// Provider that issued the tokens.
	pub provider: ProviderId,
	/// E-mail disclosed by the provider, when any.
	pub identity_hint: Option<Identity>,
	/// Provider-side account identifier, when disclosed.
	pub subject: Option<String>,
	/// Normalized tokens.
	pub tokens: TokenSet,
}

/// Authorization contract shared by every provider.
pub trait ProviderAdapter
where
	Self: Send + Sync,
{
	/// Descriptor the adapter was built from.
	fn descriptor(&self) -> &ProviderDescriptor;

	/// Provider handled by the adapter.
	fn provider(&self) -> ProviderId {
		self.descriptor().id
	}

	/// Starts an authorization for the client bound to `scope`; `redirect_uri` is the callback
	/// URL registered with the provider.
	fn begin<'a>(
		&'a self,
		scope: &'a StateScope,
		redirect_uri: &'a Url,
	) -> AdapterFuture<'a, AuthorizationStart>;

	/// Validates the callback for `scope` and exchanges the code.
	fn complete<'a>(
		&'a self,
		scope: &'a StateScope,
		params: &'a CallbackParams,
		redirect_uri: &'a Url,
	) -> AdapterFuture<'a, AuthorizationGrant>;
}

/// Builds the provider authorization URL for the given state (and optional PKCE challenge).
pub(crate) fn authorization_url(
	descriptor: &ProviderDescriptor,
	client_id: &str,
	redirect_uri: &Url,
	state: &str,
	pkce_challenge: Option<&str>,
) -> Url {
	let mut url = descriptor.endpoints.authorization.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair(&descriptor.quirks.client_id_param, client_id);
	pairs.append_pair("response_type", "code");
	pairs.append_pair("redirect_uri", redirect_uri.as_str());

	if let Some(scope_value) = descriptor.scope_param() {
		pairs.append_pair("scope", &scope_value);
	}

	pairs.append_pair("state", state);

	if let Some(challenge) = pkce_challenge {
		pairs.append_pair("code_challenge", challenge);
		pairs.append_pair("code_challenge_method", "S256");
	}
	for (key, value) in &descriptor.extra_authorize_params {
		pairs.append_pair(key, value);
	}

	drop(pairs);

	url
}

/// Looks up the disclosed e-mail in a profile payload, ignoring addresses flagged unverified.
pub(crate) fn extract_email(profile: &serde_json::Value) -> Option<Identity> {
	if profile.pointer("/email_verified").and_then(serde_json::Value::as_bool) == Some(false) {
		return None;
	}

	EMAIL_POINTERS
		.iter()
		.filter_map(|pointer| profile.pointer(pointer).and_then(serde_json::Value::as_str))
		.find_map(|raw| Identity::new(raw).ok())
}

/// Looks up the provider-side account identifier in a profile payload.
pub(crate) fn extract_subject(profile: &serde_json::Value) -> Option<String> {
	SUBJECT_POINTERS.iter().find_map(|pointer| match profile.pointer(pointer)? {
		serde_json::Value::String(value) if !value.is_empty() => Some(value.clone()),
		serde_json::Value::Number(value) => Some(value.to_string()),
		_ => None,
	})
}

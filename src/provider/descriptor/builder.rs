// std
use std::iter::IntoIterator;
// self
use crate::{
	_prelude::*,
	auth::ProviderId,
	provider::{ClientAuthMethod, ProviderDescriptor, ProviderEndpoints, ProviderQuirks},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ProviderDescriptorError {
	/// Authorization endpoint is required.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is required.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Reject scope delimiters that are control characters.
	#[error("Scope delimiter must be a printable character.")]
	InvalidScopeDelimiter {
		/// Invalid delimiter that was supplied.
		delimiter: char,
	},
	/// The client identifier parameter name cannot be blank.
	#[error("Client identifier parameter name cannot be empty.")]
	EmptyClientIdParam,
	/// The hand-rolled flow authenticates with the state token and client secret only.
	#[error("The `pkce_required` flag is not supported for custom-flow providers.")]
	PkceRequiredForCustomFlow,
}

/// Builder for [`ProviderDescriptor`] values.
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
	/// Identifier for the descriptor being constructed.
	pub id: ProviderId,
	/// Authorization endpoint.
	pub authorization_endpoint: Option<Url>,
	/// Token endpoint used for the code exchange.
	pub token_endpoint: Option<Url>,
	/// Optional profile endpoint.
	pub userinfo_endpoint: Option<Url>,
	/// Requested scopes.
	pub scopes: Vec<String>,
	/// Extra authorization URL parameters.
	pub extra_authorize_params: BTreeMap<String, String>,
	/// Preferred client authentication method for the token endpoint.
	pub client_auth: ClientAuthMethod,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptorBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: ProviderId) -> Self {
		Self {
			id,
			authorization_endpoint: None,
			token_endpoint: None,
			userinfo_endpoint: None,
			scopes: Vec::new(),
			extra_authorize_params: BTreeMap::new(),
			client_auth: ClientAuthMethod::default(),
			quirks: ProviderQuirks::default(),
		}
	}

	/// Creates a builder carrying the provider's public endpoints, default scopes, and quirks.
	pub fn preset(id: ProviderId) -> Self {
		let builder = Self::new(id);

		match id {
			ProviderId::Google => builder
				.endpoints(
					"https://accounts.google.com/o/oauth2/v2/auth",
					"https://oauth2.googleapis.com/token",
					Some("https://openidconnect.googleapis.com/v1/userinfo"),
				)
				.scopes(["openid", "email", "profile"])
				.extra_authorize_param("access_type", "offline")
				.client_auth(ClientAuthMethod::ClientSecretPost),
			ProviderId::Reddit => builder
				.endpoints(
					"https://www.reddit.com/api/v1/authorize",
					"https://www.reddit.com/api/v1/access_token",
					None,
				)
				.scopes(["identity", "read"])
				.extra_authorize_param("duration", "permanent"),
			ProviderId::Twitter => builder
				.endpoints(
					"https://twitter.com/i/oauth2/authorize",
					"https://api.twitter.com/2/oauth2/token",
					None,
				)
				.scopes(["users.read", "tweet.read", "offline.access"])
				.quirks(ProviderQuirks { pkce_required: true, ..Default::default() }),
			ProviderId::TikTok => builder
				.endpoints(
					"https://www.tiktok.com/v2/auth/authorize/",
					"https://open.tiktokapis.com/v2/oauth/token/",
					None,
				)
				.scopes(["user.info.basic", "video.list"])
				.client_auth(ClientAuthMethod::ClientSecretPost)
				.quirks(ProviderQuirks {
					scope_delimiter: ',',
					client_id_param: "client_key".into(),
					..Default::default()
				}),
		}
	}

	fn endpoints(self, authorization: &str, token: &str, userinfo: Option<&str>) -> Self {
		Self {
			authorization_endpoint: Url::parse(authorization).ok(),
			token_endpoint: Url::parse(token).ok(),
			userinfo_endpoint: userinfo.and_then(|value| Url::parse(value).ok()),
			..self
		}
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the profile endpoint.
	pub fn userinfo_endpoint(mut self, url: Url) -> Self {
		self.userinfo_endpoint = Some(url);

		self
	}

	/// Clears the profile endpoint.
	pub fn without_userinfo(mut self) -> Self {
		self.userinfo_endpoint = None;

		self
	}

	/// Replaces the requested scopes.
	pub fn scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Adds an extra authorization URL parameter.
	pub fn extra_authorize_param(
		mut self,
		key: impl Into<String>,
		value: impl Into<String>,
	) -> Self {
		self.extra_authorize_params.insert(key.into(), value.into());

		self
	}

	/// Overrides the preferred client authentication method.
	pub fn client_auth(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth = method;

		self
	}

	/// Overrides the provider quirks.
	pub fn quirks(mut self, quirks: ProviderQuirks) -> Self {
		self.quirks = quirks;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let authorization = self
			.authorization_endpoint
			.ok_or(ProviderDescriptorError::MissingAuthorizationEndpoint)?;
		let token = self.token_endpoint.ok_or(ProviderDescriptorError::MissingTokenEndpoint)?;
		let endpoints =
			ProviderEndpoints { authorization, token, userinfo: self.userinfo_endpoint };
		let descriptor = ProviderDescriptor {
			id: self.id,
			endpoints,
			scopes: self.scopes,
			extra_authorize_params: self.extra_authorize_params,
			client_auth: self.client_auth,
			quirks: self.quirks,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl ProviderDescriptor {
	/// Validates invariants for the descriptor.
	fn validate(&self) -> Result<(), ProviderDescriptorError> {
		if self.quirks.pkce_required && self.is_custom_flow() {
			return Err(ProviderDescriptorError::PkceRequiredForCustomFlow);
		}
		if self.quirks.client_id_param.trim().is_empty() {
			return Err(ProviderDescriptorError::EmptyClientIdParam);
		}

		validate_endpoint("authorization", &self.endpoints.authorization)?;
		validate_endpoint("token", &self.endpoints.token)?;

		if let Some(userinfo) = self.endpoints.userinfo.as_ref() {
			validate_endpoint("userinfo", userinfo)?;
		}

		validate_scope_delimiter(self.quirks.scope_delimiter)?;

		Ok(())
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	if url.scheme() != "https" {
		Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	} else {
		Ok(())
	}
}

fn validate_scope_delimiter(delimiter: char) -> Result<(), ProviderDescriptorError> {
	if delimiter.is_control() {
		Err(ProviderDescriptorError::InvalidScopeDelimiter { delimiter })
	} else {
		Ok(())
	}
}

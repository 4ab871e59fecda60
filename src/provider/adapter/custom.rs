//! Hand-rolled authorization flow for providers the `oauth2` crate cannot drive.
//!
//! State handling goes through the shared [`StateStore`], and the code exchange is a plain form
//! POST whose response is parsed leniently: some platforms wrap errors in an object
//! (`{"error": {"code": "...", "message": "..."}}`) and report success as `"code": "ok"`.

// crates.io
use serde::Deserializer;
// self
use crate::{
	_prelude::*,
	auth::{StateScope, TokenSet, TokenSetBuilderError},
	csrf::StateStore,
	error::{ConfigError, ExchangeError},
	http::{RawResponse, ReqwestHttpClient},
	provider::{
		AdapterFuture, AuthorizationGrant, AuthorizationStart, CallbackParams, ClientAuthMethod,
		ClientCredentials, DefaultProviderStrategy, ProviderAdapter, ProviderDescriptor,
		ProviderErrorContext, ProviderStrategy,
		adapter::{self, authorization_url},
	},
};

#[derive(Debug, Default, Deserialize)]
struct CustomTokenResponse {
	access_token: Option<String>,
	refresh_token: Option<String>,
	expires_in: Option<i64>,
	open_id: Option<String>,
	scope: Option<String>,
	#[serde(default, deserialize_with = "deserialize_error")]
	error: Option<String>,
	error_description: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorField {
	Code(String),
	Object { code: String },
}

/// Adapter that runs the authorization-code flow by hand.
#[derive(Clone)]
pub struct CustomAdapter {
	descriptor: ProviderDescriptor,
	credentials: ClientCredentials,
	states: Arc<dyn StateStore>,
	http_client: ReqwestHttpClient,
	strategy: Arc<dyn ProviderStrategy>,
}
impl CustomAdapter {
	/// Creates an adapter backed by `states` for CSRF protection.
	pub fn new(
		descriptor: ProviderDescriptor,
		credentials: ClientCredentials,
		states: Arc<dyn StateStore>,
		http_client: ReqwestHttpClient,
	) -> Self {
		Self {
			descriptor,
			credentials,
			states,
			http_client,
			strategy: Arc::new(DefaultProviderStrategy),
		}
	}

	/// Overrides the error-classification strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	fn token_form(&self, code: &str, redirect_uri: &Url) -> BTreeMap<String, String> {
		let mut form = BTreeMap::from([
			(self.descriptor.quirks.client_id_param.clone(), self.credentials.client_id.clone()),
			("code".into(), code.to_owned()),
			("grant_type".into(), "authorization_code".into()),
			("redirect_uri".into(), redirect_uri.to_string()),
		]);

		if matches!(self.descriptor.client_auth, ClientAuthMethod::ClientSecretPost) {
			form.insert("client_secret".into(), self.credentials.client_secret.expose().to_owned());
		}

		self.strategy.augment_token_request(&mut form);

		form
	}

	async fn exchange(&self, code: &str, redirect_uri: &Url) -> Result<(TokenSet, Option<String>)> {
		let form = self.token_form(code, redirect_uri);
		let basic_auth = match self.descriptor.client_auth {
			ClientAuthMethod::ClientSecretBasic => Some((
				self.credentials.client_id.as_str(),
				self.credentials.client_secret.expose(),
			)),
			ClientAuthMethod::ClientSecretPost => None,
		};
		let response = self
			.http_client
			.post_form(&self.descriptor.endpoints.token, &form, basic_auth)
			.await?;

		self.parse_token_response(&response)
	}

	fn parse_token_response(&self, response: &RawResponse) -> Result<(TokenSet, Option<String>)> {
		let status = response.metadata.status;
		let deserializer = &mut serde_json::Deserializer::from_slice(&response.body);
		let parsed = serde_path_to_error::deserialize::<_, CustomTokenResponse>(deserializer);
		let body = match parsed {
			Ok(body) => body,
			Err(_) if !response.is_success() =>
				return Err(ExchangeError::TokenEndpoint {
					message: format!("token endpoint answered with HTTP {}", response.status()),
					status,
					retry_after: response.metadata.retry_after,
				}
				.into()),
			Err(source) => return Err(ExchangeError::ResponseParse { source, status }.into()),
		};

		if let Some(code) = body.error.clone() {
			let mut ctx = ProviderErrorContext::new(self.descriptor.id)
				.with_oauth_error(code.clone())
				.with_body_preview(response.body_text());

			if let Some(description) = body.error_description.as_ref() {
				ctx = ctx.with_error_description(description.clone());
			}
			if let Some(status) = status {
				ctx = ctx.with_http_status(status);
			}

			return Err(ExchangeError::Rejected {
				kind: self.strategy.classify_token_error(&ctx),
				code,
				status,
			}
			.into());
		}
		if !response.is_success() {
			return Err(ExchangeError::TokenEndpoint {
				message: format!("token endpoint answered with HTTP {}", response.status()),
				status,
				retry_after: response.metadata.retry_after,
			}
			.into());
		}

		let access_token = body
			.access_token
			.filter(|token| !token.is_empty())
			.ok_or(ExchangeError::MissingAccessToken)?;
		let mut builder =
			TokenSet::builder().access_token(access_token).issued_at(OffsetDateTime::now_utc());

		if let Some(secs) = body.expires_in.filter(|secs| *secs > 0) {
			builder = builder.expires_in(Duration::seconds(secs));
		}
		if let Some(refresh) = body.refresh_token.filter(|token| !token.is_empty()) {
			builder = builder.refresh_token(refresh);
		}
		if let Some(scope) = body.scope {
			builder = builder.scope(scope);
		}

		let tokens = builder.build().map_err(|e| match e {
			TokenSetBuilderError::MissingAccessToken =>
				Error::from(ExchangeError::MissingAccessToken),
			other => ConfigError::from(other).into(),
		})?;

		Ok((tokens, body.open_id.filter(|id| !id.is_empty())))
	}
}
impl ProviderAdapter for CustomAdapter {
	fn descriptor(&self) -> &ProviderDescriptor {
		&self.descriptor
	}

	fn begin<'a>(
		&'a self,
		scope: &'a StateScope,
		redirect_uri: &'a Url,
	) -> AdapterFuture<'a, AuthorizationStart> {
		Box::pin(async move {
			let pending = self.states.issue(scope).await?;
			let url = authorization_url(
				&self.descriptor,
				&self.credentials.client_id,
				redirect_uri,
				&pending.state_token,
				None,
			);

			Ok(AuthorizationStart {
				provider: self.descriptor.id,
				authorization_url: url,
				state: pending.state_token,
				state_ttl: pending.ttl,
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

			let state = params.require_state()?;

			if !self.states.consume(scope, state).await? {
				return Err(Error::InvalidState);
			}

			let code = params.require_code()?;
			let (tokens, open_id) = self.exchange(code, redirect_uri).await?;
			let profile = match self.descriptor.endpoints.userinfo.as_ref() {
				Some(userinfo) => Some(
					self.http_client.get_bearer_json(userinfo, tokens.access_token.expose()).await?,
				),
				None => None,
			};

			Ok(AuthorizationGrant {
				provider: self.descriptor.id,
				identity_hint: profile.as_ref().and_then(adapter::extract_email),
				subject: open_id.or_else(|| profile.as_ref().and_then(adapter::extract_subject)),
				tokens,
			})
		})
	}
}
impl Debug for CustomAdapter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CustomAdapter")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.credentials.client_id)
			.finish()
	}
}

fn deserialize_error<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(match Option::<ErrorField>::deserialize(deserializer)? {
		Some(ErrorField::Code(code)) | Some(ErrorField::Object { code })
			if !code.is_empty() && !code.eq_ignore_ascii_case("ok") =>
			Some(code),
		_ => None,
	})
}

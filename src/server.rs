//! HTTP surface: authorization start, provider callback, and quota read endpoints.
//!
//! Every authorization failure is turned into a redirect carrying
//! `integration=<provider>&status=error&message=<code>`; provider payloads never reach the
//! browser. The quota endpoint answers JSON and reports failures as `{"error": {code, message}}`.

pub mod cookies;

pub use cookies::*;

// crates.io
use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Redirect, Response},
	routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
// self
use crate::{
	_prelude::*,
	auth::{Identity, ProviderId, StateScope},
	csrf,
	error::{ConfigError, MessageCode},
	link::{LinkOutcome, Linker},
	provider::CallbackParams,
	quota::QuotaView,
	session::RequestContext,
};

/// Shared state behind the router.
#[derive(Clone, Debug)]
pub struct ServerState {
	linker: Linker,
	public_url: Url,
	default_return_path: String,
	cookies: CookiePolicy,
}
impl ServerState {
	/// Serves `linker` under `public_url`, the externally visible origin used for callback URLs
	/// and final redirects.
	pub fn new(linker: Linker, public_url: Url) -> Self {
		Self {
			linker,
			public_url,
			default_return_path: DEFAULT_RETURN_PATH.into(),
			cookies: CookiePolicy::default(),
		}
	}

	/// Overrides the return path used when `returnTo` is missing or unsafe.
	pub fn with_default_return_path(mut self, path: impl Into<String>) -> Self {
		let path = path.into();

		if sanitize_return_to(&path).is_some() {
			self.default_return_path = path;
		}

		self
	}

	/// Overrides the cookie attribute policy.
	pub fn with_cookie_policy(mut self, cookies: CookiePolicy) -> Self {
		self.cookies = cookies;

		self
	}

	/// Coordinator behind the endpoints.
	pub fn linker(&self) -> &Linker {
		&self.linker
	}

	/// Callback URL registered with `provider`.
	pub fn callback_url(&self, provider: ProviderId) -> Result<Url> {
		self.public_url
			.join(&format!("/auth/{provider}/callback"))
			.map_err(|source| ConfigError::InvalidRedirect { source }.into())
	}

	fn return_target(&self, candidate: Option<&str>) -> String {
		candidate
			.and_then(sanitize_return_to)
			.unwrap_or(&self.default_return_path)
			.to_owned()
	}

	fn finish_redirect(
		&self,
		return_to: &str,
		provider: Option<ProviderId>,
		code: Option<MessageCode>,
	) -> Redirect {
		let mut url = self
			.public_url
			.join(return_to)
			.or_else(|_| self.public_url.join(&self.default_return_path))
			.unwrap_or_else(|_| self.public_url.clone());

		{
			let mut pairs = url.query_pairs_mut();

			if let Some(provider) = provider {
				pairs.append_pair("integration", provider.as_str());
			}

			match code {
				Some(code) => {
					pairs.append_pair("status", "error");
					pairs.append_pair("message", code.as_str());
				},
				None => {
					pairs.append_pair("status", "success");
				},
			}
		}

		Redirect::to(url.as_str())
	}
}

/// Query accepted by the start endpoint.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StartQuery {
	/// Local path to come back to after the callback.
	#[serde(rename = "returnTo")]
	pub return_to: Option<String>,
}

/// Body accepted by the quota endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuotaRequest {
	/// Identity whose counters are requested.
	pub identity: Identity,
}

/// JSON error wrapper for API endpoints.
#[derive(Debug)]
pub struct ApiError(pub Error);
impl ApiError {
	/// Status code for the wrapped error.
	pub fn status(&self) -> StatusCode {
		match &self.0 {
			Error::Unauthenticated => StatusCode::UNAUTHORIZED,
			Error::Forbidden => StatusCode::FORBIDDEN,
			Error::UnsupportedProvider { .. } | Error::NotLinked { .. } => StatusCode::NOT_FOUND,
			Error::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
			Error::TokenExchangeFailed(_) => StatusCode::BAD_GATEWAY,
			Error::PersistenceFailed(_) | Error::Session(_) => StatusCode::SERVICE_UNAVAILABLE,
			Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
			_ => StatusCode::BAD_REQUEST,
		}
	}
}
impl From<Error> for ApiError {
	fn from(e: Error) -> Self {
		Self(e)
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let code = self.0.message_code();

		(
			self.status(),
			Json(serde_json::json!({
				"error": { "code": code.as_str(), "message": code.banner() }
			})),
		)
			.into_response()
	}
}

/// Builds the router exposing the three endpoints.
pub fn router(state: ServerState) -> Router {
	Router::new()
		.route("/auth/{provider}/start", get(start))
		.route("/auth/{provider}/callback", get(callback))
		.route("/quota/{provider}", post(quota))
		.with_state(state)
}

/// Serves the router on `listener` until the task is dropped.
pub async fn serve(listener: tokio::net::TcpListener, state: ServerState) -> std::io::Result<()> {
	axum::serve(listener, router(state)).await
}

async fn start(
	State(state): State<ServerState>,
	Path(raw_provider): Path<String>,
	Query(query): Query<StartQuery>,
	jar: CookieJar,
) -> (CookieJar, Redirect) {
	let return_to = state.return_target(query.return_to.as_deref());
	let Ok(provider) = raw_provider.parse::<ProviderId>() else {
		let code = Error::UnsupportedProvider { provider: raw_provider }.message_code();

		return (jar, state.finish_redirect(&return_to, None, Some(code)));
	};
	let (jar, binding) = match jar.get(CLIENT_COOKIE).map(|cookie| cookie.value().to_owned()) {
		Some(binding) if !binding.is_empty() => (jar, binding),
		_ => {
			let binding = csrf::mint_token();

			(jar.add(state.cookies.persistent_cookie(CLIENT_COOKIE, binding.clone())), binding)
		},
	};
	let started = async {
		let scope = StateScope::for_client(provider, &binding).map_err(ConfigError::from)?;
		let redirect_uri = state.callback_url(provider)?;

		state.linker.begin(provider, &scope, &redirect_uri).await
	}
	.await;

	match started {
		Ok(start) => {
			let mut jar = jar.add(state.cookies.flow_cookie(RETURN_TO_COOKIE, return_to));

			if provider.is_custom_flow() {
				jar = jar.add(state.cookies.flow_cookie(state_cookie_name(provider), start.state));
			}

			(jar, Redirect::to(start.authorization_url.as_str()))
		},
		Err(e) => (jar, state.finish_redirect(&return_to, Some(provider), Some(e.message_code()))),
	}
}

async fn callback(
	State(state): State<ServerState>,
	Path(raw_provider): Path<String>,
	Query(params): Query<CallbackParams>,
	jar: CookieJar,
) -> (CookieJar, Redirect) {
	let return_to = state.return_target(jar.get(RETURN_TO_COOKIE).map(|cookie| cookie.value()));
	let jar = cookies::remove(jar, RETURN_TO_COOKIE);
	let Ok(provider) = raw_provider.parse::<ProviderId>() else {
		let code = Error::UnsupportedProvider { provider: raw_provider }.message_code();

		return (jar, state.finish_redirect(&return_to, None, Some(code)));
	};
	let state_cookie =
		jar.get(&state_cookie_name(provider)).map(|cookie| cookie.value().to_owned());
	let jar = if provider.is_custom_flow() {
		cookies::remove(jar, state_cookie_name(provider))
	} else {
		jar
	};
	let ctx = match jar.get(SESSION_COOKIE) {
		Some(cookie) => RequestContext::with_session_token(cookie.value()),
		None => RequestContext::anonymous(),
	};
	let binding = jar.get(CLIENT_COOKIE).map(|cookie| cookie.value().to_owned());
	let completed = async {
		params.check_provider_error()?;

		let binding = binding.ok_or(Error::InvalidState)?;

		// The echoed cookie must match before the store is consulted.
		if provider.is_custom_flow() && state_cookie.as_deref() != Some(params.require_state()?) {
			return Err(Error::InvalidState);
		}

		let scope = StateScope::for_client(provider, &binding).map_err(|_| Error::InvalidState)?;
		let redirect_uri = state.callback_url(provider)?;

		state.linker.complete(provider, &scope, &params, &redirect_uri, &ctx).await
	}
	.await;

	match completed {
		Ok(outcome) => {
			let jar = match &outcome {
				LinkOutcome::NewSession { session_token, .. } => jar.add(
					state.cookies.persistent_cookie(SESSION_COOKIE, session_token.expose()),
				),
				LinkOutcome::PreserveSession { .. } => jar,
			};

			(jar, state.finish_redirect(&return_to, Some(provider), None))
		},
		Err(e) => (jar, state.finish_redirect(&return_to, Some(provider), Some(e.message_code()))),
	}
}

async fn quota(
	State(state): State<ServerState>,
	Path(raw_provider): Path<String>,
	jar: CookieJar,
	Json(request): Json<QuotaRequest>,
) -> Result<Json<BTreeMap<String, QuotaView>>, ApiError> {
	let sessions = state.linker.sessions();
	let ctx = match jar.get(SESSION_COOKIE) {
		Some(cookie) => RequestContext::with_session_token(cookie.value()),
		None => RequestContext::anonymous(),
	};
	let session = sessions
		.current_session(&ctx)
		.await
		.map_err(Error::from)?
		.ok_or(Error::Unauthenticated)?;

	if session.identity != request.identity
		&& !sessions.claims(&session.identity).await.map_err(Error::from)?.is_admin()
	{
		return Err(Error::Forbidden.into());
	}

	let provider = raw_provider
		.parse::<ProviderId>()
		.map_err(|_| Error::UnsupportedProvider { provider: raw_provider })?;
	let snapshot = state
		.linker
		.quotas()
		.snapshot_at(&request.identity, provider, OffsetDateTime::now_utc())
		.await?;

	Ok(Json(snapshot))
}

#![cfg(feature = "test")]

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use oauth2_linker::{
	_preludet::*,
	auth::{Identity, LinkedCredential, ProviderId, StateScope, TokenSecret, TokenSet},
	csrf::MemoryStateStore,
	link::{LinkOutcome, Linker},
	provider::{AuthorizationGrant, CallbackParams},
	quota::{MemoryLedger, QuotaPolicy},
	session::{
		Claims, MemorySessionAuthority, RequestContext, Session, SessionAuthority, SessionError,
		SessionFuture,
	},
	store::{MemoryVault, StoreError, StoreFuture, TokenVault},
};

const TIKTOK_TOKEN_BODY: &str = "{\"access_token\":\"act.tiktok\",\"refresh_token\":\"rft.tiktok\",\
	\"expires_in\":86400,\"open_id\":\"open-1\",\"scope\":\"user.info.basic\"}";
const GOOGLE_TOKEN_BODY: &str = "{\"access_token\":\"ya29.google\",\"token_type\":\"Bearer\",\
	\"expires_in\":3599,\"refresh_token\":\"1//google\",\"scope\":\"openid email\"}";

fn identity(raw: &str) -> Identity {
	Identity::new(raw).expect("Identity fixture should be valid for linking tests.")
}

fn redirect_uri(provider: ProviderId) -> Url {
	Url::parse(&format!("https://app.example.com/auth/{provider}/callback"))
		.expect("Redirect URI fixture should parse successfully.")
}

fn browser(provider: ProviderId) -> StateScope {
	StateScope::for_client(provider, "browser-1").expect("Scope fixture should be valid.")
}

async fn mock_token<'a>(server: &'a MockServer, body: &'static str) -> httpmock::Mock<'a> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("content-type", "application/x-www-form-urlencoded");
			then.status(200).header("content-type", "application/json").body(body);
		})
		.await
}

async fn mock_userinfo<'a>(
	server: &'a MockServer,
	access_token: &str,
	profile: serde_json::Value,
) -> httpmock::Mock<'a> {
	let authorization = format!("Bearer {access_token}");

	server
		.mock_async(move |when, then| {
			when.method(GET).path("/userinfo").header("authorization", authorization);
			then.status(200).header("content-type", "application/json").json_body(profile);
		})
		.await
}

async fn signed_in(backends: &TestBackends, raw: &str) -> RequestContext {
	let token = backends
		.sessions
		.issue_session(&identity(raw))
		.await
		.expect("Issuing the fixture session should succeed.");

	RequestContext::with_session_token(token.expose())
}

async fn run_flow(
	linker: &Linker,
	provider: ProviderId,
	ctx: &RequestContext,
) -> Result<LinkOutcome> {
	let scope = browser(provider);
	let redirect = redirect_uri(provider);
	let start = linker
		.begin(provider, &scope, &redirect)
		.await
		.expect("Authorization should start successfully.");

	linker
		.complete(
			provider,
			&scope,
			&CallbackParams::success("code-1", start.state),
			&redirect,
			ctx,
		)
		.await
}

#[tokio::test]
async fn secondary_login_without_session_bootstraps_from_the_disclosed_email() {
	let server = MockServer::start_async().await;
	let (linker, backends) =
		build_test_linker(vec![mock_descriptor(ProviderId::TikTok, &server.url(""), true)]);
	let token = mock_token(&server, TIKTOK_TOKEN_BODY).await;
	let userinfo = mock_userinfo(
		&server,
		"act.tiktok",
		json!({ "data": { "user": { "open_id": "open-1", "email": "U@X.com" } } }),
	)
	.await;
	let outcome = run_flow(&linker, ProviderId::TikTok, &RequestContext::anonymous())
		.await
		.expect("Bootstrap from a secondary provider should succeed.");

	token.assert_calls_async(1).await;
	userinfo.assert_calls_async(1).await;

	let LinkOutcome::NewSession { identity: linked, session_token, .. } = outcome else {
		panic!("Expected a new session, got {outcome:?}.");
	};

	assert_eq!(linked, identity("u@x.com"));
	assert_eq!(
		backends.sessions.session(session_token.expose()).map(|session| session.identity),
		Some(identity("u@x.com"))
	);

	let stored = backends
		.vault
		.get(&linked, ProviderId::TikTok)
		.await
		.expect("Vault lookup should succeed.")
		.expect("TikTok credential should be linked.");

	assert_eq!(stored.tokens.access_token.expose(), "act.tiktok");
	assert_eq!(stored.tokens.refresh_token.as_ref().map(TokenSecret::expose), Some("rft.tiktok"));
	assert_eq!(stored.subject.as_deref(), Some("open-1"));
}

#[tokio::test]
async fn secondary_link_keeps_the_active_session_identity() {
	let server = MockServer::start_async().await;
	let (linker, backends) =
		build_test_linker(vec![mock_descriptor(ProviderId::TikTok, &server.url(""), true)]);
	let _token = mock_token(&server, TIKTOK_TOKEN_BODY).await;
	let _userinfo = mock_userinfo(
		&server,
		"act.tiktok",
		json!({ "data": { "user": { "open_id": "open-1", "email": "someone-else@x.com" } } }),
	)
	.await;
	let ctx = signed_in(&backends, "owner@x.com").await;
	let outcome = run_flow(&linker, ProviderId::TikTok, &ctx)
		.await
		.expect("Linking while signed in should succeed.");

	assert_eq!(
		outcome,
		LinkOutcome::PreserveSession {
			identity: identity("owner@x.com"),
			provider: ProviderId::TikTok,
		}
	);
	assert_eq!(backends.sessions.session_count(), 1, "No session may be issued on a link.");
	assert!(
		backends
			.vault
			.get(&identity("someone-else@x.com"), ProviderId::TikTok)
			.await
			.expect("Vault lookup should succeed.")
			.is_none()
	);
	assert_eq!(
		linker.credentials(&identity("owner@x.com")).await.expect("Listing should succeed.").len(),
		1
	);
}

#[tokio::test]
async fn forged_or_replayed_state_never_reaches_the_token_endpoint() {
	let server = MockServer::start_async().await;
	let (linker, backends) =
		build_test_linker(vec![mock_descriptor(ProviderId::TikTok, &server.url(""), false)]);
	let token = mock_token(&server, TIKTOK_TOKEN_BODY).await;
	let scope = browser(ProviderId::TikTok);
	let redirect = redirect_uri(ProviderId::TikTok);
	let ctx = signed_in(&backends, "owner@x.com").await;
	let start = linker
		.begin(ProviderId::TikTok, &scope, &redirect)
		.await
		.expect("Authorization should start successfully.");
	let forged = linker
		.complete(
			ProviderId::TikTok,
			&scope,
			&CallbackParams::success("code-1", "wrong"),
			&redirect,
			&ctx,
		)
		.await;

	assert!(matches!(forged, Err(Error::InvalidState)));
	token.assert_calls_async(0).await;

	let genuine = CallbackParams::success("code-1", start.state);

	linker
		.complete(ProviderId::TikTok, &scope, &genuine, &redirect, &ctx)
		.await
		.expect("The genuine callback should still succeed after a forged attempt.");

	let replayed = linker.complete(ProviderId::TikTok, &scope, &genuine, &redirect, &ctx).await;

	assert!(matches!(replayed, Err(Error::InvalidState)));
	token.assert_calls_async(1).await;
}

#[tokio::test]
async fn callback_checks_run_before_any_exchange() {
	let server = MockServer::start_async().await;
	let (linker, _) =
		build_test_linker(vec![mock_descriptor(ProviderId::TikTok, &server.url(""), false)]);
	let token = mock_token(&server, TIKTOK_TOKEN_BODY).await;
	let scope = browser(ProviderId::TikTok);
	let redirect = redirect_uri(ProviderId::TikTok);
	let ctx = RequestContext::anonymous();
	let denied = CallbackParams { error: Some("access_denied".into()), ..Default::default() };
	let result = linker.complete(ProviderId::TikTok, &scope, &denied, &redirect, &ctx).await;

	assert_eq!(
		result.expect_err("Provider errors should fail the callback.").message_code().as_str(),
		"access_denied"
	);

	let start = linker
		.begin(ProviderId::TikTok, &scope, &redirect)
		.await
		.expect("Authorization should start successfully.");
	let no_code = CallbackParams { state: Some(start.state), ..Default::default() };

	assert!(matches!(
		linker.complete(ProviderId::TikTok, &scope, &no_code, &redirect, &ctx).await,
		Err(Error::MissingCode)
	));
	token.assert_calls_async(0).await;
}

#[tokio::test]
async fn provider_error_bodies_fail_the_exchange_without_linking() {
	let server = MockServer::start_async().await;
	let (linker, backends) =
		build_test_linker(vec![mock_descriptor(ProviderId::TikTok, &server.url(""), false)]);
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"error": "invalid_grant",
				"error_description": "Authorization code is expired."
			}));
		})
		.await;
	let ctx = signed_in(&backends, "owner@x.com").await;
	let result = run_flow(&linker, ProviderId::TikTok, &ctx).await;

	assert!(matches!(result, Err(Error::TokenExchangeFailed(_))));
	assert!(backends.vault.is_empty());
}

#[tokio::test]
async fn primary_provider_always_rederives_the_session() {
	let server = MockServer::start_async().await;
	let (linker, backends) =
		build_test_linker(vec![mock_descriptor(ProviderId::Google, &server.url(""), true)]);
	let token = mock_token(&server, GOOGLE_TOKEN_BODY).await;
	let _userinfo = mock_userinfo(
		&server,
		"ya29.google",
		json!({ "sub": "1234", "email": "b@x.com", "email_verified": true }),
	)
	.await;
	let ctx = signed_in(&backends, "a@x.com").await;
	let outcome = run_flow(&linker, ProviderId::Google, &ctx)
		.await
		.expect("Primary sign-in should succeed over an active session.");

	token.assert_calls_async(1).await;

	let LinkOutcome::NewSession { identity: linked, session_token, provider } = outcome else {
		panic!("Expected a new session, got {outcome:?}.");
	};

	assert_eq!(provider, ProviderId::Google);
	assert_eq!(linked, identity("b@x.com"));
	assert_eq!(
		backends.sessions.session(session_token.expose()).map(|session| session.identity),
		Some(identity("b@x.com"))
	);
	assert_eq!(backends.sessions.session_count(), 2);
}

#[tokio::test]
async fn unresolvable_identities_leave_no_trace() {
	let server = MockServer::start_async().await;
	let (linker, backends) = build_test_linker(vec![
		mock_descriptor(ProviderId::TikTok, &server.url(""), false),
		mock_descriptor(ProviderId::Google, &server.url(""), true),
	]);
	let _tiktok = mock_token(&server, TIKTOK_TOKEN_BODY).await;
	let anonymous = RequestContext::anonymous();

	assert!(matches!(
		run_flow(&linker, ProviderId::TikTok, &anonymous).await,
		Err(Error::UnresolvableIdentity)
	));

	let ctx = signed_in(&backends, "a@x.com").await;
	let grant = AuthorizationGrant {
		provider: ProviderId::Google,
		identity_hint: None,
		subject: Some("1234".into()),
		tokens: TokenSet::builder()
			.access_token("ya29.unverified")
			.build()
			.expect("Token set fixture should build successfully."),
	};

	assert!(matches!(linker.link(grant, &ctx).await, Err(Error::UnresolvableIdentity)));
	assert!(backends.vault.is_empty());
	assert_eq!(backends.sessions.session_count(), 1);
}

#[tokio::test]
async fn twitter_link_opens_quota_windows() {
	let (linker, backends) = build_test_linker(Vec::new());
	let owner = identity("owner@x.com");
	let ctx = signed_in(&backends, "owner@x.com").await;
	let grant = AuthorizationGrant {
		provider: ProviderId::Twitter,
		identity_hint: None,
		subject: None,
		tokens: TokenSet::builder()
			.access_token("twitter-access")
			.build()
			.expect("Token set fixture should build successfully."),
	};

	linker.link(grant, &ctx).await.expect("Linking Twitter should succeed.");

	assert_eq!(backends.ledger.len(), 2);

	let history = linker
		.quotas()
		.history(&owner, ProviderId::Twitter)
		.await
		.expect("History should be readable.");

	assert!(history.iter().all(|counter| counter.count == 0));

	let removed =
		linker.unlink(&owner, ProviderId::Twitter).await.expect("Unlinking should succeed.");

	assert!(removed.is_some());
	assert!(matches!(
		linker.quotas().use_credential(&owner, ProviderId::Twitter, "tweets", 1).await,
		Err(Error::NotLinked { .. })
	));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_links_for_one_pair_serialize() {
	let (linker, backends) = build_test_linker(Vec::new());
	let owner = identity("owner@x.com");
	let at = OffsetDateTime::now_utc();
	let mut handles = Vec::new();

	for i in 0..8 {
		let linker = linker.clone();
		let owner = owner.clone();

		handles.push(tokio::spawn(async move {
			let grant = AuthorizationGrant {
				provider: ProviderId::Reddit,
				identity_hint: None,
				subject: None,
				tokens: TokenSet::builder()
					.access_token(format!("reddit-{i}"))
					.refresh_token(format!("reddit-refresh-{i}"))
					.build()
					.expect("Token set fixture should build successfully."),
			};

			linker.link_with_active_at(grant, Some(&owner), at).await
		}));
	}
	for handle in handles {
		handle.await.expect("Link task should not panic.").expect("Link should succeed.");
	}

	let stored = backends
		.vault
		.get(&owner, ProviderId::Reddit)
		.await
		.expect("Vault lookup should succeed.")
		.expect("Reddit credential should be linked.");
	let suffix = stored
		.tokens
		.access_token
		.expose()
		.strip_prefix("reddit-")
		.expect("Access token should keep its fixture prefix.")
		.to_owned();

	assert_eq!(
		stored.tokens.refresh_token.as_ref().map(|token| token.expose().to_owned()),
		Some(format!("reddit-refresh-{suffix}"))
	);
}

/// Session Authority that resolves sessions normally but cannot issue new ones.
struct OfflineIssuer(MemorySessionAuthority);
impl SessionAuthority for OfflineIssuer {
	fn current_session<'a>(
		&'a self,
		ctx: &'a RequestContext,
	) -> SessionFuture<'a, Option<Session>> {
		self.0.current_session(ctx)
	}

	fn issue_session<'a>(&'a self, _: &'a Identity) -> SessionFuture<'a, TokenSecret> {
		Box::pin(async { Err(SessionError::Backend { message: "issuer offline".into() }) })
	}

	fn claims<'a>(&'a self, identity: &'a Identity) -> SessionFuture<'a, Claims> {
		self.0.claims(identity)
	}
}

#[tokio::test]
async fn failed_session_issuance_restores_the_previous_credential() {
	let vault = Arc::new(MemoryVault::default());
	let linker = Linker::new(
		vault.clone(),
		Arc::new(MemoryLedger::default()),
		QuotaPolicy::default(),
		Arc::new(MemoryStateStore::default()),
		Arc::new(OfflineIssuer(MemorySessionAuthority::default())),
	);
	let owner = identity("u@x.com");
	let tokens = |access: &str| {
		TokenSet::builder()
			.access_token(access)
			.build()
			.expect("Token set fixture should build successfully.")
	};

	vault
		.upsert(LinkedCredential::new(
			owner.clone(),
			ProviderId::Google,
			tokens("ya29.prior"),
			None,
			OffsetDateTime::now_utc(),
		))
		.await
		.expect("Seeding the prior credential should succeed.");

	let grant = AuthorizationGrant {
		provider: ProviderId::Google,
		identity_hint: Some(owner.clone()),
		subject: None,
		tokens: tokens("ya29.next"),
	};
	let result = linker.link_with_active_at(grant, None, OffsetDateTime::now_utc()).await;

	assert!(matches!(result, Err(Error::Session(_))));

	let stored = vault
		.get(&owner, ProviderId::Google)
		.await
		.expect("Vault lookup should succeed.")
		.expect("The prior credential should be restored.");

	assert_eq!(stored.tokens.access_token.expose(), "ya29.prior");

	let newcomer = identity("new@x.com");
	let grant = AuthorizationGrant {
		provider: ProviderId::Google,
		identity_hint: Some(newcomer.clone()),
		subject: None,
		tokens: tokens("ya29.first"),
	};

	assert!(linker.link_with_active_at(grant, None, OffsetDateTime::now_utc()).await.is_err());
	assert!(
		vault
			.get(&newcomer, ProviderId::Google)
			.await
			.expect("Vault lookup should succeed.")
			.is_none(),
		"A first link must be rolled back entirely."
	);
}

/// Vault that accepts a fixed number of upserts and then reports the backend as unavailable.
struct FlakyVault {
	inner: MemoryVault,
	upserts_left: AtomicUsize,
}
impl TokenVault for FlakyVault {
	fn upsert(&self, credential: LinkedCredential) -> StoreFuture<'_, ()> {
		let allowed = self
			.upserts_left
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
			.is_ok();

		if allowed {
			self.inner.upsert(credential)
		} else {
			Box::pin(async { Err(StoreError::Backend { message: "vault offline".into() }) })
		}
	}

	fn get<'a>(
		&'a self,
		identity: &'a Identity,
		provider: ProviderId,
	) -> StoreFuture<'a, Option<LinkedCredential>> {
		self.inner.get(identity, provider)
	}

	fn delete<'a>(
		&'a self,
		identity: &'a Identity,
		provider: ProviderId,
	) -> StoreFuture<'a, Option<LinkedCredential>> {
		self.inner.delete(identity, provider)
	}

	fn list<'a>(&'a self, identity: &'a Identity) -> StoreFuture<'a, Vec<LinkedCredential>> {
		self.inner.list(identity)
	}
}

#[tokio::test]
async fn failed_rollback_surfaces_the_storage_error() {
	let vault = Arc::new(FlakyVault { inner: MemoryVault::default(), upserts_left: 1.into() });
	let linker = Linker::new(
		vault.clone(),
		Arc::new(MemoryLedger::default()),
		QuotaPolicy::default(),
		Arc::new(MemoryStateStore::default()),
		Arc::new(OfflineIssuer(MemorySessionAuthority::default())),
	);
	let owner = identity("u@x.com");
	let tokens = |access: &str| {
		TokenSet::builder()
			.access_token(access)
			.build()
			.expect("Token set fixture should build successfully.")
	};

	vault
		.inner
		.upsert(LinkedCredential::new(
			owner.clone(),
			ProviderId::Google,
			tokens("ya29.prior"),
			None,
			OffsetDateTime::now_utc(),
		))
		.await
		.expect("Seeding the prior credential should succeed.");

	let grant = AuthorizationGrant {
		provider: ProviderId::Google,
		identity_hint: Some(owner.clone()),
		subject: None,
		tokens: tokens("ya29.next"),
	};
	let result = linker.link_with_active_at(grant, None, OffsetDateTime::now_utc()).await;

	assert!(
		matches!(result, Err(Error::PersistenceFailed(_))),
		"A failed restore must be reported instead of the session error, got {result:?}."
	);
	assert_eq!(vault.upserts_left.load(Ordering::SeqCst), 0);
}

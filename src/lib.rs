//! Identity linking across OAuth 2.0 providers without losing the active session: a primary
//! provider bootstraps the session, secondary providers attach API credentials to it, and every
//! linked credential is metered by a per-plan daily quota ledger.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod csrf;
pub mod error;
pub mod http;
pub mod link;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod quota;
pub mod server;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::ProviderId,
		csrf::{MemoryStateStore, StateStore},
		http::ReqwestHttpClient,
		link::Linker,
		provider::{ClientCredentials, CustomAdapter, LibraryAdapter, ProviderDescriptor},
		quota::{MemoryLedger, QuotaLedger, QuotaPolicy},
		session::{MemorySessionAuthority, SessionAuthority},
		store::{MemoryVault, TokenVault},
	};

	/// Client identifier used by every test adapter.
	pub const TEST_CLIENT_ID: &str = "client-it";
	/// Client secret used by every test adapter.
	pub const TEST_CLIENT_SECRET: &str = "secret-it";

	/// Concrete in-memory backends wired into a test [`Linker`], kept for assertions.
	#[derive(Clone, Debug, Default)]
	pub struct TestBackends {
		/// Token Vault backend.
		pub vault: Arc<MemoryVault>,
		/// Quota Ledger backend.
		pub ledger: Arc<MemoryLedger>,
		/// CSRF State Store backend.
		pub states: Arc<MemoryStateStore>,
		/// Session Authority backend.
		pub sessions: Arc<MemorySessionAuthority>,
	}

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds a descriptor for `provider` whose endpoints all live on `base` (an `httpmock`
	/// server URL).
	pub fn mock_descriptor(
		provider: ProviderId,
		base: &str,
		with_userinfo: bool,
	) -> ProviderDescriptor {
		let endpoint =
			|path: &str| Url::parse(&format!("{base}{path}")).expect("Mock endpoint should parse.");
		let mut builder = ProviderDescriptor::preset(provider)
			.authorization_endpoint(endpoint("/authorize"))
			.token_endpoint(endpoint("/token"));

		builder = if with_userinfo {
			builder.userinfo_endpoint(endpoint("/userinfo"))
		} else {
			builder.without_userinfo()
		};

		builder.build().expect("Mock provider descriptor should build successfully.")
	}

	/// Constructs a [`Linker`] backed by in-memory stores, the default quota policy, and one
	/// adapter per descriptor (custom-flow providers get a [`CustomAdapter`]).
	pub fn build_test_linker(descriptors: Vec<ProviderDescriptor>) -> (Linker, TestBackends) {
		let backends = TestBackends::default();
		let vault: Arc<dyn TokenVault> = backends.vault.clone();
		let ledger: Arc<dyn QuotaLedger> = backends.ledger.clone();
		let states: Arc<dyn StateStore> = backends.states.clone();
		let sessions: Arc<dyn SessionAuthority> = backends.sessions.clone();
		let http_client = test_reqwest_http_client();
		let mut linker =
			Linker::new(vault, ledger, QuotaPolicy::default(), states.clone(), sessions);

		for descriptor in descriptors {
			let credentials = ClientCredentials::new(TEST_CLIENT_ID, TEST_CLIENT_SECRET);

			linker = if descriptor.is_custom_flow() {
				linker.with_adapter(Arc::new(CustomAdapter::new(
					descriptor,
					credentials,
					states.clone(),
					http_client.clone(),
				)))
			} else {
				linker.with_adapter(Arc::new(LibraryAdapter::new(
					descriptor,
					credentials,
					http_client.clone(),
				)))
			};
		}

		(linker, backends)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Date, Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)]
use {color_eyre as _, httpmock as _, tower as _, tracing_subscriber as _};

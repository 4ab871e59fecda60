//! Linker-level error types shared across adapters, stores, and the HTTP surface.

// self
use crate::{_prelude::*, auth::ProviderId, provider::ProviderErrorKind};

/// Linker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical linker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// CSRF state was missing, expired, already consumed, or did not match.
	#[error("Authorization state is missing, expired, or does not match.")]
	InvalidState,
	/// The callback carried no authorization code.
	#[error("Authorization callback did not include a code.")]
	MissingCode,
	/// The provider redirected back with an OAuth `error` parameter.
	#[error("Provider denied the authorization: {code}.")]
	ProviderDenied {
		/// Provider-sent OAuth error code.
		code: String,
	},
	/// Authorization-code exchange or profile lookup failed.
	#[error(transparent)]
	TokenExchangeFailed(#[from] ExchangeError),
	/// Neither an active session nor a disclosed identity was available.
	#[error("No active session and the provider disclosed no identity.")]
	UnresolvableIdentity,
	/// Storage-layer failure.
	#[error("{0}")]
	PersistenceFailed(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// A linked credential was used beyond its daily quota.
	#[error("Daily `{metric}` quota for {provider} is exhausted ({limit} allowed).")]
	QuotaExceeded {
		/// Provider whose quota was exhausted.
		provider: ProviderId,
		/// Metric that would have been exceeded.
		metric: String,
		/// Limit configured for the current window.
		limit: u64,
		/// Units still available in the current window.
		remaining: u64,
		/// Start of the next window (UTC midnight).
		resets_at: OffsetDateTime,
	},
	/// No credential is linked for the provider.
	#[error("No {provider} account is linked.")]
	NotLinked {
		/// Provider that was asked for.
		provider: ProviderId,
	},
	/// Session Authority failure.
	#[error(transparent)]
	Session(#[from] crate::session::SessionError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// No adapter is registered for the provider.
	#[error("Provider `{provider}` is not configured.")]
	UnsupportedProvider {
		/// Provider label as requested.
		provider: String,
	},
	/// The caller lacks the capability for the requested read.
	#[error("Caller is not allowed to access this resource.")]
	Forbidden,
	/// The request carried no active session.
	#[error("An authenticated session is required.")]
	Unauthenticated,
}
impl Error {
	/// Machine-readable code carried in callback redirects and API error bodies.
	pub fn message_code(&self) -> MessageCode {
		match self {
			Error::InvalidState => MessageCode::InvalidState,
			Error::MissingCode => MessageCode::NoCode,
			Error::ProviderDenied { code } if code.eq_ignore_ascii_case("access_denied") =>
				MessageCode::AccessDenied,
			Error::ProviderDenied { .. } => MessageCode::ProviderError,
			Error::TokenExchangeFailed(_) => MessageCode::TokenExchangeFailed,
			Error::UnresolvableIdentity => MessageCode::UnresolvableIdentity,
			Error::PersistenceFailed(_) => MessageCode::PersistenceFailed,
			Error::QuotaExceeded { .. } => MessageCode::QuotaExceeded,
			Error::NotLinked { .. } => MessageCode::NotLinked,
			Error::Session(_) => MessageCode::SessionFailed,
			Error::Config(_) => MessageCode::ConfigurationError,
			Error::UnsupportedProvider { .. } => MessageCode::UnsupportedProvider,
			Error::Forbidden => MessageCode::Forbidden,
			Error::Unauthenticated => MessageCode::Unauthenticated,
		}
	}

	/// Returns true when restarting the flow (or retrying the call) may succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			Error::InvalidState | Error::MissingCode | Error::PersistenceFailed(_) => true,
			Error::TokenExchangeFailed(inner) => inner.is_retryable(),
			Error::QuotaExceeded { .. } | Error::Session(_) => true,
			_ => false,
		}
	}
}

/// Stable, provider-independent failure codes shown to browsers and support staff.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageCode {
	/// CSRF state mismatch or expiry.
	InvalidState,
	/// Callback arrived without a code.
	NoCode,
	/// The user declined the consent screen.
	AccessDenied,
	/// The provider reported any other authorization error.
	ProviderError,
	/// Token endpoint or profile lookup failure.
	TokenExchangeFailed,
	/// No session and no disclosed identity.
	UnresolvableIdentity,
	/// Storage failure.
	PersistenceFailed,
	/// Daily quota exhausted.
	QuotaExceeded,
	/// Provider account not linked.
	NotLinked,
	/// Session Authority failure.
	SessionFailed,
	/// Local misconfiguration.
	ConfigurationError,
	/// Provider not configured.
	UnsupportedProvider,
	/// Capability check failed.
	Forbidden,
	/// No active session.
	Unauthenticated,
}
impl MessageCode {
	/// Returns the wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			MessageCode::InvalidState => "invalid_state",
			MessageCode::NoCode => "no_code",
			MessageCode::AccessDenied => "access_denied",
			MessageCode::ProviderError => "provider_error",
			MessageCode::TokenExchangeFailed => "token_exchange_failed",
			MessageCode::UnresolvableIdentity => "unresolvable_identity",
			MessageCode::PersistenceFailed => "persistence_failed",
			MessageCode::QuotaExceeded => "quota_exceeded",
			MessageCode::NotLinked => "not_linked",
			MessageCode::SessionFailed => "session_failed",
			MessageCode::ConfigurationError => "configuration_error",
			MessageCode::UnsupportedProvider => "unsupported_provider",
			MessageCode::Forbidden => "forbidden",
			MessageCode::Unauthenticated => "unauthenticated",
		}
	}

	/// Short human-readable banner for the dashboard.
	pub const fn banner(self) -> &'static str {
		match self {
			MessageCode::InvalidState =>
				"The connection request expired or was tampered with. Please try again.",
			MessageCode::NoCode => "The provider did not return an authorization code.",
			MessageCode::AccessDenied => "Access was not granted.",
			MessageCode::ProviderError => "The provider reported an error during authorization.",
			MessageCode::TokenExchangeFailed =>
				"We could not complete the connection with the provider. Please try again.",
			MessageCode::UnresolvableIdentity => "Please sign in before connecting this account.",
			MessageCode::PersistenceFailed =>
				"We could not save the connection. Please try again.",
			MessageCode::QuotaExceeded => "The daily usage limit has been reached.",
			MessageCode::NotLinked => "Connect this account before using it.",
			MessageCode::SessionFailed => "We could not start your session. Please try again.",
			MessageCode::ConfigurationError => "This integration is misconfigured.",
			MessageCode::UnsupportedProvider => "This integration is not available.",
			MessageCode::Forbidden => "You are not allowed to view this information.",
			MessageCode::Unauthenticated => "Please sign in first.",
		}
	}
}
impl Display for MessageCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Configuration and validation failures raised by the linker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::provider::ProviderDescriptorError),
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// An identifier failed validation.
	#[error(transparent)]
	Identifier(#[from] crate::auth::IdentifierError),
	/// Token set builder validation failed.
	#[error("Unable to build token set.")]
	TokenBuild(#[from] crate::auth::TokenSetBuilderError),
	/// The quota policy does not track the metric.
	#[error("Metric `{metric}` is not quota-tracked for {provider}.")]
	UntrackedMetric {
		/// Provider that was asked about.
		provider: ProviderId,
		/// Metric that is not configured.
		metric: String,
	},
	/// Configuration file could not be read.
	#[error("Failed to read configuration file {path}.")]
	Read {
		/// Path that failed.
		path: String,
		/// Underlying IO error.
		#[source]
		source: std::io::Error,
	},
	/// Configuration file could not be parsed.
	#[error(transparent)]
	Parse(#[from] toml::de::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures while exchanging an authorization code or reading the provider profile.
#[derive(Debug, ThisError)]
pub enum ExchangeError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the provider.")]
	Io(#[from] std::io::Error),
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Provider answered with a structured OAuth error.
	#[error("Provider rejected the exchange with `{code}`.")]
	Rejected {
		/// Strategy classification of the error.
		kind: ProviderErrorKind,
		/// Provider-sent error code (never forwarded to browsers).
		code: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Provider responded with JSON that could not be parsed.
	#[error("Provider returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Successful response without an access token.
	#[error("Token endpoint response is missing access_token.")]
	MissingAccessToken,
}
impl ExchangeError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// HTTP status attached to the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::TokenEndpoint { status, .. }
			| Self::Rejected { status, .. }
			| Self::ResponseParse { status, .. } => *status,
			_ => None,
		}
	}

	/// Returns true when the same exchange might succeed if retried.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Rejected { kind, .. } => matches!(kind, ProviderErrorKind::Transient),
			Self::MissingAccessToken => false,
			_ => true,
		}
	}
}
impl From<ReqwestError> for ExchangeError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn store_error_converts_into_persistence_failure_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::PersistenceFailed(_)));
		assert!(error.to_string().contains("database unreachable"));
		assert_eq!(error.message_code(), MessageCode::PersistenceFailed);
		assert!(error.is_retryable());

		let source = StdError::source(&error)
			.expect("Linker error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn provider_errors_never_leak_into_message_codes() {
		let denied = Error::ProviderDenied { code: "access_denied".into() };
		let other = Error::ProviderDenied { code: "<script>alert(1)</script>".into() };
		let exchange: Error = ExchangeError::Rejected {
			kind: ProviderErrorKind::InvalidGrant,
			code: "internal_stack_trace".into(),
			status: Some(400),
		}
		.into();

		assert_eq!(denied.message_code().as_str(), "access_denied");
		assert_eq!(other.message_code().as_str(), "provider_error");
		assert_eq!(exchange.message_code().as_str(), "token_exchange_failed");
		assert!(!exchange.is_retryable());
	}

	#[test]
	fn message_codes_serialize_as_snake_case_labels() {
		for code in [MessageCode::InvalidState, MessageCode::NoCode, MessageCode::QuotaExceeded] {
			let payload = serde_json::to_string(&code).expect("Code should serialize.");

			assert_eq!(payload, format!("\"{}\"", code.as_str()));
			assert!(!code.banner().is_empty());
		}
	}
}

//! Normalized token sets returned by provider adapters, plus their builder.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Longest relative lifetime honored from a provider; larger `expires_in` values are clamped.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::days(3650);

/// Current lifecycle status for a token set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is currently usable (or carries no expiry at all).
	Active,
	/// Token exceeded its expiry instant.
	Expired,
}

/// Errors produced by [`TokenSetBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenSetBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when the relative expiry is zero or negative.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiry,
	/// Issued when the expiry instant falls outside the representable range.
	#[error("The expiry instant is out of range.")]
	ExpiryOverflow,
}

/// Provider-agnostic token fields produced by a completed authorization.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Expiry instant, if the provider disclosed a lifetime.
	pub expires_at: Option<OffsetDateTime>,
	/// Granted scopes as reported by the provider, space-joined.
	pub scope: Option<String>,
	/// Instant the token endpoint answered.
	pub issued_at: OffsetDateTime,
}
impl TokenSet {
	/// Returns a builder for normalizing provider responses.
	pub fn builder() -> TokenSetBuilder {
		TokenSetBuilder::default()
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		match self.expires_at {
			Some(expires_at) if instant >= expires_at => TokenStatus::Expired,
			_ => TokenStatus::Active,
		}
	}

	/// Returns `true` if the set has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Expired)
	}

	/// Returns `true` if the set is expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}
}
impl Debug for TokenSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenSet")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.field("scope", &self.scope)
			.field("issued_at", &self.issued_at)
			.finish()
	}
}

/// Builder for [`TokenSet`].
#[derive(Clone, Debug, Default)]
pub struct TokenSetBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	scope: Option<String>,
}
impl TokenSetBuilder {
	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Records the granted scope string.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Consumes the builder and produces a [`TokenSet`].
	pub fn build(self) -> Result<TokenSet, TokenSetBuilderError> {
		let access_token = self
			.access_token
			.filter(|token| !token.expose().is_empty())
			.ok_or(TokenSetBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) if delta.is_positive() => Some(
				issued_at
					.checked_add(delta.min(MAX_TOKEN_LIFETIME))
					.ok_or(TokenSetBuilderError::ExpiryOverflow)?,
			),
			(None, Some(_)) => return Err(TokenSetBuilderError::NonPositiveExpiry),
			(None, None) => None,
		};

		Ok(TokenSet {
			access_token,
			refresh_token: self.refresh_token,
			expires_at,
			scope: self.scope,
			issued_at,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn builder_handles_relative_expiry() {
		let set = TokenSet::builder()
			.access_token("secret")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::minutes(30))
			.build()
			.expect("Token set builder should support relative expiry calculations.");

		assert_eq!(set.expires_at, Some(macros::datetime!(2025-01-01 00:30 UTC)));
		assert_eq!(set.status_at(macros::datetime!(2025-01-01 00:10 UTC)), TokenStatus::Active);
		assert!(set.is_expired_at(macros::datetime!(2025-01-01 00:30 UTC)));
	}

	#[test]
	fn builder_rejects_missing_access_and_bad_expiry() {
		assert_eq!(
			TokenSet::builder().build().expect_err("Access token is mandatory."),
			TokenSetBuilderError::MissingAccessToken
		);
		assert_eq!(
			TokenSet::builder().access_token("").build().expect_err("Empty token is rejected."),
			TokenSetBuilderError::MissingAccessToken
		);
		assert_eq!(
			TokenSet::builder()
				.access_token("a")
				.expires_in(Duration::ZERO)
				.build()
				.expect_err("Zero lifetime is rejected."),
			TokenSetBuilderError::NonPositiveExpiry
		);
	}

	#[test]
	fn oversized_lifetimes_are_clamped_instead_of_overflowing() {
		let issued_at = macros::datetime!(2025-01-01 00:00 UTC);
		let set = TokenSet::builder()
			.access_token("a")
			.issued_at(issued_at)
			.expires_in(Duration::seconds(i64::MAX))
			.build()
			.expect("Huge lifetimes should be clamped.");

		assert_eq!(set.expires_at, Some(issued_at + MAX_TOKEN_LIFETIME));
		assert_eq!(
			TokenSet::builder()
				.access_token("a")
				.issued_at(macros::datetime!(9999-12-31 23:59 UTC))
				.expires_in(Duration::days(1))
				.build()
				.expect_err("Expiry past the calendar range is rejected."),
			TokenSetBuilderError::ExpiryOverflow
		);
	}

	#[test]
	fn sets_without_expiry_never_expire() {
		let set = TokenSet::builder()
			.access_token("long-lived")
			.build()
			.expect("Expiry is optional for token sets.");

		assert!(set.expires_at.is_none());
		assert!(!set.is_expired_at(macros::datetime!(2999-01-01 00:00 UTC)));
	}

	#[test]
	fn debug_output_redacts_secrets() {
		let set = TokenSet::builder()
			.access_token("access-visible")
			.refresh_token("refresh-visible")
			.build()
			.expect("Token set should build.");
		let rendered = format!("{set:?}");

		assert!(!rendered.contains("access-visible"));
		assert!(!rendered.contains("refresh-visible"));
	}
}

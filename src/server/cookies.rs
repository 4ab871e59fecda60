//! Cookie names, attributes, and the return-target rules used by the authorization endpoints.

// crates.io
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
// self
use crate::{_prelude::*, auth::ProviderId, csrf::STATE_TTL};

/// Long-lived random client binding; scopes pending authorizations to one browser.
pub const CLIENT_COOKIE: &str = "linker_client";
/// Where to send the browser once the callback completes.
pub const RETURN_TO_COOKIE: &str = "linker_return_to";
/// Session token issued on bootstrap.
pub const SESSION_COOKIE: &str = "linker_session";
/// Fallback return path.
pub const DEFAULT_RETURN_PATH: &str = "/dashboard/settings";

const RETURN_TO_MAX_LEN: usize = 512;

/// Attribute policy shared by every cookie the endpoints set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CookiePolicy {
	/// Adds the `Secure` attribute; enable behind HTTPS.
	pub secure: bool,
	/// Max-age of the state and return-target cookies.
	pub flow_ttl: Duration,
}
impl CookiePolicy {
	pub(crate) fn flow_cookie(
		&self,
		name: impl Into<String>,
		value: impl Into<String>,
	) -> Cookie<'static> {
		Cookie::build((name.into(), value.into()))
			.http_only(true)
			.same_site(SameSite::Lax)
			.secure(self.secure)
			.path("/")
			.max_age(self.flow_ttl)
			.build()
	}

	pub(crate) fn persistent_cookie(
		&self,
		name: &'static str,
		value: impl Into<String>,
	) -> Cookie<'static> {
		Cookie::build((name, value.into()))
			.http_only(true)
			.same_site(SameSite::Lax)
			.secure(self.secure)
			.path("/")
			.build()
	}
}
impl Default for CookiePolicy {
	fn default() -> Self {
		Self { secure: false, flow_ttl: STATE_TTL }
	}
}

/// Name of the cookie echoing the custom-flow state for `provider`.
pub fn state_cookie_name(provider: ProviderId) -> String {
	format!("{provider}_oauth_state")
}

/// Expires `name` in the browser.
pub(crate) fn remove(jar: CookieJar, name: impl Into<String>) -> CookieJar {
	jar.remove(Cookie::build(name.into()).path("/"))
}

/// Returns `candidate` when it is a local absolute path, `None` otherwise.
///
/// Protocol-relative (`//host`) and backslash forms are rejected because browsers resolve them
/// to other origins.
pub fn sanitize_return_to(candidate: &str) -> Option<&str> {
	let valid = candidate.starts_with('/')
		&& !candidate.starts_with("//")
		&& !candidate.contains('\\')
		&& candidate.len() <= RETURN_TO_MAX_LEN
		&& !candidate.chars().any(char::is_control);

	valid.then_some(candidate)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn return_targets_must_stay_local() {
		assert_eq!(sanitize_return_to("/dashboard"), Some("/dashboard"));
		assert_eq!(sanitize_return_to("/a?b=c"), Some("/a?b=c"));
		assert_eq!(sanitize_return_to("//evil.example"), None);
		assert_eq!(sanitize_return_to("/\\evil.example"), None);
		assert_eq!(sanitize_return_to("https://evil.example"), None);
		assert_eq!(sanitize_return_to("/line\nbreak"), None);
		assert_eq!(sanitize_return_to(""), None);
	}

	#[test]
	fn flow_cookies_are_http_only_and_lax() {
		let cookie =
			CookiePolicy::default().flow_cookie(state_cookie_name(ProviderId::TikTok), "s");

		assert_eq!(cookie.name(), "tiktok_oauth_state");
		assert_eq!(cookie.http_only(), Some(true));
		assert_eq!(cookie.same_site(), Some(SameSite::Lax));
		assert_eq!(cookie.max_age(), Some(Duration::minutes(10)));
	}
}

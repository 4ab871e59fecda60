//! Provider-facing descriptors (data), strategies (error classification), and adapters (flows).
//!
//! `descriptor` exposes validated metadata ([`ProviderDescriptor`]): HTTPS-only endpoints,
//! scopes, client authentication preferences, and quirks such as the PKCE requirement or a
//! renamed client identifier parameter. `adapter` turns a descriptor into a runnable
//! authorization flow, either through the `oauth2` crate or by hand.

pub mod adapter;
pub mod descriptor;
pub mod strategy;

pub use adapter::*;
pub use descriptor::*;
pub use strategy::*;

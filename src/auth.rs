//! Auth-domain identifiers, provider identities, and token models.

pub mod id;
pub mod token;

pub use id::*;
pub use token::{credential::*, secret::*, set::*};

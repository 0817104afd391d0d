//! Credential management
//!
//! Two fixed roles, each backed by one secret file that is created exactly
//! once and never rewritten:
//!
//! ```text
//! <credentials dir>/deployer.key   primary signing identity
//! <credentials dir>/other.key      secondary identity
//! ```
//!
//! An environment variable per role (`DEPLOYER_PK`, `OTHER_PK` by default)
//! takes precedence over the file when set.

pub mod identity;
pub mod store;

pub use identity::{Role, SigningIdentity};
pub use store::{CredentialSource, CredentialStore, GenerateOutcome, LoadedCredential};

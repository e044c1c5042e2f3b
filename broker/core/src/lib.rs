#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod admission;
pub mod credentials;
pub mod exchange;
pub mod identity;
pub mod inject;
#[cfg(any(test, feature = "test-util"))]
pub mod mem;
pub mod patch;
pub mod secret;
pub mod store;
pub mod token;

#[cfg(test)]
mod tests;

pub use self::{
    admission::{Denial, Injection, Injector},
    credentials::{AssumeRole, CredentialSet, SessionDuration},
    exchange::{Exchange, ExchangeError, Exchanged},
    identity::TargetRoles,
    inject::Sidecar,
    secret::{SecretRef, Secrets},
    store::{AllowedRoles, StoreError, TokenRecord, TokenStore},
    token::AuthToken,
};

/// The environment variable (and secret key) under which workloads find their token.
pub const AUTHORIZATION_TOKEN_ENV: &str = "AWS_CONTAINER_AUTHORIZATION_TOKEN";

/// The environment variable pointing workloads at the credential proxy sidecar.
pub const CREDENTIALS_URI_ENV: &str = "AWS_CONTAINER_CREDENTIALS_FULL_URI";

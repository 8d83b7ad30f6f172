//! Token model, issuance and verification.
//!
//! - [`claims`] - claims carried by self-issued tokens
//! - [`issuer`] - HS256 minting and verification
//! - [`context`] - authenticated request context and extractors
//! - [`jwks`] / [`oidc`] - external identity provider path

pub mod claims;
pub mod context;
pub mod issuer;
pub mod jwks;
pub mod oidc;

pub use claims::{Claims, TokenKind};
pub use context::{AuthContext, AuthUser, CorrelationId, MaybeAuthUser, ProviderContext, ProviderUser};
pub use issuer::TokenIssuer;
pub use jwks::JwksClient;
pub use oidc::{OidcValidator, ProviderClaims};

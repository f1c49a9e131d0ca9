//! `umrahops-auth`: authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage: the API layer turns a bearer token into a
//! [`Principal`] and asks this crate whether an action is allowed.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, authorize, permissions_for_roles};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use permissions::Permission;
pub use principal::{Principal, ReadScope};
pub use roles::Role;

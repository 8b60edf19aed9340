//! OAuth endpoints.

pub mod authorize;
pub mod extract;
pub mod health;
pub mod introspect;
pub mod revoke;
pub mod token;

pub use authorize::{AuthorizeQuery, authorize_handler};
pub use extract::{JsonOrForm, basic_credentials};
pub use health::{HealthResponse, health_routes};
pub use introspect::{IntrospectRequest, IntrospectResponse, introspect_handler};
pub use revoke::{RevokeRequest, revoke_handler};
pub use token::{TokenRequest, TokenResponse, token_handler};

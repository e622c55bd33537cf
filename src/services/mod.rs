pub mod auth;
pub use auth::Auth;

pub mod authentication;
pub use authentication::{AuthError, AuthenticatedUser, AuthenticationBackend};

pub mod authentication_impl;
pub use authentication_impl::SeaOrmAuthentication;

pub mod authorization;
pub use authorization::{Access, AuthorizationBackend};

pub mod authorization_impl;
pub use authorization_impl::SeaOrmAuthorization;

pub mod prelude;

pub mod login_attempts;
pub mod permissions;
pub mod role_permissions;
pub mod roles;
pub mod user_cookies;
pub mod users;

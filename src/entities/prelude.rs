pub use super::login_attempts::Entity as LoginAttempts;
pub use super::permissions::Entity as Permissions;
pub use super::role_permissions::Entity as RolePermissions;
pub use super::roles::Entity as Roles;
pub use super::user_cookies::Entity as UserCookies;
pub use super::users::Entity as Users;

//! Domain events for the application.
//!
//! Emitted by the authentication engine around session establishment and
//! teardown. Delivery is fire-and-forget: a subscriber failing or lagging
//! must never abort the auth flow that triggered the event.

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum AuthEvent {
    AfterLogin { user_id: i32, role_id: i32 },
    BeforeLogout { user_id: i32, role_id: i32 },
}

//! Bot and User account entities.
//!
//! The two kinds share the same capability set (token lifecycle, webhook
//! subscription maintenance) but differ in their OAuth client pair, delivery
//! address and event filter set; those constants travel in the
//! [`KindContext`] injected at construction. Entity methods that mutate the
//! registry take it as an explicit parameter rather than reaching for shared
//! ambient state.

pub mod bot;
pub mod subscription;
pub mod user;

pub use bot::Bot;
pub use user::User;

use std::sync::Arc;

use crate::accounts::subscription::SubscriptionProfile;
use crate::platform::PlatformApi;

/// Per-kind dependencies handed to every entity of that kind.
#[derive(Clone)]
pub struct KindContext {
    pub api: Arc<dyn PlatformApi>,
    pub profile: SubscriptionProfile,
}

impl KindContext {
    pub fn new(api: Arc<dyn PlatformApi>, profile: SubscriptionProfile) -> Self {
        Self { api, profile }
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

//! Current user identity.
//!
//! Sign-up, sign-in, and token handling live outside this crate. The sync
//! engine only needs to ask "who is signed in right now?".

use std::sync::RwLock;

use crate::config::{Config, USER_ID_ENV};

pub trait IdentityResolver: Send + Sync {
    /// The signed-in user's id, or `None` before login.
    fn current_user_id(&self) -> Option<String>;
}

/// Identity held in memory and changed by sign-in and sign-out.
#[derive(Default)]
pub struct SessionIdentity {
    user_id: RwLock<Option<String>>,
}

impl SessionIdentity {
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            user_id: RwLock::new(user_id),
        }
    }

    /// Identity from `[identity].user_id`, falling back to
    /// `SCOPENOTES_USER_ID`.
    pub fn from_config(config: &Config) -> Self {
        let user_id = config
            .identity
            .user_id
            .clone()
            .or_else(|| std::env::var(USER_ID_ENV).ok())
            .filter(|u| !u.trim().is_empty());
        Self::new(user_id)
    }

    pub fn set(&self, user_id: Option<String>) {
        *self.user_id.write().unwrap() = user_id;
    }
}

impl IdentityResolver for SessionIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.user_id.read().unwrap().clone()
    }
}

//! Current user and the persisted session marker.
//!
//! The current-user slot is per tab and lives only in memory. The marker
//! `{ userId, expiresAt }` is persisted under the session key so a new tab
//! (or a restart) can log the same user back in until it expires.

use crate::clock::Clock;
use crate::config::SESSION_KEY;
use crate::entity::EntityId;
use crate::error::Result;
use crate::models::User;
use crate::serialization::{decode_value, encode_value};
use crate::storage::Storage;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMarker {
    pub user_id: EntityId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

/// Session state shared by every repository of one tab.
pub struct Session<S: Storage> {
    storage: S,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    current: RwLock<Option<User>>,
}

impl<S: Storage> Session<S> {
    pub fn new(storage: S, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Session {
            storage,
            clock,
            ttl,
            current: RwLock::new(None),
        }
    }

    /// The logged-in user of this tab, if any.
    pub fn current_user(&self) -> Option<User> {
        self.current.read().clone()
    }

    pub fn current_user_id(&self) -> Option<EntityId> {
        self.current.read().as_ref().map(|user| user.id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Log `user` in: fill the slot and persist a fresh marker.
    pub fn establish(&self, user: &User) -> Result<()> {
        let marker = SessionMarker {
            user_id: user.id,
            expires_at: self.clock.now() + self.ttl,
        };
        self.storage.set(SESSION_KEY, encode_value(&marker)?)?;
        *self.current.write() = Some(user.clone());
        debug!("Session established for user {}", user.id);
        Ok(())
    }

    /// Fill the slot without touching the marker.
    pub fn set_current(&self, user: Option<User>) {
        *self.current.write() = user;
    }

    /// Replace the slot's copy of `user` if it is the one logged in.
    pub fn refresh(&self, user: &User) {
        let mut current = self.current.write();
        if current.as_ref().is_some_and(|c| c.id == user.id) {
            *current = Some(user.clone());
        }
    }

    /// The persisted marker, whether or not it has expired.
    ///
    /// An unreadable marker is removed and treated as absent.
    pub fn marker(&self) -> Result<Option<SessionMarker>> {
        let Some(raw) = self.storage.get(SESSION_KEY)? else {
            return Ok(None);
        };

        match decode_value::<SessionMarker>(&raw) {
            Ok(marker) => Ok(Some(marker)),
            Err(e) => {
                warn!("Discarding unreadable session marker: {}", e);
                self.storage.remove(SESSION_KEY)?;
                Ok(None)
            }
        }
    }

    /// Id of the user named by a live marker.
    ///
    /// Expired markers are removed.
    pub fn restore_marker(&self) -> Result<Option<EntityId>> {
        match self.marker()? {
            Some(marker) if marker.expires_at > self.clock.now() => Ok(Some(marker.user_id)),
            Some(marker) => {
                info!("Session of user {} expired", marker.user_id);
                self.storage.remove(SESSION_KEY)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Log out: empty the slot and remove the marker.
    pub fn clear(&self) -> Result<()> {
        self.storage.remove(SESSION_KEY)?;
        *self.current.write() = None;
        Ok(())
    }
}

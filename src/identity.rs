//! Identity source
//!
//! Publishes the current signed-in identity over a watch channel. `None`
//! means authentication has not yet reported its first value — consumers
//! that need a decided identity block on the first `Some`.
//!
//! The hub also carries the data-load inversion: the storage layer registers
//! a hook here, and `sign_in` awaits it so a sign-in is never reported
//! complete before the user's data has actually loaded.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

/// Either anonymous (guest) use or an opaque authenticated user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User(String),
}

impl Identity {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Identity::Anonymous => None,
            Identity::User(id) => Some(id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::User(_))
    }
}

pub type DataLoadFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type DataLoadHook = Arc<dyn Fn() -> DataLoadFuture + Send + Sync>;

pub struct IdentityHub {
    tx: watch::Sender<Option<Identity>>,
    data_load_hook: Mutex<Option<DataLoadHook>>,
}

impl IdentityHub {
    /// New hub with authentication not yet determined.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx,
            data_load_hook: Mutex::new(None),
        }
    }

    /// Subscribe to identity changes.
    pub fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }

    /// The most recently emitted identity, if any.
    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    /// Emit an identity without waiting for data loading. Used for the
    /// initial emission after the auth subsystem restores its session.
    pub fn set_identity(&self, identity: Identity) {
        self.tx.send_replace(Some(identity));
    }

    /// Register the hook awaited by `sign_in` after emitting a new user.
    pub fn register_data_load_hook(&self, hook: DataLoadHook) {
        *self.data_load_hook.lock() = Some(hook);
    }

    /// Emit an authenticated identity, then wait until the registered
    /// data-load hook reports the user's data is available.
    pub async fn sign_in(&self, user_id: impl Into<String>) -> Identity {
        let identity = Identity::User(user_id.into());
        self.tx.send_replace(Some(identity.clone()));

        let hook = self.data_load_hook.lock().clone();
        if let Some(hook) = hook {
            hook().await;
        } else {
            log::debug!("No data-load hook registered; sign-in completes immediately");
        }

        identity
    }

    /// Return to anonymous use.
    pub fn sign_out(&self) {
        self.tx.send_replace(Some(Identity::Anonymous));
    }
}

impl Default for IdentityHub {
    fn default() -> Self {
        Self::new()
    }
}

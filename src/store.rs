//! Modification store
//!
//! Holds the authoritative set of shift overrides and user settings,
//! synchronized between an in-memory cache, the local key-value store, and a
//! remote per-user document. The source of truth follows the active
//! identity: anonymous use is local-backed, authenticated use is
//! remote-backed, and the first sign-in migrates local data to a fresh
//! remote document exactly once.
//!
//! The store is a tagged state machine (`Uninitialized → Loading → Ready`)
//! driven by `run()`, which the caller spawns. Every public operation awaits
//! the readiness gate before touching the cache, so a write can never land
//! against an undecided source of truth.
//!
//! Write ordering is write-then-cache-then-notify: the cache is updated only
//! after the backing store confirmed the write, and a change notification is
//! emitted after every successful write regardless of backing store. Remote
//! push snapshots are a secondary convergence mechanism for changes that
//! originate elsewhere.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};

use crate::error::StorageError;
use crate::identity::{Identity, IdentityHub};
use crate::local_store::{LocalStore, MODIFICATIONS_KEY, SETTINGS_KEY};
use crate::remote::{DocumentEvent, DocumentStore, Subscription, USER_DATA_COLLECTION};
use crate::settings::{SettingsUpdate, UserSettings};
use crate::types::{Crew, ShiftModification, ShiftType, StorageData};

/// Buffer for remote push snapshots.
const PUSH_CHANNEL_SIZE: usize = 16;

/// Buffer for "data changed" notifications.
const CHANGED_CHANNEL_SIZE: usize = 32;

/// Which backing store is authoritative for the active identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageSource {
    Local,
    Remote,
}

struct ReadyState {
    identity: Identity,
    source: StorageSource,
    data: StorageData,
}

enum StoreState {
    Uninitialized,
    Loading(Identity),
    Ready(ReadyState),
}

pub struct ModificationStore {
    local: LocalStore,
    remote: Arc<dyn DocumentStore>,
    identity_rx: watch::Receiver<Option<Identity>>,
    state: Mutex<StoreState>,
    /// Initialization gate: true while `state` is `Ready`.
    ready_tx: watch::Sender<bool>,
    /// Loading flag for UI gating, true for the duration of a load cycle.
    loading_tx: watch::Sender<bool>,
    changed_tx: broadcast::Sender<()>,
}

impl ModificationStore {
    pub fn new(
        local: LocalStore,
        remote: Arc<dyn DocumentStore>,
        identity: watch::Receiver<Option<Identity>>,
    ) -> Arc<Self> {
        let (ready_tx, _) = watch::channel(false);
        let (loading_tx, _) = watch::channel(false);
        let (changed_tx, _) = broadcast::channel(CHANGED_CHANNEL_SIZE);
        Arc::new(Self {
            local,
            remote,
            identity_rx: identity,
            state: Mutex::new(StoreState::Uninitialized),
            ready_tx,
            loading_tx,
            changed_tx,
        })
    }

    /// Register this store as the hub's data-load hook, so interactive
    /// sign-in waits for the user's data before reporting success.
    pub fn register_data_load(self: &Arc<Self>, hub: &IdentityHub) {
        let store = Arc::clone(self);
        hub.register_data_load_hook(Arc::new(move || {
            let store = Arc::clone(&store);
            Box::pin(async move {
                store.wait_for_data_load().await;
            })
        }));
    }

    /// Drive the store: wait for the auth subsystem's first identity
    /// emission, decide a source of truth, then react to identity changes
    /// and remote push snapshots. The caller spawns this once.
    pub async fn run(self: Arc<Self>) {
        let mut identity_rx = self.identity_rx.clone();

        // Unconditional gate: no source-of-truth decision until the
        // identity source has emitted its first value.
        let first = match identity_rx.wait_for(|identity| identity.is_some()).await {
            Ok(guard) => guard.as_ref().cloned().unwrap_or(Identity::Anonymous),
            Err(_) => {
                log::warn!("Identity source closed before first emission; serving local data");
                Identity::Anonymous
            }
        };

        let mut remote_feed = self.load_for_identity(first.clone()).await;
        let mut current = first;

        loop {
            tokio::select! {
                changed = identity_rx.changed() => {
                    if changed.is_err() {
                        // Identity source dropped; keep serving the current
                        // cache until the store itself is dropped.
                        break;
                    }
                    let next = identity_rx.borrow_and_update().clone();
                    let Some(next) = next else { continue };
                    if next == current {
                        continue;
                    }
                    current = next.clone();
                    // Unsubscribe before reloading so stale pushes from the
                    // previous identity can't land mid-decision.
                    remote_feed = None;
                    remote_feed = self.load_for_identity(next).await;
                }
                Some(event) = recv_push(&mut remote_feed) => {
                    self.apply_remote_snapshot(event.data);
                }
            }
        }

        if let Some((_subscription, mut push_rx)) = remote_feed {
            while let Some(event) = push_rx.recv().await {
                self.apply_remote_snapshot(event.data);
            }
        }
    }

    async fn load_for_identity(
        &self,
        identity: Identity,
    ) -> Option<(Subscription, mpsc::Receiver<DocumentEvent>)> {
        *self.state.lock() = StoreState::Loading(identity.clone());
        self.ready_tx.send_replace(false);
        self.loading_tx.send_replace(true);

        let feed = match &identity {
            Identity::Anonymous => {
                let data = self.local.load_data();
                self.finish_load(identity.clone(), StorageSource::Local, data);
                None
            }
            Identity::User(user_id) => match self.load_remote(user_id).await {
                Ok(feed) => feed,
                Err(e) => {
                    log::error!("Failed to load data for user {}: {}", user_id, e);
                    // Leave the store usable rather than wedged: empty data,
                    // writes still target the remote document.
                    self.finish_load(
                        identity.clone(),
                        StorageSource::Remote,
                        StorageData::default(),
                    );
                    None
                }
            },
        };

        // The loading gate resolves exactly once per cycle, errors included.
        self.loading_tx.send_replace(false);
        feed
    }

    async fn load_remote(
        &self,
        user_id: &str,
    ) -> Result<Option<(Subscription, mpsc::Receiver<DocumentEvent>)>, StorageError> {
        let identity = Identity::User(user_id.to_string());
        match self.remote.read(USER_DATA_COLLECTION, user_id).await? {
            Some(document) => {
                let data = parse_storage_document(document);
                let (push_tx, push_rx) = mpsc::channel(PUSH_CHANNEL_SIZE);
                let subscription = self.remote.subscribe(USER_DATA_COLLECTION, user_id, push_tx);
                self.finish_load(identity, StorageSource::Remote, data);
                Ok(Some((subscription, push_rx)))
            }
            None => {
                // One-time migration: whatever sits in the local store
                // becomes the new remote document, then the local keys are
                // cleared so the data can't migrate twice.
                let data = self.local.load_data();
                let document = serde_json::to_value(&data)?;
                self.remote
                    .create(USER_DATA_COLLECTION, user_id, document)
                    .await?;
                if let Err(e) = self.local.clear() {
                    log::warn!("Failed to clear local store after migration: {}", e);
                }
                log::info!("Migrated local data to remote document for user {}", user_id);
                self.finish_load(identity, StorageSource::Remote, data);
                Ok(None)
            }
        }
    }

    fn finish_load(&self, identity: Identity, source: StorageSource, data: StorageData) {
        *self.state.lock() = StoreState::Ready(ReadyState {
            identity,
            source,
            data,
        });
        self.ready_tx.send_replace(true);
        let _ = self.changed_tx.send(());
    }

    /// Overwrite the cache with a pushed remote snapshot. Only applies while
    /// remote-backed and Ready; snapshots racing a reload are dropped.
    fn apply_remote_snapshot(&self, data: Option<Value>) {
        let Some(document) = data else {
            return;
        };
        let parsed = parse_storage_document(document);
        let applied = {
            let mut state = self.state.lock();
            match &mut *state {
                StoreState::Ready(ready) if ready.source == StorageSource::Remote => {
                    ready.data = parsed;
                    true
                }
                StoreState::Loading(identity) => {
                    log::debug!("Dropping remote snapshot during reload for {:?}", identity);
                    false
                }
                _ => false,
            }
        };
        if applied {
            let _ = self.changed_tx.send(());
        }
    }

    /// Wait until the store is `Ready`.
    async fn await_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }

    fn with_ready<T>(&self, f: impl FnOnce(&ReadyState) -> T) -> Option<T> {
        match &*self.state.lock() {
            StoreState::Ready(ready) => Some(f(ready)),
            _ => None,
        }
    }

    /// Await readiness and read from the cache. Retries if an identity
    /// switch re-entered `Loading` between the gate and the lock.
    async fn ready_snapshot<T>(&self, f: impl Fn(&ReadyState) -> T) -> T {
        loop {
            self.await_ready().await;
            if let Some(value) = self.with_ready(&f) {
                return value;
            }
        }
    }

    /// Apply a cache mutation after a confirmed store write, then notify.
    /// Skipped when an identity switch superseded the write — the write
    /// completed under the old identity but its result is no longer trusted.
    fn commit(&self, identity: &Identity, apply: impl FnOnce(&mut StorageData)) {
        let committed = {
            let mut state = self.state.lock();
            match &mut *state {
                StoreState::Ready(ready) if ready.identity == *identity => {
                    apply(&mut ready.data);
                    true
                }
                _ => false,
            }
        };
        if committed {
            let _ = self.changed_tx.send(());
        }
    }

    async fn write_modifications(
        &self,
        identity: &Identity,
        modifications: &[ShiftModification],
    ) -> Result<(), StorageError> {
        match identity {
            Identity::User(user_id) => {
                let patch = serde_json::json!({ MODIFICATIONS_KEY: modifications });
                self.remote
                    .update(USER_DATA_COLLECTION, user_id, patch)
                    .await
            }
            Identity::Anonymous => self.local.write_modifications(modifications),
        }
    }

    /// True while a load cycle is in progress. Exposed for UI gating.
    pub fn is_loading(&self) -> bool {
        *self.loading_tx.borrow()
    }

    /// Resolve once the store has finished loading for the most recently
    /// emitted identity. Resolves immediately when no load is pending, and
    /// also on load errors — callers are never left hanging.
    pub async fn wait_for_data_load(&self) {
        let mut rx = self.ready_tx.subscribe();
        let _ = rx
            .wait_for(|_| match self.identity_rx.borrow().clone() {
                None => true,
                Some(identity) => self
                    .with_ready(|ready| ready.identity == identity)
                    .unwrap_or(false),
            })
            .await;
    }

    /// Subscribe to "data changed" notifications: one event after every
    /// successful write, reload, or externally-originated remote update.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<()> {
        self.changed_tx.subscribe()
    }

    /// The override for `(date, crew)`, if any. Cache lookup, no side effects.
    pub async fn modification(&self, date: NaiveDate, crew: Crew) -> Option<ShiftModification> {
        self.ready_snapshot(|ready| {
            ready
                .data
                .modifications
                .iter()
                .find(|m| m.matches(date, crew))
                .cloned()
        })
        .await
    }

    /// All current overrides.
    pub async fn modifications(&self) -> Vec<ShiftModification> {
        self.ready_snapshot(|ready| ready.data.modifications.clone())
            .await
    }

    /// Record an override for `(date, crew)`, replacing any existing one.
    pub async fn save_modification(
        &self,
        date: NaiveDate,
        original_type: ShiftType,
        modified_type: ShiftType,
        crew: Crew,
    ) -> Result<(), StorageError> {
        let (identity, mut modifications) = self
            .ready_snapshot(|ready| (ready.identity.clone(), ready.data.modifications.clone()))
            .await;

        modifications.retain(|m| !m.matches(date, crew));
        modifications.push(ShiftModification {
            date,
            crew,
            original_type,
            modified_type,
            timestamp: Utc::now(),
        });

        self.write_modifications(&identity, &modifications).await?;
        self.commit(&identity, |data| data.modifications = modifications);
        Ok(())
    }

    /// Remove the override for `(date, crew)`. No write and no notification
    /// when nothing matched.
    pub async fn remove_modification(
        &self,
        date: NaiveDate,
        crew: Crew,
    ) -> Result<(), StorageError> {
        let (identity, mut modifications) = self
            .ready_snapshot(|ready| (ready.identity.clone(), ready.data.modifications.clone()))
            .await;

        let before = modifications.len();
        modifications.retain(|m| !m.matches(date, crew));
        if modifications.len() == before {
            return Ok(());
        }

        self.write_modifications(&identity, &modifications).await?;
        self.commit(&identity, |data| data.modifications = modifications);
        Ok(())
    }

    /// Drop every override.
    pub async fn clear_all_modifications(&self) -> Result<(), StorageError> {
        let identity = self.ready_snapshot(|ready| ready.identity.clone()).await;
        self.write_modifications(&identity, &[]).await?;
        self.commit(&identity, |data| data.modifications = Vec::new());
        Ok(())
    }

    /// Count annual-leave overrides for `crew` in `year`.
    pub async fn annual_leave_usage(&self, crew: Crew, year: i32) -> usize {
        self.ready_snapshot(|ready| {
            ready
                .data
                .modifications
                .iter()
                .filter(|m| {
                    m.crew == crew
                        && m.modified_type == ShiftType::AnnualLeave
                        && m.date.year() == year
                })
                .count()
        })
        .await
    }

    pub async fn settings(&self) -> UserSettings {
        self.ready_snapshot(|ready| ready.data.settings.clone())
            .await
    }

    /// Replace the settings singleton.
    pub async fn set_settings(&self, settings: UserSettings) -> Result<(), StorageError> {
        let identity = self.ready_snapshot(|ready| ready.identity.clone()).await;
        match &identity {
            Identity::User(user_id) => {
                let patch = serde_json::json!({ SETTINGS_KEY: &settings });
                self.remote
                    .update(USER_DATA_COLLECTION, user_id, patch)
                    .await?;
            }
            Identity::Anonymous => self.local.write_settings(&settings)?,
        }
        self.commit(&identity, |data| data.settings = settings);
        Ok(())
    }

    /// Merge a partial update into the current settings and persist.
    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<UserSettings, StorageError> {
        let merged = self.settings().await.apply(update);
        self.set_settings(merged.clone()).await?;
        Ok(merged)
    }
}

async fn recv_push(
    feed: &mut Option<(Subscription, mpsc::Receiver<DocumentEvent>)>,
) -> Option<DocumentEvent> {
    match feed {
        Some((_, push_rx)) => push_rx.recv().await,
        None => std::future::pending().await,
    }
}

fn parse_storage_document(document: Value) -> StorageData {
    match serde_json::from_value(document) {
        Ok(data) => data,
        Err(e) => {
            log::warn!("Malformed user document, substituting defaults: {}", e);
            StorageData::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryDocumentStore;
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;

    fn d(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    /// Millisecond-aligned timestamp, so values survive the wire format
    /// (epoch millis) unchanged and compare equal after a round trip.
    fn ts() -> chrono::DateTime<Utc> {
        chrono::DateTime::from_timestamp_millis(1_750_000_000_000).unwrap()
    }

    fn spawn_store(
        root: &Path,
        remote: Arc<dyn DocumentStore>,
        hub: &IdentityHub,
    ) -> Arc<ModificationStore> {
        let store = ModificationStore::new(LocalStore::new(root.to_path_buf()), remote, hub.watch());
        store.register_data_load(hub);
        tokio::spawn(Arc::clone(&store).run());
        store
    }

    /// Wait until the store's modification list satisfies a predicate, or panic.
    async fn wait_for_modifications(
        store: &Arc<ModificationStore>,
        predicate: impl Fn(&[ShiftModification]) -> bool,
    ) -> Vec<ShiftModification> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let mods = store.modifications().await;
                if predicate(&mods) {
                    return mods;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("store never reached expected modification state")
    }

    #[tokio::test]
    async fn test_anonymous_save_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let hub = IdentityHub::new();
        let store = spawn_store(dir.path(), Arc::new(MemoryDocumentStore::new()), &hub);
        hub.set_identity(Identity::Anonymous);

        let date = d(2025, 3, 10);
        store
            .save_modification(date, ShiftType::Early, ShiftType::Off, Crew::David)
            .await
            .unwrap();

        let found = store.modification(date, Crew::David).await.unwrap();
        assert_eq!(found.modified_type, ShiftType::Off);
        assert_eq!(found.original_type, ShiftType::Early);

        // A different crew on the same date has no override.
        assert!(store.modification(date, Crew::Trevor).await.is_none());

        // The write reached the local store, not the remote document.
        let reloaded = LocalStore::new(dir.path().to_path_buf()).load_data();
        assert_eq!(reloaded.modifications.len(), 1);
    }

    #[tokio::test]
    async fn test_second_save_for_same_pair_wins() {
        let dir = tempfile::tempdir().unwrap();
        let hub = IdentityHub::new();
        let store = spawn_store(dir.path(), Arc::new(MemoryDocumentStore::new()), &hub);
        hub.set_identity(Identity::Anonymous);

        let date = d(2025, 3, 10);
        store
            .save_modification(date, ShiftType::Early, ShiftType::Off, Crew::David)
            .await
            .unwrap();
        store
            .save_modification(date, ShiftType::Early, ShiftType::AnnualLeave, Crew::David)
            .await
            .unwrap();

        let mods = store.modifications().await;
        assert_eq!(mods.len(), 1);
        assert_eq!(mods[0].modified_type, ShiftType::AnnualLeave);
    }

    #[tokio::test]
    async fn test_writes_emit_change_notifications() {
        let dir = tempfile::tempdir().unwrap();
        let hub = IdentityHub::new();
        let store = spawn_store(dir.path(), Arc::new(MemoryDocumentStore::new()), &hub);
        hub.set_identity(Identity::Anonymous);

        // Force readiness before subscribing so the initial-load event is
        // not counted.
        let _ = store.settings().await;
        let mut changes = store.subscribe_changes();

        store
            .save_modification(d(2025, 3, 10), ShiftType::Early, ShiftType::Off, Crew::David)
            .await
            .unwrap();
        changes.recv().await.unwrap();

        // Removing a nonexistent override is a no-op: no notification.
        store
            .remove_modification(d(2025, 4, 1), Crew::Paddy)
            .await
            .unwrap();
        assert!(matches!(
            changes.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_clear_all_modifications() {
        let dir = tempfile::tempdir().unwrap();
        let hub = IdentityHub::new();
        let store = spawn_store(dir.path(), Arc::new(MemoryDocumentStore::new()), &hub);
        hub.set_identity(Identity::Anonymous);

        for day in 1..=3 {
            store
                .save_modification(d(2025, 5, day), ShiftType::Early, ShiftType::Off, Crew::Paddy)
                .await
                .unwrap();
        }
        assert_eq!(store.modifications().await.len(), 3);

        store.clear_all_modifications().await.unwrap();
        assert!(store.modifications().await.is_empty());
        let reloaded = LocalStore::new(dir.path().to_path_buf()).load_data();
        assert!(reloaded.modifications.is_empty());
    }

    #[tokio::test]
    async fn test_annual_leave_usage_counts_crew_and_year() {
        let dir = tempfile::tempdir().unwrap();
        let hub = IdentityHub::new();
        let store = spawn_store(dir.path(), Arc::new(MemoryDocumentStore::new()), &hub);
        hub.set_identity(Identity::Anonymous);

        store
            .save_modification(d(2025, 3, 1), ShiftType::Early, ShiftType::AnnualLeave, Crew::David)
            .await
            .unwrap();
        store
            .save_modification(d(2025, 3, 2), ShiftType::Early, ShiftType::AnnualLeave, Crew::Trevor)
            .await
            .unwrap();
        store
            .save_modification(d(2024, 12, 31), ShiftType::Late, ShiftType::AnnualLeave, Crew::David)
            .await
            .unwrap();
        store
            .save_modification(d(2025, 6, 1), ShiftType::Late, ShiftType::Off, Crew::David)
            .await
            .unwrap();

        assert_eq!(store.annual_leave_usage(Crew::David, 2025).await, 1);
        assert_eq!(store.annual_leave_usage(Crew::David, 2024).await, 1);
        assert_eq!(store.annual_leave_usage(Crew::Trevor, 2025).await, 1);
        assert_eq!(store.annual_leave_usage(Crew::Paddy, 2025).await, 0);
    }

    #[tokio::test]
    async fn test_migration_on_first_sign_in() {
        let dir = tempfile::tempdir().unwrap();

        // Seed local data before the store starts.
        let seed = LocalStore::new(dir.path().to_path_buf());
        let m1 = ShiftModification {
            date: d(2025, 2, 14),
            crew: Crew::Trevor,
            original_type: ShiftType::Late,
            modified_type: ShiftType::AnnualLeave,
            timestamp: ts(),
        };
        seed.write_modifications(std::slice::from_ref(&m1)).unwrap();
        let mut settings = UserSettings::default();
        settings.selected_crew = Some(Crew::Trevor);
        seed.write_settings(&settings).unwrap();

        let remote = Arc::new(MemoryDocumentStore::new());
        let hub = IdentityHub::new();
        let store = spawn_store(dir.path(), Arc::clone(&remote) as Arc<dyn DocumentStore>, &hub);
        hub.set_identity(Identity::User("user-1".to_string()));

        // After initialization the remote document holds the local data.
        let mods = store.modifications().await;
        assert_eq!(mods, vec![m1.clone()]);
        assert_eq!(store.settings().await, settings);

        let document = remote.document(USER_DATA_COLLECTION, "user-1").unwrap();
        let expected = serde_json::to_value(StorageData {
            modifications: vec![m1],
            settings,
        })
        .unwrap();
        assert_eq!(document, expected);

        // Local keys are cleared so the data cannot migrate twice.
        assert!(!dir.path().join("modifications.json").exists());
        assert!(!dir.path().join("settings.json").exists());
    }

    #[tokio::test]
    async fn test_sign_in_after_anonymous_use_migrates_and_switches_target() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryDocumentStore::new());
        let hub = IdentityHub::new();
        let store = spawn_store(dir.path(), Arc::clone(&remote) as Arc<dyn DocumentStore>, &hub);
        hub.set_identity(Identity::Anonymous);

        let date = d(2025, 7, 1);
        store
            .save_modification(date, ShiftType::Early, ShiftType::Off, Crew::David)
            .await
            .unwrap();

        // Interactive sign-in waits for the reload via the data-load hook.
        hub.sign_in("user-2").await;
        assert!(!store.is_loading());

        // The anonymous data survived the migration.
        let mods = store.modifications().await;
        assert_eq!(mods.len(), 1);
        assert!(remote.document(USER_DATA_COLLECTION, "user-2").is_some());
        assert!(!dir.path().join("modifications.json").exists());

        // Subsequent writes target the remote document.
        store
            .save_modification(d(2025, 7, 2), ShiftType::Early, ShiftType::Late, Crew::David)
            .await
            .unwrap();
        let document = remote.document(USER_DATA_COLLECTION, "user-2").unwrap();
        assert_eq!(document["modifications"].as_array().unwrap().len(), 2);
        // And nothing was written back to the local store.
        assert!(!dir.path().join("modifications.json").exists());
    }

    #[tokio::test]
    async fn test_existing_remote_document_is_loaded_and_followed() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryDocumentStore::new());

        let m1 = ShiftModification {
            date: d(2025, 8, 1),
            crew: Crew::Paddy,
            original_type: ShiftType::Off,
            modified_type: ShiftType::Late,
            timestamp: ts(),
        };
        let document = serde_json::to_value(StorageData {
            modifications: vec![m1.clone()],
            settings: UserSettings::default(),
        })
        .unwrap();
        remote
            .create(USER_DATA_COLLECTION, "user-3", document)
            .await
            .unwrap();

        let hub = IdentityHub::new();
        let store = spawn_store(dir.path(), Arc::clone(&remote) as Arc<dyn DocumentStore>, &hub);
        hub.set_identity(Identity::User("user-3".to_string()));

        assert_eq!(store.modifications().await, vec![m1.clone()]);

        // An externally-originated update converges via the push listener.
        let m2 = ShiftModification {
            date: d(2025, 8, 2),
            crew: Crew::Paddy,
            original_type: ShiftType::Off,
            modified_type: ShiftType::AnnualLeave,
            timestamp: ts(),
        };
        remote
            .update(
                USER_DATA_COLLECTION,
                "user-3",
                serde_json::json!({ "modifications": [m1, m2] }),
            )
            .await
            .unwrap();

        let mods = wait_for_modifications(&store, |mods| mods.len() == 2).await;
        assert_eq!(mods[1].modified_type, ShiftType::AnnualLeave);
    }

    #[tokio::test]
    async fn test_malformed_remote_document_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryDocumentStore::new());
        remote
            .create(USER_DATA_COLLECTION, "user-4", serde_json::json!({ "modifications": "oops" }))
            .await
            .unwrap();

        let hub = IdentityHub::new();
        let store = spawn_store(dir.path(), Arc::clone(&remote) as Arc<dyn DocumentStore>, &hub);
        hub.set_identity(Identity::User("user-4".to_string()));

        assert!(store.modifications().await.is_empty());
        assert_eq!(store.settings().await, UserSettings::default());
    }

    #[tokio::test]
    async fn test_sign_out_returns_to_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryDocumentStore::new());
        let hub = IdentityHub::new();
        let store = spawn_store(dir.path(), Arc::clone(&remote) as Arc<dyn DocumentStore>, &hub);
        hub.set_identity(Identity::User("user-5".to_string()));

        store
            .save_modification(d(2025, 9, 1), ShiftType::Early, ShiftType::Off, Crew::David)
            .await
            .unwrap();

        hub.sign_out();
        // The local store was emptied by the migration, so anonymous use
        // starts from a clean slate.
        let mods = wait_for_modifications(&store, |mods| mods.is_empty()).await;
        assert!(mods.is_empty());

        store
            .save_modification(d(2025, 9, 2), ShiftType::Late, ShiftType::Off, Crew::David)
            .await
            .unwrap();
        assert!(dir.path().join("modifications.json").exists());
        // The signed-out write did not touch the remote document.
        let document = remote.document(USER_DATA_COLLECTION, "user-5").unwrap();
        assert_eq!(document["modifications"].as_array().unwrap().len(), 1);
    }

    /// Remote store whose writes always fail; reads serve a fixed document.
    struct FailingStore {
        document: Value,
    }

    #[async_trait]
    impl DocumentStore for FailingStore {
        async fn create(&self, _: &str, _: &str, _: Value) -> Result<(), StorageError> {
            Err(StorageError::Remote("create failed".to_string()))
        }

        async fn read(&self, _: &str, _: &str) -> Result<Option<Value>, StorageError> {
            Ok(Some(self.document.clone()))
        }

        async fn update(&self, _: &str, _: &str, _: Value) -> Result<(), StorageError> {
            Err(StorageError::Remote("update failed".to_string()))
        }

        async fn set_with_merge(&self, _: &str, _: &str, _: Value) -> Result<(), StorageError> {
            Err(StorageError::Remote("merge failed".to_string()))
        }

        fn subscribe(
            &self,
            _: &str,
            _: &str,
            _sender: mpsc::Sender<DocumentEvent>,
        ) -> Subscription {
            Subscription::new(|| {})
        }
    }

    #[tokio::test]
    async fn test_remote_write_failure_leaves_cache_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let m1 = ShiftModification {
            date: d(2025, 10, 1),
            crew: Crew::David,
            original_type: ShiftType::Early,
            modified_type: ShiftType::Off,
            timestamp: ts(),
        };
        let failing = Arc::new(FailingStore {
            document: serde_json::to_value(StorageData {
                modifications: vec![m1.clone()],
                settings: UserSettings::default(),
            })
            .unwrap(),
        });

        let hub = IdentityHub::new();
        let store = spawn_store(dir.path(), failing, &hub);
        hub.set_identity(Identity::User("user-6".to_string()));

        let err = store
            .save_modification(d(2025, 10, 2), ShiftType::Late, ShiftType::Off, Crew::David)
            .await
            .unwrap_err();
        assert!(err.is_remote());

        // Write-then-cache ordering: the failed write never reached the cache.
        assert_eq!(store.modifications().await, vec![m1]);
    }

    #[tokio::test]
    async fn test_update_settings_merges_partial() {
        let dir = tempfile::tempdir().unwrap();
        let hub = IdentityHub::new();
        let store = spawn_store(dir.path(), Arc::new(MemoryDocumentStore::new()), &hub);
        hub.set_identity(Identity::Anonymous);

        let merged = store
            .update_settings(SettingsUpdate::select_crew(Crew::Paddy))
            .await
            .unwrap();
        assert_eq!(merged.selected_crew, Some(Crew::Paddy));
        assert_eq!(merged.has_completed_initial_setup, Some(true));

        // Untouched fields kept their defaults, and the result persisted.
        let reloaded = LocalStore::new(dir.path().to_path_buf()).load_data();
        assert!(reloaded.settings.show_shift_labels);
        assert_eq!(reloaded.settings.selected_crew, Some(Crew::Paddy));
    }
}

//! The public client facade.

use crate::clock::now_millis;
use crate::config::Config;
use crate::dataset::Dataset;
use crate::error::{SyncError, SyncResult};
use crate::network::{AlwaysOnline, NetworkStatus};
use crate::notify::{Notification, NotificationCode, NotifyCallback};
use crate::state::EngineState;
use crate::transport::CloudHandler;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tidesync_protocol::{
    generate_hash, Action, HashMethod, ListCollisionsRequest, PendingChange, Record,
    RemoveCollisionRequest, Sha256Hash, SyncMessage,
};
use tidesync_storage::{InMemoryStorage, StorageAdapter};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Storage key of the persisted client identity.
pub const CLIENT_ID_KEY: &str = "client_id";

/// Message of the `local_update_applied` notification for a loaded dataset.
const LOAD_MESSAGE: &str = "load";

pub(crate) struct Inner<T> {
    pub transport: T,
    pub hasher: Arc<dyn HashMethod>,
    pub network: Arc<dyn NetworkStatus>,
    pub client_id: String,
    pub state: Mutex<EngineState>,
    pub monitor: Mutex<Option<JoinHandle<()>>>,
}

/// An offline-first sync client.
///
/// The client keeps a local cache of every managed dataset, applies local
/// changes to it immediately and reconciles them with the remote authority
/// in the background. Cloning is cheap; clones share one engine. Separate
/// engines are built with separate [`SyncClientBuilder`]s and share nothing.
///
/// # Example
///
/// ```rust,no_run
/// use serde_json::json;
/// use tidesync_engine::{MockCloudHandler, SyncClient};
///
/// # async fn run() -> tidesync_engine::SyncResult<()> {
/// let client = SyncClient::builder(MockCloudHandler::new()).build();
/// client.init(json!({"sync_frequency": 30}))?;
/// client.manage("todos", json!({}), None, None)?;
/// client.start();
///
/// let change = client.create("todos", json!({"title": "write tests"}))?;
/// let record = client.read("todos", &change.uid)?;
/// assert_eq!(record.data["title"], "write tests");
/// # Ok(())
/// # }
/// ```
pub struct SyncClient<T: CloudHandler> {
    pub(crate) inner: Arc<Inner<T>>,
}

impl<T: CloudHandler> Clone for SyncClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: CloudHandler> fmt::Debug for SyncClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncClient")
            .field("client_id", &self.inner.client_id)
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}

impl<T: CloudHandler> SyncClient<T> {
    /// Returns a builder for a client talking to the authority via `transport`.
    pub fn builder(transport: T) -> SyncClientBuilder<T> {
        SyncClientBuilder::new(transport)
    }

    /// Returns the identity attached to every request.
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Returns the cloud handler.
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Sets the client defaults: built-in defaults merged with `options`.
    ///
    /// Datasets managed afterwards start from these defaults. The scheduler
    /// is started separately with [`SyncClient::start`].
    pub fn init(&self, options: Value) -> SyncResult<()> {
        let config = Config::default().merged(&options)?;
        info!(sync_frequency = config.sync_frequency, "client configured");
        self.inner.state.lock().config = config;
        Ok(())
    }

    /// Registers a callback for every dataset without its own callback.
    pub fn notify_all(&self, callback: impl Fn(&Notification) + Send + Sync + 'static) {
        let callback: NotifyCallback = Arc::new(callback);
        self.inner.state.lock().notifier.set_global(callback);
    }

    /// Registers a callback for one dataset.
    pub fn notify(
        &self,
        dataset_id: &str,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) {
        let callback: NotifyCallback = Arc::new(callback);
        self.inner
            .state
            .lock()
            .notifier
            .set_dataset(dataset_id, callback);
    }

    /// Starts managing a dataset.
    ///
    /// A dataset already in memory is reconfigured. Otherwise its snapshot is
    /// loaded from storage, or an empty dataset is created. `options` are
    /// merged over the dataset's current configuration (the client defaults
    /// for a new dataset). `None` keeps the current query params or metadata.
    /// The dataset is marked for sync on the next tick.
    pub fn manage(
        &self,
        dataset_id: &str,
        options: Value,
        query_params: Option<Value>,
        meta_data: Option<Value>,
    ) -> SyncResult<()> {
        let mut state = self.inner.state.lock();

        if !state.registry.contains(dataset_id) {
            let loaded = match state.registry.load(dataset_id) {
                Ok(loaded) => loaded,
                Err(err) => {
                    state.report_storage_failure(dataset_id, &err);
                    return Err(err);
                }
            };
            let from_storage = loaded.is_some();
            let dataset = match loaded {
                Some(dataset) => {
                    info!(dataset_id, records = dataset.records.len(), "dataset loaded");
                    dataset
                }
                None => {
                    info!(dataset_id, "creating dataset");
                    Dataset::new(state.config.clone())
                }
            };
            state.registry.insert(dataset_id, dataset);
            if from_storage {
                state.notify(
                    dataset_id,
                    None,
                    NotificationCode::LocalUpdateApplied,
                    LOAD_MESSAGE,
                );
            }
        }

        let dataset = state.registry.get_mut(dataset_id)?;
        dataset.config = dataset.config.merged(&options)?;
        if let Some(query_params) = query_params {
            dataset.query_params = query_params;
        }
        if let Some(meta_data) = meta_data {
            dataset.meta_data = meta_data;
        }
        dataset.initialised = true;
        dataset.sync_pending = true;

        state.persist(dataset_id)
    }

    /// Returns every record in the dataset.
    pub fn list(&self, dataset_id: &str) -> SyncResult<BTreeMap<String, Record>> {
        let state = self.inner.state.lock();
        Ok(state.registry.get(dataset_id)?.records.clone())
    }

    /// Creates a record. The returned change's `uid` addresses the record
    /// immediately and keeps working after the authority assigns its own.
    pub fn create(&self, dataset_id: &str, data: Value) -> SyncResult<PendingChange> {
        self.apply_local(dataset_id, Action::Create, None, data)
    }

    /// Reads one record.
    pub fn read(&self, dataset_id: &str, uid: &str) -> SyncResult<Record> {
        let state = self.inner.state.lock();
        let uid = state.uid_map.resolve(uid);
        state
            .registry
            .get(dataset_id)?
            .records
            .get(uid)
            .cloned()
            .ok_or_else(|| SyncError::UnknownUid {
                dataset_id: dataset_id.to_string(),
                uid: uid.to_string(),
            })
    }

    /// Replaces a record's data.
    pub fn update(&self, dataset_id: &str, uid: &str, data: Value) -> SyncResult<PendingChange> {
        self.apply_local(dataset_id, Action::Update, Some(uid), data)
    }

    /// Deletes a record.
    pub fn delete(&self, dataset_id: &str, uid: &str) -> SyncResult<PendingChange> {
        self.apply_local(dataset_id, Action::Delete, Some(uid), Value::Null)
    }

    fn apply_local(
        &self,
        dataset_id: &str,
        action: Action,
        uid: Option<&str>,
        data: Value,
    ) -> SyncResult<PendingChange> {
        let online = self.inner.network.is_online();
        let mut state = self.inner.state.lock();
        let uid = uid.map(|uid| state.uid_map.resolve(uid).to_string());

        if !online {
            state.notify(
                dataset_id,
                uid.clone(),
                NotificationCode::OfflineUpdate,
                action.as_str(),
            );
        }

        let dataset = state.registry.get_mut(dataset_id)?;
        let change = dataset.stage_change(
            dataset_id,
            action,
            uid.as_deref(),
            data,
            now_millis(),
            self.inner.hasher.as_ref(),
        )?;
        let change = dataset.enqueue(change);
        if dataset.config.auto_sync_local_updates {
            dataset.sync_pending = true;
        }
        debug!(dataset_id, uid = %change.uid, %action, "local change applied");

        state.persist(dataset_id)?;
        state.notify(
            dataset_id,
            Some(change.uid.clone()),
            NotificationCode::LocalUpdateApplied,
            action.as_str(),
        );
        Ok(change)
    }

    /// Resumes scheduled syncing of a dataset.
    pub fn start_sync(&self, dataset_id: &str) -> SyncResult<()> {
        self.set_sync_active(dataset_id, true)
    }

    /// Pauses scheduled syncing of a dataset. A loop already running finishes.
    pub fn stop_sync(&self, dataset_id: &str) -> SyncResult<()> {
        self.set_sync_active(dataset_id, false)
    }

    fn set_sync_active(&self, dataset_id: &str, active: bool) -> SyncResult<()> {
        let mut state = self.inner.state.lock();
        state.registry.get_mut(dataset_id)?.config.sync_active = active;
        state.persist(dataset_id)
    }

    /// Marks a dataset for sync on the next tick, if syncing is active.
    pub fn do_sync(&self, dataset_id: &str) -> SyncResult<()> {
        let mut state = self.inner.state.lock();
        state.registry.get_mut(dataset_id)?.sync_pending = true;
        state.persist(dataset_id)
    }

    /// Syncs a dataset on the next tick even if syncing is paused.
    pub fn force_sync(&self, dataset_id: &str) -> SyncResult<()> {
        let mut state = self.inner.state.lock();
        state.registry.get_mut(dataset_id)?.sync_forced = true;
        state.persist(dataset_id)
    }

    /// Returns the dataset's pending changes by hash.
    pub fn get_pending(&self, dataset_id: &str) -> SyncResult<BTreeMap<String, PendingChange>> {
        let state = self.inner.state.lock();
        Ok(state.registry.get(dataset_id)?.pending.clone())
    }

    /// Discards every pending change. The optimistic records are kept.
    pub fn clear_pending(&self, dataset_id: &str) -> SyncResult<()> {
        let mut state = self.inner.state.lock();
        let dataset = state.registry.get_mut(dataset_id)?;
        let dropped = dataset.pending.len();
        dataset.pending.clear();
        warn!(dataset_id, dropped, "pending changes cleared");
        state.persist(dataset_id)
    }

    /// Returns a copy of the whole dataset.
    pub fn get_dataset(&self, dataset_id: &str) -> SyncResult<Dataset> {
        let state = self.inner.state.lock();
        state.registry.get(dataset_id).cloned()
    }

    /// Returns the query forwarded with every request.
    pub fn get_query_params(&self, dataset_id: &str) -> SyncResult<Value> {
        let state = self.inner.state.lock();
        Ok(state.registry.get(dataset_id)?.query_params.clone())
    }

    /// Replaces the query forwarded with every request.
    pub fn set_query_params(&self, dataset_id: &str, query_params: Value) -> SyncResult<()> {
        let mut state = self.inner.state.lock();
        state.registry.get_mut(dataset_id)?.query_params = query_params;
        state.persist(dataset_id)
    }

    /// Returns the metadata forwarded with every request.
    pub fn get_meta_data(&self, dataset_id: &str) -> SyncResult<Value> {
        let state = self.inner.state.lock();
        Ok(state.registry.get(dataset_id)?.meta_data.clone())
    }

    /// Replaces the metadata forwarded with every request.
    pub fn set_meta_data(&self, dataset_id: &str, meta_data: Value) -> SyncResult<()> {
        let mut state = self.inner.state.lock();
        state.registry.get_mut(dataset_id)?.meta_data = meta_data;
        state.persist(dataset_id)
    }

    /// Returns the dataset's effective configuration.
    pub fn get_config(&self, dataset_id: &str) -> SyncResult<Config> {
        let state = self.inner.state.lock();
        Ok(state.registry.get(dataset_id)?.config.clone())
    }

    /// Merges `options` into the dataset's configuration.
    pub fn set_config(&self, dataset_id: &str, options: Value) -> SyncResult<()> {
        let mut state = self.inner.state.lock();
        let dataset = state.registry.get_mut(dataset_id)?;
        dataset.config = dataset.config.merged(&options)?;
        state.persist(dataset_id)
    }

    /// Asks the authority for the collisions it recorded for this dataset.
    pub async fn list_collisions(&self, dataset_id: &str) -> SyncResult<Value> {
        let meta_data = self.get_meta_data(dataset_id)?;
        let message = SyncMessage::ListCollisions(ListCollisionsRequest { meta_data });
        self.call(dataset_id, &message).await
    }

    /// Asks the authority to discard the collision with `hash`.
    pub async fn remove_collision(&self, dataset_id: &str, hash: &str) -> SyncResult<Value> {
        let meta_data = self.get_meta_data(dataset_id)?;
        let message = SyncMessage::RemoveCollision(RemoveCollisionRequest {
            hash: hash.to_string(),
            meta_data,
        });
        self.call(dataset_id, &message).await
    }

    /// Hashes `value` the same way records and changes are hashed.
    pub fn generate_hash(&self, value: &Value) -> String {
        generate_hash(self.inner.hasher.as_ref(), value)
    }

    /// Returns the current uid for `uid`, following remaps.
    pub fn resolve_uid(&self, uid: &str) -> String {
        self.inner.state.lock().uid_map.resolve(uid).to_string()
    }

    /// Loads a dataset's snapshot into memory without managing it.
    ///
    /// Loaded datasets are not synced until [`SyncClient::manage`] is
    /// called. Returns a copy of the loaded dataset, or `None` if no
    /// snapshot exists.
    pub fn load_dataset(&self, dataset_id: &str) -> SyncResult<Option<Dataset>> {
        let mut state = self.inner.state.lock();
        let loaded = match state.registry.load(dataset_id) {
            Ok(loaded) => loaded,
            Err(err) => {
                state.report_storage_failure(dataset_id, &err);
                return Err(err);
            }
        };
        if let Some(dataset) = &loaded {
            state.registry.insert(dataset_id, dataset.clone());
        }
        Ok(loaded)
    }

    /// Forgets a dataset: drops it from memory, drops its callback, and
    /// deletes its snapshot.
    pub fn clear_cache(&self, dataset_id: &str) -> SyncResult<()> {
        let mut state = self.inner.state.lock();
        state.registry.evict(dataset_id);
        state.notifier.remove_dataset(dataset_id);
        if let Err(err) = state.registry.remove_stored(dataset_id) {
            state.report_storage_failure(dataset_id, &err);
            return Err(err);
        }
        info!(dataset_id, "dataset cache cleared");
        Ok(())
    }

    /// Returns the ids of the datasets held in memory.
    pub fn datasets(&self) -> Vec<String> {
        self.inner.state.lock().registry.ids()
    }
}

/// Builder for [`SyncClient`].
///
/// Every collaborator except the cloud handler has a default: in-memory
/// storage, SHA-256 hashing, an always-online oracle, and a random client
/// id persisted in storage.
pub struct SyncClientBuilder<T: CloudHandler> {
    transport: T,
    storage: Arc<dyn StorageAdapter>,
    hasher: Arc<dyn HashMethod>,
    network: Arc<dyn NetworkStatus>,
    client_id: Option<String>,
    instance_name: Option<String>,
    config: Config,
}

impl<T: CloudHandler> SyncClientBuilder<T> {
    /// Creates a builder for a client talking to the authority via `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            storage: Arc::new(InMemoryStorage::new()),
            hasher: Arc::new(Sha256Hash),
            network: Arc::new(AlwaysOnline),
            client_id: None,
            instance_name: None,
            config: Config::default(),
        }
    }

    /// Sets the storage adapter for dataset snapshots.
    pub fn storage(mut self, storage: impl StorageAdapter + 'static) -> Self {
        self.storage = Arc::new(storage);
        self
    }

    /// Sets a shared storage adapter.
    pub fn shared_storage(mut self, storage: Arc<dyn StorageAdapter>) -> Self {
        self.storage = storage;
        self
    }

    /// Sets the hash method for records and changes.
    pub fn hash_method(mut self, hasher: impl HashMethod + 'static) -> Self {
        self.hasher = Arc::new(hasher);
        self
    }

    /// Sets the online status oracle.
    pub fn network_status(mut self, network: impl NetworkStatus + 'static) -> Self {
        self.network = Arc::new(network);
        self
    }

    /// Uses `client_id` instead of a persisted random id.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Prefixes the persisted client id, to tell apps sharing storage apart.
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    /// Sets the client defaults. Equivalent to calling [`SyncClient::init`].
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Builds the client.
    pub fn build(self) -> SyncClient<T> {
        let client_id = match self.client_id {
            Some(id) => id,
            None => {
                let id = persisted_client_id(self.storage.as_ref());
                match self.instance_name {
                    Some(prefix) => format!("{prefix}-{id}"),
                    None => id,
                }
            }
        };

        let mut state = EngineState::new(self.storage);
        state.config = self.config;

        SyncClient {
            inner: Arc::new(Inner {
                transport: self.transport,
                hasher: self.hasher,
                network: self.network,
                client_id,
                state: Mutex::new(state),
                monitor: Mutex::new(None),
            }),
        }
    }
}

/// Reads the installation's client id, generating and saving one if needed.
fn persisted_client_id(storage: &dyn StorageAdapter) -> String {
    match storage.load(CLIENT_ID_KEY) {
        Ok(Some(bytes)) => {
            if let Ok(id) = String::from_utf8(bytes) {
                if !id.is_empty() {
                    return id;
                }
            }
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "failed to read client id"),
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = storage.save(CLIENT_ID_KEY, id.as_bytes()) {
        warn!(error = %e, "failed to persist client id");
    }
    id
}

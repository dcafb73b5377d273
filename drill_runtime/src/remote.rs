// Remote word-table store and the workflows that mirror it locally.
//
// Every workflow calls the remote first and dispatches ordinary actions only
// once the call succeeded, so a remote failure leaves local state untouched.
// Review lists never exist remotely and are handled locally.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use thiserror::Error;
use tracing::{debug, info, warn};

use drill_engine::actions::Action;
use drill_engine::domain::{ListItem, Millis, RemoteList, Transition};
use drill_engine::lists::{is_reserved_list, parse_remote_time};

use crate::session::SharedStore;

/// Terms created per remote request by `add_terms`.
pub const ADD_TERMS_BATCH: usize = 50;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Remote rejected request: {0}")]
    Rejected(String),

    #[error("Remote record not found: {0}")]
    NotFound(String),
}

/// A word record under a remote table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    pub id: String,
    pub term: String,
    /// RFC 3339 creation time, when the store reports one.
    pub created_time: Option<String>,
}

#[async_trait]
pub trait RemoteListStore: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<RemoteList>, RemoteError>;
    async fn fetch_items(&self, table_id: &str) -> Result<Vec<RemoteItem>, RemoteError>;
    async fn create_table(&self, name: &str) -> Result<RemoteList, RemoteError>;
    async fn rename_table(&self, table_id: &str, name: &str) -> Result<(), RemoteError>;
    async fn delete_table(&self, table_id: &str) -> Result<(), RemoteError>;
    /// Create one record per term, returned in input order.
    async fn create_items(&self, table_id: &str, terms: &[String])
        -> Result<Vec<RemoteItem>, RemoteError>;
    async fn update_item(&self, item_id: &str, term: &str) -> Result<(), RemoteError>;
    async fn delete_items(&self, item_ids: &[String]) -> Result<(), RemoteError>;
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Debug, Default)]
struct MemoryTables {
    tables: Vec<RemoteList>,
    items: BTreeMap<String, Vec<RemoteItem>>,
    next_id: u64,
    create_calls: usize,
    fail_create_call: Option<usize>,
}

impl MemoryTables {
    fn issue(&mut self) -> (String, String) {
        self.next_id += 1;
        let created = DateTime::from_timestamp(1_700_000_000 + self.next_id as i64, 0)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        (format!("rec{}", self.next_id), created)
    }
}

/// Remote store held in memory. Ids are `rec1`, `rec2`, ...; creation times
/// advance one second per record.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    inner: Mutex<MemoryTables>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the n-th (1-based) `create_items` call fail.
    pub fn fail_create_call(self, n: usize) -> Self {
        if let Ok(mut t) = self.inner.lock() {
            t.fail_create_call = Some(n);
        }
        self
    }

    pub fn create_calls(&self) -> usize {
        self.inner.lock().map(|t| t.create_calls).unwrap_or_default()
    }

    fn with<T>(
        &self,
        f: impl FnOnce(&mut MemoryTables) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let mut tables = self
            .inner
            .lock()
            .map_err(|_| RemoteError::Transport("remote state poisoned".into()))?;
        f(&mut tables)
    }
}

#[async_trait]
impl RemoteListStore for MemoryRemote {
    async fn list_tables(&self) -> Result<Vec<RemoteList>, RemoteError> {
        self.with(|t| Ok(t.tables.clone()))
    }

    async fn fetch_items(&self, table_id: &str) -> Result<Vec<RemoteItem>, RemoteError> {
        self.with(|t| {
            t.items
                .get(table_id)
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(table_id.to_string()))
        })
    }

    async fn create_table(&self, name: &str) -> Result<RemoteList, RemoteError> {
        self.with(|t| {
            let (id, created) = t.issue();
            let table = RemoteList {
                id: id.clone(),
                table_name: name.to_string(),
                create_time: Some(created),
                created_time: None,
            };
            t.tables.push(table.clone());
            t.items.insert(id, Vec::new());
            Ok(table)
        })
    }

    async fn rename_table(&self, table_id: &str, name: &str) -> Result<(), RemoteError> {
        self.with(|t| {
            let table = t
                .tables
                .iter_mut()
                .find(|l| l.id == table_id)
                .ok_or_else(|| RemoteError::NotFound(table_id.to_string()))?;
            table.table_name = name.to_string();
            Ok(())
        })
    }

    async fn delete_table(&self, table_id: &str) -> Result<(), RemoteError> {
        self.with(|t| {
            let before = t.tables.len();
            t.tables.retain(|l| l.id != table_id);
            if t.tables.len() == before {
                return Err(RemoteError::NotFound(table_id.to_string()));
            }
            t.items.remove(table_id);
            Ok(())
        })
    }

    async fn create_items(
        &self,
        table_id: &str,
        terms: &[String],
    ) -> Result<Vec<RemoteItem>, RemoteError> {
        self.with(|t| {
            t.create_calls += 1;
            if t.fail_create_call == Some(t.create_calls) {
                return Err(RemoteError::Transport("connection reset".into()));
            }
            if !t.items.contains_key(table_id) {
                return Err(RemoteError::NotFound(table_id.to_string()));
            }
            let mut created = Vec::with_capacity(terms.len());
            for term in terms {
                let (id, time) = t.issue();
                created.push(RemoteItem {
                    id,
                    term: term.clone(),
                    created_time: Some(time),
                });
            }
            if let Some(items) = t.items.get_mut(table_id) {
                items.extend(created.iter().cloned());
            }
            Ok(created)
        })
    }

    async fn update_item(&self, item_id: &str, term: &str) -> Result<(), RemoteError> {
        self.with(|t| {
            let item = t
                .items
                .values_mut()
                .flat_map(|items| items.iter_mut())
                .find(|i| i.id == item_id)
                .ok_or_else(|| RemoteError::NotFound(item_id.to_string()))?;
            item.term = term.to_string();
            Ok(())
        })
    }

    async fn delete_items(&self, item_ids: &[String]) -> Result<(), RemoteError> {
        self.with(|t| {
            for items in t.items.values_mut() {
                items.retain(|i| !item_ids.contains(&i.id));
            }
            Ok(())
        })
    }
}

// =============================================================================
// Sync workflows
// =============================================================================

pub struct RemoteSync<R> {
    remote: R,
    store: SharedStore,
    batch_pause: Duration,
}

impl<R: RemoteListStore> RemoteSync<R> {
    pub fn new(remote: R, store: SharedStore) -> Self {
        Self {
            remote,
            store,
            batch_pause: Duration::from_millis(500),
        }
    }

    /// Pause between `add_terms` batches.
    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    fn now(&self) -> Millis {
        self.store.read(|_, clock| clock.now_ms())
    }

    fn to_list_item(item: RemoteItem, now: Millis) -> ListItem {
        let created_at = parse_remote_time(item.created_time.as_deref()).unwrap_or(now);
        ListItem::new(item.id, item.term, created_at)
    }

    /// Refresh the local list set from the remote table listing.
    pub async fn pull_lists(&self) -> Result<Transition, RemoteError> {
        let remote = self.remote.list_tables().await?;
        info!(tables = remote.len(), "remote lists pulled");
        Ok(self.store.dispatch(&Action::ListsSync { remote }))
    }

    /// Replace a list's items with the remote's.
    pub async fn pull_items(&self, list_id: &str) -> Result<Transition, RemoteError> {
        let fetched = self.remote.fetch_items(list_id).await?;
        let now = self.now();
        let items = fetched
            .into_iter()
            .map(|i| Self::to_list_item(i, now))
            .collect();
        Ok(self.store.dispatch(&Action::ItemsReplace {
            list_id: list_id.to_string(),
            items,
        }))
    }

    /// Create a list remotely, then locally under the remote id.
    pub async fn create_list(&self, name: &str) -> Result<String, RemoteError> {
        let table = self.remote.create_table(name).await?;
        let created_at = parse_remote_time(table.create_time.as_deref())
            .or_else(|| parse_remote_time(table.created_time.as_deref()));
        self.store.dispatch(&Action::ListsCreate {
            name: name.to_string(),
            id: Some(table.id.clone()),
            created_at,
        });
        Ok(table.id)
    }

    pub async fn rename_list(&self, list_id: &str, name: &str) -> Result<Transition, RemoteError> {
        if !is_reserved_list(list_id) {
            self.remote.rename_table(list_id, name).await?;
        }
        Ok(self.store.dispatch(&Action::ListsRename {
            list_id: list_id.to_string(),
            name: name.to_string(),
        }))
    }

    /// Delete the table's items, the table, then the local list.
    pub async fn delete_list(&self, list_id: &str) -> Result<Transition, RemoteError> {
        if !is_reserved_list(list_id) {
            let items = self.remote.fetch_items(list_id).await?;
            if !items.is_empty() {
                let ids: Vec<String> = items.into_iter().map(|i| i.id).collect();
                self.remote.delete_items(&ids).await?;
            }
            self.remote.delete_table(list_id).await?;
        }
        Ok(self.store.dispatch(&Action::ListsDelete {
            list_id: list_id.to_string(),
        }))
    }

    /// Create or rename one term, then restart the list's session.
    /// Returns the item id.
    pub async fn save_item(
        &self,
        list_id: &str,
        item_id: Option<&str>,
        term: &str,
    ) -> Result<String, RemoteError> {
        let now = self.now();
        let item = match item_id {
            Some(id) => {
                if !is_reserved_list(list_id) {
                    self.remote.update_item(id, term).await?;
                }
                let created_at = self
                    .store
                    .read(|s, _| s.item(list_id, id).map(|i| i.created_at))
                    .unwrap_or(now);
                ListItem::new(id, term, created_at)
            }
            None if is_reserved_list(list_id) => {
                ListItem::new(self.store.read(|_, c| c.new_id()), term, now)
            }
            None => {
                let created = self
                    .remote
                    .create_items(list_id, &[term.to_string()])
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| RemoteError::Rejected("no record created".into()))?;
                Self::to_list_item(created, now)
            }
        };
        let id = item.id.clone();
        self.store.dispatch_all(&[
            Action::ItemsUpsert {
                list_id: list_id.to_string(),
                item,
            },
            Action::PracticeEnsure {
                list_id: list_id.to_string(),
                reshuffle: true,
                mode: None,
            },
        ]);
        Ok(id)
    }

    /// Add many terms in batches of `ADD_TERMS_BATCH`. Each created batch is
    /// applied as it lands; the session restarts once all batches are in.
    /// A failed batch stops the import and applies nothing further.
    pub async fn add_terms(&self, list_id: &str, terms: &[String]) -> Result<usize, RemoteError> {
        let terms: Vec<String> = terms
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let mut added = 0;

        if is_reserved_list(list_id) {
            let items = self.store.read(|_, clock| {
                terms
                    .iter()
                    .map(|t| ListItem::new(clock.new_id(), t.clone(), clock.now_ms()))
                    .collect::<Vec<_>>()
            });
            added = items.len();
            self.store.dispatch(&Action::ItemsBulkUpsert {
                list_id: list_id.to_string(),
                items,
            });
        } else {
            let batches: Vec<&[String]> = terms.chunks(ADD_TERMS_BATCH).collect();
            for (n, batch) in batches.iter().enumerate() {
                let created = match self.remote.create_items(list_id, batch).await {
                    Ok(created) => created,
                    Err(err) => {
                        warn!(list_id, batch = n + 1, added, error = %err, "term import stopped");
                        return Err(err);
                    }
                };
                let now = self.now();
                let items: Vec<ListItem> = created
                    .into_iter()
                    .map(|i| Self::to_list_item(i, now))
                    .collect();
                added += items.len();
                self.store.dispatch(&Action::ItemsBulkUpsert {
                    list_id: list_id.to_string(),
                    items,
                });
                debug!(list_id, batch = n + 1, of = batches.len(), "term batch added");
                if n + 1 < batches.len() && !self.batch_pause.is_zero() {
                    tokio::time::sleep(self.batch_pause).await;
                }
            }
        }

        self.store.dispatch(&Action::PracticeEnsure {
            list_id: list_id.to_string(),
            reshuffle: true,
            mode: None,
        });
        info!(list_id, added, "terms added");
        Ok(added)
    }

    pub async fn remove_item(&self, list_id: &str, item_id: &str) -> Result<Transition, RemoteError> {
        if !is_reserved_list(list_id) {
            self.remote.delete_items(&[item_id.to_string()]).await?;
        }
        let outcomes = self.store.dispatch_all(&[
            Action::ItemsDelete {
                list_id: list_id.to_string(),
                item_id: item_id.to_string(),
            },
            Action::PracticeEnsure {
                list_id: list_id.to_string(),
                reshuffle: true,
                mode: None,
            },
        ]);
        Ok(outcomes
            .into_iter()
            .next()
            .unwrap_or_else(|| Transition::skipped("items/delete", "nothing dispatched")))
    }
}

//! # In-Memory Store
//!
//! A process-local implementation of the storage collaborator contract:
//! `find(query, filters) -> (rows, total)`, `get_by_id`, `create`, `save`,
//! `delete`.
//!
//! All operations are synchronous (the lock is `parking_lot`, not
//! `tokio::sync`) because the lock is never held across an `.await`.
//! Reads take the request context and return [`ResourceError::Cancelled`]
//! once the client has disconnected; writes never look at it.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::ResourceError;
use crate::filter::{compare_scalars, scalar_text, FilterParam};
use crate::query::ListQuery;

/// A row that can live in a [`MemoryStore`].
pub trait Record: Clone + Serialize + Send + Sync + 'static {
    /// Server-assigned identifier.
    fn id(&self) -> u64;

    /// Overwrite the identifier (called by the store on create/save).
    fn set_id(&mut self, id: u64);
}

/// Thread-safe, cloneable in-memory table keyed by `u64`.
#[derive(Debug)]
pub struct MemoryStore<T: Record> {
    rows: Arc<RwLock<BTreeMap<u64, T>>>,
    next_id: Arc<AtomicU64>,
}

impl<T: Record> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T: Record> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> MemoryStore<T> {
    /// Create an empty store. Ids start at 1.
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Parse a path id. An unparseable id addresses nothing.
    pub fn parse_id(raw: &str, entity: &str) -> Result<u64, ResourceError> {
        raw.trim()
            .parse()
            .map_err(|_| ResourceError::NotFound(format!("{entity} {raw}")))
    }

    /// Filter, sort, and paginate.
    ///
    /// `total` counts rows matching the filters before pagination.
    pub fn find(
        &self,
        query: &ListQuery,
        filters: &[FilterParam],
        ctx: &RequestContext,
    ) -> Result<(Vec<T>, i64), ResourceError> {
        let order = sort_order(query)?;
        let snapshot: Vec<T> = self.rows.read().values().cloned().collect();
        if ctx.client_disconnected() {
            return Err(ResourceError::Cancelled);
        }

        let mut matched = Vec::with_capacity(snapshot.len());
        for row in snapshot {
            let json = serde_json::to_value(&row)
                .map_err(|e| ResourceError::Storage(format!("row serialization failed: {e}")))?;
            if filters.iter().all(|f| f.matches(&json)) && matches_query_filter(query, &json) {
                matched.push((row, json));
            }
        }

        if !order.is_empty() {
            matched.sort_by(|(_, a), (_, b)| {
                for (field, descending) in &order {
                    let ord = compare_fields(a.get(field), b.get(field));
                    let ord = if *descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let total = matched.len() as i64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let rows = matched
            .into_iter()
            .skip(offset)
            .take(query.limit() as usize)
            .map(|(row, _)| row)
            .collect();
        Ok((rows, total))
    }

    /// Fetch one row.
    pub fn get_by_id(&self, id: u64, entity: &str, ctx: &RequestContext) -> Result<T, ResourceError> {
        if ctx.client_disconnected() {
            return Err(ResourceError::Cancelled);
        }
        self.rows
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(format!("{entity} {id}")))
    }

    /// Insert a row under a freshly assigned id.
    pub fn create(&self, mut row: T) -> T {
        let id = self.next_id.fetch_add(1, AtomicOrdering::SeqCst);
        row.set_id(id);
        self.rows.write().insert(id, row.clone());
        row
    }

    /// Overwrite an existing row. The stored row keeps `id`.
    pub fn save(&self, id: u64, mut row: T, entity: &str) -> Result<T, ResourceError> {
        row.set_id(id);
        let mut guard = self.rows.write();
        match guard.get_mut(&id) {
            Some(slot) => {
                *slot = row.clone();
                Ok(row)
            }
            None => Err(ResourceError::NotFound(format!("{entity} {id}"))),
        }
    }

    /// Remove a row. Returns whether anything was removed.
    pub fn delete(&self, id: u64) -> bool {
        self.rows.write().remove(&id).is_some()
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the row lock can be taken within `timeout`.
    pub fn ping(&self, timeout: Duration) -> Result<(), ResourceError> {
        self.rows
            .try_read_for(timeout)
            .map(|_| ())
            .ok_or_else(|| ResourceError::Storage("row lock not acquired in time".into()))
    }
}

fn sort_order(query: &ListQuery) -> Result<Vec<(String, bool)>, ResourceError> {
    query
        .sort()
        .iter()
        .map(|(field, dir)| match dir.trim().to_ascii_lowercase().as_str() {
            "" | "asc" => Ok((field.clone(), false)),
            "desc" => Ok((field.clone(), true)),
            other => Err(ResourceError::Unprocessable(format!(
                "unknown sort direction {other:?} for field {field}"
            ))),
        })
        .collect()
}

fn matches_query_filter(query: &ListQuery, row: &Value) -> bool {
    query.filter().iter().all(|(field, expected)| {
        row.get(field)
            .and_then(scalar_text)
            .is_some_and(|actual| &actual == expected)
    })
}

/// Missing and incomparable values sort first.
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_scalars(a, b).unwrap_or(Ordering::Equal),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

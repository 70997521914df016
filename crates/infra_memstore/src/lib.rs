//! In-memory document store adapter
//!
//! Reference implementation of the [`DocumentStore`] port backed by nested
//! maps behind a single `RwLock`. Batches are applied under one write lock,
//! so readers observe them all-or-nothing; update/delete targets are
//! validated before anything is touched, so a failing batch leaves the
//! store unchanged.
//!
//! Intended for tests and embedding; a production deployment supplies its
//! own adapter over a real document database.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use core_kernel::{
    Document, DocumentStore, Filter, FilterOp, Query, SortOrder, StoreError, WriteBatch, WriteOp,
};

type Collection = BTreeMap<String, Document>;

/// In-memory [`DocumentStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_poisoned() -> StoreError {
        StoreError::Backend("store lock poisoned".to_string())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().map_err(|_| Self::lock_poisoned())?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().map_err(|_| Self::lock_poisoned())?;
        let mut results: Vec<Document> = match collections.get(collection) {
            Some(docs) => docs
                .values()
                .filter(|doc| query.filters.iter().all(|f| matches(doc, f)))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        if let Some((field, order)) = &query.order_by {
            results.sort_by(|a, b| {
                let ordering = match (a.get(field), b.get(field)) {
                    (Some(x), Some(y)) => value_cmp(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }

        let offset = query.offset.unwrap_or(0);
        let mut results: Vec<Document> = results.into_iter().skip(offset).collect();
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn add(&self, collection: &str, data: Document) -> Result<String, StoreError> {
        let mut collections = self.collections.write().map_err(|_| Self::lock_poisoned())?;
        let id = Uuid::new_v4().to_string();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Document) -> Result<(), StoreError> {
        let mut collections = self.collections.write().map_err(|_| Self::lock_poisoned())?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn set_checked(
        &self,
        collection: &str,
        id: &str,
        data: Document,
        expected_revision: u64,
    ) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().map_err(|_| Self::lock_poisoned())?;
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        let current = docs
            .get(id)
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        let stored_revision = current
            .get("revision")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if stored_revision != expected_revision {
            return Ok(false);
        }
        docs.insert(id.to_string(), data);
        Ok(true)
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> Result<(), StoreError> {
        let mut collections = self.collections.write().map_err(|_| Self::lock_poisoned())?;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        for (key, value) in patch {
            doc.insert(key, value);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().map_err(|_| Self::lock_poisoned())?;
        let removed = collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id));
        if removed.is_none() {
            return Err(StoreError::not_found(collection, id));
        }
        Ok(())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut collections = self.collections.write().map_err(|_| Self::lock_poisoned())?;
        let ops = batch.into_ops();

        // Validate every target before touching anything
        for op in &ops {
            if let WriteOp::Update { collection, id, .. } | WriteOp::Delete { collection, id } = op
            {
                let exists = collections
                    .get(collection)
                    .is_some_and(|docs| docs.contains_key(id));
                if !exists {
                    return Err(StoreError::not_found(collection.clone(), id.clone()));
                }
            }
        }

        for op in ops {
            match op {
                WriteOp::Set {
                    collection,
                    id,
                    data,
                } => {
                    collections.entry(collection).or_default().insert(id, data);
                }
                WriteOp::Update {
                    collection,
                    id,
                    patch,
                } => {
                    // Existence checked above
                    if let Some(doc) = collections
                        .get_mut(&collection)
                        .and_then(|docs| docs.get_mut(&id))
                    {
                        for (key, value) in patch {
                            doc.insert(key, value);
                        }
                    }
                }
                WriteOp::Delete { collection, id } => {
                    if let Some(docs) = collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}

fn matches(doc: &Document, filter: &Filter) -> bool {
    let Some(actual) = doc.get(&filter.field) else {
        return false;
    };
    let Some(ordering) = value_cmp(actual, &filter.value) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => ordering == Ordering::Equal,
        FilterOp::Ne => ordering != Ordering::Equal,
        FilterOp::Lt => ordering == Ordering::Less,
        FilterOp::Lte => ordering != Ordering::Greater,
        FilterOp::Gt => ordering == Ordering::Greater,
        FilterOp::Gte => ordering != Ordering::Less,
    }
}

fn value_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn set_and_get_round_trip() {
        let store = MemoryStore::new();
        store
            .set("invoices", "a", doc(&[("amount_due", json!(10))]))
            .await
            .unwrap();

        let fetched = store.get("invoices", "a").await.unwrap().unwrap();
        assert_eq!(fetched["amount_due"], json!(10));
        assert!(store.get("invoices", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn add_assigns_an_id() {
        let store = MemoryStore::new();
        let id = store
            .add("invoices", doc(&[("status", json!("OPEN"))]))
            .await
            .unwrap();
        assert!(store.get("invoices", &id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        for (id, tenant, due) in [("a", "t1", 30), ("b", "t1", 10), ("c", "t2", 20)] {
            store
                .set(
                    "invoices",
                    id,
                    doc(&[("tenant_id", json!(tenant)), ("amount_due", json!(due))]),
                )
                .await
                .unwrap();
        }

        let query = Query::new()
            .filter_eq("tenant_id", "t1")
            .filter("amount_due", FilterOp::Gt, json!(5))
            .order_by("amount_due", SortOrder::Descending)
            .limit(1);
        let results = store.query("invoices", &query).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["amount_due"], json!(30));
    }

    #[tokio::test]
    async fn update_merges_shallowly() {
        let store = MemoryStore::new();
        store
            .set(
                "invoices",
                "a",
                doc(&[("status", json!("OPEN")), ("amount_due", json!(10))]),
            )
            .await
            .unwrap();
        store
            .update("invoices", "a", doc(&[("status", json!("PAID"))]))
            .await
            .unwrap();

        let fetched = store.get("invoices", "a").await.unwrap().unwrap();
        assert_eq!(fetched["status"], json!("PAID"));
        assert_eq!(fetched["amount_due"], json!(10));
    }

    #[tokio::test]
    async fn update_missing_document_errors() {
        let store = MemoryStore::new();
        let err = store
            .update("invoices", "ghost", Document::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn set_checked_rejects_stale_revision() {
        let store = MemoryStore::new();
        store
            .set("invoices", "a", doc(&[("revision", json!(3))]))
            .await
            .unwrap();

        let stale = store
            .set_checked("invoices", "a", doc(&[("revision", json!(9))]), 2)
            .await
            .unwrap();
        assert!(!stale);

        let applied = store
            .set_checked("invoices", "a", doc(&[("revision", json!(4))]), 3)
            .await
            .unwrap();
        assert!(applied);
        let fetched = store.get("invoices", "a").await.unwrap().unwrap();
        assert_eq!(fetched["revision"], json!(4));
    }

    #[tokio::test]
    async fn failed_batch_applies_nothing() {
        let store = MemoryStore::new();
        store
            .set("methods", "a", doc(&[("is_default", json!(true))]))
            .await
            .unwrap();

        let mut batch = WriteBatch::new();
        batch.update("methods", "a", doc(&[("is_default", json!(false))]));
        batch.update("methods", "ghost", doc(&[("is_default", json!(false))]));
        batch.set("methods", "b", doc(&[("is_default", json!(true))]));

        let err = store.commit(batch).await.unwrap_err();
        assert!(err.is_not_found());

        // Nothing from the batch landed
        let a = store.get("methods", "a").await.unwrap().unwrap();
        assert_eq!(a["is_default"], json!(true));
        assert!(store.get("methods", "b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn successful_batch_applies_everything() {
        let store = MemoryStore::new();
        store
            .set("methods", "a", doc(&[("is_default", json!(true))]))
            .await
            .unwrap();

        let mut batch = WriteBatch::new();
        batch.update("methods", "a", doc(&[("is_default", json!(false))]));
        batch.set("methods", "b", doc(&[("is_default", json!(true))]));
        store.commit(batch).await.unwrap();

        let a = store.get("methods", "a").await.unwrap().unwrap();
        let b = store.get("methods", "b").await.unwrap().unwrap();
        assert_eq!(a["is_default"], json!(false));
        assert_eq!(b["is_default"], json!(true));
    }
}

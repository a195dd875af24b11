// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # The compiled-artifact cache
//!
//! Process-wide, keyed by the canonical encoding of the planned tree,
//! weak-valued so artifacts die with their last compiled query. Under
//! contention a losing build is discarded: exactly one artifact is
//! published per key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::compiled::PlanArtifact;

type Cache = Mutex<HashMap<Vec<u8>, Weak<PlanArtifact>>>;

fn cache() -> &'static Cache {
    static CACHE: OnceLock<Cache> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Publish an artifact, or return the already-published winner for the
/// same key. Dead entries are replaced in place.
pub fn intern(artifact: Arc<PlanArtifact>) -> Arc<PlanArtifact> {
    let mut map = cache().lock().expect("artifact cache");
    match map.get(artifact.key()) {
        Some(existing) => {
            if let Some(live) = existing.upgrade() {
                tracing::debug!("compiled artifact cache hit");
                return live;
            }
            map.insert(artifact.key().to_vec(), Arc::downgrade(&artifact));
            artifact
        }
        None => {
            map.insert(artifact.key().to_vec(), Arc::downgrade(&artifact));
            artifact
        }
    }
}

/// Drop dead entries; called opportunistically by tests and long-lived
/// processes.
pub fn sweep() {
    let mut map = cache().lock().expect("artifact cache");
    map.retain(|_, weak| weak.strong_count() > 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::{RelationExpr, TableExpr};
    use relq_store::{QueryPlan, StoreResult, Table, TableRef};
    use relq_types::{Column, Primitive, TupleType, Type, Value};
    use std::sync::Arc;

    struct Empty;

    impl Table for Empty {
        fn row_type(&self) -> Arc<TupleType> {
            TupleType::shared(vec![Column::new("a", Type::basic(Primitive::Long))]).unwrap()
        }
        fn new_scanner(
            &self,
            _args: &[Value],
        ) -> StoreResult<Box<dyn relq_store::Scanner>> {
            Ok(Box::new(relq_store::VecScanner::new(Vec::new())))
        }
        fn view(&self, _q: &str, _a: &[Value]) -> StoreResult<TableRef> {
            unimplemented!()
        }
        fn scan_plan(&self) -> QueryPlan {
            QueryPlan::Scan { table: "empty".into() }
        }
        fn describe(&self) -> String {
            "empty".into()
        }
    }

    fn artifact(table: &TableRef) -> Arc<PlanArtifact> {
        let root = RelationExpr::Table(TableExpr {
            table: Arc::clone(table),
            row_type: table.row_type(),
        });
        PlanArtifact::new(root, 0)
    }

    #[test]
    fn test_one_winner_per_key() {
        let table: TableRef = Arc::new(Empty);
        let a = intern(artifact(&table));
        let b = intern(artifact(&table));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_weak_reclamation() {
        let table: TableRef = Arc::new(Empty);
        let key = {
            let a = intern(artifact(&table));
            a.key().to_vec()
        };
        // The artifact is dead now; a new build republishes.
        sweep();
        let b = intern(artifact(&table));
        assert_eq!(b.key(), &key[..]);
    }
}

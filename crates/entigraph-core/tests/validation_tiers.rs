//! # Validation Tier Tests (T0-T4)
//!
//! Store guarantees, checked against every storage medium.
//!
//! ## Tiers
//! - T0: Version chain integrity and type immutability
//! - T1: Link reindexing
//! - T2: Aggregation (pagination, filters)
//! - T3: Transaction atomicity and nesting
//! - T4: Concurrent serialization

use entigraph_core::{
    AccountId, AggregateOperation, Collection, EntityId, Filter, FilterOperator, GraphError,
    MultiFilter, NewEntity, NewLink, PropertyValue, SortField, Store, StoreConfig,
};
use uuid::Uuid;

fn account() -> AccountId {
    AccountId(Uuid::from_u128(0xACC))
}

fn creator() -> EntityId {
    EntityId(Uuid::from_u128(0xC0))
}

fn title(text: &str) -> PropertyValue {
    PropertyValue::from_pairs([("title", text)])
}

/// Run `check` against an in-memory store and a redb-backed store.
fn on_each_medium(check: impl Fn(&Store)) {
    check(&Store::in_memory());

    let temp = tempfile::tempdir().expect("temp dir");
    let store = Store::open(temp.path().join("tiers.redb"), StoreConfig::default()).expect("open");
    check(&store);
}

// =============================================================================
// TIER T0: VERSION CHAINS
// =============================================================================

mod t0_version_chains {
    use super::*;

    /// T0.1: N updates yield N+1 versions, newest first, tail preserved.
    #[test]
    fn chain_integrity() {
        on_each_medium(|store| {
            let first = store
                .create_entity(NewEntity::new(account(), creator(), "Page", title("v0")).versioned())
                .expect("create entity");

            let updates = 7;
            for n in 1..updates {
                store
                    .update_entity(account(), first.entity_id, Some("Page"), title(&format!("v{n}")))
                    .expect("update entity");
            }
            let chain = store
                .update_entity(account(), first.entity_id, Some("Page"), title("last"))
                .expect("update entity");

            assert_eq!(chain.len(), updates + 1);
            assert!(chain.windows(2).all(|w| w[0].created_at > w[1].created_at));
            assert!(chain.iter().all(|v| v.metadata_id == first.metadata_id));
            let tail = chain.last().expect("chain tail");
            assert_eq!(tail.entity_id, first.entity_id);
            assert_eq!(tail.created_at, first.created_at);

            let mut ids: Vec<_> = chain.iter().map(|v| v.entity_id).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), chain.len());
        });
    }

    /// T0.2: Every historical id still returns its frozen snapshot.
    #[test]
    fn history_is_frozen() {
        on_each_medium(|store| {
            let first = store
                .create_entity(NewEntity::new(account(), creator(), "Page", title("v0")).versioned())
                .expect("create entity");
            let chain = store
                .update_entity(account(), first.entity_id, None, title("v1"))
                .expect("update entity");

            for version in &chain {
                let fetched = store
                    .get_entity(account(), version.entity_id, false)
                    .expect("get entity")
                    .expect("entity present");
                assert_eq!(&fetched, version);
            }
        });
    }

    /// T0.3: A mismatched expected type fails and changes nothing.
    #[test]
    fn type_immutability() {
        on_each_medium(|store| {
            let page = store
                .create_entity(NewEntity::new(account(), creator(), "Page", title("p")).versioned())
                .expect("create entity");
            let before = store.stats().expect("stats");

            let result = store.update_entity(account(), page.entity_id, Some("Block"), title("x"));
            assert!(matches!(result, Err(GraphError::TypeMismatch { .. })));

            assert_eq!(store.stats().expect("stats"), before);
            let head = store.get_entity(account(), page.entity_id, true).expect("get entity").expect("entity present");
            assert_eq!(head, page);
        });
    }
}

// =============================================================================
// TIER T1: LINK REINDEXING
// =============================================================================

mod t1_link_reindexing {
    use super::*;

    /// T1.1: Insert at 0 shifts the group; deleting 0 restores it.
    #[test]
    fn insert_then_delete_round_trip() {
        on_each_medium(|store| {
            let page = store
                .create_entity(NewEntity::new(account(), creator(), "Page", title("p")))
                .expect("create entity");
            let mut blocks = Vec::new();
            for n in 0..4 {
                let block = store
                    .create_entity(NewEntity::new(account(), creator(), "Block", title(&n.to_string())))
                    .expect("create entity");
                store
                    .create_link(NewLink::new(account(), page.entity_id, account(), block.entity_id, "contents"))
                    .expect("create link");
                blocks.push(block.entity_id);
            }
            let original = store.get_link_group(account(), page.entity_id, "contents").expect("link group");

            let head = store
                .create_entity(NewEntity::new(account(), creator(), "Block", title("head")))
                .expect("create entity");
            store
                .create_link(
                    NewLink::new(account(), page.entity_id, account(), head.entity_id, "contents").at_index(0),
                )
                .expect("create link");

            let shifted = store.get_link_group(account(), page.entity_id, "contents").expect("link group");
            assert_eq!(shifted.len(), 5);
            assert_eq!(shifted[0].destination_entity_id, head.entity_id);
            for (k, link) in shifted.iter().enumerate().skip(1) {
                assert_eq!(link.index, k);
                assert_eq!(link.destination_entity_id, blocks[k - 1]);
            }

            assert!(store.delete_link(account(), page.entity_id, "contents", 0).expect("delete link"));
            assert_eq!(store.get_link_group(account(), page.entity_id, "contents").expect("link group"), original);
        });
    }

    /// T1.2: Deleting a missing position is `false`, not an error.
    #[test]
    fn delete_missing_is_false() {
        on_each_medium(|store| {
            let page = store
                .create_entity(NewEntity::new(account(), creator(), "Page", title("p")))
                .expect("create entity");
            assert!(!store.delete_link(account(), page.entity_id, "contents", 0).expect("delete link"));
        });
    }
}

// =============================================================================
// TIER T2: AGGREGATION
// =============================================================================

mod t2_aggregation {
    use super::*;

    fn seed(store: &Store, count: usize) {
        for n in 0..count {
            store
                .create_entity(NewEntity::new(account(), creator(), "Item", title(&format!("item {n:02}"))))
                .expect("create entity");
        }
    }

    fn items() -> Collection {
        Collection::EntityType {
            account_id: account(),
            entity_type: "Item".to_string(),
        }
    }

    /// T2.1: 25 items at 10 per page.
    #[test]
    fn pagination() {
        on_each_medium(|store| {
            seed(store, 25);

            let third = store
                .aggregate(&items(), &AggregateOperation::default().page(3, 10))
                .expect("aggregate");
            assert_eq!(third.operation.page_count, 3);
            assert_eq!(third.results.len(), 5);

            let fourth = store
                .aggregate(&items(), &AggregateOperation::default().page(4, 10))
                .expect("aggregate");
            assert!(fourth.results.is_empty());
            assert_eq!(fourth.operation.page_count, 3);
        });
    }

    /// T2.2: STARTS_WITH matches, IS_NOT excludes.
    #[test]
    fn filter_correctness() {
        on_each_medium(|store| {
            store
                .create_entity(NewEntity::new(account(), creator(), "Item", title("Hello World")))
                .expect("create entity");

            let starts = AggregateOperation::default().filtered_by(MultiFilter::all(vec![Filter::new(
                "title",
                FilterOperator::StartsWith,
                "Hello",
            )]));
            assert_eq!(store.aggregate(&items(), &starts).expect("aggregate").results.len(), 1);

            let is_not = AggregateOperation::default().filtered_by(MultiFilter::all(vec![Filter::new(
                "title",
                FilterOperator::IsNot,
                "Hello World",
            )]));
            assert!(store.aggregate(&items(), &is_not).expect("aggregate").results.is_empty());
        });
    }

    /// T2.3: Link-group collections follow link order.
    #[test]
    fn link_group_collection() {
        on_each_medium(|store| {
            let page = store
                .create_entity(NewEntity::new(account(), creator(), "Page", title("p")))
                .expect("create entity");
            for name in ["b", "a", "c"] {
                let block = store
                    .create_entity(NewEntity::new(account(), creator(), "Block", title(name)))
                    .expect("create entity");
                store
                    .create_link(NewLink::new(account(), page.entity_id, account(), block.entity_id, "contents"))
                    .expect("create link");
            }
            let collection = Collection::LinkGroup {
                source_account_id: account(),
                source_entity_id: page.entity_id,
                path: "contents".to_string(),
            };
            let result = store.aggregate(&collection, &AggregateOperation::default()).expect("aggregate");
            let titles: Vec<_> = result
                .results
                .iter()
                .filter_map(|e| e.properties.get_path("title").and_then(PropertyValue::to_text))
                .collect();
            assert_eq!(titles, vec!["b", "a", "c"]);
            assert_eq!(result.operation.page_count, 1);

            let sorted = AggregateOperation::default().sorted_by(vec![SortField::desc("title")]);
            let result = store.aggregate(&collection, &sorted).expect("aggregate");
            let titles: Vec<_> = result
                .results
                .iter()
                .filter_map(|e| e.properties.get_path("title").and_then(PropertyValue::to_text))
                .collect();
            assert_eq!(titles, vec!["c", "b", "a"]);
        });
    }
}

// =============================================================================
// TIER T3: TRANSACTIONS
// =============================================================================

mod t3_transactions {
    use super::*;

    /// T3.1: A failed second step discards the first.
    #[test]
    fn atomicity() {
        on_each_medium(|store| {
            let b = store
                .create_entity(NewEntity::new(account(), creator(), "Page", title("b")))
                .expect("create entity");
            let a_id = EntityId(Uuid::from_u128(0xA));

            let result = store.run_transaction(|txn| {
                txn.create_entity(NewEntity::new(account(), creator(), "Page", title("a")).with_entity_id(a_id))?;
                txn.update_entity(account(), b.entity_id, Some("Block"), title("b2"))
            });

            assert!(matches!(result, Err(GraphError::TypeMismatch { .. })));
            assert!(store.get_entity(account(), a_id, false).expect("get entity").is_none());
        });
    }

    /// T3.2: Everything done in one transaction is visible afterwards.
    #[test]
    fn multi_step_commit() {
        on_each_medium(|store| {
            let (page, block) = store
                .run_transaction(|txn| {
                    let page = txn.create_entity(NewEntity::new(account(), creator(), "Page", title("p")).versioned())?;
                    let block = txn.create_entity(NewEntity::new(account(), creator(), "Block", title("b")))?;
                    txn.create_link(NewLink::new(account(), page.entity_id, account(), block.entity_id, "contents"))?;
                    txn.update_entity(account(), page.entity_id, Some("Page"), title("p2"))?;
                    Ok((page, block))
                })
                .expect("transaction");

            let head = store.get_entity(account(), page.entity_id, true).expect("get entity").expect("entity present");
            assert_ne!(head.entity_id, page.entity_id);
            let linked = store.get_linked_entities(account(), head.entity_id, "contents").expect("linked entities");
            assert_eq!(linked.len(), 1);
            assert_eq!(linked[0].entity_id, block.entity_id);
        });
    }

    /// T3.3: Nested transactions are rejected and roll back the outer one.
    #[test]
    fn nesting_is_rejected() {
        on_each_medium(|store| {
            let id = EntityId(Uuid::from_u128(0x5));
            let result = store.run_transaction(|txn| {
                txn.create_entity(NewEntity::new(account(), creator(), "Page", title("x")).with_entity_id(id))?;
                store.create_entity(NewEntity::new(account(), creator(), "Page", title("y")))
            });
            assert!(matches!(result, Err(GraphError::NestedTransaction)));
            assert!(store.get_entity(account(), id, false).expect("get entity").is_none());
        });
    }
}

// =============================================================================
// TIER T4: CONCURRENCY
// =============================================================================

mod t4_concurrency {
    use super::*;
    use entigraph_core::EntityReader;
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    /// T4.1: Concurrent appends never lose an update.
    #[test]
    fn concurrent_updates_serialize() {
        on_each_medium(|store| {
            let first = store
                .create_entity(NewEntity::new(account(), creator(), "Page", title("v0")).versioned())
                .expect("create entity");

            let entity_id = first.entity_id;
            let writers = 8;
            let barrier = Arc::new(Barrier::new(writers));
            let handles: Vec<_> = (0..writers)
                .map(|n| {
                    let store = store.clone();
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        store.run_transaction(|txn| {
                            // Stale read of the head, then an update through it.
                            let seen = txn.get_entity_versions(account(), entity_id)?;
                            txn.update_entity(account(), seen[0].entity_id, Some("Page"), title(&format!("w{n}")))
                        })
                    })
                })
                .collect();
            for handle in handles {
                handle.join().expect("thread join").expect("thread result");
            }

            let history = store
                .get_entity_history(account(), entity_id)
                .expect("history")
                .expect("history present");
            assert_eq!(history.len(), writers + 1);
            assert!(history.windows(2).all(|w| w[0].created_at > w[1].created_at));
        });
    }

    /// T4.2: Concurrent appends to one link group get distinct slots.
    #[test]
    fn concurrent_link_inserts_take_distinct_slots() {
        on_each_medium(|store| {
            let page = store
                .create_entity(NewEntity::new(account(), creator(), "Page", title("p")))
                .expect("create entity");
            let block = store
                .create_entity(NewEntity::new(account(), creator(), "Block", title("b")))
                .expect("create entity");

            let (source, destination) = (page.entity_id, block.entity_id);
            let handles: Vec<_> = (0..6)
                .map(|_| {
                    let store = store.clone();
                    std::thread::spawn(move || {
                        store.create_link(
                            NewLink::new(account(), source, account(), destination, "contents").at_index(0),
                        )
                    })
                })
                .collect();
            for handle in handles {
                handle.join().expect("thread join").expect("thread result");
            }

            let group = store.get_link_group(account(), page.entity_id, "contents").expect("link group");
            assert_eq!(group.iter().map(|l| l.index).collect::<Vec<_>>(), (0..6).collect::<Vec<_>>());
        });
    }

    /// T4.3: A writer blocked past the lock timeout fails with a retryable conflict.
    #[test]
    fn lock_timeout_is_conflict() {
        let store = Store::builder(Arc::new(entigraph_core::MemoryMedium::new()))
            .config(StoreConfig::default().with_lock_timeout(Duration::from_millis(50)))
            .build();
        let page = store
            .create_entity(NewEntity::new(account(), creator(), "Page", title("p")).versioned())
            .expect("create entity");

        let holding = Arc::new(Barrier::new(2));
        let done = Arc::new(Barrier::new(2));
        let page_id = page.entity_id;
        let holder = {
            let store = store.clone();
            let holding = Arc::clone(&holding);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                store.run_transaction(|txn| {
                    txn.update_entity(account(), page_id, None, title("held"))?;
                    holding.wait();
                    done.wait();
                    Ok(())
                })
            })
        };

        holding.wait();
        let result = store.update_entity(account(), page.entity_id, None, title("blocked"));
        done.wait();
        holder.join().expect("thread join").expect("thread result");

        let error = result.expect_err("lock wait should time out");
        assert!(matches!(error, GraphError::Conflict(_)));
        assert!(error.is_retryable());
        assert_eq!(store.get_entity_history(account(), page.entity_id).expect("history").expect("history present").len(), 2);
    }
}

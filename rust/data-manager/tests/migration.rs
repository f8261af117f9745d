use std::sync::Arc;

use anyhow::Result;
use data_manager::{DataManager, Notification, SharedStorage, TestStorage};

#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
use wasm_bindgen_test::wasm_bindgen_test;
#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_dedicated_worker);

type Strategy = TestStorage<String, String>;

fn key(name: &str) -> String {
    name.to_owned()
}

fn shared(storage: Strategy) -> (Arc<Strategy>, SharedStorage<String, String>) {
    let storage = Arc::new(storage);
    let handle: SharedStorage<String, String> = storage.clone();
    (storage, handle)
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
async fn registering_an_owner_with_reprocessing_moves_existing_data_into_it() -> Result<()> {
    let manager = DataManager::<String, String>::new();
    let (observer, observer_handle) = shared(Strategy::new("observer").depending_on(|_| true));
    manager.add_storage(observer_handle, true).await?;

    manager.set(key("user:1"), "alice".into()).await?;
    manager.set(key("note"), "hello".into()).await?;
    observer.take_notifications();

    let (users, users_handle) =
        shared(Strategy::new("users").owning(|key: &String| key.starts_with("user:")));
    assert!(manager.add_storage(users_handle.clone(), true).await?);

    assert!(users.contains(&key("user:1")));
    assert!(!manager.fallback().contains(&key("user:1")).await);
    assert!(manager.fallback().contains(&key("note")).await);
    assert!(
        manager
            .resolve_responsible(&key("user:1"))
            .await
            .is(&users_handle)
    );
    assert_eq!(manager.get(&key("user:1")).await?, Some("alice".into()));

    // The existing dependee sees the value leave its old owner and come back
    assert_eq!(
        observer.notifications(),
        vec![
            Notification::Remove {
                key: key("user:1"),
                is_owner: false
            },
            Notification::Set {
                key: key("user:1"),
                value: "alice".into(),
                is_owner: false
            }
        ]
    );

    // The new storage takes part in both halves of the migration
    assert_eq!(
        users.notifications(),
        vec![
            Notification::Remove {
                key: key("user:1"),
                is_owner: false
            },
            Notification::Set {
                key: key("user:1"),
                value: "alice".into(),
                is_owner: true
            }
        ]
    );

    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
async fn registering_an_owner_with_reprocessing_takes_over_from_a_previous_owner() -> Result<()> {
    let manager = DataManager::<String, String>::new();
    let (old, old_handle) = shared(Strategy::new("old").owning(|_| true));
    manager.add_storage(old_handle, true).await?;
    manager.set(key("user:1"), "alice".into()).await?;
    old.take_notifications();

    let (new, new_handle) = shared(Strategy::new("new").owning(|_| true));
    manager.add_storage(new_handle.clone(), true).await?;

    assert!(new.contains(&key("user:1")));
    assert!(!old.contains(&key("user:1")));
    assert!(
        manager
            .responsible_for(&key("user:1"))
            .await
            .is_some_and(|responsible| responsible.is(&new_handle))
    );
    assert_eq!(manager.get(&key("user:1")).await?, Some("alice".into()));
    assert_eq!(
        old.notifications(),
        vec![
            Notification::Remove {
                key: key("user:1"),
                is_owner: true
            },
            Notification::Set {
                key: key("user:1"),
                value: "alice".into(),
                is_owner: false
            }
        ]
    );

    // Keys resolved later still follow the tie-break
    manager.set(key("user:2"), "bob".into()).await?;
    assert!(old.contains(&key("user:2")));

    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
async fn registering_a_storing_only_storage_with_reprocessing_moves_data_into_it() -> Result<()> {
    let manager = DataManager::<String, String>::new();
    let (archive, archive_handle) = shared(Strategy::new("archive").owning(|_| true));
    manager.add_storage(archive_handle, true).await?;
    manager.set(key("user:1"), "alice".into()).await?;

    // The newcomer does not depend on the key, but it is the owner from now on
    let (users, users_handle) =
        shared(Strategy::new("users").storing(|key: &String| key.starts_with("user:")));
    manager.add_storage(users_handle.clone(), true).await?;

    assert!(!archive.contains(&key("user:1")));
    assert!(users.contains(&key("user:1")));
    assert_eq!(
        users.notifications(),
        vec![Notification::Set {
            key: key("user:1"),
            value: "alice".into(),
            is_owner: true
        }]
    );
    assert_eq!(manager.get(&key("user:1")).await?, Some("alice".into()));

    assert_eq!(manager.remove(&key("user:1")).await?, Some("alice".into()));
    assert!(users.is_empty());

    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
async fn registering_a_dependee_with_reprocessing_feeds_it_existing_data() -> Result<()> {
    let manager = DataManager::<String, String>::new();
    manager.set(key("user:1"), "alice".into()).await?;
    manager.set(key("user:2"), "bob".into()).await?;
    manager.set(key("note"), "hello".into()).await?;

    let (index, index_handle) =
        shared(Strategy::new("index").depending_on(|key: &String| key.starts_with("user:")));
    manager.add_storage(index_handle, true).await?;

    let sets = index
        .notifications()
        .into_iter()
        .filter(|notification| matches!(notification, Notification::Set { .. }))
        .collect::<Vec<_>>();

    assert_eq!(
        sets,
        vec![
            Notification::Set {
                key: key("user:1"),
                value: "alice".into(),
                is_owner: false
            },
            Notification::Set {
                key: key("user:2"),
                value: "bob".into(),
                is_owner: false
            }
        ]
    );
    assert!(index.is_empty());
    assert_eq!(manager.fallback().len().await, 3);
    assert_eq!(manager.get(&key("user:2")).await?, Some("bob".into()));

    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
async fn registering_without_reprocessing_leaves_existing_data_alone() -> Result<()> {
    let manager = DataManager::<String, String>::new();
    manager.set(key("user:1"), "alice".into()).await?;

    let (users, users_handle) = shared(Strategy::new("users").owning(|_| true));
    assert!(manager.add_storage(users_handle.clone(), false).await?);

    assert!(users.notifications().is_empty());
    assert!(manager.fallback().contains(&key("user:1")).await);
    assert!(
        manager
            .responsible_for(&key("user:1"))
            .await
            .is_some_and(|responsible| responsible.is_fallback())
    );
    assert_eq!(manager.get(&key("user:1")).await?, Some("alice".into()));

    // Keys resolved from now on go to the new storage
    manager.set(key("user:2"), "bob".into()).await?;
    assert!(users.contains(&key("user:2")));
    assert!(!manager.fallback().contains(&key("user:2")).await);

    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
async fn deregistering_an_owner_with_reprocessing_hands_its_data_to_the_fallback() -> Result<()> {
    let manager = DataManager::<String, String>::new();
    let (users, users_handle) = shared(Strategy::new("users").owning(|_| true));
    let (observer, observer_handle) = shared(Strategy::new("observer").depending_on(|_| true));
    manager.add_storage(users_handle.clone(), true).await?;
    manager.add_storage(observer_handle, true).await?;

    manager.set(key("user:1"), "alice".into()).await?;
    observer.take_notifications();

    assert!(manager.remove_storage(&users_handle, true).await?);

    assert!(users.is_empty());
    assert!(!manager.is_registered(&users_handle).await);
    assert!(manager.fallback().contains(&key("user:1")).await);
    assert!(
        manager
            .responsible_for(&key("user:1"))
            .await
            .is_some_and(|responsible| responsible.is_fallback())
    );
    assert_eq!(manager.get(&key("user:1")).await?, Some("alice".into()));
    assert_eq!(
        observer.notifications(),
        vec![
            Notification::Remove {
                key: key("user:1"),
                is_owner: false
            },
            Notification::Set {
                key: key("user:1"),
                value: "alice".into(),
                is_owner: false
            }
        ]
    );

    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
async fn deregistering_an_owner_with_reprocessing_hands_its_data_to_another_candidate()
-> Result<()> {
    let manager = DataManager::<String, String>::new();
    let (first, first_handle) = shared(Strategy::new("first").owning(|_| true));
    let (second, second_handle) = shared(Strategy::new("second").owning(|_| true));
    manager.add_storage(first_handle.clone(), true).await?;
    manager.add_storage(second_handle.clone(), true).await?;

    manager.set(key("user:1"), "alice".into()).await?;
    manager.set(key("note"), "hello".into()).await?;
    assert!(first.contains(&key("user:1")));
    assert_eq!(manager.ambiguities(), 2);

    manager.remove_storage(&first_handle, true).await?;

    assert!(first.is_empty());
    assert!(second.contains(&key("user:1")));
    assert!(second.contains(&key("note")));
    assert!(manager.fallback().is_empty().await);
    assert!(
        manager
            .responsible_for(&key("user:1"))
            .await
            .is_some_and(|responsible| responsible.is(&second_handle))
    );
    assert_eq!(manager.get(&key("note")).await?, Some("hello".into()));

    // Only one candidate is left, so resolving again is not ambiguous
    assert_eq!(manager.ambiguities(), 2);

    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
async fn deregistering_without_reprocessing_keeps_memoized_responsibilities() -> Result<()> {
    let manager = DataManager::<String, String>::new();
    let (users, users_handle) = shared(Strategy::new("users").owning(|_| true));
    manager.add_storage(users_handle.clone(), true).await?;
    manager.set(key("user:1"), "alice".into()).await?;
    users.take_notifications();

    assert!(manager.remove_storage(&users_handle, false).await?);

    assert!(users.contains(&key("user:1")));
    assert!(users.notifications().is_empty());
    assert!(manager.fallback().is_empty().await);
    assert!(
        manager
            .responsible_for(&key("user:1"))
            .await
            .is_some_and(|responsible| responsible.is(&users_handle))
    );
    // The memoized owner still answers reads
    assert_eq!(manager.get(&key("user:1")).await?, Some("alice".into()));

    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
async fn registration_and_deregistration_are_idempotent() -> Result<()> {
    let manager = DataManager::<String, String>::new();
    manager.set(key("user:1"), "alice".into()).await?;

    let (users, users_handle) = shared(Strategy::new("users").owning(|_| true));
    assert!(manager.add_storage(users_handle.clone(), true).await?);
    let notifications = users.notifications();

    for reprocess in [true, false] {
        assert!(!manager.add_storage(users_handle.clone(), reprocess).await?);
    }
    assert_eq!(manager.storage_count().await, 1);
    assert_eq!(users.notifications(), notifications);

    assert!(manager.remove_storage(&users_handle, true).await?);
    let notifications = users.notifications();

    for reprocess in [true, false] {
        assert!(!manager.remove_storage(&users_handle, reprocess).await?);
    }
    assert_eq!(manager.storage_count().await, 0);
    assert_eq!(users.notifications(), notifications);
    assert_eq!(manager.get(&key("user:1")).await?, Some("alice".into()));

    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
async fn storages_are_told_apart_by_identity_rather_than_by_name() -> Result<()> {
    let manager = DataManager::<String, String>::new();
    let (_, one) = shared(Strategy::new("users").owning(|_| true));
    let (_, two) = shared(Strategy::new("users").owning(|_| true));

    assert!(manager.add_storage(one.clone(), false).await?);
    assert!(manager.add_storage(two.clone(), false).await?);
    assert_eq!(manager.storage_count().await, 2);

    assert!(manager.remove_storage(&two, false).await?);
    assert!(manager.is_registered(&one).await);
    assert!(!manager.is_registered(&two).await);

    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
async fn a_storage_deregistered_without_reprocessing_keeps_receiving_its_keys() -> Result<()> {
    let manager = DataManager::<String, String>::new();
    let (users, users_handle) = shared(Strategy::new("users").owning(|_| true));
    manager.add_storage(users_handle.clone(), true).await?;
    manager.set(key("user:1"), "alice".into()).await?;
    manager.remove_storage(&users_handle, false).await?;

    manager.set(key("user:1"), "bob".into()).await?;

    assert_eq!(manager.get(&key("user:1")).await?, Some("bob".into()));
    assert!(manager.fallback().is_empty().await);
    assert!(
        manager
            .responsible_for(&key("user:1"))
            .await
            .is_some_and(|responsible| responsible.is(&users_handle))
    );

    assert_eq!(manager.remove(&key("user:1")).await?, Some("bob".into()));
    assert!(users.is_empty());
    assert_eq!(manager.get(&key("user:1")).await?, None);

    // Keys resolved from now on do not go to it anymore
    manager.set(key("user:2"), "carol".into()).await?;
    assert!(!users.contains(&key("user:2")));
    assert!(manager.fallback().contains(&key("user:2")).await);

    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
async fn a_failed_registration_puts_the_data_back() -> Result<()> {
    let manager = DataManager::<String, String>::new();
    let (watcher, watcher_handle) =
        shared(Strategy::new("watcher").depending_on(|key: &String| key == "b"));
    manager.add_storage(watcher_handle, true).await?;
    manager.set(key("a"), "1".into()).await?;
    manager.set(key("b"), "2".into()).await?;

    watcher.set_failing(true);
    let (_, index_handle) = shared(Strategy::new("index").depending_on(|_| true));
    assert!(manager.add_storage(index_handle.clone(), true).await.is_err());
    watcher.set_failing(false);

    assert!(!manager.is_registered(&index_handle).await);
    assert_eq!(manager.storage_count().await, 1);
    assert_eq!(manager.get(&key("a")).await?, Some("1".into()));
    assert_eq!(manager.get(&key("b")).await?, Some("2".into()));

    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
async fn a_failed_deregistration_keeps_the_storage_and_its_data() -> Result<()> {
    let manager = DataManager::<String, String>::new();
    let (users, users_handle) = shared(Strategy::new("users").owning(|_| true));
    let (watcher, watcher_handle) =
        shared(Strategy::new("watcher").depending_on(|key: &String| key == "b"));
    manager.add_storage(users_handle.clone(), true).await?;
    manager.add_storage(watcher_handle, true).await?;
    manager.set(key("a"), "1".into()).await?;
    manager.set(key("b"), "2".into()).await?;

    watcher.set_failing(true);
    assert!(manager.remove_storage(&users_handle, true).await.is_err());
    watcher.set_failing(false);

    assert!(manager.is_registered(&users_handle).await);
    assert!(users.contains(&key("a")));
    assert!(users.contains(&key("b")));
    assert!(manager.fallback().is_empty().await);
    assert_eq!(manager.get(&key("a")).await?, Some("1".into()));
    assert_eq!(manager.get(&key("b")).await?, Some("2".into()));

    Ok(())
}

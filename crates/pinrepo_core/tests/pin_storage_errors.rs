mod support;

use pinrepo_core::db::{open_db_in_memory, DbError};
use pinrepo_core::{
    KeyLockRegistry, PinPatch, PinQuery, PinService, PinState, RepoError, SqlitePinStore,
};
use std::sync::{Arc, Mutex};
use support::candidate;

/// Service whose table disappears after one record was stored.
fn broken_service() -> (PinService<SqlitePinStore>, String) {
    let conn = Arc::new(Mutex::new(open_db_in_memory().unwrap()));
    let service = PinService::new(
        SqlitePinStore::from_shared(Arc::clone(&conn)),
        Arc::new(KeyLockRegistry::new()),
    );
    let stored = service
        .insert_or_get(1, &candidate("bafy-stored", None))
        .unwrap();

    conn.lock().unwrap().execute_batch("DROP TABLE pins;").unwrap();
    (service, stored.request_id)
}

fn assert_storage_failure<T: std::fmt::Debug>(result: Result<T, RepoError>) {
    match result {
        Err(RepoError::Db(DbError::Sqlite(_))) => {}
        other => panic!("expected a storage failure, got {other:?}"),
    }
}

#[test]
fn insert_or_get_propagates_storage_failure() {
    let (service, _) = broken_service();
    assert_storage_failure(service.insert_or_get(1, &candidate("bafy-new", None)));
}

#[test]
fn patch_propagates_storage_failure() {
    let (service, request_id) = broken_service();
    let patch = PinPatch::new().status(PinState::Pinned);
    assert_storage_failure(service.patch(1, &request_id, &patch));
}

#[test]
fn find_by_id_propagates_storage_failure() {
    let (service, request_id) = broken_service();
    assert_storage_failure(service.find_by_id(1, &request_id));
}

#[test]
fn find_propagates_storage_failure() {
    let (service, _) = broken_service();
    assert_storage_failure(service.find(&PinQuery::for_owner(1)));
}

#[test]
fn delete_propagates_storage_failure() {
    let (service, request_id) = broken_service();
    assert_storage_failure(service.delete(1, &request_id));
}

#[test]
fn count_by_cid_propagates_storage_failure() {
    let (service, _) = broken_service();
    assert_storage_failure(service.count_by_cid("bafy-stored"));
}

#[test]
fn stream_delivers_storage_failure_as_its_only_item() {
    let (service, _) = broken_service();
    let items: Vec<_> = service.stream_by_status(&[]).collect();
    assert_eq!(items.len(), 1);
    assert_storage_failure(items.into_iter().next().unwrap());
}

#[test]
fn empty_patch_does_not_reach_storage() {
    let (service, request_id) = broken_service();
    assert!(service.patch(1, &request_id, &PinPatch::new()).is_ok());
}

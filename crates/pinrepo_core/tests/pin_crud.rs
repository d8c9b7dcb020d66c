mod support;

use pinrepo_core::{PinPatch, PinQuery, PinState, RepoError};
use std::collections::BTreeMap;
use support::{candidate, candidate_at, sqlite_service};

#[test]
fn insert_or_get_returns_existing_record_for_same_owner_and_cid() {
    let service = sqlite_service();

    let first = service
        .insert_or_get(1, &candidate("bafy-same", Some("first")))
        .unwrap();
    let mut second_input = candidate("bafy-same", Some("second"));
    second_input.status = PinState::Pinned;
    let second = service.insert_or_get(1, &second_input).unwrap();

    assert_eq!(second.request_id, first.request_id);
    assert_eq!(second.pin.cid, "bafy-same");
    assert_eq!(second.pin.name.as_deref(), Some("first"));
    assert_eq!(second.status, PinState::Queued);
    assert_eq!(service.count_by_cid("bafy-same").unwrap(), 1);
}

#[test]
fn insert_or_get_creates_separate_records_per_owner() {
    let service = sqlite_service();

    let owner_one = service.insert_or_get(1, &candidate("bafy-shared", None)).unwrap();
    let owner_two = service.insert_or_get(2, &candidate("bafy-shared", None)).unwrap();

    assert_ne!(owner_one.request_id, owner_two.request_id);
    assert_eq!(service.count_by_cid("bafy-shared").unwrap(), 2);
}

#[test]
fn candidate_request_id_and_created_apply_only_on_create() {
    let service = sqlite_service();

    let mut input = candidate_at("bafy-defaults", None, 1_000);
    input.request_id = "client-chosen".to_string();
    let created = service.insert_or_get(1, &input).unwrap();
    assert_eq!(created.request_id, "client-chosen");
    assert_eq!(created.created, 1_000);

    let mut again = candidate_at("bafy-defaults", None, 2_000);
    again.request_id = "other".to_string();
    let found = service.insert_or_get(1, &again).unwrap();
    assert_eq!(found.request_id, "client-chosen");
    assert_eq!(found.created, 1_000);
}

#[test]
fn store_assigned_created_has_millisecond_resolution() {
    let service = sqlite_service();

    let first = service.insert_or_get(1, &candidate("bafy-early", None)).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));
    let second = service.insert_or_get(1, &candidate("bafy-late", None)).unwrap();

    assert!(first.created > 1_600_000_000_000);
    assert!(second.created > first.created);
}

#[test]
fn generated_request_id_is_a_uuid() {
    let service = sqlite_service();
    let stored = service.insert_or_get(1, &candidate("bafy-uuid", None)).unwrap();
    assert!(uuid::Uuid::parse_str(&stored.request_id).is_ok());
    assert!(stored.created > 0);
}

#[test]
fn patch_updates_only_set_fields() {
    let service = sqlite_service();
    let mut input = candidate("bafy-patch", Some("before"));
    input.pin.origins = vec!["/ip4/10.0.0.1/tcp/4001".to_string()];
    let stored = service.insert_or_get(7, &input).unwrap();

    let mut info = BTreeMap::new();
    info.insert("status_details".to_string(), "fetching".to_string());
    service
        .patch(
            7,
            &stored.request_id,
            &PinPatch::new().status(PinState::Pinning).info(info.clone()),
        )
        .unwrap();

    let loaded = service.find_by_id(7, &stored.request_id).unwrap();
    assert_eq!(loaded.status, PinState::Pinning);
    assert_eq!(loaded.info, info);
    assert_eq!(loaded.pin.name.as_deref(), Some("before"));
    assert_eq!(loaded.pin.origins, stored.pin.origins);
    assert_eq!(loaded.pin.cid, stored.pin.cid);
    assert_eq!(loaded.created, stored.created);
    assert_eq!(loaded.request_id, stored.request_id);
}

#[test]
fn patch_can_clear_name_and_replace_metadata() {
    let service = sqlite_service();
    let stored = service
        .insert_or_get(7, &candidate("bafy-clear", Some("named")))
        .unwrap();

    let mut meta = BTreeMap::new();
    meta.insert("app".to_string(), "gallery".to_string());
    service
        .patch(
            7,
            &stored.request_id,
            &PinPatch::new()
                .name(None)
                .meta(meta.clone())
                .delegates(vec!["/dns4/pin.example/tcp/4001".to_string()]),
        )
        .unwrap();

    let loaded = service.find_by_id(7, &stored.request_id).unwrap();
    assert_eq!(loaded.pin.name, None);
    assert_eq!(loaded.pin.meta, meta);
    assert_eq!(loaded.delegates.len(), 1);
    assert_eq!(loaded.status, PinState::Queued);
}

#[test]
fn patch_of_unknown_or_foreign_record_is_a_silent_no_op() {
    let service = sqlite_service();
    let stored = service.insert_or_get(1, &candidate("bafy-owned", None)).unwrap();

    service
        .patch(1, "missing", &PinPatch::new().status(PinState::Failed))
        .unwrap();
    service
        .patch(2, &stored.request_id, &PinPatch::new().status(PinState::Failed))
        .unwrap();

    let loaded = service.find_by_id(1, &stored.request_id).unwrap();
    assert_eq!(loaded.status, PinState::Queued);
}

#[test]
fn find_by_id_is_scoped_to_owner() {
    let service = sqlite_service();
    let stored = service.insert_or_get(1, &candidate("bafy-scope", None)).unwrap();

    let err = service.find_by_id(2, &stored.request_id).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == stored.request_id));
}

#[test]
fn delete_removes_record_and_is_idempotent() {
    let service = sqlite_service();
    let stored = service.insert_or_get(1, &candidate("bafy-delete", None)).unwrap();

    service.delete(1, &stored.request_id).unwrap();
    let err = service.find_by_id(1, &stored.request_id).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));

    service.delete(1, &stored.request_id).unwrap();
    service.delete(1, "never-existed").unwrap();
    assert_eq!(service.count_by_cid("bafy-delete").unwrap(), 0);
}

#[test]
fn delete_does_not_touch_other_owners() {
    let service = sqlite_service();
    let stored = service.insert_or_get(1, &candidate("bafy-keep", None)).unwrap();

    service.delete(2, &stored.request_id).unwrap();
    assert!(service.find_by_id(1, &stored.request_id).is_ok());
}

#[test]
fn count_by_cid_ignores_owner_scope() {
    let service = sqlite_service();
    for owner in 1..=3 {
        service.insert_or_get(owner, &candidate("bafy-count", None)).unwrap();
    }
    service.insert_or_get(1, &candidate("bafy-other", None)).unwrap();

    assert_eq!(service.count_by_cid("bafy-count").unwrap(), 3);
    assert_eq!(service.count_by_cid("bafy-none").unwrap(), 0);

    let owner_one = service.find(&PinQuery::for_owner(1)).unwrap();
    assert_eq!(owner_one.count, 2);
}

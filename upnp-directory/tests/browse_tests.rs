//! Paging, staleness detection and object caching.

mod mock_directory;

use std::sync::Arc;

use mock_directory::{page_of, track, tracks, ScriptedDirectory};
use upnp_control::{ControlPointError, ServiceKey, StateChange};
use upnp_directory::{
    to_didl, DidlObject, DirectoryConfig, DirectoryError, Item, MediaDirectory, ObjectBase,
    PageOutcome, PageResponse, CONTAINER_UPDATE_IDS, CONTENT_DIRECTORY, SYSTEM_UPDATE_ID,
};

fn directory(mock: &ScriptedDirectory) -> MediaDirectory {
    let config = DirectoryConfig {
        page_size: 10,
        ..Default::default()
    };
    MediaDirectory::new(Arc::new(mock.clone()), config).unwrap()
}

fn change(variable: &str, value: &str) -> StateChange {
    StateChange {
        service: ServiceKey::new("uuid:media-server", CONTENT_DIRECTORY),
        variable: variable.to_string(),
        value: value.to_string(),
        seq: Some(1),
    }
}

#[test]
fn test_pages_with_same_update_id_merge() {
    let mock = ScriptedDirectory::new();
    mock.push_children(Ok(tracks(0..10, "-1", 25, 3)));
    mock.push_children(Ok(tracks(10..20, "-1", 25, 3)));
    mock.push_children(Ok(tracks(20..25, "-1", 25, 3)));
    let directory = directory(&mock);

    let mut listing = directory.browse_children("-1");
    assert_eq!(directory.next_page(&mut listing).unwrap(), Some(PageOutcome::Merged));
    assert!(listing.has_more_results());
    assert_eq!(listing.total_matches(), Some(25));

    assert_eq!(directory.next_page(&mut listing).unwrap(), Some(PageOutcome::Merged));
    assert_eq!(directory.next_page(&mut listing).unwrap(), Some(PageOutcome::Merged));
    assert_eq!(directory.next_page(&mut listing).unwrap(), None);

    assert!(!listing.is_out_of_date());
    assert_eq!(listing.objects().len(), 25);
    assert_eq!(listing.objects()[24].id(), "t24");
    // The last request only asks for what is left
    assert_eq!(mock.windows(), vec![(0, 10), (10, 10), (20, 5)]);
    assert_eq!(directory.tracker().current("-1"), Some(3));
}

#[test]
fn test_changed_update_id_marks_listing_out_of_date() {
    let mock = ScriptedDirectory::new();
    mock.push_children(Ok(tracks(0..10, "-1", 25, 3)));
    mock.push_children(Ok(tracks(10..20, "-1", 25, 4)));
    let directory = directory(&mock);

    let mut listing = directory.browse_children("-1");
    directory.next_page(&mut listing).unwrap();
    assert_eq!(
        directory.next_page(&mut listing).unwrap(),
        Some(PageOutcome::OutOfDate)
    );

    assert!(listing.is_out_of_date());
    assert!(!listing.has_more_results());
    assert_eq!(listing.objects().len(), 10);
    // The server's newer counter is recorded
    assert_eq!(listing.update_id(), Some(4));
    assert_eq!(directory.tracker().current("-1"), Some(4));

    // Nothing more is requested for a stale listing
    assert_eq!(directory.next_page(&mut listing).unwrap(), None);
    assert_eq!(mock.browse_calls(), 2);
}

#[test]
fn test_cached_objects_reused_until_parent_counter_advances() {
    let mock = ScriptedDirectory::new();
    mock.push_children(Ok(tracks(0..5, "-1", 5, 3)));
    mock.push_children(Ok(tracks(0..5, "-1", 5, 3)));
    mock.push_children(Ok(tracks(0..5, "-1", 5, 4)));
    let directory = directory(&mock);

    let first = directory.browse_all("-1").unwrap();
    assert_eq!(directory.cache().len(), 5);

    let second = directory.browse_all("-1").unwrap();
    for (a, b) in first.objects().iter().zip(second.objects()) {
        assert!(Arc::ptr_eq(a, b), "{} should come from the cache", a.id());
    }
    assert_eq!(directory.cache().stats().hits, 5);

    let third = directory.browse_all("-1").unwrap();
    for (a, b) in first.objects().iter().zip(third.objects()) {
        assert!(!Arc::ptr_eq(a, b), "{} should be rebuilt", a.id());
        assert_eq!(**a, **b);
    }
    assert_eq!(directory.cache().stats().stale, 5);
}

#[test]
fn test_metadata_is_cached() {
    let mock = ScriptedDirectory::new();
    mock.set_metadata(track(1, "a1"), 7);
    let directory = directory(&mock);

    let first = directory.metadata("t1").unwrap();
    let second = directory.metadata("t1").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.title(), "Track 1");
    assert_eq!(mock.metadata_calls(), 1);
}

#[test]
fn test_container_update_ids_invalidate_cache() {
    let mock = ScriptedDirectory::new();
    mock.push_children(Ok(tracks(0..3, "a1", 3, 7)));
    mock.set_metadata(track(1, "a1"), 7);
    let directory = directory(&mock);

    directory.browse_all("a1").unwrap();
    directory.metadata("t1").unwrap();
    assert_eq!(mock.metadata_calls(), 0, "t1 was cached by the listing");

    let changed = directory.apply_container_update_ids("a1,8,other,1").unwrap();
    assert_eq!(changed, vec!["a1".to_string()]);
    assert_eq!(directory.cache().len(), 0);

    directory.metadata("t1").unwrap();
    assert_eq!(mock.metadata_calls(), 1);
}

#[test]
fn test_evented_state_changes_are_applied() {
    let mock = ScriptedDirectory::new();
    mock.push_children(Ok(tracks(0..3, "a1", 3, 7)));
    let directory = directory(&mock);
    directory.browse_all("a1").unwrap();

    directory.on_state_change(&change(CONTAINER_UPDATE_IDS, "a1,9"));
    assert_eq!(directory.tracker().current("a1"), Some(9));
    assert!(directory.cache().is_empty());

    directory.on_state_change(&change(SYSTEM_UPDATE_ID, "42"));
    assert_eq!(directory.tracker().system_update_id(), Some(42));

    // Malformed values are ignored
    directory.on_state_change(&change(CONTAINER_UPDATE_IDS, "a1"));
    directory.on_state_change(&change(SYSTEM_UPDATE_ID, "soon"));
    assert_eq!(directory.tracker().current("a1"), Some(9));
    assert_eq!(directory.tracker().system_update_id(), Some(42));
}

#[test]
fn test_search_pages() {
    let mock = ScriptedDirectory::new();
    mock.push_search(Ok(tracks(0..10, "a1", 12, 5)));
    mock.push_search(Ok(tracks(10..12, "a2", 12, 5)));
    let directory = directory(&mock);

    let mut results = directory.search("0", "upnp:class derivedfrom \"object.item.audioItem\"");
    while directory.next_page(&mut results).unwrap().is_some() {}

    assert_eq!(results.objects().len(), 12);
    assert_eq!(mock.search_calls(), 2);
    assert_eq!(mock.browse_calls(), 0);
    assert_eq!(mock.windows(), vec![(0, 10), (10, 2)]);
}

#[test]
fn test_failed_page_can_be_retried() {
    let mock = ScriptedDirectory::new();
    mock.push_children(Ok(tracks(0..10, "-1", 15, 3)));
    mock.push_children(Err(DirectoryError::Control(ControlPointError::Timeout(
        "read timed out".to_string(),
    ))));
    mock.push_children(Ok(tracks(10..15, "-1", 15, 3)));
    let directory = directory(&mock);

    let mut listing = directory.browse_children("-1");
    directory.next_page(&mut listing).unwrap();
    assert!(directory.next_page(&mut listing).is_err());
    assert_eq!(listing.next_index(), 10);

    assert_eq!(directory.next_page(&mut listing).unwrap(), Some(PageOutcome::Merged));
    assert_eq!(listing.objects().len(), 15);
    assert!(!listing.has_more_results());
}

#[test]
fn test_undecodable_objects_are_skipped() {
    let mock = ScriptedDirectory::new();
    let mut payload = to_didl(&[track(0, "-1"), track(1, "-1")]);
    // An item without a title cannot be decoded
    payload = payload.replace(
        "</DIDL-Lite>",
        r#"<item id="broken" parentID="-1" restricted="1"><upnp:class>object.item</upnp:class></item></DIDL-Lite>"#,
    );
    mock.push_children(Ok(PageResponse {
        result: payload,
        number_returned: 3,
        total_matches: 3,
        update_id: 1,
    }));
    let directory = directory(&mock);

    let listing = directory.browse_all("-1").unwrap();
    let ids: Vec<&str> = listing.objects().iter().map(|o| o.id()).collect();
    assert_eq!(ids, vec!["t0", "t1"]);
    assert!(!listing.has_more_results());
}

#[test]
fn test_invalid_didl_fails_the_page() {
    let mock = ScriptedDirectory::new();
    mock.push_children(Ok(PageResponse {
        result: "<root/>".to_string(),
        number_returned: 0,
        total_matches: 0,
        update_id: 1,
    }));
    let directory = directory(&mock);

    let mut listing = directory.browse_children("-1");
    assert!(matches!(
        directory.next_page(&mut listing),
        Err(DirectoryError::Didl(_))
    ));
}

#[test]
fn test_containers_and_items_share_a_listing() {
    let mock = ScriptedDirectory::new();
    let album = DidlObject::Container(upnp_directory::Container {
        base: ObjectBase::new("a1", "0", "Kind of Blue", "object.container.album.musicAlbum"),
        child_count: Some(5),
        ..Default::default()
    });
    let reference = DidlObject::Item(Item {
        base: ObjectBase::new("r1", "0", "So What", "object.item.audioItem.musicTrack"),
        ref_id: Some("t1".to_string()),
    });
    mock.push_children(Ok(page_of(vec![album, reference], 2, 1)));
    let directory = directory(&mock);

    let listing = directory.browse_all("0").unwrap();
    assert!(listing.objects()[0].is_container());
    assert_eq!(listing.objects()[0].as_container().unwrap().child_count, Some(5));
    assert_eq!(
        listing.objects()[1].as_item().unwrap().ref_id.as_deref(),
        Some("t1")
    );
}

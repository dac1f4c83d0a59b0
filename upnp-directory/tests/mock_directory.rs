//! Scripted ContentDirectory for directory tests.
//!
//! Responses are queued per action and every call is counted, so tests can
//! tell a cache hit from a round trip.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use upnp_directory::{
    to_didl, BrowseFlag, ContentDirectory, DidlObject, DirectoryError, Item, ObjectBase,
    PageRequest, PageResponse, Result,
};

/// `(starting_index, requested_count)` of a page request
pub type Window = (u32, u32);

#[derive(Clone, Default)]
pub struct ScriptedDirectory {
    children: Arc<Mutex<VecDeque<Result<PageResponse>>>>,
    searches: Arc<Mutex<VecDeque<Result<PageResponse>>>>,
    metadata: Arc<Mutex<HashMap<String, PageResponse>>>,
    windows: Arc<Mutex<Vec<Window>>>,
    browse_calls: Arc<AtomicU32>,
    metadata_calls: Arc<AtomicU32>,
    search_calls: Arc<AtomicU32>,
}

impl ScriptedDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_children(&self, response: Result<PageResponse>) {
        self.children.lock().unwrap().push_back(response);
    }

    pub fn push_search(&self, response: Result<PageResponse>) {
        self.searches.lock().unwrap().push_back(response);
    }

    pub fn set_metadata(&self, object: DidlObject, update_id: u32) {
        let id = object.id().to_string();
        self.metadata
            .lock()
            .unwrap()
            .insert(id, page_of(vec![object], 1, update_id));
    }

    pub fn browse_calls(&self) -> u32 {
        self.browse_calls.load(Ordering::SeqCst)
    }

    pub fn metadata_calls(&self) -> u32 {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> u32 {
        self.search_calls.load(Ordering::SeqCst)
    }

    /// Windows requested by Browse/Search, in order
    pub fn windows(&self) -> Vec<Window> {
        self.windows.lock().unwrap().clone()
    }

    fn next(queue: &Mutex<VecDeque<Result<PageResponse>>>) -> Result<PageResponse> {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(DirectoryError::Config("no scripted page left".to_string())))
    }
}

impl ContentDirectory for ScriptedDirectory {
    fn browse(&self, flag: BrowseFlag, request: &PageRequest<'_>) -> Result<PageResponse> {
        match flag {
            BrowseFlag::Metadata => {
                self.metadata_calls.fetch_add(1, Ordering::SeqCst);
                self.metadata
                    .lock()
                    .unwrap()
                    .get(request.object_id)
                    .cloned()
                    .ok_or_else(|| DirectoryError::Config(format!("no object {}", request.object_id)))
            }
            BrowseFlag::DirectChildren => {
                self.browse_calls.fetch_add(1, Ordering::SeqCst);
                self.windows
                    .lock()
                    .unwrap()
                    .push((request.starting_index, request.requested_count));
                Self::next(&self.children)
            }
        }
    }

    fn search(&self, _criteria: &str, request: &PageRequest<'_>) -> Result<PageResponse> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.windows
            .lock()
            .unwrap()
            .push((request.starting_index, request.requested_count));
        Self::next(&self.searches)
    }

    fn search_capabilities(&self) -> Result<Vec<String>> {
        Ok(vec!["dc:title".to_string(), "upnp:artist".to_string()])
    }

    fn sort_capabilities(&self) -> Result<Vec<String>> {
        Ok(vec!["dc:title".to_string()])
    }

    fn system_update_id(&self) -> Result<u32> {
        Ok(1)
    }
}

/// A music track `t<n>` inside `parent`
pub fn track(n: u32, parent: &str) -> DidlObject {
    DidlObject::Item(Item {
        base: ObjectBase::new(
            format!("t{}", n),
            parent,
            format!("Track {}", n),
            "object.item.audioItem.musicTrack",
        ),
        ref_id: None,
    })
}

pub fn page_of(objects: Vec<DidlObject>, total: u32, update_id: u32) -> PageResponse {
    PageResponse {
        result: to_didl(&objects),
        number_returned: objects.len() as u32,
        total_matches: total,
        update_id,
    }
}

/// Tracks `range` of `parent` as one page
pub fn tracks(range: std::ops::Range<u32>, parent: &str, total: u32, update_id: u32) -> PageResponse {
    page_of(range.map(|n| track(n, parent)).collect(), total, update_id)
}

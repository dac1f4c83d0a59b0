//! Paginated browsing of one ContentDirectory service

use std::sync::Arc;
use std::time::Instant;

use upnp_control::{ControlPoint, ListenerId, ServiceProxy, StateChange};

use crate::browse::{BrowseSequence, Page, PageOutcome, SequenceKind};
use crate::cache::{CacheKey, ObjectCache};
use crate::config::DirectoryConfig;
use crate::didl::{decode_object, object_id, parse_elements};
use crate::error::{DirectoryError, Result};
use crate::object::DidlObject;
use crate::service::{BrowseFlag, ContentDirectory, ContentDirectoryClient, PageRequest};
use crate::update_state::UpdateTracker;

/// Evented variable carrying per-container update ids
pub const CONTAINER_UPDATE_IDS: &str = "ContainerUpdateIDs";
/// Evented variable carrying the server-wide update id
pub const SYSTEM_UPDATE_ID: &str = "SystemUpdateID";

/// Browse and search a media server, caching decoded objects until their
/// parent container changes.
///
/// ```rust,ignore
/// let directory = MediaDirectory::for_service(&control_point, service)?;
/// let mut listing = directory.browse_children("0");
/// while directory.next_page(&mut listing)?.is_some() {}
/// if listing.is_out_of_date() {
///     // the container changed while paging; start over
/// }
/// ```
pub struct MediaDirectory {
    service: Arc<dyn ContentDirectory>,
    config: DirectoryConfig,
    tracker: Arc<UpdateTracker>,
    cache: Arc<ObjectCache>,
}

impl MediaDirectory {
    pub fn new(service: Arc<dyn ContentDirectory>, config: DirectoryConfig) -> Result<Self> {
        config.validate()?;
        let cache = ObjectCache::new(config.cache_capacity, config.cache_ttl());
        Ok(Self {
            service,
            config,
            tracker: Arc::new(UpdateTracker::new()),
            cache: Arc::new(cache),
        })
    }

    /// Directory over a service known to `control_point`, configured from
    /// the control point's settings.
    pub fn for_service(control_point: &ControlPoint, service: Arc<ServiceProxy>) -> Result<Self> {
        let client = ContentDirectoryClient::new(control_point.invoker(), service);
        Self::new(
            Arc::new(client),
            DirectoryConfig::from_control_point(control_point.config()),
        )
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<UpdateTracker> {
        &self.tracker
    }

    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.cache
    }

    /// Start listing the direct children of `container_id`
    pub fn browse_children(&self, container_id: &str) -> BrowseSequence {
        BrowseSequence::new(
            container_id,
            SequenceKind::Children,
            self.config.filter.as_str(),
            self.config.sort_criteria.as_str(),
            self.config.page_size,
        )
    }

    /// Start a search below `container_id`
    pub fn search(&self, container_id: &str, criteria: &str) -> BrowseSequence {
        BrowseSequence::new(
            container_id,
            SequenceKind::Search {
                criteria: criteria.to_string(),
            },
            self.config.filter.as_str(),
            self.config.sort_criteria.as_str(),
            self.config.page_size,
        )
    }

    /// Fetch and merge the next page of `sequence`.
    ///
    /// Returns `None` once the sequence is complete or out of date.
    pub fn next_page(&self, sequence: &mut BrowseSequence) -> Result<Option<PageOutcome>> {
        if !sequence.has_more_results() {
            return Ok(None);
        }

        let starting_index = sequence.next_index();
        let requested_count = match sequence.total_matches() {
            Some(total) => sequence.page_size().min(total.saturating_sub(starting_index)),
            None => sequence.page_size(),
        };
        let request = PageRequest {
            object_id: sequence.container_id(),
            filter: sequence.filter(),
            starting_index,
            requested_count,
            sort_criteria: sequence.sort_criteria(),
        };

        let response = match sequence.kind() {
            SequenceKind::Children => self.service.browse(BrowseFlag::DirectChildren, &request)?,
            SequenceKind::Search { criteria } => self.service.search(criteria, &request)?,
        };

        self.tracker
            .observe(sequence.container_id(), response.update_id);
        let objects = self.decode_page(sequence.filter(), &response.result)?;

        tracing::debug!(
            container = %sequence.container_id(),
            starting_index,
            returned = response.number_returned,
            total = response.total_matches,
            update_id = response.update_id,
            "page received"
        );

        let outcome = sequence.accept(Page {
            objects,
            number_returned: response.number_returned,
            total_matches: response.total_matches,
            update_id: response.update_id,
        });
        Ok(Some(outcome))
    }

    /// Fetch every page of the children of `container_id`.
    ///
    /// The returned sequence may be out of date; callers decide whether to
    /// retry.
    pub fn browse_all(&self, container_id: &str) -> Result<BrowseSequence> {
        let mut sequence = self.browse_children(container_id);
        while self.next_page(&mut sequence)?.is_some() {}
        Ok(sequence)
    }

    /// Metadata of a single object, served from the cache while its parent
    /// container is unchanged.
    pub fn metadata(&self, id: &str) -> Result<Arc<DidlObject>> {
        let key = CacheKey::new(&self.config.filter, id);
        let now = Instant::now();
        if let Some(hit) = self.cache.get(&key, now, |parent| self.tracker.current(parent)) {
            return Ok(hit);
        }

        let request = PageRequest {
            object_id: id,
            filter: &self.config.filter,
            starting_index: 0,
            requested_count: 0,
            sort_criteria: "",
        };
        let response = self.service.browse(BrowseFlag::Metadata, &request)?;

        let mut warnings = Vec::new();
        let element = parse_elements(&response.result)?
            .into_iter()
            .find(|element| object_id(element) == Some(id))
            .ok_or_else(|| DirectoryError::response("Browse", format!("no object '{}' in metadata result", id)))?;
        let object = decode_object(&element, &mut warnings).map_err(DirectoryError::Didl)?;
        log_warnings(&warnings);

        let object = Arc::new(object);
        let parent_update_id = self.tracker.current(object.parent_id());
        self.cache.insert(key, Arc::clone(&object), parent_update_id, now);
        Ok(object)
    }

    pub fn search_capabilities(&self) -> Result<Vec<String>> {
        self.service.search_capabilities()
    }

    pub fn sort_capabilities(&self) -> Result<Vec<String>> {
        self.service.sort_capabilities()
    }

    /// Query `SystemUpdateID` and record it
    pub fn system_update_id(&self) -> Result<u32> {
        let id = self.service.system_update_id()?;
        self.tracker.observe_system(id);
        Ok(id)
    }

    /// Apply an evented `ContainerUpdateIDs` value.
    ///
    /// Returns the containers whose counter changed; their cached children
    /// are dropped.
    pub fn apply_container_update_ids(&self, value: &str) -> Result<Vec<String>> {
        apply_container_update_ids(&self.tracker, &self.cache, value)
    }

    /// Feed a state change from the service's event subscription
    pub fn on_state_change(&self, change: &StateChange) {
        apply_state_change(&self.tracker, &self.cache, change);
    }

    /// Subscribe to the service's update-id variables so cached objects
    /// are invalidated as the server reports changes.
    ///
    /// Remove the returned listeners with
    /// [`ControlPoint::remove_listener`] to stop tracking.
    pub fn track_updates(&self, control_point: &ControlPoint, service: &Arc<ServiceProxy>) -> Result<Vec<ListenerId>> {
        let mut ids = Vec::with_capacity(2);
        for variable in [CONTAINER_UPDATE_IDS, SYSTEM_UPDATE_ID] {
            let tracker = Arc::clone(&self.tracker);
            let cache = Arc::clone(&self.cache);
            let added = control_point.add_listener(service, variable, move |change| {
                apply_state_change(&tracker, &cache, change)
            });
            match added {
                Ok(id) => ids.push(id),
                Err(e) => {
                    for id in ids {
                        let _ = control_point.remove_listener(id);
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(ids)
    }

    /// Decode a page payload, reusing cached objects whose parent is
    /// unchanged. Objects that fail to decode are skipped.
    fn decode_page(&self, filter: &str, payload: &str) -> Result<Vec<Arc<DidlObject>>> {
        let now = Instant::now();
        let mut warnings = Vec::new();
        let mut objects = Vec::new();

        for element in parse_elements(payload)? {
            // Objects without an id cannot be cached
            let Some(id) = object_id(&element) else {
                match decode_object(&element, &mut warnings) {
                    Ok(object) => objects.push(Arc::new(object)),
                    Err(reason) => warnings.push(reason),
                }
                continue;
            };

            let built = self.cache.get_or_try_build(
                CacheKey::new(filter, id),
                now,
                |parent| self.tracker.current(parent),
                || decode_object(&element, &mut warnings),
            );
            match built {
                Ok(object) => objects.push(object),
                Err(reason) => warnings.push(reason),
            }
        }

        log_warnings(&warnings);
        Ok(objects)
    }
}

fn log_warnings(warnings: &[String]) {
    for warning in warnings {
        tracing::warn!(warning = %warning, "DIDL-Lite object skipped");
    }
}

fn apply_container_update_ids(tracker: &UpdateTracker, cache: &ObjectCache, value: &str) -> Result<Vec<String>> {
    let changed = tracker.apply_container_update_ids(value)?;
    for container in &changed {
        let dropped = cache.invalidate_children(container);
        tracing::debug!(container = %container, dropped, "container update evented");
    }
    Ok(changed)
}

fn apply_state_change(tracker: &UpdateTracker, cache: &ObjectCache, change: &StateChange) {
    match change.variable.as_str() {
        CONTAINER_UPDATE_IDS => {
            if let Err(e) = apply_container_update_ids(tracker, cache, &change.value) {
                tracing::warn!(service = %change.service, error = %e, "ignoring ContainerUpdateIDs");
            }
        }
        SYSTEM_UPDATE_ID => match change.value.trim().parse() {
            Ok(id) => {
                tracker.observe_system(id);
            }
            Err(_) => {
                tracing::warn!(service = %change.service, value = %change.value, "ignoring SystemUpdateID")
            }
        },
        _ => {}
    }
}

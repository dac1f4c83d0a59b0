//! Container update counters as last reported by the server
//!
//! The server is always right: every observed value replaces the recorded
//! one, whether it moved forward, backward or wrapped.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{DirectoryError, Result};

/// What observing a counter did to the recorded value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Nothing was recorded for the container
    First,
    Unchanged,
    Changed { previous: u32 },
}

impl Observation {
    pub fn is_changed(&self) -> bool {
        matches!(self, Observation::Changed { .. })
    }
}

/// Per-container update ids plus the server-wide `SystemUpdateID`
#[derive(Debug, Default)]
pub struct UpdateTracker {
    containers: Mutex<HashMap<String, u32>>,
    system: Mutex<Option<u32>>,
}

impl UpdateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last recorded counter of `container_id`
    pub fn current(&self, container_id: &str) -> Option<u32> {
        self.containers.lock().get(container_id).copied()
    }

    /// Record `update_id` for `container_id`
    pub fn observe(&self, container_id: &str, update_id: u32) -> Observation {
        let previous = self
            .containers
            .lock()
            .insert(container_id.to_string(), update_id);
        match previous {
            None => Observation::First,
            Some(previous) if previous == update_id => Observation::Unchanged,
            Some(previous) => {
                tracing::debug!(
                    container = %container_id,
                    previous,
                    current = update_id,
                    "container changed"
                );
                Observation::Changed { previous }
            }
        }
    }

    pub fn system_update_id(&self) -> Option<u32> {
        *self.system.lock()
    }

    pub fn observe_system(&self, update_id: u32) -> Observation {
        let previous = self.system.lock().replace(update_id);
        match previous {
            None => Observation::First,
            Some(previous) if previous == update_id => Observation::Unchanged,
            Some(previous) => Observation::Changed { previous },
        }
    }

    /// Apply an evented `ContainerUpdateIDs` value (`id,count,id,count,...`).
    ///
    /// Returns the containers whose counter changed.
    pub fn apply_container_update_ids(&self, value: &str) -> Result<Vec<String>> {
        let pairs = parse_container_update_ids(value)?;
        Ok(pairs
            .into_iter()
            .filter(|(id, count)| self.observe(id, *count).is_changed())
            .map(|(id, _)| id)
            .collect())
    }

    pub fn forget(&self, container_id: &str) {
        self.containers.lock().remove(container_id);
    }

    pub fn clear(&self) {
        self.containers.lock().clear();
        *self.system.lock() = None;
    }
}

/// Split a `ContainerUpdateIDs` value into `(container, count)` pairs
pub fn parse_container_update_ids(value: &str) -> Result<Vec<(String, u32)>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Vec::new());
    }

    let fields: Vec<&str> = value.split(',').map(str::trim).collect();
    if fields.len() % 2 != 0 {
        return Err(DirectoryError::response(
            "ContainerUpdateIDs",
            format!("odd number of fields in '{}'", value),
        ));
    }

    fields
        .chunks(2)
        .map(|pair| {
            let count = pair[1].parse().map_err(|_| {
                DirectoryError::response(
                    "ContainerUpdateIDs",
                    format!("'{}' is not an update id", pair[1]),
                )
            })?;
            Ok((pair[0].to_string(), count))
        })
        .collect()
}

//! Multi-page browse and search sequences
//!
//! A [`BrowseSequence`] accumulates the pages of one listing. The first page
//! pins the container's update id; a later page reporting a different id
//! means the listing changed underneath us, so the sequence is marked out of
//! date and no further pages are merged.

use std::sync::Arc;

use crate::object::DidlObject;

/// What a sequence lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceKind {
    /// Direct children of the container
    Children,
    /// Search results below the container
    Search { criteria: String },
}

/// Result of offering a page to a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// The page's objects were appended
    Merged,
    /// The container changed; the page was discarded
    OutOfDate,
}

/// One decoded page ready to be merged
#[derive(Debug, Clone)]
pub struct Page {
    pub objects: Vec<Arc<DidlObject>>,
    pub number_returned: u32,
    pub total_matches: u32,
    pub update_id: u32,
}

/// Accumulated state of a paged listing
#[derive(Debug, Clone)]
pub struct BrowseSequence {
    container_id: String,
    kind: SequenceKind,
    filter: String,
    sort_criteria: String,
    page_size: u32,
    next_index: u32,
    total_matches: Option<u32>,
    update_id: Option<u32>,
    objects: Vec<Arc<DidlObject>>,
    out_of_date: bool,
    exhausted: bool,
}

impl BrowseSequence {
    pub fn new(
        container_id: impl Into<String>,
        kind: SequenceKind,
        filter: impl Into<String>,
        sort_criteria: impl Into<String>,
        page_size: u32,
    ) -> Self {
        Self {
            container_id: container_id.into(),
            kind,
            filter: filter.into(),
            sort_criteria: sort_criteria.into(),
            page_size: page_size.max(1),
            next_index: 0,
            total_matches: None,
            update_id: None,
            objects: Vec::new(),
            out_of_date: false,
            exhausted: false,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn kind(&self) -> &SequenceKind {
        &self.kind
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn sort_criteria(&self) -> &str {
        &self.sort_criteria
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Offset of the next page to request
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Total reported by the server, once a page has arrived
    pub fn total_matches(&self) -> Option<u32> {
        self.total_matches
    }

    /// Update id pinned by the first page, or the newer one that made the
    /// sequence out of date
    pub fn update_id(&self) -> Option<u32> {
        self.update_id
    }

    pub fn objects(&self) -> &[Arc<DidlObject>] {
        &self.objects
    }

    pub fn into_objects(self) -> Vec<Arc<DidlObject>> {
        self.objects
    }

    pub fn is_out_of_date(&self) -> bool {
        self.out_of_date
    }

    /// Whether another page should be requested
    pub fn has_more_results(&self) -> bool {
        if self.out_of_date || self.exhausted {
            return false;
        }
        match self.total_matches {
            None => true,
            Some(total) => self.next_index < total,
        }
    }

    /// Offer the next page to the sequence
    pub fn accept(&mut self, page: Page) -> PageOutcome {
        if self.out_of_date {
            return PageOutcome::OutOfDate;
        }

        match self.update_id {
            Some(pinned) if pinned != page.update_id => {
                tracing::debug!(
                    container = %self.container_id,
                    pinned,
                    reported = page.update_id,
                    "container changed while paging"
                );
                self.update_id = Some(page.update_id);
                self.out_of_date = true;
                return PageOutcome::OutOfDate;
            }
            _ => self.update_id = Some(page.update_id),
        }

        self.total_matches = Some(page.total_matches);
        self.next_index = self.next_index.saturating_add(page.number_returned);
        // Servers that return nothing would otherwise be polled forever
        if page.number_returned == 0 {
            self.exhausted = true;
        }
        self.objects.extend(page.objects);
        PageOutcome::Merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Item, ObjectBase};

    fn page(ids: std::ops::Range<u32>, total: u32, update_id: u32) -> Page {
        let objects: Vec<Arc<DidlObject>> = ids
            .map(|i| {
                Arc::new(DidlObject::Item(Item {
                    base: ObjectBase::new(format!("t{}", i), "-1", format!("Track {}", i), "object.item"),
                    ref_id: None,
                }))
            })
            .collect();
        Page {
            number_returned: objects.len() as u32,
            objects,
            total_matches: total,
            update_id,
        }
    }

    fn sequence() -> BrowseSequence {
        BrowseSequence::new("-1", SequenceKind::Children, "*", "", 10)
    }

    #[test]
    fn test_matching_pages_merge() {
        let mut seq = sequence();
        assert!(seq.has_more_results());

        assert_eq!(seq.accept(page(0..10, 25, 3)), PageOutcome::Merged);
        assert!(seq.has_more_results());
        assert_eq!(seq.next_index(), 10);

        assert_eq!(seq.accept(page(10..20, 25, 3)), PageOutcome::Merged);
        assert_eq!(seq.accept(page(20..25, 25, 3)), PageOutcome::Merged);
        assert!(!seq.has_more_results());
        assert_eq!(seq.objects().len(), 25);
        assert!(!seq.is_out_of_date());
    }

    #[test]
    fn test_changed_update_id_discards_page() {
        let mut seq = sequence();
        seq.accept(page(0..10, 25, 3));

        assert_eq!(seq.accept(page(10..20, 25, 4)), PageOutcome::OutOfDate);
        assert!(seq.is_out_of_date());
        assert!(!seq.has_more_results());
        assert_eq!(seq.objects().len(), 10);
        assert_eq!(seq.update_id(), Some(4));

        // Even a page with the new id is not merged
        assert_eq!(seq.accept(page(10..20, 25, 4)), PageOutcome::OutOfDate);
        assert_eq!(seq.objects().len(), 10);
    }

    #[test]
    fn test_first_page_records_any_id() {
        let mut seq = sequence();
        assert_eq!(seq.accept(page(0..10, 25, 99)), PageOutcome::Merged);
        assert_eq!(seq.update_id(), Some(99));
    }

    #[test]
    fn test_empty_page_ends_sequence() {
        let mut seq = sequence();
        seq.accept(page(0..10, 25, 3));
        seq.accept(page(10..10, 25, 3));
        assert!(!seq.has_more_results());
        assert!(!seq.is_out_of_date());
    }

    #[test]
    fn test_zero_page_size_is_raised() {
        let seq = BrowseSequence::new("0", SequenceKind::Children, "*", "", 0);
        assert_eq!(seq.page_size(), 1);
    }
}

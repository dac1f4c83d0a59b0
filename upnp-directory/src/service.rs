//! ContentDirectory actions
//!
//! [`ContentDirectory`] is the seam between paging logic and the network;
//! [`ContentDirectoryClient`] implements it on top of the control point's
//! validated action invoker.

use std::sync::Arc;

use upnp_control::{ActionInvoker, ActionResult, ServiceProxy};

use crate::error::{DirectoryError, Result};

/// Service type of ContentDirectory:1
pub const CONTENT_DIRECTORY: &str = "urn:schemas-upnp-org:service:ContentDirectory:1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseFlag {
    /// The object itself
    Metadata,
    /// The object's children
    DirectChildren,
}

impl BrowseFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowseFlag::Metadata => "BrowseMetadata",
            BrowseFlag::DirectChildren => "BrowseDirectChildren",
        }
    }
}

/// One Browse or Search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest<'a> {
    /// Object to browse, or container to search
    pub object_id: &'a str,
    pub filter: &'a str,
    pub starting_index: u32,
    pub requested_count: u32,
    pub sort_criteria: &'a str,
}

/// Out-arguments of Browse and Search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    /// DIDL-Lite payload
    pub result: String,
    pub number_returned: u32,
    pub total_matches: u32,
    pub update_id: u32,
}

/// The ContentDirectory actions the directory uses
pub trait ContentDirectory: Send + Sync {
    fn browse(&self, flag: BrowseFlag, request: &PageRequest<'_>) -> Result<PageResponse>;

    /// `Search` is optional; servers without it fail with a
    /// not-implemented error.
    fn search(&self, criteria: &str, request: &PageRequest<'_>) -> Result<PageResponse>;

    fn search_capabilities(&self) -> Result<Vec<String>>;

    fn sort_capabilities(&self) -> Result<Vec<String>>;

    fn system_update_id(&self) -> Result<u32>;
}

/// [`ContentDirectory`] over a control point service proxy
#[derive(Clone)]
pub struct ContentDirectoryClient {
    invoker: ActionInvoker,
    service: Arc<ServiceProxy>,
}

impl ContentDirectoryClient {
    pub fn new(invoker: ActionInvoker, service: Arc<ServiceProxy>) -> Self {
        if service.type_name() != "ContentDirectory" {
            tracing::warn!(service = %service.key(), "not a ContentDirectory service");
        }
        Self { invoker, service }
    }

    pub fn service(&self) -> &Arc<ServiceProxy> {
        &self.service
    }

    /// Whether the server declares the optional Search action
    pub fn supports_search(&self) -> Result<bool> {
        let catalog = self.invoker.resolver().ensure_catalog(&self.service)?;
        Ok(catalog.implements("Search"))
    }

    fn page(&self, action: &str, arguments: &[(&str, &str)]) -> Result<PageResponse> {
        let result = self.invoker.invoke(&self.service, action, arguments)?;
        Ok(PageResponse {
            result: result.require("Result")?.to_string(),
            number_returned: number(&result, action, "NumberReturned")?,
            total_matches: number(&result, action, "TotalMatches")?,
            update_id: number(&result, action, "UpdateID")?,
        })
    }
}

impl ContentDirectory for ContentDirectoryClient {
    fn browse(&self, flag: BrowseFlag, request: &PageRequest<'_>) -> Result<PageResponse> {
        let starting_index = request.starting_index.to_string();
        let requested_count = request.requested_count.to_string();
        self.page(
            "Browse",
            &[
                ("ObjectID", request.object_id),
                ("BrowseFlag", flag.as_str()),
                ("Filter", request.filter),
                ("StartingIndex", starting_index.as_str()),
                ("RequestedCount", requested_count.as_str()),
                ("SortCriteria", request.sort_criteria),
            ],
        )
    }

    fn search(&self, criteria: &str, request: &PageRequest<'_>) -> Result<PageResponse> {
        let starting_index = request.starting_index.to_string();
        let requested_count = request.requested_count.to_string();
        self.page(
            "Search",
            &[
                ("ContainerID", request.object_id),
                ("SearchCriteria", criteria),
                ("Filter", request.filter),
                ("StartingIndex", starting_index.as_str()),
                ("RequestedCount", requested_count.as_str()),
                ("SortCriteria", request.sort_criteria),
            ],
        )
    }

    fn search_capabilities(&self) -> Result<Vec<String>> {
        let result = self.invoker.invoke(&self.service, "GetSearchCapabilities", &[])?;
        Ok(split_capabilities(result.require("SearchCaps")?))
    }

    fn sort_capabilities(&self) -> Result<Vec<String>> {
        let result = self.invoker.invoke(&self.service, "GetSortCapabilities", &[])?;
        Ok(split_capabilities(result.require("SortCaps")?))
    }

    fn system_update_id(&self) -> Result<u32> {
        let result = self.invoker.invoke(&self.service, "GetSystemUpdateID", &[])?;
        number(&result, "GetSystemUpdateID", "Id")
    }
}

fn number(result: &ActionResult, action: &str, name: &str) -> Result<u32> {
    let value = result.require(name)?;
    value
        .trim()
        .parse()
        .map_err(|_| DirectoryError::response(action, format!("{} is '{}', not a number", name, value)))
}

/// Split a comma-separated capability list; `*` is kept as given
fn split_capabilities(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

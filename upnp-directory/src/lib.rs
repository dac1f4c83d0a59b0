//! # UPnP Directory
//!
//! Paginated browsing and searching of a UPnP ContentDirectory service.
//!
//! Every page reports the container's update id. The first page of a
//! listing pins it; if a later page reports a different one the listing is
//! marked out of date instead of silently mixing two versions of the
//! container. Decoded objects are cached by filter and object id, and a
//! cached object is reused only while its parent container's counter is
//! unchanged.
//!
//! ```rust,ignore
//! use upnp_directory::MediaDirectory;
//!
//! let directory = MediaDirectory::for_service(&control_point, cds)?;
//! let listing = directory.browse_all("0")?;
//! for object in listing.objects() {
//!     println!("{} ({})", object.title(), object.class());
//! }
//! ```

pub mod browse;
pub mod cache;
pub mod config;
pub mod didl;
mod directory;
mod error;
pub mod object;
pub mod schema;
pub mod service;
pub mod update_state;

pub use browse::{BrowseSequence, Page, PageOutcome, SequenceKind};
pub use cache::{CacheKey, CacheStats, ObjectCache};
pub use config::DirectoryConfig;
pub use didl::{parse_didl, to_didl, DidlDocument};
pub use directory::{MediaDirectory, CONTAINER_UPDATE_IDS, SYSTEM_UPDATE_ID};
pub use error::{DirectoryError, Result};
pub use object::{AudioItem, Container, DidlObject, Item, ObjectBase, Property, Resource};
pub use service::{BrowseFlag, ContentDirectory, ContentDirectoryClient, PageRequest, PageResponse, CONTENT_DIRECTORY};
pub use update_state::{Observation, UpdateTracker};

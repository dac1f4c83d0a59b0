//! Unique Service Name parsing.
//!
//! A USN has the shape `uuid:<device-uuid>[::<suffix>]`. The part before the
//! first `::` is the identity key shared by every announcement a device makes;
//! the suffix says what is being announced:
//!
//! | Suffix                                   | Kind                    |
//! |------------------------------------------|-------------------------|
//! | (none)                                   | [`UsnKind::Bare`]       |
//! | `upnp:rootdevice`                        | [`UsnKind::RootDevice`] |
//! | `urn:<domain>:device:<type>:<version>`   | [`UsnKind::Device`]     |
//! | `urn:<domain>:service:<type>:<version>`  | [`UsnKind::Service`]    |

use std::fmt;
use std::str::FromStr;

use crate::error::{DiscoveryError, Result};

const SCOPE_PREFIX: &str = "uuid:";
const SEPARATOR: &str = "::";

/// A `urn:<domain>:<kind>:<name>:<version>` type string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeUrn {
    /// The full URN as announced
    pub urn: String,
    /// Type name, e.g. `MediaServer` or `ContentDirectory`
    pub name: String,
    /// Version suffix, when numeric
    pub version: Option<u32>,
}

impl TypeUrn {
    fn from_segments(urn: &str, segments: &[&str], marker: usize) -> Self {
        let name = segments.get(marker + 1).copied().unwrap_or_default().to_string();
        let version = segments
            .get(marker + 2)
            .and_then(|v| v.trim().parse::<u32>().ok());
        Self {
            urn: urn.to_string(),
            name,
            version,
        }
    }
}

/// What an announcement refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UsnKind {
    /// Only the device uuid; presence without type information
    Bare,
    /// `upnp:rootdevice`; presence of a root device without its type
    RootDevice,
    /// A typed device announcement
    Device(TypeUrn),
    /// A service announcement
    Service(TypeUrn),
}

/// A parsed Unique Service Name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Usn {
    raw: String,
    key: String,
    kind: UsnKind,
}

impl Usn {
    /// Parse a USN, classifying it by its suffix.
    ///
    /// The scope prefix is matched case-insensitively and always keyed as
    /// `uuid:`. Anything that does not start with `uuid:` or has nothing after
    /// it is rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let has_prefix = raw
            .get(..SCOPE_PREFIX.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(SCOPE_PREFIX));
        if !has_prefix {
            return Err(DiscoveryError::MalformedUsn(raw.to_string()));
        }

        let separator = raw[SCOPE_PREFIX.len()..]
            .find(SEPARATOR)
            .map(|idx| idx + SCOPE_PREFIX.len());
        let (key, suffix) = match separator {
            Some(idx) => (&raw[..idx], Some(&raw[idx + SEPARATOR.len()..])),
            None => (raw, None),
        };
        if key.len() == SCOPE_PREFIX.len() {
            return Err(DiscoveryError::MalformedUsn(raw.to_string()));
        }

        let kind = match suffix.map(str::trim) {
            None | Some("") => UsnKind::Bare,
            Some(s) => classify_suffix(s),
        };

        Ok(Self {
            raw: raw.to_string(),
            key: format!("{}{}", SCOPE_PREFIX, &key[SCOPE_PREFIX.len()..]),
            kind,
        })
    }

    /// The identity key, e.g. `uuid:4d696e69-444c-164e-9d41-b827eb54e3d6`
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> &UsnKind {
        &self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Device type URN, if this is a typed device announcement
    pub fn device_type(&self) -> Option<&TypeUrn> {
        match &self.kind {
            UsnKind::Device(t) => Some(t),
            _ => None,
        }
    }

    /// Service type URN, if this is a service announcement
    pub fn service_type(&self) -> Option<&TypeUrn> {
        match &self.kind {
            UsnKind::Service(t) => Some(t),
            _ => None,
        }
    }
}

fn classify_suffix(suffix: &str) -> UsnKind {
    if suffix.eq_ignore_ascii_case("upnp:rootdevice") {
        return UsnKind::RootDevice;
    }

    let segments: Vec<&str> = suffix.split(':').collect();
    // `urn:<domain>:<marker>:...` puts the marker in the third segment; other
    // shapes fall back to the first marker-looking segment.
    let marker = if segments.len() > 2 && segments[0].eq_ignore_ascii_case("urn") {
        Some(2)
    } else {
        segments
            .iter()
            .position(|s| s.eq_ignore_ascii_case("device") || s.eq_ignore_ascii_case("service"))
    };

    if let Some(marker) = marker {
        if segments[marker].eq_ignore_ascii_case("device") {
            return UsnKind::Device(TypeUrn::from_segments(suffix, &segments, marker));
        }
        if segments[marker].eq_ignore_ascii_case("service") {
            return UsnKind::Service(TypeUrn::from_segments(suffix, &segments, marker));
        }
    }

    // Vendor suffixes without a marker carry no type information
    tracing::trace!(suffix, "USN suffix without device or service marker");
    UsnKind::Bare
}

impl FromStr for Usn {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self> {
        Usn::parse(s)
    }
}

impl fmt::Display for Usn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

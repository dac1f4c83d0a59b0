//! Field tables for DIDL-Lite objects and the codec that consumes them
//!
//! Each object type lists its wire fields once: where the value lives
//! (attribute, child element or text), its namespace, how many values it
//! may have and whether an absent value is written out. [`decode_fields`]
//! and the `encode_*` functions are the only code that walks these tables.

use std::fmt::Write as _;

use xmltree::{Element, XMLNode};

use crate::object::{Container, Item, ObjectBase, Resource};

/// XML namespaces used by DIDL-Lite documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Didl,
    DublinCore,
    Upnp,
    Dlna,
}

impl Namespace {
    pub const ALL: [Namespace; 4] = [
        Namespace::Didl,
        Namespace::DublinCore,
        Namespace::Upnp,
        Namespace::Dlna,
    ];

    pub const fn uri(self) -> &'static str {
        match self {
            Namespace::Didl => "urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/",
            Namespace::DublinCore => "http://purl.org/dc/elements/1.1/",
            Namespace::Upnp => "urn:schemas-upnp-org:metadata-1-0/upnp/",
            Namespace::Dlna => "urn:schemas-dlna-org:metadata-1-0/",
        }
    }

    /// Conventional prefix; the DIDL namespace is the default one
    pub const fn prefix(self) -> Option<&'static str> {
        match self {
            Namespace::Didl => None,
            Namespace::DublinCore => Some("dc"),
            Namespace::Upnp => Some("upnp"),
            Namespace::Dlna => Some("dlna"),
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ns| ns.uri() == uri)
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ns| ns.prefix() == Some(prefix))
    }

    /// Namespace of a parsed element, by URI first and prefix second
    pub fn of(element: &Element) -> Option<Self> {
        match (&element.namespace, &element.prefix) {
            (Some(uri), _) => Self::from_uri(uri),
            (None, Some(prefix)) => Self::from_prefix(prefix),
            (None, None) => Some(Namespace::Didl),
        }
    }

    /// `prefix:local`, or `local` for the default namespace
    pub fn qualify(self, local: &str) -> String {
        match self.prefix() {
            Some(prefix) => format!("{}:{}", prefix, local),
            None => local.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Attribute,
    Element,
    /// The element's own text content
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Required,
    Optional,
    Many,
}

pub type ReadFn<T> = fn(&T) -> Vec<String>;
pub type WriteFn<T> = fn(&mut T, &str) -> Result<(), String>;

/// One wire field of type `T`
pub struct FieldSpec<T> {
    pub wire_name: &'static str,
    pub namespace: Namespace,
    pub location: Location,
    pub cardinality: Cardinality,
    /// Skip the field when encoding if it has no value
    pub omit_if_null: bool,
    pub read: ReadFn<T>,
    pub write: WriteFn<T>,
}

impl<T> FieldSpec<T> {
    pub fn qualified_name(&self) -> String {
        self.namespace.qualify(self.wire_name)
    }

    fn matches(&self, element: &Element) -> bool {
        self.location == Location::Element
            && element.name == self.wire_name
            && Namespace::of(element) == Some(self.namespace)
    }
}

impl<T> std::fmt::Debug for FieldSpec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.qualified_name())
            .field("location", &self.location)
            .field("cardinality", &self.cardinality)
            .field("omit_if_null", &self.omit_if_null)
            .finish()
    }
}

/// Whether any element field of `table` claims `element`
pub fn claims<T>(table: &[FieldSpec<T>], element: &Element) -> bool {
    table.iter().any(|spec| spec.matches(element))
}

/// Decode every field of `table` from `element` into `target`.
///
/// Fails on a missing required field or a value the field rejects.
pub fn decode_fields<T>(element: &Element, table: &[FieldSpec<T>], target: &mut T) -> Result<(), String> {
    for spec in table {
        let values: Vec<String> = match spec.location {
            Location::Attribute => element.attributes.get(spec.wire_name).cloned().into_iter().collect(),
            Location::Text => element.get_text().map(|t| t.trim().to_string()).into_iter().collect(),
            Location::Element => element
                .children
                .iter()
                .filter_map(XMLNode::as_element)
                .filter(|child| spec.matches(child))
                .map(|child| child.get_text().map(|t| t.into_owned()).unwrap_or_default())
                .collect(),
        };

        if values.is_empty() {
            if spec.cardinality == Cardinality::Required {
                return Err(format!("missing required {}", spec.qualified_name()));
            }
            continue;
        }

        let accepted = match spec.cardinality {
            Cardinality::Many => values.len(),
            Cardinality::Required | Cardinality::Optional => 1,
        };
        for value in values.iter().take(accepted) {
            (spec.write)(target, value)
                .map_err(|reason| format!("{}: {}", spec.qualified_name(), reason))?;
        }
    }
    Ok(())
}

/// Append ` name="value"` for every attribute field of `table`
pub fn encode_attributes<T>(source: &T, table: &[FieldSpec<T>], out: &mut String) {
    for spec in table.iter().filter(|s| s.location == Location::Attribute) {
        let values = (spec.read)(source);
        match values.first() {
            Some(value) => {
                let _ = write!(out, " {}=\"{}\"", spec.wire_name, escape_xml(value));
            }
            None if !spec.omit_if_null => {
                let _ = write!(out, " {}=\"\"", spec.wire_name);
            }
            None => {}
        }
    }
}

/// Append one child element per value of every element field of `table`
pub fn encode_elements<T>(source: &T, table: &[FieldSpec<T>], out: &mut String) {
    for spec in table.iter().filter(|s| s.location == Location::Element) {
        let name = spec.qualified_name();
        let values = (spec.read)(source);
        if values.is_empty() {
            if !spec.omit_if_null {
                let _ = write!(out, "<{}/>", name);
            }
            continue;
        }
        for value in values {
            let _ = write!(out, "<{0}>{1}</{0}>", name, escape_xml(&value));
        }
    }
}

/// The text field of `table`, escaped
pub fn encode_text<T>(source: &T, table: &[FieldSpec<T>]) -> String {
    table
        .iter()
        .filter(|s| s.location == Location::Text)
        .flat_map(|spec| (spec.read)(source))
        .map(|v| escape_xml(&v))
        .collect()
}

pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim() {
        "1" | "true" | "True" | "TRUE" => Ok(true),
        "0" | "false" | "False" | "FALSE" => Ok(false),
        other => Err(format!("'{}' is not a boolean", other)),
    }
}

fn flag(value: bool) -> String {
    let text = if value { "1" } else { "0" };
    text.to_string()
}

fn opt(value: &Option<String>) -> Vec<String> {
    value.iter().cloned().collect()
}

pub static OBJECT_FIELDS: &[FieldSpec<ObjectBase>] = &[
    FieldSpec {
        wire_name: "id",
        namespace: Namespace::Didl,
        location: Location::Attribute,
        cardinality: Cardinality::Required,
        omit_if_null: false,
        read: |o| vec![o.id.clone()],
        write: |o, v| {
            o.id = v.to_string();
            Ok(())
        },
    },
    FieldSpec {
        wire_name: "parentID",
        namespace: Namespace::Didl,
        location: Location::Attribute,
        cardinality: Cardinality::Required,
        omit_if_null: false,
        read: |o| vec![o.parent_id.clone()],
        write: |o, v| {
            o.parent_id = v.to_string();
            Ok(())
        },
    },
    FieldSpec {
        wire_name: "restricted",
        namespace: Namespace::Didl,
        location: Location::Attribute,
        cardinality: Cardinality::Optional,
        omit_if_null: false,
        read: |o| vec![flag(o.restricted)],
        write: |o, v| {
            o.restricted = parse_bool(v)?;
            Ok(())
        },
    },
    FieldSpec {
        wire_name: "title",
        namespace: Namespace::DublinCore,
        location: Location::Element,
        cardinality: Cardinality::Required,
        omit_if_null: false,
        read: |o| vec![o.title.clone()],
        write: |o, v| {
            o.title = v.to_string();
            Ok(())
        },
    },
    FieldSpec {
        wire_name: "creator",
        namespace: Namespace::DublinCore,
        location: Location::Element,
        cardinality: Cardinality::Optional,
        omit_if_null: true,
        read: |o| opt(&o.creator),
        write: |o, v| {
            o.creator = Some(v.to_string());
            Ok(())
        },
    },
    FieldSpec {
        wire_name: "class",
        namespace: Namespace::Upnp,
        location: Location::Element,
        cardinality: Cardinality::Required,
        omit_if_null: false,
        read: |o| vec![o.class.clone()],
        write: |o, v| {
            o.class = v.trim().to_string();
            Ok(())
        },
    },
    FieldSpec {
        wire_name: "writeStatus",
        namespace: Namespace::Upnp,
        location: Location::Element,
        cardinality: Cardinality::Optional,
        omit_if_null: true,
        read: |o| opt(&o.write_status),
        write: |o, v| {
            o.write_status = Some(v.to_string());
            Ok(())
        },
    },
];

pub static CONTAINER_FIELDS: &[FieldSpec<Container>] = &[
    FieldSpec {
        wire_name: "childCount",
        namespace: Namespace::Didl,
        location: Location::Attribute,
        cardinality: Cardinality::Optional,
        omit_if_null: true,
        read: |c| c.child_count.iter().map(u32::to_string).collect(),
        write: |c, v| {
            let count = v.trim().parse().map_err(|_| format!("'{}' is not a count", v))?;
            c.child_count = Some(count);
            Ok(())
        },
    },
    FieldSpec {
        wire_name: "searchable",
        namespace: Namespace::Didl,
        location: Location::Attribute,
        cardinality: Cardinality::Optional,
        omit_if_null: true,
        read: |c| c.searchable.map(flag).into_iter().collect(),
        write: |c, v| {
            c.searchable = Some(parse_bool(v)?);
            Ok(())
        },
    },
    FieldSpec {
        wire_name: "searchClass",
        namespace: Namespace::Upnp,
        location: Location::Element,
        cardinality: Cardinality::Many,
        omit_if_null: true,
        read: |c| c.search_classes.clone(),
        write: |c, v| {
            c.search_classes.push(v.trim().to_string());
            Ok(())
        },
    },
];

pub static ITEM_FIELDS: &[FieldSpec<Item>] = &[FieldSpec {
    wire_name: "refID",
    namespace: Namespace::Didl,
    location: Location::Attribute,
    cardinality: Cardinality::Optional,
    omit_if_null: true,
    read: |i| opt(&i.ref_id),
    write: |i, v| {
        i.ref_id = Some(v.to_string());
        Ok(())
    },
}];

macro_rules! optional_resource_attribute {
    ($wire:literal, $field:ident) => {
        FieldSpec {
            wire_name: $wire,
            namespace: Namespace::Didl,
            location: Location::Attribute,
            cardinality: Cardinality::Optional,
            omit_if_null: true,
            read: |r| opt(&r.$field),
            write: |r, v| {
                r.$field = Some(v.to_string());
                Ok(())
            },
        }
    };
}

pub static RESOURCE_FIELDS: &[FieldSpec<Resource>] = &[
    FieldSpec {
        wire_name: "protocolInfo",
        namespace: Namespace::Didl,
        location: Location::Attribute,
        cardinality: Cardinality::Required,
        omit_if_null: false,
        read: |r| vec![r.protocol_info.clone()],
        write: |r, v| {
            r.protocol_info = v.to_string();
            Ok(())
        },
    },
    optional_resource_attribute!("size", size),
    optional_resource_attribute!("duration", duration),
    optional_resource_attribute!("bitrate", bitrate),
    optional_resource_attribute!("sampleFrequency", sample_frequency),
    optional_resource_attribute!("bitsPerSample", bits_per_sample),
    optional_resource_attribute!("nrAudioChannels", nr_audio_channels),
    optional_resource_attribute!("resolution", resolution),
    FieldSpec {
        wire_name: "res",
        namespace: Namespace::Didl,
        location: Location::Text,
        cardinality: Cardinality::Required,
        omit_if_null: false,
        read: |r| vec![r.uri.clone()],
        write: |r, v| {
            r.uri = v.to_string();
            Ok(())
        },
    },
];

//! DIDL-Lite documents
//!
//! Decoding goes through the field tables in [`crate::schema`]; children no
//! table claims are kept in the object's property bag so that encoding an
//! object reproduces the metadata it was decoded from.

use std::fmt::Write as _;

use xmltree::{Element, XMLNode};

use crate::error::{DirectoryError, Result};
use crate::object::{Container, DidlObject, Item, ObjectBase, Property, Resource};
use crate::schema::{
    claims, decode_fields, encode_attributes, encode_elements, encode_text, escape_xml, Namespace,
    CONTAINER_FIELDS, ITEM_FIELDS, OBJECT_FIELDS, RESOURCE_FIELDS,
};

const ROOT: &str = "DIDL-Lite";

/// A decoded document. Objects that failed to decode are skipped and
/// described in `warnings`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DidlDocument {
    pub objects: Vec<DidlObject>,
    pub warnings: Vec<String>,
}

/// Parse a DIDL-Lite document into objects
pub fn parse_didl(xml: &str) -> Result<DidlDocument> {
    let mut document = DidlDocument::default();
    for element in parse_elements(xml)? {
        match decode_object(&element, &mut document.warnings) {
            Ok(object) => document.objects.push(object),
            Err(reason) => {
                tracing::debug!(reason = %reason, "skipping DIDL-Lite object");
                document.warnings.push(reason);
            }
        }
    }
    Ok(document)
}

/// Parse the document and return its top-level `container` and `item`
/// elements without decoding them.
pub fn parse_elements(xml: &str) -> Result<Vec<Element>> {
    let root = Element::parse(xml.trim().as_bytes())
        .map_err(|e| DirectoryError::Didl(format!("Failed to parse DIDL-Lite: {}", e)))?;
    if root.name != ROOT {
        return Err(DirectoryError::Didl(format!(
            "Expected {} root, found {}",
            ROOT, root.name
        )));
    }

    Ok(root
        .children
        .into_iter()
        .filter_map(|node| match node {
            XMLNode::Element(element) if element.name == "container" || element.name == "item" => {
                Some(element)
            }
            _ => None,
        })
        .collect())
}

/// The `id` attribute of an undecoded object element
pub fn object_id(element: &Element) -> Option<&str> {
    element.attributes.get("id").map(String::as_str)
}

/// Decode one `container` or `item` element.
///
/// Malformed resources are skipped with a warning; a malformed object
/// fails as a whole.
pub fn decode_object(element: &Element, warnings: &mut Vec<String>) -> std::result::Result<DidlObject, String> {
    let describe = |reason: String| {
        format!(
            "{} {}: {}",
            element.name,
            object_id(element).unwrap_or("<no id>"),
            reason
        )
    };

    let mut base = ObjectBase::default();
    decode_fields(element, OBJECT_FIELDS, &mut base).map_err(describe)?;

    let is_container = element.name == "container";
    for child in element.children.iter().filter_map(XMLNode::as_element) {
        let claimed = claims(OBJECT_FIELDS, child)
            || if is_container {
                claims(CONTAINER_FIELDS, child)
            } else {
                claims(ITEM_FIELDS, child)
            };
        if claimed {
            continue;
        }

        if child.name == "res" && Namespace::of(child) == Some(Namespace::Didl) {
            let mut resource = Resource::default();
            match decode_fields(child, RESOURCE_FIELDS, &mut resource) {
                Ok(()) => base.resources.push(resource),
                Err(reason) => warnings.push(describe(format!("resource skipped, {}", reason))),
            }
            continue;
        }

        base.properties.push(property(child));
    }

    if is_container {
        let mut container = Container::default();
        decode_fields(element, CONTAINER_FIELDS, &mut container).map_err(describe)?;
        container.base = base;
        Ok(DidlObject::Container(container))
    } else {
        let mut item = Item::default();
        decode_fields(element, ITEM_FIELDS, &mut item).map_err(describe)?;
        item.base = base;
        Ok(DidlObject::Item(item))
    }
}

fn property(element: &Element) -> Property {
    let name = match (Namespace::of(element), &element.prefix) {
        (Some(ns), _) => ns.qualify(&element.name),
        (None, Some(prefix)) => format!("{}:{}", prefix, element.name),
        (None, None) => element.name.clone(),
    };
    let mut attributes: Vec<(String, String)> = element
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    attributes.sort();

    Property {
        name,
        namespace: element.namespace.clone(),
        value: element.get_text().map(|t| t.into_owned()).unwrap_or_default(),
        attributes,
    }
}

/// Encode objects as a DIDL-Lite document
pub fn to_didl(objects: &[DidlObject]) -> String {
    let mut out = String::from("<DIDL-Lite");
    for ns in Namespace::ALL {
        match ns.prefix() {
            Some(prefix) => {
                let _ = write!(out, " xmlns:{}=\"{}\"", prefix, ns.uri());
            }
            None => {
                let _ = write!(out, " xmlns=\"{}\"", ns.uri());
            }
        }
    }
    out.push('>');
    for object in objects {
        encode_object(object, &mut out);
    }
    out.push_str("</DIDL-Lite>");
    out
}

fn encode_object(object: &DidlObject, out: &mut String) {
    let base = object.base();
    let tag = if object.is_container() { "container" } else { "item" };

    out.push('<');
    out.push_str(tag);
    encode_attributes(base, OBJECT_FIELDS, out);
    match object {
        DidlObject::Container(c) => encode_attributes(c, CONTAINER_FIELDS, out),
        DidlObject::Item(i) => encode_attributes(i, ITEM_FIELDS, out),
    }
    out.push('>');

    encode_elements(base, OBJECT_FIELDS, out);
    match object {
        DidlObject::Container(c) => encode_elements(c, CONTAINER_FIELDS, out),
        DidlObject::Item(i) => encode_elements(i, ITEM_FIELDS, out),
    }

    for property in &base.properties {
        encode_property(property, out);
    }

    for resource in &base.resources {
        out.push_str("<res");
        encode_attributes(resource, RESOURCE_FIELDS, out);
        out.push('>');
        out.push_str(&encode_text(resource, RESOURCE_FIELDS));
        out.push_str("</res>");
    }

    let _ = write!(out, "</{}>", tag);
}

fn encode_property(property: &Property, out: &mut String) {
    let _ = write!(out, "<{}", property.name);

    // Foreign namespaces are declared where they are used
    if let (Some(uri), Some((prefix, _))) = (&property.namespace, property.name.split_once(':')) {
        if Namespace::from_uri(uri).is_none() {
            let _ = write!(out, " xmlns:{}=\"{}\"", prefix, escape_xml(uri));
        }
    }
    for (name, value) in &property.attributes {
        let _ = write!(out, " {}=\"{}\"", name, escape_xml(value));
    }
    let _ = write!(out, ">{}</{}>", escape_xml(&property.value), property.name);
}

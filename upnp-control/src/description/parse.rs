//! Device and service description documents
//!
//! Malformed individual entries (a service without a type, an argument
//! without a name) are skipped and reported in `warnings`. Only a root
//! device without identity or type fails the whole document.

use std::sync::Arc;

use url::Url;
use xmltree::{Element, XMLNode};

use crate::error::{ControlPointError, Result};
use crate::proxy::{
    Action, AllowedRange, Argument, Constraint, DataType, DeviceInfo, Direction, Icon,
    ServiceCatalog, ServiceUrls, StateVariable,
};

/// A parsed device description document
#[derive(Debug, Clone)]
pub struct DescriptionDocument {
    /// URL the document was fetched from
    pub url: String,
    /// Base used for relative URLs
    pub url_base: String,
    pub root: DeviceDescription,
    pub warnings: Vec<String>,
}

impl DescriptionDocument {
    /// Every device in the document, root first
    pub fn all_devices(&self) -> Vec<&DeviceDescription> {
        let mut out = vec![&self.root];
        let mut index = 0;
        while index < out.len() {
            let children = &out[index].devices;
            out.extend(children.iter());
            index += 1;
        }
        out
    }

    pub fn contains_udn(&self, udn: &str) -> bool {
        self.all_devices().iter().any(|d| d.udn == udn)
    }
}

#[derive(Debug, Clone)]
pub struct DeviceDescription {
    pub udn: String,
    pub device_type: String,
    pub info: DeviceInfo,
    pub services: Vec<ServiceDescription>,
    pub devices: Vec<DeviceDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescription {
    pub service_type: String,
    pub service_id: Option<String>,
    pub urls: ServiceUrls,
}

/// Parse a device description fetched from `url`.
pub fn parse_device_description(url: &str, xml: &str) -> Result<DescriptionDocument> {
    let root = Element::parse(xml.as_bytes())
        .map_err(|e| ControlPointError::Parse(format!("Invalid description XML: {}", e)))?;

    let url_base = child_text(&root, "URLBase").unwrap_or_else(|| url.to_string());
    let base = Url::parse(&url_base)
        .or_else(|_| Url::parse(url))
        .map_err(|e| ControlPointError::Parse(format!("Invalid base URL {}: {}", url_base, e)))?;

    let device = root
        .get_child("device")
        .ok_or_else(|| ControlPointError::Parse("Missing root device element".to_string()))?;

    let mut warnings = Vec::new();
    let root_device = parse_device(device, &base, &mut warnings)?;

    for warning in &warnings {
        tracing::warn!(url = %url, "{}", warning);
    }

    Ok(DescriptionDocument {
        url: url.to_string(),
        url_base: base.to_string(),
        root: root_device,
        warnings,
    })
}

fn parse_device(
    element: &Element,
    base: &Url,
    warnings: &mut Vec<String>,
) -> Result<DeviceDescription> {
    let udn = child_text(element, "UDN")
        .ok_or_else(|| ControlPointError::Parse("Device is missing UDN".to_string()))?;
    let device_type = child_text(element, "deviceType").ok_or_else(|| {
        ControlPointError::Parse(format!("Device {} is missing deviceType", udn))
    })?;

    let info = DeviceInfo {
        friendly_name: child_text(element, "friendlyName"),
        manufacturer: child_text(element, "manufacturer"),
        manufacturer_url: child_text(element, "manufacturerURL"),
        model_name: child_text(element, "modelName"),
        model_number: child_text(element, "modelNumber"),
        model_description: child_text(element, "modelDescription"),
        model_url: child_text(element, "modelURL"),
        serial_number: child_text(element, "serialNumber"),
        upc: child_text(element, "UPC"),
        presentation_url: child_text(element, "presentationURL").and_then(|u| resolve(base, &u)),
        icons: parse_icons(element, base),
    };

    let mut services = Vec::new();
    for service in list_items(element, "serviceList", "service") {
        match parse_service_entry(service, base) {
            Some(s) => services.push(s),
            None => warnings.push(format!("Skipping service without serviceType in {}", udn)),
        }
    }

    let mut devices = Vec::new();
    for child in list_items(element, "deviceList", "device") {
        // An embedded device without identity only loses itself
        match parse_device(child, base, warnings) {
            Ok(d) => devices.push(d),
            Err(e) => warnings.push(format!("Skipping embedded device of {}: {}", udn, e)),
        }
    }

    Ok(DeviceDescription {
        udn,
        device_type,
        info,
        services,
        devices,
    })
}

fn parse_service_entry(element: &Element, base: &Url) -> Option<ServiceDescription> {
    let service_type = child_text(element, "serviceType")?;
    Some(ServiceDescription {
        service_type,
        service_id: child_text(element, "serviceId"),
        urls: ServiceUrls {
            scpd: child_text(element, "SCPDURL").and_then(|u| resolve(base, &u)),
            control: child_text(element, "controlURL").and_then(|u| resolve(base, &u)),
            event_sub: child_text(element, "eventSubURL").and_then(|u| resolve(base, &u)),
        },
    })
}

fn parse_icons(element: &Element, base: &Url) -> Vec<Icon> {
    list_items(element, "iconList", "icon")
        .filter_map(|icon| {
            let url = child_text(icon, "url").and_then(|u| resolve(base, &u))?;
            Some(Icon {
                mime_type: child_text(icon, "mimetype").unwrap_or_default(),
                width: child_number(icon, "width"),
                height: child_number(icon, "height"),
                depth: child_number(icon, "depth"),
                url,
            })
        })
        .collect()
}

/// Parse a service control protocol description into a catalog.
pub fn parse_service_description(xml: &str) -> Result<ServiceCatalog> {
    let root = Element::parse(xml.as_bytes())
        .map_err(|e| ControlPointError::Parse(format!("Invalid service description XML: {}", e)))?;

    let mut warnings = Vec::new();

    let mut variables: Vec<Arc<StateVariable>> = Vec::new();
    for element in list_items(&root, "serviceStateTable", "stateVariable") {
        match parse_state_variable(element, &mut warnings) {
            Some(var) if variables.iter().any(|v| v.name == var.name) => {
                warnings.push(format!("Skipping duplicate state variable {}", var.name));
            }
            Some(var) => variables.push(Arc::new(var)),
            None => warnings.push("Skipping state variable without name".to_string()),
        }
    }

    let mut actions: Vec<Action> = Vec::new();
    for element in list_items(&root, "actionList", "action") {
        let Some(name) = child_text(element, "name") else {
            warnings.push("Skipping action without name".to_string());
            continue;
        };
        if actions.iter().any(|a| a.name == name) {
            warnings.push(format!("Skipping duplicate action {}", name));
            continue;
        }
        let arguments = parse_arguments(element, &name, &variables, &mut warnings);
        actions.push(Action { name, arguments });
    }

    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    Ok(ServiceCatalog::new(actions, variables, warnings))
}

fn parse_state_variable(element: &Element, warnings: &mut Vec<String>) -> Option<StateVariable> {
    let name = child_text(element, "name")?;
    let data_type = match child_text(element, "dataType") {
        Some(t) => DataType::parse(&t),
        None => {
            warnings.push(format!("State variable {} has no dataType, assuming string", name));
            DataType::String
        }
    };

    let send_events = element
        .attributes
        .get("sendEvents")
        .or_else(|| element.attributes.get("sendEventsAttribute"))
        .map(|v| v.trim().eq_ignore_ascii_case("yes"))
        .or_else(|| {
            child_text(element, "sendEventsAttribute").map(|v| v.eq_ignore_ascii_case("yes"))
        })
        .unwrap_or(false);

    let values: Vec<String> = list_items(element, "allowedValueList", "allowedValue")
        .map(|v| text_of(v).unwrap_or_default())
        .collect();
    let range = element.get_child("allowedValueRange").and_then(|range| {
        let minimum = child_text(range, "minimum")?;
        let maximum = child_text(range, "maximum")?;
        Some(AllowedRange::new(minimum, maximum, child_text(range, "step")))
    });
    if element.get_child("allowedValueRange").is_some() && range.is_none() {
        warnings.push(format!("Ignoring incomplete allowedValueRange of {}", name));
    }

    let constraint = match (values.is_empty(), range) {
        (true, None) => None,
        (true, Some(range)) => Some(Constraint::AllowedRange(range)),
        (false, None) => Some(Constraint::AllowedValues(values)),
        (false, Some(_)) => {
            warnings.push(format!(
                "State variable {} declares both a value list and a range, keeping the list",
                name
            ));
            Some(Constraint::AllowedValues(values))
        }
    };

    Some(StateVariable {
        name,
        data_type,
        default_value: child_text(element, "defaultValue"),
        send_events,
        constraint,
    })
}

fn parse_arguments(
    action: &Element,
    action_name: &str,
    variables: &[Arc<StateVariable>],
    warnings: &mut Vec<String>,
) -> Vec<Argument> {
    let mut arguments: Vec<Argument> = Vec::new();
    for element in list_items(action, "argumentList", "argument") {
        let Some(name) = child_text(element, "name") else {
            warnings.push(format!("Skipping argument without name in {}", action_name));
            continue;
        };
        let direction = match child_text(element, "direction").as_deref() {
            Some(d) if d.eq_ignore_ascii_case("in") => Direction::In,
            Some(d) if d.eq_ignore_ascii_case("out") => Direction::Out,
            other => {
                warnings.push(format!(
                    "Skipping argument {} of {} with direction {:?}",
                    name, action_name, other
                ));
                continue;
            }
        };

        let related_state_variable_name =
            child_text(element, "relatedStateVariable").unwrap_or_default();
        let related_state_variable = variables
            .iter()
            .find(|v| v.name == related_state_variable_name)
            .cloned();
        if related_state_variable.is_none() {
            warnings.push(format!(
                "Argument {} of {} refers to unknown state variable {:?}",
                name, action_name, related_state_variable_name
            ));
        }

        let mut is_return_value = element.get_child("retval").is_some();
        if is_return_value && direction == Direction::In {
            warnings.push(format!(
                "Ignoring retval on in-argument {} of {}",
                name, action_name
            ));
            is_return_value = false;
        }

        arguments.push(Argument {
            name,
            direction,
            is_return_value,
            related_state_variable_name,
            related_state_variable,
        });
    }

    // At most one return value; with several, all become plain out-arguments
    let return_values = arguments.iter().filter(|a| a.is_return_value).count();
    if return_values > 1 {
        warnings.push(format!(
            "Action {} declares {} return values, treating them as out-arguments",
            action_name, return_values
        ));
        for argument in &mut arguments {
            argument.is_return_value = false;
        }
    }

    arguments
}

fn list_items<'a>(
    parent: &'a Element,
    list: &str,
    item: &'a str,
) -> impl Iterator<Item = &'a Element> + 'a {
    parent
        .get_child(list)
        .into_iter()
        .flat_map(|l| l.children.iter())
        .filter_map(XMLNode::as_element)
        .filter(move |e| e.name == item)
}

fn text_of(element: &Element) -> Option<String> {
    element
        .get_text()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn child_text(element: &Element, name: &str) -> Option<String> {
    element.get_child(name).and_then(text_of)
}

fn child_number(element: &Element, name: &str) -> Option<u32> {
    child_text(element, name).and_then(|t| t.parse().ok())
}

fn resolve(base: &Url, reference: &str) -> Option<String> {
    match base.join(reference) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            tracing::debug!(reference = %reference, error = %e, "unresolvable URL");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
    <friendlyName>NAS</friendlyName>
    <manufacturer>Acme</manufacturer>
    <UDN>uuid:root-1</UDN>
    <iconList>
      <icon><mimetype>image/png</mimetype><width>48</width><height>48</height><depth>24</depth><url>/icon.png</url></icon>
    </iconList>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ContentDirectory:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:ContentDirectory</serviceId>
        <SCPDURL>cds.xml</SCPDURL>
        <controlURL>/ctl/cds</controlURL>
        <eventSubURL>/evt/cds</eventSubURL>
      </service>
      <service>
        <serviceId>broken</serviceId>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:Basic:1</deviceType>
        <UDN>uuid:child-1</UDN>
      </device>
      <device>
        <friendlyName>no identity</friendlyName>
      </device>
    </deviceList>
  </device>
</root>"#;

    #[test]
    fn test_parse_device_resolves_relative_urls() {
        let doc = parse_device_description("http://10.0.0.2:8200/desc/root.xml", DEVICE).unwrap();
        assert_eq!(doc.root.udn, "uuid:root-1");
        assert_eq!(doc.root.info.friendly_name.as_deref(), Some("NAS"));
        assert_eq!(doc.root.info.icons[0].url, "http://10.0.0.2:8200/icon.png");

        let cds = &doc.root.services[0];
        assert_eq!(cds.urls.scpd.as_deref(), Some("http://10.0.0.2:8200/desc/cds.xml"));
        assert_eq!(cds.urls.control.as_deref(), Some("http://10.0.0.2:8200/ctl/cds"));
    }

    #[test]
    fn test_malformed_entries_are_skipped_with_warnings() {
        let doc = parse_device_description("http://10.0.0.2/root.xml", DEVICE).unwrap();
        assert_eq!(doc.root.services.len(), 1);
        assert_eq!(doc.root.devices.len(), 1);
        assert_eq!(doc.warnings.len(), 2);
        assert!(doc.contains_udn("uuid:child-1"));
    }

    #[test]
    fn test_url_base_takes_precedence() {
        let xml = DEVICE.replace(
            "<specVersion>",
            "<URLBase>http://192.168.1.9:9000/</URLBase><specVersion>",
        );
        let doc = parse_device_description("http://10.0.0.2/root.xml", &xml).unwrap();
        assert_eq!(
            doc.root.services[0].urls.control.as_deref(),
            Some("http://192.168.1.9:9000/ctl/cds")
        );
    }

    #[test]
    fn test_root_without_udn_fails() {
        let xml = DEVICE.replace("<UDN>uuid:root-1</UDN>", "");
        let err = parse_device_description("http://10.0.0.2/root.xml", &xml).unwrap_err();
        assert!(matches!(err, ControlPointError::Parse(_)));
    }

    const SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <actionList>
    <action>
      <name>GetVolume</name>
      <argumentList>
        <argument><name>Channel</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_Channel</relatedStateVariable></argument>
        <argument><name>CurrentVolume</name><direction>out</direction><retval/><relatedStateVariable>Volume</relatedStateVariable></argument>
      </argumentList>
    </action>
    <action>
      <name>GetPair</name>
      <argumentList>
        <argument><name>First</name><direction>out</direction><retval/><relatedStateVariable>Volume</relatedStateVariable></argument>
        <argument><name>Second</name><direction>out</direction><retval/><relatedStateVariable>Volume</relatedStateVariable></argument>
      </argumentList>
    </action>
    <action>
      <argumentList/>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable sendEvents="no">
      <name>A_ARG_TYPE_Channel</name>
      <dataType>string</dataType>
      <defaultValue>Master</defaultValue>
      <allowedValueList><allowedValue>Master</allowedValue><allowedValue>LF</allowedValue></allowedValueList>
    </stateVariable>
    <stateVariable sendEvents="yes">
      <name>Volume</name>
      <dataType>ui2</dataType>
      <allowedValueRange><minimum>0</minimum><maximum>100</maximum><step>1</step></allowedValueRange>
    </stateVariable>
    <stateVariable>
      <name>Both</name>
      <dataType>string</dataType>
      <allowedValueList><allowedValue>a</allowedValue></allowedValueList>
      <allowedValueRange><minimum>0</minimum><maximum>1</maximum></allowedValueRange>
    </stateVariable>
  </serviceStateTable>
</scpd>"#;

    #[test]
    fn test_parse_service_description() {
        let catalog = parse_service_description(SCPD).unwrap();
        let get_volume = catalog.action("GetVolume").unwrap();
        assert_eq!(get_volume.in_arguments().count(), 1);
        assert_eq!(get_volume.return_value().unwrap().name, "CurrentVolume");

        let channel = &get_volume.arguments[0];
        let variable = channel.related_state_variable.as_ref().unwrap();
        assert_eq!(variable.default_value.as_deref(), Some("Master"));
        assert!(variable.validate("LF").is_ok());
        assert!(variable.validate("RR").is_err());

        let volume = catalog.state_variable("Volume").unwrap();
        assert!(volume.send_events);
        assert!(matches!(volume.constraint, Some(Constraint::AllowedRange(_))));
    }

    #[test]
    fn test_two_return_values_are_demoted_with_warning() {
        let catalog = parse_service_description(SCPD).unwrap();
        let pair = catalog.action("GetPair").unwrap();
        assert!(pair.return_value().is_none());
        assert_eq!(pair.out_arguments().count(), 2);
        assert!(catalog.warnings.iter().any(|w| w.contains("GetPair declares 2 return values")));
    }

    #[test]
    fn test_list_wins_over_range_and_nameless_action_skipped() {
        let catalog = parse_service_description(SCPD).unwrap();
        let both = catalog.state_variable("Both").unwrap();
        assert!(matches!(both.constraint, Some(Constraint::AllowedValues(_))));
        assert_eq!(catalog.actions().len(), 2);
        assert!(catalog.warnings.iter().any(|w| w.contains("without name")));
    }
}

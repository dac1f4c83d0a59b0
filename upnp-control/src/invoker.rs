//! Action invocation
//!
//! Every check that can fail locally (disposal, unknown action, undeclared or
//! out-of-range argument) runs before the transport is touched.

use std::sync::Arc;
use std::time::Duration;

use crate::description::DescriptionResolver;
use crate::error::{ControlPointError, Result};
use crate::liveness::LivenessMonitor;
use crate::proxy::{Action, ServiceProxy};
use crate::transport::{ActionRequest, ControlTransport};

/// Per-call options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvokeOptions {
    /// Deadline overriding the configured default
    pub timeout: Option<Duration>,
}

impl InvokeOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Out-arguments of a successful call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionResult {
    /// Out-arguments other than the return value, in response order
    pub out_arguments: Vec<(String, String)>,
    /// The argument the action declares as its return value
    pub return_value: Option<(String, String)>,
}

impl ActionResult {
    /// Value of an out-argument or the return value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.out_arguments
            .iter()
            .chain(self.return_value.iter())
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Like [`get`](Self::get), failing with a parse error when absent
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| ControlPointError::Parse(format!("Response is missing {}", name)))
    }
}

/// Validates and performs remote action calls.
///
/// Cheap to clone; all clones share the transport and resolver.
#[derive(Clone)]
pub struct ActionInvoker {
    transport: Arc<dyn ControlTransport>,
    resolver: Arc<DescriptionResolver>,
    liveness: Arc<LivenessMonitor>,
    default_timeout: Duration,
}

impl ActionInvoker {
    pub fn new(
        transport: Arc<dyn ControlTransport>,
        resolver: Arc<DescriptionResolver>,
        liveness: Arc<LivenessMonitor>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            resolver,
            liveness,
            default_timeout,
        }
    }

    pub fn invoke(
        &self,
        service: &Arc<ServiceProxy>,
        action: &str,
        arguments: &[(&str, &str)],
    ) -> Result<ActionResult> {
        self.invoke_with(service, action, arguments, InvokeOptions::default())
    }

    /// Invoke `action` on `service`.
    ///
    /// On a timeout the owning device is re-verified before the timeout is
    /// returned; if re-verification fails the device is disposed and later
    /// calls fail with [`ControlPointError::DeviceGone`].
    pub fn invoke_with(
        &self,
        service: &Arc<ServiceProxy>,
        action: &str,
        arguments: &[(&str, &str)],
        options: InvokeOptions,
    ) -> Result<ActionResult> {
        if service.is_disposed() {
            return Err(ControlPointError::DeviceGone(service.udn().to_string()));
        }

        let catalog = match self.resolver.ensure_catalog(service) {
            Ok(catalog) => catalog,
            Err(ControlPointError::Timeout(reason)) => {
                tracing::warn!(
                    service = %service.key(),
                    "service description timed out, re-verifying device"
                );
                self.reverify(service);
                return Err(ControlPointError::Timeout(reason));
            }
            Err(e) => return Err(e),
        };
        let declared = catalog.action(action).ok_or_else(|| {
            ControlPointError::ActionNotImplemented {
                service_type: service.service_type().to_string(),
                action: action.to_string(),
            }
        })?;

        let in_arguments = validate_arguments(declared, arguments)?;

        let control_url = service.control_url().ok_or_else(|| {
            ControlPointError::resolution(
                &[],
                format!("{} has no control URL", service.key()),
            )
        })?;

        let request = ActionRequest {
            control_url: &control_url,
            service_type: service.service_type(),
            action,
            arguments: &in_arguments,
            timeout: Some(options.timeout.unwrap_or(self.default_timeout)),
        };

        tracing::debug!(service = %service.key(), action = %action, "invoking action");

        let response = match self.transport.invoke(&request) {
            Ok(response) => response,
            Err(ControlPointError::Timeout(reason)) => {
                tracing::warn!(
                    service = %service.key(),
                    action = %action,
                    "action timed out, re-verifying device"
                );
                self.reverify(service);
                return Err(ControlPointError::Timeout(reason));
            }
            Err(e) => return Err(e),
        };

        Ok(split_return_value(declared, response))
    }

    fn reverify(&self, service: &Arc<ServiceProxy>) {
        if let Some(device) = service.device() {
            self.liveness.reverify_or_dispose(&device);
        }
    }

    pub fn resolver(&self) -> &Arc<DescriptionResolver> {
        &self.resolver
    }
}

/// Check supplied arguments against the declaration and produce the full
/// in-argument list in declared order.
fn validate_arguments(action: &Action, supplied: &[(&str, &str)]) -> Result<Vec<(String, String)>> {
    let invalid = |argument: &str, reason: String| ControlPointError::ArgumentValidation {
        action: action.name.clone(),
        argument: argument.to_string(),
        reason,
    };

    for (index, (name, value)) in supplied.iter().enumerate() {
        let declared = action
            .in_arguments()
            .find(|a| a.name == *name)
            .ok_or_else(|| invalid(name, "not a declared in-argument".to_string()))?;
        if supplied[..index].iter().any(|(n, _)| n == name) {
            return Err(invalid(name, "supplied more than once".to_string()));
        }
        if let Some(variable) = &declared.related_state_variable {
            variable.validate(value).map_err(|reason| invalid(name, reason))?;
        }
    }

    Ok(action
        .in_arguments()
        .map(|declared| {
            let value = supplied
                .iter()
                .find(|(n, _)| *n == declared.name)
                .map(|(_, v)| v.to_string())
                .or_else(|| {
                    declared
                        .related_state_variable
                        .as_ref()
                        .and_then(|v| v.default_value.clone())
                })
                .unwrap_or_default();
            (declared.name.clone(), value)
        })
        .collect())
}

fn split_return_value(action: &Action, response: Vec<(String, String)>) -> ActionResult {
    let mut result = ActionResult::default();
    let return_name = action.return_value().map(|a| a.name.as_str());
    for (name, value) in response {
        if result.return_value.is_none() && Some(name.as_str()) == return_name {
            result.return_value = Some((name, value));
        } else {
            result.out_arguments.push((name, value));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::parse_service_description;

    const SCPD: &str = r#"<scpd>
  <actionList>
    <action>
      <name>SetVolume</name>
      <argumentList>
        <argument><name>InstanceID</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_InstanceID</relatedStateVariable></argument>
        <argument><name>Channel</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_Channel</relatedStateVariable></argument>
        <argument><name>DesiredVolume</name><direction>in</direction><relatedStateVariable>Volume</relatedStateVariable></argument>
      </argumentList>
    </action>
    <action>
      <name>GetVolume</name>
      <argumentList>
        <argument><name>CurrentVolume</name><direction>out</direction><retval/><relatedStateVariable>Volume</relatedStateVariable></argument>
        <argument><name>Muted</name><direction>out</direction><relatedStateVariable>Mute</relatedStateVariable></argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable><name>A_ARG_TYPE_InstanceID</name><dataType>ui4</dataType></stateVariable>
    <stateVariable>
      <name>A_ARG_TYPE_Channel</name><dataType>string</dataType><defaultValue>Master</defaultValue>
      <allowedValueList><allowedValue>Master</allowedValue><allowedValue>LF</allowedValue></allowedValueList>
    </stateVariable>
    <stateVariable>
      <name>Volume</name><dataType>ui2</dataType>
      <allowedValueRange><minimum>0</minimum><maximum>100</maximum></allowedValueRange>
    </stateVariable>
    <stateVariable><name>Mute</name><dataType>boolean</dataType></stateVariable>
  </serviceStateTable>
</scpd>"#;

    #[test]
    fn test_missing_arguments_filled_in_declared_order() {
        let catalog = parse_service_description(SCPD).unwrap();
        let action = catalog.action("SetVolume").unwrap();
        let args = validate_arguments(action, &[("DesiredVolume", "40")]).unwrap();
        assert_eq!(
            args,
            vec![
                ("InstanceID".to_string(), String::new()),
                ("Channel".to_string(), "Master".to_string()),
                ("DesiredVolume".to_string(), "40".to_string()),
            ]
        );
    }

    #[test]
    fn test_argument_validation_failures() {
        let catalog = parse_service_description(SCPD).unwrap();
        let action = catalog.action("SetVolume").unwrap();

        let out_of_range = validate_arguments(action, &[("DesiredVolume", "101")]).unwrap_err();
        assert!(matches!(
            out_of_range,
            ControlPointError::ArgumentValidation { ref argument, .. } if argument == "DesiredVolume"
        ));
        assert!(validate_arguments(action, &[("Channel", "RF")]).is_err());
        assert!(validate_arguments(action, &[("InstanceID", "-1")]).is_err());
        assert!(validate_arguments(action, &[("Loudness", "1")]).is_err());
        assert!(validate_arguments(action, &[("Channel", "LF"), ("Channel", "LF")]).is_err());
    }

    #[test]
    fn test_return_value_is_split_out() {
        let catalog = parse_service_description(SCPD).unwrap();
        let action = catalog.action("GetVolume").unwrap();
        let result = split_return_value(
            action,
            vec![
                ("CurrentVolume".to_string(), "25".to_string()),
                ("Muted".to_string(), "0".to_string()),
            ],
        );
        assert_eq!(result.return_value, Some(("CurrentVolume".to_string(), "25".to_string())));
        assert_eq!(result.out_arguments.len(), 1);
        assert_eq!(result.get("CurrentVolume"), Some("25"));
        assert_eq!(result.get("Muted"), Some("0"));
        assert!(result.require("Missing").is_err());
    }
}

//! Application-visible handles for discovered devices and services

pub mod catalog;
mod device;
mod service;

pub use catalog::{
    Action, AllowedRange, Argument, Constraint, DataType, Direction, NumericRange,
    ServiceCatalog, StateVariable,
};
pub use device::{DeviceInfo, DeviceProxy, Icon};
pub use service::{ServiceKey, ServiceProxy, ServiceUrls};

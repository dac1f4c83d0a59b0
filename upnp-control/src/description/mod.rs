//! Description fetching, parsing and resolution

mod fetch;
mod parse;
mod resolver;

pub use fetch::{DescriptionFetcher, HttpFetcher};
pub use parse::{
    parse_device_description, parse_service_description, DescriptionDocument, DeviceDescription,
    ServiceDescription,
};
pub use resolver::DescriptionResolver;

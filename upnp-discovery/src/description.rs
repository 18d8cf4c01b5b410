//! Device description parsing.
//!
//! This module handles parsing the UPnP device description XML a device serves
//! at its announced location.

use crate::error::{DiscoveryError, Result};
use serde::{Deserialize, Serialize};

/// UPnP device description document (`<root>` element).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DescriptionDocument {
    /// Base for relative URLs, when the device declares one
    #[serde(rename = "URLBase", default)]
    pub url_base: Option<String>,
    /// The root device
    pub device: DeviceDescription,
}

/// Descriptor fields of a device, as found in the first `device` element.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescription {
    /// Empty when the device omits `deviceType`
    #[serde(default)]
    pub device_type: String,
    /// Empty when the device omits `friendlyName`
    #[serde(default)]
    pub friendly_name: String,
    pub manufacturer: Option<String>,
    #[serde(rename = "manufacturerURL")]
    pub manufacturer_url: Option<String>,
    pub model_description: Option<String>,
    pub model_name: Option<String>,
    pub model_number: Option<String>,
    #[serde(rename = "modelURL")]
    pub model_url: Option<String>,
    pub serial_number: Option<String>,
    #[serde(rename = "UDN")]
    pub udn: Option<String>,
    #[serde(rename = "presentationURL")]
    pub presentation_url: Option<String>,
    /// Vendor MAC address field some devices (e.g. Belkin WeMo) publish
    #[serde(rename = "macAddress")]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub service_list: ServiceList,
}

/// The `serviceList` element of a device description.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ServiceList {
    #[serde(rename = "service", default)]
    pub services: Vec<ServiceDescription>,
}

/// One service offered by a device.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescription {
    #[serde(default)]
    pub service_type: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(rename = "SCPDURL")]
    pub scpd_url: Option<String>,
    #[serde(rename = "controlURL")]
    pub control_url: Option<String>,
    #[serde(rename = "eventSubURL")]
    pub event_sub_url: Option<String>,
}

impl DescriptionDocument {
    /// Parse a device description from XML.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::Parse` if the XML is malformed or the document has
    /// no `device` element. Missing descriptor fields are left empty.
    pub fn from_xml(xml: &str) -> Result<Self> {
        quick_xml::de::from_str(xml)
            .map_err(|e| DiscoveryError::Parse(format!("Failed to parse device XML: {}", e)))
    }
}

impl DeviceDescription {
    /// Find a service by its full service type URN.
    pub fn service(&self, service_type: &str) -> Option<&ServiceDescription> {
        self.service_list
            .services
            .iter()
            .find(|service| service.service_type == service_type)
    }

    /// Iterate over the services this device offers.
    pub fn services(&self) -> impl Iterator<Item = &ServiceDescription> {
        self.service_list.services.iter()
    }
}

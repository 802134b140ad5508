//! Device discovery using nusb.
//!
//! Enumeration only looks at descriptors; nothing is opened or claimed until
//! [`DiscoveredDevice::open`] is called.

use std::fmt;

use nusb::{DeviceInfo, MaybeFuture, list_devices};
use tracing::{debug, info, instrument};

use crate::catalog::{self, ProductDescriptor};
use crate::transport::{NusbTransport, TransportError};

/// An attached, supported light.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub product: &'static ProductDescriptor,
    pub bus_id: String,
    pub address: u8,
    pub serial: Option<String>,
    info: DeviceInfo,
}

impl DiscoveredDevice {
    /// Open the device. The interface is claimed later by the session.
    pub fn open(&self) -> Result<NusbTransport, TransportError> {
        NusbTransport::open(&self.info)
    }
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Litra {} (bus {}, address {}, serial {})",
            self.product.display_name,
            self.bus_id,
            self.address,
            self.serial.as_deref().unwrap_or("unknown")
        )
    }
}

/// Narrows discovery to a product and/or serial number.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    pub product: Option<&'static ProductDescriptor>,
    pub serial: Option<String>,
}

impl DeviceFilter {
    pub fn accepts(&self, product: &ProductDescriptor, serial: Option<&str>) -> bool {
        if let Some(wanted) = self.product {
            if wanted.product_id != product.product_id {
                return false;
            }
        }
        match self.serial.as_deref() {
            Some(wanted) => serial == Some(wanted),
            None => true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.product.is_none() && self.serial.is_none()
    }
}

/// List every attached device the catalog supports.
#[instrument(level = "debug")]
pub fn discover() -> Result<Vec<DiscoveredDevice>, TransportError> {
    discover_matching(&DeviceFilter::default())
}

/// List supported devices accepted by `filter`.
#[instrument(level = "debug", skip(filter))]
pub fn discover_matching(filter: &DeviceFilter) -> Result<Vec<DiscoveredDevice>, TransportError> {
    let devices = list_devices()
        .wait()
        .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

    let mut found = Vec::new();
    for info in devices {
        let Ok(product) = catalog::lookup(info.vendor_id(), info.product_id()) else {
            continue;
        };
        let serial = info.serial_number().map(str::to_owned);
        if !filter.accepts(product, serial.as_deref()) {
            debug!(product = product.display_name, serial = ?serial, "Filtered out");
            continue;
        }
        found.push(DiscoveredDevice {
            product,
            bus_id: info.bus_id().to_owned(),
            address: info.device_address(),
            serial,
            info,
        });
    }

    info!(count = found.len(), "Discovered Litra devices");
    Ok(found)
}

//! Supported Litra products and their transport parameters.

use std::fmt;

use thiserror::Error;

/// Logitech USB Vendor ID.
pub const LOGITECH_VENDOR_ID: u16 = 0x046D;

pub const GLOW_PRODUCT_ID: u16 = 0xC900;
pub const BEAM_PRODUCT_ID: u16 = 0xC901;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Unsupported vendor {0:04X} (expected 046D)")]
    UnsupportedVendor(u16),
    #[error("Unsupported product {0:04X}")]
    UnsupportedProduct(u16),
}

/// Static description of a supported light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductDescriptor {
    pub product_id: u16,
    pub display_name: &'static str,
    /// Endpoint commands are written to (OUT) and acknowledged on (IN).
    pub endpoint_address: u8,
    /// Length of reports and acknowledgements.
    pub report_buffer_length: u32,
}

impl fmt::Display for ProductDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Litra {} ({:04X}:{:04X})",
            self.display_name, LOGITECH_VENDOR_ID, self.product_id
        )
    }
}

static PRODUCTS: [ProductDescriptor; 2] = [
    ProductDescriptor {
        product_id: GLOW_PRODUCT_ID,
        display_name: "Glow",
        endpoint_address: 0x02,
        report_buffer_length: 64,
    },
    ProductDescriptor {
        product_id: BEAM_PRODUCT_ID,
        display_name: "Beam",
        endpoint_address: 0x01,
        report_buffer_length: 32,
    },
];

/// All supported products.
pub fn products() -> &'static [ProductDescriptor] {
    &PRODUCTS
}

/// Look up the descriptor for a vendor/product pair.
pub fn lookup(vendor_id: u16, product_id: u16) -> Result<&'static ProductDescriptor, CatalogError> {
    if vendor_id != LOGITECH_VENDOR_ID {
        return Err(CatalogError::UnsupportedVendor(vendor_id));
    }
    PRODUCTS
        .iter()
        .find(|p| p.product_id == product_id)
        .ok_or(CatalogError::UnsupportedProduct(product_id))
}

pub fn is_supported(vendor_id: u16, product_id: u16) -> bool {
    lookup(vendor_id, product_id).is_ok()
}

/// Find a product by display name, ignoring case.
pub fn find_by_name(name: &str) -> Option<&'static ProductDescriptor> {
    PRODUCTS
        .iter()
        .find(|p| p.display_name.eq_ignore_ascii_case(name))
}

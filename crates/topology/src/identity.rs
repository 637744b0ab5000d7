//! Device identity
//!
//! A [`DeviceIdentity`] names one physical attachment of a USB device: where it
//! sits (bus, address, port) plus a fingerprint of its device descriptor. Two
//! enumerations of the same attachment produce equal identities, while a
//! device that re-enumerates with different descriptor contents (firmware
//! switch, DFU mode, ...) produces a new one.

use crate::error::{Result, TopologyError};
use crate::native::NativeDevice;
use serde::{Deserialize, Serialize};
use std::fmt;

/// USB device class code of hubs (bDeviceClass)
pub const HUB_CLASS: u8 = 0x09;

/// Fields of the standard USB device descriptor
///
/// Every field of the 18-byte descriptor except the length/type header.
/// Version fields are kept in their raw BCD encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DescriptorFingerprint {
    /// USB specification release (bcdUSB)
    pub usb_version: u16,
    /// Device class (bDeviceClass)
    pub class: u8,
    /// Device subclass (bDeviceSubClass)
    pub subclass: u8,
    /// Device protocol (bDeviceProtocol)
    pub protocol: u8,
    /// Max packet size of endpoint 0 (bMaxPacketSize0)
    pub max_packet_size: u8,
    /// Vendor ID (idVendor)
    pub vendor_id: u16,
    /// Product ID (idProduct)
    pub product_id: u16,
    /// Device release number (bcdDevice)
    pub device_version: u16,
    /// Manufacturer string index, 0 if absent
    pub manufacturer_index: u8,
    /// Product string index, 0 if absent
    pub product_index: u8,
    /// Serial number string index, 0 if absent
    pub serial_number_index: u8,
    /// Number of configurations (bNumConfigurations)
    pub num_configurations: u8,
}

impl DescriptorFingerprint {
    /// Fingerprint with the given vendor/product and class, all other fields zero
    pub const fn new(vendor_id: u16, product_id: u16, class: u8) -> Self {
        Self {
            usb_version: 0x0200,
            class,
            subclass: 0,
            protocol: 0,
            max_packet_size: 64,
            vendor_id,
            product_id,
            device_version: 0x0100,
            manufacturer_index: 0,
            product_index: 0,
            serial_number_index: 0,
            num_configurations: 1,
        }
    }

    /// Check if the descriptor announces a hub
    pub fn is_hub(&self) -> bool {
        self.class == HUB_CLASS
    }
}

impl From<&rusb::DeviceDescriptor> for DescriptorFingerprint {
    fn from(desc: &rusb::DeviceDescriptor) -> Self {
        Self {
            usb_version: version_to_bcd(desc.usb_version()),
            class: desc.class_code(),
            subclass: desc.sub_class_code(),
            protocol: desc.protocol_code(),
            max_packet_size: desc.max_packet_size(),
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            device_version: version_to_bcd(desc.device_version()),
            manufacturer_index: desc.manufacturer_string_index().unwrap_or(0),
            product_index: desc.product_string_index().unwrap_or(0),
            serial_number_index: desc.serial_number_string_index().unwrap_or(0),
            num_configurations: desc.num_configurations(),
        }
    }
}

/// Re-encode a decoded rusb version as BCD
fn version_to_bcd(version: rusb::Version) -> u16 {
    let major = u16::from(version.major());
    let minor = u16::from(version.minor() & 0x0F);
    let sub_minor = u16::from(version.sub_minor() & 0x0F);
    ((major / 10) << 12) | ((major % 10) << 8) | (minor << 4) | sub_minor
}

/// Identity of one physical device attachment
///
/// Used as the sole key of the device registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Bus number
    pub bus: u8,
    /// Device address on the bus
    pub address: u8,
    /// Port number on the parent hub (0 if unknown)
    pub port: u8,
    /// Device descriptor fingerprint
    pub descriptor: DescriptorFingerprint,
}

impl DeviceIdentity {
    /// Create an identity from its parts
    pub const fn new(bus: u8, address: u8, port: u8, descriptor: DescriptorFingerprint) -> Self {
        Self {
            bus,
            address,
            port,
            descriptor,
        }
    }

    /// Read the identity of a native device
    ///
    /// Fails if the device descriptor cannot be read. Callers skip such devices
    /// for the current scan instead of building a partial identity.
    pub fn read<D: NativeDevice>(device: &D) -> Result<Self> {
        let bus = device.bus_number();
        let address = device.address();
        let port = device.port_number();
        let descriptor = device
            .descriptor()
            .map_err(|source| TopologyError::DescriptorRead {
                bus,
                address,
                source,
            })?;

        Ok(Self::new(bus, address, port, descriptor))
    }

    /// Check if this identity belongs to a hub
    pub fn is_hub(&self) -> bool {
        self.descriptor.is_hub()
    }

    pub fn vendor_id(&self) -> u16 {
        self.descriptor.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.descriptor.product_id
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus {:03} Device {:03} Port {}: ID {:04x}:{:04x}",
            self.bus, self.address, self.port, self.descriptor.vendor_id, self.descriptor.product_id
        )
    }
}

//! nusb-based USB transport implementation.

use std::io::{self, Read, Write};
use std::time::Duration;

use nusb::descriptors::TransferType;
use nusb::transfer::{Bulk, BulkOrInterrupt, Direction, In, Interrupt, Out};
use nusb::{Device, DeviceInfo, Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, trace, warn};

use super::traits::{ClaimInfo, TransportError, UsbTransport};

#[derive(Debug, Clone, Copy)]
struct EndpointInfo {
    address: u8,
    direction: Direction,
    transfer_type: TransferType,
    max_packet_size: usize,
}

/// nusb-based USB transport.
pub struct NusbTransport {
    device: Device,
    interface: Option<Interface>,
    interface_number: u8,
    endpoints: Vec<EndpointInfo>,
    kernel_driver_detached: bool,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// Open an enumerated device. The interface is not claimed yet.
    #[instrument(level = "info", skip(device_info), fields(vid = %format!("{:04X}", device_info.vendor_id()), pid = %format!("{:04X}", device_info.product_id())))]
    pub fn open(device_info: &DeviceInfo) -> Result<Self, TransportError> {
        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        info!(
            bus = %device_info.bus_id(),
            address = device_info.device_address(),
            "Device opened"
        );

        Ok(Self {
            device,
            interface: None,
            interface_number: 0,
            endpoints: Vec::new(),
            kernel_driver_detached: false,
            vid: device_info.vendor_id(),
            pid: device_info.product_id(),
        })
    }

    /// Open the first device with specific VID/PID.
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        Self::open(&device_info)
    }

    fn interface(&self) -> Result<&Interface, TransportError> {
        self.interface.as_ref().ok_or(TransportError::NotClaimed)
    }

    fn endpoint(&self, address: u8) -> Result<EndpointInfo, TransportError> {
        self.endpoints
            .iter()
            .find(|ep| ep.address == address)
            .copied()
            .ok_or(TransportError::EndpointNotFound { address })
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn detach_kernel_driver(&self, interface: u8) -> bool {
        match self.device.detach_kernel_driver(interface) {
            Ok(()) => {
                info!(interface, "Detached kernel driver");
                true
            }
            Err(e) => {
                debug!(interface, error = %e, "No kernel driver detached");
                false
            }
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn detach_kernel_driver(&self, _interface: u8) -> bool {
        false
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn attach_kernel_driver(&self, interface: u8) -> Result<(), TransportError> {
        self.device
            .attach_kernel_driver(interface)
            .map_err(|e| TransportError::ReleaseFailed {
                interface,
                message: e.to_string(),
            })
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn attach_kernel_driver(&self, _interface: u8) -> Result<(), TransportError> {
        Ok(())
    }

    fn apply_configuration(&self, interface: u8) -> Result<(), TransportError> {
        let Some(config) = self.device.configurations().next() else {
            return Ok(());
        };
        let value = config.configuration_value();
        debug!(configuration = value, "Setting configuration");
        self.device
            .set_configuration(value)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface,
                message: format!("set configuration {}: {}", value, e),
            })
    }

    fn scan_endpoints(&self, interface: u8) -> Vec<EndpointInfo> {
        let mut endpoints = Vec::new();
        for config in self.device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() != interface {
                    continue;
                }
                for alt in iface.alt_settings() {
                    for ep in alt.endpoints() {
                        endpoints.push(EndpointInfo {
                            address: ep.address(),
                            direction: ep.direction(),
                            transfer_type: ep.transfer_type(),
                            max_packet_size: ep.max_packet_size(),
                        });
                    }
                }
            }
        }
        endpoints
    }
}

fn map_io(e: io::Error, timeout: Duration, other: fn(String) -> TransportError) -> TransportError {
    match e.kind() {
        io::ErrorKind::TimedOut => TransportError::timeout(timeout),
        io::ErrorKind::NotConnected
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset => TransportError::Disconnected,
        _ => other(e.to_string()),
    }
}

fn write_endpoint<E: BulkOrInterrupt>(
    interface: &Interface,
    endpoint: u8,
    data: &[u8],
    timeout: Duration,
) -> Result<usize, TransportError> {
    let ep = interface
        .endpoint::<E, Out>(endpoint)
        .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

    let mut writer = ep.writer(data.len().max(1));
    writer.set_write_timeout(timeout);
    writer
        .write_all(data)
        .map_err(|e| map_io(e, timeout, TransportError::WriteFailed))?;
    writer
        .flush()
        .map_err(|e| map_io(e, timeout, TransportError::WriteFailed))?;
    Ok(data.len())
}

fn read_endpoint<E: BulkOrInterrupt>(
    interface: &Interface,
    endpoint: u8,
    max_len: usize,
    max_packet_size: usize,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    let ep = interface
        .endpoint::<E, In>(endpoint)
        .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

    // IN transfers must be a whole number of packets.
    let packet = max_packet_size.max(1);
    let mut reader = ep.reader(max_len.div_ceil(packet).max(1) * packet);
    reader.set_read_timeout(timeout);

    let mut buf = vec![0u8; max_len];
    let n = reader
        .read(&mut buf)
        .map_err(|e| map_io(e, timeout, TransportError::ReadFailed))?;
    buf.truncate(n);
    Ok(buf)
}

impl UsbTransport for NusbTransport {
    #[instrument(skip(self), fields(vid = %format!("{:04X}", self.vid), pid = %format!("{:04X}", self.pid)))]
    fn claim(&mut self, interface: u8) -> Result<ClaimInfo, TransportError> {
        let detached = self.detach_kernel_driver(interface);
        self.kernel_driver_detached = detached;
        self.interface_number = interface;

        if detached {
            self.apply_configuration(interface)?;
        }

        let claimed = self
            .device
            .claim_interface(interface)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface,
                message: e.to_string(),
            })?;

        self.endpoints = self.scan_endpoints(interface);
        self.interface = Some(claimed);

        info!(
            interface,
            endpoints = %self
                .endpoints
                .iter()
                .map(|ep| format!("0x{:02X}", ep.address))
                .collect::<Vec<_>>()
                .join(","),
            "Interface claimed"
        );

        Ok(ClaimInfo {
            kernel_driver_detached: detached,
        })
    }

    #[instrument(skip(self, data), fields(endpoint = %format!("0x{:02X}", endpoint), len = data.len()))]
    fn write(&self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        let interface = self.interface()?;
        let ep = self.endpoint(endpoint)?;

        let n = match ep.transfer_type {
            TransferType::Interrupt => write_endpoint::<Interrupt>(interface, endpoint, data, timeout)?,
            TransferType::Bulk => write_endpoint::<Bulk>(interface, endpoint, data, timeout)?,
            _ => return Err(TransportError::EndpointNotFound { address: endpoint }),
        };

        trace!(data = %format!("{:02X?}", data), "Write complete");
        Ok(n)
    }

    fn read(
        &self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let interface = self.interface()?;
        let ep = self.endpoint(endpoint)?;

        let buf = match ep.transfer_type {
            TransferType::Interrupt => {
                read_endpoint::<Interrupt>(interface, endpoint, max_len, ep.max_packet_size, timeout)?
            }
            TransferType::Bulk => {
                read_endpoint::<Bulk>(interface, endpoint, max_len, ep.max_packet_size, timeout)?
            }
            _ => return Err(TransportError::EndpointNotFound { address: endpoint }),
        };

        trace!(
            endpoint = %format!("0x{:02X}", endpoint),
            bytes_read = buf.len(),
            "Read complete"
        );
        Ok(buf)
    }

    fn input_endpoint(&self) -> Option<u8> {
        self.endpoints
            .iter()
            .find(|ep| {
                ep.transfer_type == TransferType::Interrupt && ep.direction == Direction::In
            })
            .map(|ep| ep.address)
    }

    #[instrument(skip(self), fields(interface = self.interface_number))]
    fn release(&mut self) -> Result<(), TransportError> {
        // Dropping the handle releases the claim.
        if self.interface.take().is_some() {
            debug!("Interface released");
        }
        self.endpoints.clear();

        if self.kernel_driver_detached {
            self.kernel_driver_detached = false;
            match self.attach_kernel_driver(self.interface_number) {
                Ok(()) => info!("Kernel driver reattached"),
                Err(e) => {
                    warn!(error = %e, "Failed to reattach kernel driver");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

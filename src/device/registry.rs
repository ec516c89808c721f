use tracing::debug;

use super::Device;
use crate::util::format_ext_address;

/// Authoritative list of devices known to the coordinator
///
/// Lookups are linear scans; a PAN holds tens of devices, not millions.
/// At most one entry exists per extended address.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        DeviceRegistry::default()
    }

    /// Inserts a device, or refreshes the entry with the same extended address
    ///
    /// Returns `true` when a new entry was added. An existing entry gets the new
    /// short address and capability info and is marked active; its readings stay.
    pub fn upsert_by_ext_address(&mut self, device: Device) -> bool {
        self.release_short_address(device.short_address, device.ext_address);
        match self.find_by_ext_address_mut(device.ext_address) {
            Some(existing) => {
                existing.update_info(device.short_address, device.capability_info);
                false
            }
            None => {
                debug!(
                    device = %format_ext_address(device.ext_address),
                    short = device.short_address,
                    "registering device"
                );
                self.devices.push(device);
                true
            }
        }
    }

    /// Marks the device with `addr` inactive; `false` if no such device
    pub fn mark_inactive_by_short_address(&mut self, addr: u16) -> bool {
        match self.find_by_short_address_mut(addr) {
            Some(device) => {
                device.mark_inactive();
                true
            }
            None => false,
        }
    }

    /// Looks up a device by short address, preferring an active entry
    pub fn find_by_short_address(&self, addr: u16) -> Option<&Device> {
        self.short_address_index(addr).map(|i| &self.devices[i])
    }

    pub fn find_by_short_address_mut(&mut self, addr: u16) -> Option<&mut Device> {
        self.short_address_index(addr).map(move |i| &mut self.devices[i])
    }

    pub fn find_by_ext_address(&self, addr: u64) -> Option<&Device> {
        self.devices.iter().find(|d| d.ext_address == addr)
    }

    pub fn find_by_ext_address_mut(&mut self, addr: u64) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.ext_address == addr)
    }

    /// Replaces the whole registry with a snapshot from the peer
    ///
    /// Duplicate extended addresses in the snapshot collapse into one entry.
    pub fn replace_all(&mut self, devices: impl IntoIterator<Item = Device>) {
        self.devices.clear();
        for device in devices {
            self.upsert_by_ext_address(device);
        }
    }

    /// Copy of every device, in insertion order
    pub fn snapshot(&self) -> Vec<Device> {
        self.devices.clone()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn short_address_index(&self, addr: u16) -> Option<usize> {
        self.devices
            .iter()
            .position(|d| d.short_address == addr && d.active)
            .or_else(|| self.devices.iter().position(|d| d.short_address == addr))
    }

    /// Short addresses are reassigned on join; a stale holder of `addr` goes inactive
    fn release_short_address(&mut self, addr: u16, owner: u64) {
        for stale in self
            .devices
            .iter_mut()
            .filter(|d| d.short_address == addr && d.ext_address != owner && d.active)
        {
            debug!(
                device = %format_ext_address(stale.ext_address),
                short = addr,
                "short address reassigned, marking previous holder inactive"
            );
            stale.mark_inactive();
        }
    }
}

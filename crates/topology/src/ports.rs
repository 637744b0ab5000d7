//! Hub port sets
//!
//! A [`PortSet`] is the list of downstream ports of a hub (or of the virtual
//! root hub). Slots only hold device identities; the registry owns the nodes.

use crate::identity::DeviceIdentity;

/// Ordered collection of hub ports
///
/// Port numbers are 1-based. Slots are created on demand since hub
/// descriptors (and with them the real port count) are not read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSet {
    slots: Vec<Option<DeviceIdentity>>,
}

impl PortSet {
    /// Create an empty port set
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device
    ///
    /// The device goes into the slot matching `port_number` if that slot is
    /// free, otherwise into the first free slot, otherwise into a new slot
    /// appended at the end. Returns the port number used. Attaching a device
    /// that is already attached returns its current port.
    pub fn attach(&mut self, identity: DeviceIdentity, port_number: u8) -> u8 {
        if let Some(port) = self.port_of(&identity) {
            return port;
        }

        let index = match usize::from(port_number).checked_sub(1) {
            Some(wanted) => {
                if wanted >= self.slots.len() {
                    self.slots.resize(wanted + 1, None);
                }
                if self.slots[wanted].is_none() {
                    wanted
                } else {
                    self.free_or_new_slot()
                }
            }
            None => self.free_or_new_slot(),
        };

        self.slots[index] = Some(identity);
        slot_to_port(index)
    }

    /// Detach a device, returning the port it was attached to
    pub fn detach(&mut self, identity: &DeviceIdentity) -> Option<u8> {
        let index = self.slot_index(identity)?;
        self.slots[index] = None;
        Some(slot_to_port(index))
    }

    /// Check if a device is attached to one of the ports
    pub fn is_attached(&self, identity: &DeviceIdentity) -> bool {
        self.slot_index(identity).is_some()
    }

    /// Port number a device is attached to
    pub fn port_of(&self, identity: &DeviceIdentity) -> Option<u8> {
        self.slot_index(identity).map(slot_to_port)
    }

    /// Attached devices with their port numbers, in port order
    pub fn attached(&self) -> impl Iterator<Item = (u8, &DeviceIdentity)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|id| (slot_to_port(index), id)))
    }

    /// Attached device identities in port order
    pub fn attached_identities(&self) -> Vec<DeviceIdentity> {
        self.slots.iter().flatten().copied().collect()
    }

    /// Number of attached devices
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of ports known so far
    pub fn number_of_ports(&self) -> usize {
        self.slots.len()
    }

    fn slot_index(&self, identity: &DeviceIdentity) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref() == Some(identity))
    }

    fn free_or_new_slot(&mut self) -> usize {
        match self.slots.iter().position(Option::is_none) {
            Some(index) => index,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        }
    }
}

fn slot_to_port(index: usize) -> u8 {
    u8::try_from(index + 1).unwrap_or(u8::MAX)
}

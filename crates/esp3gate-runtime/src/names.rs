use std::collections::{BTreeMap, HashMap};

use esp3gate_frame::DeviceAddress;

use crate::error::RouterError;

/// Name reported for addresses without a configured name.
pub const UNKNOWN_NAME: &str = "unknown";

/// Immutable bijection between logical device names and addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameTable {
    by_name: BTreeMap<String, DeviceAddress>,
    by_address: HashMap<DeviceAddress, String>,
}

impl NameTable {
    /// Build the table, rejecting a name or an address used twice.
    pub fn new<I, S>(entries: I) -> Result<Self, RouterError>
    where
        I: IntoIterator<Item = (S, DeviceAddress)>,
        S: Into<String>,
    {
        let mut table = Self::default();
        for (name, address) in entries {
            let name = name.into();
            if table.by_name.contains_key(&name) {
                return Err(RouterError::DuplicateName(name));
            }
            if let Some(first) = table.by_address.get(&address) {
                return Err(RouterError::DuplicateAddress {
                    address,
                    first: first.clone(),
                    second: name,
                });
            }
            table.by_address.insert(address, name.clone());
            table.by_name.insert(name, address);
        }
        Ok(table)
    }

    pub fn address_for(&self, name: &str) -> Option<DeviceAddress> {
        self.by_name.get(name).copied()
    }

    /// The configured name, or [`UNKNOWN_NAME`].
    pub fn name_for(&self, address: DeviceAddress) -> &str {
        self.by_address
            .get(&address)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_NAME)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Entries sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, DeviceAddress)> {
        self.by_name.iter().map(|(name, address)| (name.as_str(), *address))
    }
}

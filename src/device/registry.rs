use indexmap::IndexMap;

use crate::device::types::{DeviceHandle, ScanObservation};

/// Devices seen during the current scan pass, first sighting wins.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    observations: IndexMap<String, ScanObservation>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        DeviceRegistry::default()
    }

    /// Returns true when `handle` carries an identifier not seen before.
    pub fn observe(&mut self, handle: DeviceHandle) -> bool {
        if self.observations.contains_key(&handle.identifier) {
            return false;
        }

        let first_seen_order = self.observations.len();
        self.observations.insert(
            handle.identifier.clone(),
            ScanObservation { device: handle, first_seen_order },
        );
        true
    }

    pub fn list(&self) -> Vec<DeviceHandle> {
        self.observations.values().map(|observation| observation.device.clone()).collect()
    }

    pub fn get(&self, index: usize) -> Option<&DeviceHandle> {
        self.observations.get_index(index).map(|(_, observation)| &observation.device)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn reset(&mut self) {
        self.observations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(identifier: &str) -> DeviceHandle {
        DeviceHandle::new(identifier, None)
    }

    #[test]
    fn duplicates_are_dropped() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.observe(handle("AA:BB")));
        assert!(!registry.observe(handle("AA:BB")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn first_sighting_wins() {
        let mut registry = DeviceRegistry::new();
        registry.observe(DeviceHandle::new("AA:BB", None));
        registry.observe(DeviceHandle::new("AA:BB", Some("ESP32 HR".to_string())));
        assert_eq!(registry.list(), vec![DeviceHandle::new("AA:BB", None)]);
    }

    #[test]
    fn keeps_first_seen_order() {
        let mut registry = DeviceRegistry::new();
        for id in ["c", "a", "c", "b", "a", "d", "b"] {
            registry.observe(handle(id));
        }

        let ids: Vec<String> = registry.list().into_iter().map(|h| h.identifier).collect();
        assert_eq!(ids, vec!["c", "a", "b", "d"]);
        assert_eq!(registry.get(2), Some(&handle("b")));
        assert_eq!(registry.get(4), None);
    }

    #[test]
    fn reset_clears_everything() {
        let mut registry = DeviceRegistry::new();
        registry.observe(handle("a"));
        registry.reset();
        assert!(registry.is_empty());
        assert!(registry.observe(handle("a")));
    }
}

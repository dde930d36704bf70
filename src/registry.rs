//! Device registry
//!
//! Insertion-ordered mapping of device summaries, merging the periodic
//! full-list fetch with per-device push updates. At most one entry exists
//! per device id.

use tracing::debug;

use crate::models::{DeviceId, DeviceSummary};

/// Ordered collection of device summaries keyed by id.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceSummary>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wholesale replace from a full-list fetch.
    ///
    /// Applied as a sequence of upserts so the one-entry-per-id invariant
    /// holds even when the fetch repeats an id (later rows win in place).
    pub fn replace_all(&mut self, summaries: Vec<DeviceSummary>) {
        self.devices.clear();
        for summary in summaries {
            self.upsert(summary);
        }
        debug!(devices = self.devices.len(), "Replaced device registry");
    }

    /// Insert-or-replace by id, preserving the positions of other entries.
    ///
    /// Returns true when the device was new to the registry.
    pub fn upsert(&mut self, summary: DeviceSummary) -> bool {
        match self.devices.iter().position(|d| d.id == summary.id) {
            Some(index) => {
                self.devices[index] = summary;
                false
            }
            None => {
                self.devices.push(summary);
                true
            }
        }
    }

    pub fn get(&self, id: DeviceId) -> Option<&DeviceSummary> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Ordered snapshot of all device summaries.
    pub fn devices(&self) -> &[DeviceSummary] {
        &self.devices
    }

    /// Device ids in registry order.
    pub fn ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.iter().map(|d| d.id)
    }

    /// Coordinate pairs of all devices with finite positions.
    ///
    /// Missing or non-finite coordinates are excluded, never coerced to
    /// zero.
    pub fn positions(&self) -> Vec<(f64, f64)> {
        self.devices.iter().filter_map(|d| d.position()).collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: DeviceId, name: &str) -> DeviceSummary {
        DeviceSummary {
            id,
            hardware_id: format!("RG-{:04}", id),
            name: name.to_string(),
            lat: Some(13.0 + id as f64 * 0.1),
            lng: Some(100.0 + id as f64 * 0.1),
            is_online: true,
        }
    }

    #[test]
    fn test_upsert_unknown_id_appends() {
        let mut registry = DeviceRegistry::new();

        assert!(registry.upsert(summary(1, "a")));
        assert!(registry.upsert(summary(2, "b")));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.devices()[1].id, 2);
    }

    #[test]
    fn test_upsert_known_id_replaces_in_place() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(summary(1, "a"));
        registry.upsert(summary(2, "b"));
        registry.upsert(summary(3, "c"));

        assert!(!registry.upsert(summary(2, "renamed")));

        assert_eq!(registry.len(), 3);
        let ids: Vec<_> = registry.ids().collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(registry.get(2).unwrap().name, "renamed");
    }

    #[test]
    fn test_never_two_entries_per_id() {
        let mut registry = DeviceRegistry::new();
        for _ in 0..5 {
            registry.upsert(summary(7, "same"));
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_replace_all_dedups_by_id() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(summary(9, "old"));

        registry.replace_all(vec![
            summary(1, "a"),
            summary(2, "b"),
            summary(1, "a-later"),
        ]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(1).unwrap().name, "a-later");
        assert!(registry.get(9).is_none());
    }

    #[test]
    fn test_positions_excludes_unplaced_devices() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(summary(1, "placed"));

        let mut unplaced = summary(2, "unplaced");
        unplaced.lat = None;
        registry.upsert(unplaced);

        let mut broken = summary(3, "broken");
        broken.lng = Some(f64::NAN);
        registry.upsert(broken);

        let positions = registry.positions();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0], (13.1, 100.1));
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Port-handle registry.
//!
//! The device assigns small integer handles to connected (or loaded)
//! tools. The registry owns each handle's provisioning state through the
//! free / initialize / enable flow driven by session initialization.
//! Tracked tools reference handles by id only.

use std::collections::BTreeMap;

/// Provisioning state of one port handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Known to the device but carrying no tool.
    Free,
    /// Assigned to a tool, not yet initialized.
    Occupied,
    /// Initialized, not yet enabled for tracking.
    Initialized,
    /// Enabled; reported in tracking replies.
    Enabled,
}

/// One allocated port handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortHandle {
    pub id: u8,
    pub state: HandleState,
    /// Raw status field from the last handle search reply.
    pub search_status: u16,
    /// Tool information text from the last handle-info query.
    pub info: Option<String>,
}

/// Registry of allocated port handles, ordered by id.
#[derive(Debug, Default)]
pub struct PortHandleRegistry {
    handles: BTreeMap<u8, PortHandle>,
}

impl PortHandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a handle reported by a search, creating it as Occupied if it
    /// was unknown.
    pub fn record_search(&mut self, id: u8, search_status: u16) -> &mut PortHandle {
        let handle = self.handles.entry(id).or_insert(PortHandle {
            id,
            state: HandleState::Occupied,
            search_status,
            info: None,
        });
        handle.search_status = search_status;
        handle
    }

    /// Record a handle freshly assigned by the device (tool definition to
    /// be loaded next).
    pub fn record_assigned(&mut self, id: u8) {
        self.handles.insert(
            id,
            PortHandle {
                id,
                state: HandleState::Occupied,
                search_status: 0,
                info: None,
            },
        );
    }

    pub fn set_info(&mut self, id: u8, info: String) {
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.info = Some(info);
        }
    }

    /// Drop a handle after it was freed on the device.
    pub fn remove(&mut self, id: u8) {
        self.handles.remove(&id);
    }

    pub fn mark_initialized(&mut self, id: u8) {
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.state = HandleState::Initialized;
        }
    }

    pub fn mark_enabled(&mut self, id: u8) {
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.state = HandleState::Enabled;
        }
    }

    pub fn get(&self, id: u8) -> Option<&PortHandle> {
        self.handles.get(&id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortHandle> {
        self.handles.values()
    }

    /// Ids of all enabled handles, in ascending order.
    pub fn enabled(&self) -> Vec<u8> {
        self.handles
            .values()
            .filter(|h| h.state == HandleState::Enabled)
            .map(|h| h.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisioning_flow() {
        let mut registry = PortHandleRegistry::new();
        registry.record_search(0x0A, 0x001);
        registry.record_search(0x0B, 0x001);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(0x0A).expect("handle").state, HandleState::Occupied);

        registry.mark_initialized(0x0A);
        registry.mark_enabled(0x0A);
        registry.mark_initialized(0x0B);
        assert_eq!(registry.enabled(), vec![0x0A]);

        registry.mark_enabled(0x0B);
        assert_eq!(registry.enabled(), vec![0x0A, 0x0B]);
    }

    #[test]
    fn test_remove_after_free() {
        let mut registry = PortHandleRegistry::new();
        registry.record_search(0x01, 0x101);
        registry.remove(0x01);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_record_search_updates_status_without_resetting_state() {
        let mut registry = PortHandleRegistry::new();
        registry.record_search(0x0A, 0x001);
        registry.mark_initialized(0x0A);
        registry.record_search(0x0A, 0x011);
        let handle = registry.get(0x0A).expect("handle");
        assert_eq!(handle.state, HandleState::Initialized);
        assert_eq!(handle.search_status, 0x011);
    }
}

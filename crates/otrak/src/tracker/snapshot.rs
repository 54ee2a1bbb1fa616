// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! The latest-tracking-data snapshot.
//!
//! The poll thread is the only writer: it clones the current snapshot,
//! applies one decoded frame, and publishes the result as a whole new value
//! (`ArcSwap` in the session). Readers therefore always observe a complete
//! snapshot, never a partially updated tool list.

use crate::core::types::{is_missing, MarkerStatus, Pose, Position};
use crate::protocol::bx::BxFrame;
use crate::protocol::constants::STRAY_HANDLE;
use crate::protocol::gbf::{ComponentBody, GbfPayload};

/// One sampled instant of tracking data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingSnapshot {
    /// Device frame counter, monotonic while tracking.
    pub frame_number: u32,
    /// Tracked tools in port-handle order.
    pub tools: Vec<TrackedTool>,
    /// Detected markers not attributed to any tool.
    pub stray_markers: Vec<StrayMarker>,
}

/// A tool entry references its port handle by id; the registry owns the
/// handle itself.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedTool {
    pub handle: u16,
    /// Missing when the device could not compute a transform this frame.
    pub pose: Option<Pose>,
    /// Raw status bitfield from the reply (6D status, or the handle status
    /// byte for legacy replies).
    pub status: u16,
    pub markers: Vec<MarkerState>,
}

impl TrackedTool {
    fn new(handle: u16) -> Self {
        Self {
            handle,
            pose: None,
            status: 0,
            markers: Vec::new(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.pose.is_some()
    }
}

/// One marker belonging to a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerState {
    pub index: u16,
    pub status: MarkerStatus,
    pub position: Option<Position>,
    /// Per-marker fit error, when the reply carried one.
    pub error: Option<f32>,
}

/// One stray marker observation.
#[derive(Debug, Clone, PartialEq)]
pub struct StrayMarker {
    pub index: u16,
    pub status: MarkerStatus,
    pub position: Option<Position>,
}

impl TrackingSnapshot {
    /// Fresh snapshot with one empty tool entry per enabled port handle.
    pub fn from_handles(handles: impl IntoIterator<Item = u16>) -> Self {
        Self {
            frame_number: 0,
            tools: handles.into_iter().map(TrackedTool::new).collect(),
            stray_markers: Vec::new(),
        }
    }

    /// Find or create the tool entry for a port handle.
    fn tool_mut(&mut self, handle: u16) -> &mut TrackedTool {
        if let Some(pos) = self.tools.iter().position(|t| t.handle == handle) {
            return &mut self.tools[pos];
        }
        self.tools.push(TrackedTool::new(handle));
        self.tools.last_mut().expect("just pushed")
    }

    /// Apply one decoded GBF payload.
    ///
    /// Frame items nest complete payloads, so this walks the tree
    /// recursively: frame -> payload -> components -> items.
    pub fn apply_gbf(&mut self, payload: &GbfPayload) {
        self.stray_markers.clear();
        self.apply_gbf_inner(payload);
    }

    fn apply_gbf_inner(&mut self, payload: &GbfPayload) {
        for component in &payload.components {
            match &component.body {
                ComponentBody::Frame(items) => {
                    for item in items {
                        self.frame_number = item.frame_number;
                        self.apply_gbf_inner(&item.payload);
                    }
                }
                ComponentBody::Pose6d(items) => {
                    for item in items {
                        let tool = self.tool_mut(item.handle);
                        tool.pose = item.pose;
                        tool.status = item.status;
                    }
                }
                ComponentBody::Marker3d(groups) => {
                    for group in groups {
                        if group.handle == STRAY_HANDLE {
                            for marker in &group.markers {
                                self.stray_markers.push(StrayMarker {
                                    index: marker.index,
                                    status: marker.status,
                                    position: marker.position,
                                });
                            }
                            continue;
                        }
                        let tool = self.tool_mut(group.handle);
                        tool.markers = group
                            .markers
                            .iter()
                            .map(|m| MarkerState {
                                index: m.index,
                                status: m.status,
                                position: m.position,
                                error: None,
                            })
                            .collect();
                    }
                }
                ComponentBody::MarkerError(groups) => {
                    for group in groups {
                        if group.handle == STRAY_HANDLE {
                            continue;
                        }
                        let tool = self.tool_mut(group.handle);
                        for (index, error) in &group.errors {
                            if let Some(marker) =
                                tool.markers.iter_mut().find(|m| m.index == *index)
                            {
                                marker.error = Some(*error);
                            }
                        }
                    }
                }
                // Buttons, images, and alerts carry no pose data; unknown
                // components have already been skipped by the codec.
                ComponentBody::Button1d(_)
                | ComponentBody::Image(_)
                | ComponentBody::Alert(_)
                | ComponentBody::Unknown { .. } => {}
            }
        }
    }

    /// Apply one decoded legacy reply.
    pub fn apply_bx(&mut self, frame: &BxFrame) {
        self.stray_markers.clear();

        for handle in &frame.handles {
            if let Some(frame_number) = handle.frame_number {
                self.frame_number = frame_number;
            }
            let tool = self.tool_mut(u16::from(handle.handle));
            tool.status = u16::from(handle.status);
            tool.pose = handle.pose.filter(|p| !is_missing(p.tx));
            if let Some(markers) = &handle.markers {
                tool.markers = markers
                    .iter()
                    .enumerate()
                    .map(|(i, m)| MarkerState {
                        index: i as u16,
                        status: if m.out_of_volume {
                            MarkerStatus::OutOfVolume
                        } else {
                            MarkerStatus::Okay
                        },
                        position: Some(m.position),
                        error: None,
                    })
                    .collect();
            }
        }

        if let Some(strays) = &frame.stray_passive {
            for (i, marker) in strays.iter().enumerate() {
                self.stray_markers.push(StrayMarker {
                    index: i as u16,
                    status: if marker.out_of_volume {
                        MarkerStatus::OutOfVolume
                    } else {
                        MarkerStatus::Stray
                    },
                    position: Some(marker.position),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::bx::{handle_status, BxHandle, BxStrayMarker};
    use crate::protocol::gbf::{DataComponent, FrameItem, Item3d, Item6d, Tool3d};

    fn pose(tx: f32) -> Pose {
        Pose::new(1.0, 0.0, 0.0, 0.0, tx, 0.0, 0.0, 0.1)
    }

    #[test]
    fn test_apply_gbf_updates_tools_and_frame_number() {
        let mut snapshot = TrackingSnapshot::from_handles([0x0A, 0x0B]);
        let payload = GbfPayload {
            version: 1,
            components: vec![DataComponent {
                item_format: 0,
                body: ComponentBody::Frame(vec![FrameItem {
                    frame_type: 2,
                    sequence_index: 0,
                    status: 0,
                    frame_number: 900,
                    timestamp_s: 0,
                    timestamp_ns: 0,
                    payload: GbfPayload {
                        version: 1,
                        components: vec![
                            DataComponent {
                                item_format: 0,
                                body: ComponentBody::Pose6d(vec![
                                    Item6d {
                                        handle: 0x0A,
                                        status: 0,
                                        pose: Some(pose(5.0)),
                                    },
                                    Item6d {
                                        handle: 0x0B,
                                        status: 0x0100,
                                        pose: None,
                                    },
                                ]),
                            },
                            DataComponent {
                                item_format: 0,
                                body: ComponentBody::Marker3d(vec![
                                    Tool3d {
                                        handle: 0x0A,
                                        markers: vec![Item3d {
                                            status: MarkerStatus::Okay,
                                            index: 0,
                                            position: Some(Position::new(1.0, 2.0, 3.0)),
                                        }],
                                    },
                                    Tool3d {
                                        handle: STRAY_HANDLE,
                                        markers: vec![Item3d {
                                            status: MarkerStatus::Stray,
                                            index: 7,
                                            position: Some(Position::new(9.0, 9.0, 9.0)),
                                        }],
                                    },
                                ]),
                            },
                        ],
                    },
                }]),
            }],
        };

        snapshot.apply_gbf(&payload);
        assert_eq!(snapshot.frame_number, 900);
        assert_eq!(snapshot.tools.len(), 2);
        assert_eq!(snapshot.tools[0].pose, Some(pose(5.0)));
        assert!(snapshot.tools[0].is_visible());
        assert!(!snapshot.tools[1].is_visible());
        assert_eq!(snapshot.tools[0].markers.len(), 1);
        assert_eq!(snapshot.stray_markers.len(), 1);
        assert_eq!(snapshot.stray_markers[0].index, 7);
    }

    #[test]
    fn test_apply_gbf_clears_previous_strays() {
        let mut snapshot = TrackingSnapshot::from_handles([0x0A]);
        snapshot.stray_markers.push(StrayMarker {
            index: 0,
            status: MarkerStatus::Stray,
            position: None,
        });
        snapshot.apply_gbf(&GbfPayload {
            version: 1,
            components: vec![],
        });
        assert!(snapshot.stray_markers.is_empty());
    }

    #[test]
    fn test_apply_bx_missing_tool_keeps_entry() {
        let mut snapshot = TrackingSnapshot::from_handles([0x0A]);
        let frame = BxFrame {
            handles: vec![BxHandle {
                handle: 0x0A,
                status: handle_status::MISSING,
                pose: None,
                port_status: Some(0),
                frame_number: Some(42),
                tool_info: None,
                stray_active: None,
                markers: None,
            }],
            stray_passive: Some(vec![BxStrayMarker {
                position: Position::new(1.0, 1.0, 1.0),
                out_of_volume: false,
                phantom_status: 0,
            }]),
            system_status: 0,
        };
        snapshot.apply_bx(&frame);
        assert_eq!(snapshot.frame_number, 42);
        assert_eq!(snapshot.tools.len(), 1);
        assert_eq!(snapshot.tools[0].pose, None);
        assert_eq!(snapshot.stray_markers.len(), 1);
        assert_eq!(snapshot.stray_markers[0].status, MarkerStatus::Stray);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Session configuration.
//!
//! Wire-format constants live in [`crate::protocol::constants`]; this module
//! holds the runtime knobs a session is built with.

use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::bx::reply_option;
use crate::protocol::commands::DEFAULT_GBF_FILTER;

/// How the poll loop asks the device for tracking data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataRequest {
    /// Newer GBF data command with an item filter.
    Gbf { filter: String },
    /// Legacy per-handle command with a reply-option bitmask.
    Legacy { options: u16 },
}

impl Default for DataRequest {
    fn default() -> Self {
        DataRequest::Gbf {
            filter: DEFAULT_GBF_FILTER.to_string(),
        }
    }
}

/// Runtime configuration for a tracker session.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Session name used in events and logs.
    pub name: String,
    /// Connect attempts before giving up. Fixed count, no backoff policy.
    pub connect_retries: u32,
    /// Enforce CRC verification on received frames. Off by default:
    /// devices are observed to emit spurious bytes, and robustness takes
    /// precedence over strict validation.
    pub verify_checksums: bool,
    /// Data acquisition command used by the poll loop.
    pub data_request: DataRequest,
    /// Tracking priority character passed when enabling port handles
    /// ('S' static, 'D' dynamic, 'B' button box).
    pub enable_mode: char,
    /// Tool definition files to load onto requested port handles during
    /// initialization (wireless tools).
    pub srom_files: Vec<PathBuf>,
    /// How long the poll loop sleeps between checks while paused.
    pub pause_backoff: Duration,
    /// How long the poll loop sleeps after a poll failure, so a dead device
    /// does not turn the loop into a busy error storm.
    pub error_backoff: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            name: "tracker".to_string(),
            connect_retries: 3,
            verify_checksums: false,
            data_request: DataRequest::default(),
            enable_mode: 'D',
            srom_files: Vec::new(),
            pause_backoff: Duration::from_millis(10),
            error_backoff: Duration::from_millis(50),
        }
    }
}

impl TrackerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self
    }

    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    pub fn with_data_request(mut self, request: DataRequest) -> Self {
        self.data_request = request;
        self
    }

    /// Shorthand for the legacy data command with the given options.
    pub fn with_legacy_data(mut self, options: u16) -> Self {
        self.data_request = DataRequest::Legacy { options };
        self
    }

    pub fn with_srom_files(mut self, files: Vec<PathBuf>) -> Self {
        self.srom_files = files;
        self
    }
}

/// Default option mask for the legacy data command: transforms plus stray
/// passive markers.
pub fn default_legacy_options() -> u16 {
    reply_option::TRANSFORM | reply_option::STRAY_PASSIVE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.connect_retries, 3);
        assert!(!config.verify_checksums);
        assert_eq!(
            config.data_request,
            DataRequest::Gbf {
                filter: DEFAULT_GBF_FILTER.to_string()
            }
        );
    }

    #[test]
    fn test_builder_chain() {
        let config = TrackerConfig::default()
            .with_name("side-cart")
            .with_connect_retries(5)
            .with_legacy_data(0x0001);
        assert_eq!(config.name, "side-cart");
        assert_eq!(config.connect_retries, 5);
        assert_eq!(config.data_request, DataRequest::Legacy { options: 0x0001 });
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Recording sink seam.
//!
//! The session feeds every successfully decoded frame to the active sink.
//! The bundled CSV sink writes one row per tool per frame; anything richer
//! (binary data files, databases) implements [`RecordingSink`] itself.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::tracker::snapshot::TrackingSnapshot;

/// Destination for recorded tracking data.
pub trait RecordingSink: Send {
    /// Called once when recording starts, with the tracked tool handles.
    fn start(&mut self, handles: &[u16]) -> Result<()>;

    /// Called for every published snapshot while recording.
    fn record(&mut self, snapshot: &TrackingSnapshot) -> Result<()>;

    /// Called once when recording stops.
    fn finish(&mut self) -> Result<()>;
}

/// CSV pose recorder: `frame,handle,q0,qx,qy,qz,tx,ty,tz,error` with
/// `MISSING` in place of the pose fields when a tool was not visible.
pub struct CsvPoseSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl CsvPoseSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
        }
    }
}

impl RecordingSink for CsvPoseSink {
    fn start(&mut self, handles: &[u16]) -> Result<()> {
        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "frame,handle,q0,qx,qy,qz,tx,ty,tz,error")?;
        log::info!(
            "[recording] writing {} tool(s) to {}",
            handles.len(),
            self.path.display()
        );
        self.writer = Some(writer);
        Ok(())
    }

    fn record(&mut self, snapshot: &TrackingSnapshot) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::InvalidState("recording sink not started".into()))?;
        for tool in &snapshot.tools {
            match &tool.pose {
                Some(p) => writeln!(
                    writer,
                    "{},{},{},{},{},{},{},{},{},{}",
                    snapshot.frame_number,
                    tool.handle,
                    p.q0,
                    p.qx,
                    p.qy,
                    p.qz,
                    p.tx,
                    p.ty,
                    p.tz,
                    p.error
                )?,
                None => writeln!(
                    writer,
                    "{},{},MISSING,MISSING,MISSING,MISSING,MISSING,MISSING,MISSING,MISSING",
                    snapshot.frame_number, tool.handle
                )?,
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            log::info!("[recording] finished {}", self.path.display());
        }
        Ok(())
    }
}

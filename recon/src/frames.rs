//! Discovery of nested frames opened by modal dialogs.
//!
//! The remote application renders each modal in a new frame appended to the
//! outer document. "The new frame" is identified by count: take a snapshot
//! before the triggering click, then wait for the count to exceed it.

use crate::platforms::{ContextId, DocumentEngine};
use crate::utils::wait_for;
use crate::{ReconError, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// A frame found by discovery. Owned by the workflow step that opened it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHandle {
    /// Ordinal among matching frames at discovery time
    pub index: usize,
    pub id: String,
    pub context: ContextId,
}

/// Frame count recorded before a triggering action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub count: usize,
}

#[derive(Clone)]
pub struct FrameDiscoverer {
    engine: Arc<dyn DocumentEngine>,
    naming: Selector,
    poll_interval: Duration,
    content_threshold: usize,
}

impl FrameDiscoverer {
    pub(crate) fn new(
        engine: Arc<dyn DocumentEngine>,
        naming: Selector,
        poll_interval: Duration,
        content_threshold: usize,
    ) -> Self {
        Self {
            engine,
            naming,
            poll_interval,
            content_threshold,
        }
    }

    pub async fn snapshot(&self) -> Result<FrameSnapshot, ReconError> {
        let count = self.engine.frames(&self.naming).await?.len();
        debug!(count, "Frame snapshot");
        Ok(FrameSnapshot { count })
    }

    /// Every matching frame whose content is reachable right now
    pub async fn open_frames(&self) -> Result<Vec<FrameHandle>, ReconError> {
        let frames = self.engine.frames(&self.naming).await?;
        Ok(frames
            .into_iter()
            .enumerate()
            .filter(|(_, f)| f.content_length.is_some())
            .map(|(index, f)| FrameHandle {
                index,
                context: ContextId::Frame(f.id.clone()),
                id: f.id,
            })
            .collect())
    }

    /// Wait until more frames exist than in `previous` and the newest one
    /// has rendered content.
    #[instrument(level = "debug", skip(self, previous), fields(previous = previous.count))]
    pub async fn discover(
        &self,
        previous: FrameSnapshot,
        timeout: Duration,
    ) -> Result<FrameHandle, ReconError> {
        debug!("Looking for frame > {}...", previous.count);
        let found = wait_for(timeout, self.poll_interval, move || async move {
            let frames = self.engine.frames(&self.naming).await?;
            if frames.len() <= previous.count {
                return Ok(None);
            }
            let index = frames.len() - 1;
            let newest = &frames[index];
            // Created but not yet rendering; its fields would race emptiness.
            if newest.content_length.unwrap_or(0) <= self.content_threshold {
                return Ok(None);
            }
            Ok::<_, ReconError>(Some(FrameHandle {
                index,
                id: newest.id.clone(),
                context: ContextId::Frame(newest.id.clone()),
            }))
        })
        .await?;

        match found {
            Some(handle) => {
                info!("Found new frame: {}", handle.id);
                Ok(handle)
            }
            None => {
                warn!(timeout = ?timeout, "Timeout waiting for new frame to load");
                Err(ReconError::FrameTimeout {
                    previous: previous.count,
                    timeout,
                })
            }
        }
    }
}

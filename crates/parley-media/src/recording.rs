//! Voice recording session on top of an [`AudioRecorder`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use parley_shared::DeviceError;

use crate::devices::{AudioRecorder, MediaRef};

const IDLE: u8 = 0;
const STARTING: u8 = 1;
const RECORDING: u8 = 2;
const STOPPING: u8 = 3;

/// Tracks whether a recording is running so the action menu can offer
/// "Stop Recording" and a second start is refused instead of reaching the
/// microphone twice.
pub struct RecordingSession {
    recorder: Arc<dyn AudioRecorder>,
    state: AtomicU8,
}

impl RecordingSession {
    pub fn new(recorder: Arc<dyn AudioRecorder>) -> Self {
        Self {
            recorder,
            state: AtomicU8::new(IDLE),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state.load(Ordering::SeqCst) == RECORDING
    }

    pub async fn start(&self) -> Result<(), DeviceError> {
        if self
            .state
            .compare_exchange(IDLE, STARTING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DeviceError::Busy("recording already in progress".into()));
        }

        match self.recorder.start().await {
            Ok(()) => {
                self.state.store(RECORDING, Ordering::SeqCst);
                info!("Recording started");
                Ok(())
            }
            Err(e) => {
                self.state.store(IDLE, Ordering::SeqCst);
                warn!(error = %e, "Recorder failed to start");
                Err(e)
            }
        }
    }

    /// Finish the recording and hand back the file. The session is idle
    /// afterwards whether or not the recorder succeeded.
    pub async fn stop(&self) -> Result<MediaRef, DeviceError> {
        if self
            .state
            .compare_exchange(RECORDING, STOPPING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DeviceError::Failed("no recording in progress".into()));
        }

        let result = self.recorder.stop().await;
        self.state.store(IDLE, Ordering::SeqCst);
        match &result {
            Ok(media) => debug!(path = %media.path().display(), "Recording stopped"),
            Err(e) => warn!(error = %e, "Recorder failed to stop"),
        }
        result
    }
}

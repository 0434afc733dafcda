//! Audio playback via rodio.
//!
//! One output stream and one shared sink per engine; the sink handle is
//! cloned into the streaming worker so playback can be stopped from the
//! orchestrator thread mid-chunk.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tracing::info;

pub struct AudioPlayer {
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
    sink: Arc<Sink>,
}

impl AudioPlayer {
    /// Open the named output device, or the system default.
    pub fn new(device_name: Option<&str>) -> anyhow::Result<Self> {
        let (stream, stream_handle) = match device_name {
            Some(name) => {
                let host = cpal::default_host();
                let device = host
                    .output_devices()
                    .map_err(|e| anyhow::anyhow!("Failed to enumerate output devices: {e}"))?
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false));
                match device {
                    Some(dev) => {
                        info!(device = %name, "Selected output device");
                        OutputStream::try_from_device(&dev).map_err(|e| {
                            anyhow::anyhow!("Failed to open output device '{name}': {e}")
                        })?
                    }
                    None => {
                        info!(requested = %name, "Output device not found, using default");
                        OutputStream::try_default()
                            .map_err(|e| anyhow::anyhow!("Failed to open audio output: {e}"))?
                    }
                }
            }
            None => OutputStream::try_default()
                .map_err(|e| anyhow::anyhow!("Failed to open audio output: {e}"))?,
        };

        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| anyhow::anyhow!("Failed to create audio sink: {e}"))?;

        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
            sink: Arc::new(sink),
        })
    }

    /// Clonable handle for appending and stopping from other threads.
    pub fn sink_handle(&self) -> Arc<Sink> {
        Arc::clone(&self.sink)
    }
}

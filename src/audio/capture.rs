// Live capture - default input device feeding the visualizer
//
// The cpal data callback owns the Visualizer outright. Per callback it only
// down-mixes, runs the windowed FFT and publishes into the frame pool; there
// is no locking and no logging on that path.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::config::VisualizerConfig;
use crate::error::TransportError;
use crate::visualizer::{BandFrameReceiver, Visualizer};

const DEVICE_NAME: &str = "default input device";

/// Running capture stream; dropping it stops capture
pub struct LiveCapture {
    stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
}

impl LiveCapture {
    /// Open the default input device and start streaming into a visualizer
    ///
    /// # Returns
    /// The running capture plus the receiver band frames arrive on.
    pub fn start(config: &VisualizerConfig) -> Result<(Self, BandFrameReceiver), TransportError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| open_failed("No default input device found".to_string()))?;

        let supported = device
            .default_input_config()
            .map_err(|e| open_failed(format!("Failed to get default input config: {:?}", e)))?;

        let stream_config: cpal::StreamConfig = supported.clone().into();
        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels;
        let channel_count = channels as usize;

        let (mut visualizer, receiver) =
            Visualizer::new(config, sample_rate).map_err(|e| TransportError::UnsupportedFormat {
                details: e.to_string(),
            })?;

        let err_fn = |err| log::error!("[LiveCapture] Input stream error: {}", err);

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    visualizer.process_interleaved(data, channel_count);
                },
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    visualizer.process_i16(data, channel_count);
                },
                err_fn,
                None,
            ),
            other => {
                return Err(TransportError::UnsupportedFormat {
                    details: format!("capture sample format {:?}", other),
                })
            }
        }
        .map_err(|e| open_failed(format!("{:?}", e)))?;

        stream
            .play()
            .map_err(|e| open_failed(format!("Failed to start input stream: {:?}", e)))?;

        log::info!(
            "[LiveCapture] Capturing {} Hz, {} ch",
            sample_rate,
            channels
        );

        Ok((
            Self {
                stream,
                sample_rate,
                channels,
            },
            receiver,
        ))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn stop(self) {
        if let Err(e) = self.stream.pause() {
            log::warn!("[LiveCapture] Failed to pause input stream: {:?}", e);
        }
    }
}

fn open_failed(reason: String) -> TransportError {
    TransportError::OpenFailed {
        path: DEVICE_NAME.to_string(),
        reason,
    }
}

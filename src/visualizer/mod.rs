// Visualizer - real-time banded spectrum for live capture buffers
//
// Runs inside the capture callback, so everything here is allocation-free
// after construction: the sample window, FFT scratch, magnitudes and band
// vectors are all sized up front. Finished band frames leave through the
// frame pool (see `frame_pool`), never through a blocking channel.
//
// Per full window (50% overlap):
// 1. Hamming window, FFT via a precomputed radix-2 plan
// 2. Half-spectrum magnitudes averaged into log-spaced bands
// 3. Normalize by the frame's peak band, compress with tanh(v * gain)
// 4. Temporal smoothing against the previous frame, publish

mod bands;
mod frame_pool;

pub use bands::BandLayout;
pub use frame_pool::{frame_pool, BandFrame, BandFrameReceiver, BandFrameSender};

use std::f64::consts::PI;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::analysis::fft::{padded_length, Complex64, Radix2Fft};
use crate::audio::i16_to_f32;
use crate::config::VisualizerConfig;
use crate::error::AnalysisError;

/// Stack scratch used to convert 16-bit capture buffers
const I16_SCRATCH: usize = 512;

/// Streaming spectrum analyzer feeding a band frame pool
pub struct Visualizer {
    plan: Radix2Fft,
    layout: BandLayout,
    window: Vec<f64>,
    /// Mono samples waiting for a full window
    pending: Vec<f64>,
    hop: usize,
    spectrum: Vec<Complex64>,
    magnitudes: Vec<f64>,
    bands: Vec<f64>,
    smoothed: Vec<f64>,
    has_previous: bool,
    gain: f64,
    smoothing: f64,
    sender: BandFrameSender,
    frames_emitted: u64,
}

impl Visualizer {
    /// Build a visualizer and the receiver its frames arrive on
    ///
    /// # Arguments
    /// * `config` - Visualizer settings; `fft_size` is rounded up to a power of two
    /// * `sample_rate` - Capture sample rate in Hz
    pub fn new(
        config: &VisualizerConfig,
        sample_rate: u32,
    ) -> Result<(Self, BandFrameReceiver), AnalysisError> {
        let fft_size = padded_length(config.fft_size, 2);
        let plan = Radix2Fft::new(fft_size)?;
        let layout = BandLayout::new(
            config.band_count,
            config.min_frequency_hz,
            sample_rate,
            fft_size,
        );
        let band_count = layout.band_count();
        let (sender, receiver) = frame_pool(config.frame_pool_size, band_count);

        let window = (0..fft_size)
            .map(|n| 0.54 - 0.46 * (2.0 * PI * n as f64 / (fft_size - 1) as f64).cos())
            .collect();

        log::info!(
            "[Visualizer] fft_size={} bands={} sample_rate={}",
            fft_size,
            band_count,
            sample_rate
        );

        Ok((
            Self {
                plan,
                layout,
                window,
                pending: Vec::with_capacity(fft_size),
                hop: fft_size / 2,
                spectrum: vec![Complex64::new(0.0, 0.0); fft_size],
                magnitudes: vec![0.0; fft_size / 2],
                bands: vec![0.0; band_count],
                smoothed: vec![0.0; band_count],
                has_previous: false,
                gain: config.compression_gain,
                smoothing: config.temporal_smoothing.clamp(0.0, 1.0),
                sender,
                frames_emitted: 0,
            },
            receiver,
        ))
    }

    pub fn layout(&self) -> &BandLayout {
        &self.layout
    }

    /// Band values of the most recent frame
    pub fn latest_bands(&self) -> &[f64] {
        &self.smoothed
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn dropped_frames(&self) -> u64 {
        self.sender.dropped_frames()
    }

    /// Feed interleaved float samples; returns the number of frames computed
    pub fn process_interleaved(&mut self, data: &[f32], channels: usize) -> usize {
        let channels = channels.max(1);
        let mut computed = 0;
        for frame in data.chunks_exact(channels) {
            let mono = frame.iter().map(|&s| s as f64).sum::<f64>() / channels as f64;
            computed += self.push_sample(mono);
        }
        computed
    }

    /// Feed interleaved signed 16-bit samples
    pub fn process_i16(&mut self, data: &[i16], channels: usize) -> usize {
        let channels = channels.max(1);
        let mut scratch = [0.0f32; I16_SCRATCH];
        let chunk = (I16_SCRATCH - I16_SCRATCH % channels).max(1);
        let mut computed = 0;
        for block in data.chunks(chunk) {
            let n = i16_to_f32(block, &mut scratch);
            computed += self.process_interleaved(&scratch[..n], channels);
        }
        computed
    }

    fn push_sample(&mut self, sample: f64) -> usize {
        self.pending.push(sample);
        if self.pending.len() < self.window.len() {
            return 0;
        }

        self.compute_frame();
        let len = self.pending.len();
        self.pending.copy_within(self.hop..len, 0);
        self.pending.truncate(len - self.hop);
        1
    }

    fn compute_frame(&mut self) {
        for ((bin, &sample), &w) in self
            .spectrum
            .iter_mut()
            .zip(self.pending.iter())
            .zip(self.window.iter())
        {
            *bin = Complex64::new(sample * w, 0.0);
        }
        // Lengths are fixed at construction, so the plan cannot reject them
        if self.plan.process(&mut self.spectrum).is_err() {
            return;
        }

        for (mag, bin) in self.magnitudes.iter_mut().zip(self.spectrum.iter()) {
            *mag = bin.norm();
        }
        self.layout.accumulate(&self.magnitudes, &mut self.bands);

        let peak = self.bands.iter().fold(1e-9_f64, |acc, &v| acc.max(v));
        for value in self.bands.iter_mut() {
            let compressed = (*value / peak * self.gain).tanh();
            *value = if compressed.is_finite() { compressed } else { 0.0 };
        }

        if self.has_previous {
            let s = self.smoothing;
            for (out, &current) in self.smoothed.iter_mut().zip(self.bands.iter()) {
                *out = *out * s + current * (1.0 - s);
            }
        } else {
            self.smoothed.copy_from_slice(&self.bands);
            self.has_previous = true;
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        self.sender.publish(&self.smoothed, timestamp);
        self.frames_emitted += 1;
    }
}

// Audio module - transport seam, file and memory sources, live capture

#[cfg(not(target_os = "android"))]
pub mod capture;
pub mod source;
pub mod wav;

// Re-export commonly used types for convenience
#[cfg(not(target_os = "android"))]
pub use capture::LiveCapture;
pub use source::{
    downmix_interleaved, i16_to_f32, AudioSource, MemorySource, ReadOutcome, StreamInfo,
};
pub use wav::WavSource;

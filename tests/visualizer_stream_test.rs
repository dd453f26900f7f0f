//! Visualizer frames crossing from a capture thread to a consumer thread
//!
//! The producer side mimics a capture callback delivering odd-sized stereo
//! buffers; the consumer drains the frame pool concurrently.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lyric_sync::config::VisualizerConfig;
use lyric_sync::Visualizer;

const SAMPLE_RATE: u32 = 48_000;

fn stereo_tone(frames: usize, hz: f32, offset: usize) -> Vec<f32> {
    (0..frames)
        .flat_map(|i| {
            let t = (offset + i) as f32 / SAMPLE_RATE as f32;
            let s = 0.5 * (2.0 * PI * hz * t).sin();
            [s, s]
        })
        .collect()
}

#[test]
fn test_frames_flow_between_threads() {
    let config = VisualizerConfig {
        frame_pool_size: 4,
        ..VisualizerConfig::default()
    };
    let (mut visualizer, mut receiver) =
        Visualizer::new(&config, SAMPLE_RATE).expect("visualizer setup");
    let target_band = visualizer
        .layout()
        .band_for_frequency(3000.0)
        .expect("3 kHz falls inside a band");
    let done = Arc::new(AtomicBool::new(false));

    let producer_done = Arc::clone(&done);
    let producer = thread::spawn(move || {
        let mut offset = 0;
        let mut computed = 0;
        for _ in 0..200 {
            // 333 frames per callback: never aligned with the 1024-sample window
            let buffer = stereo_tone(333, 3000.0, offset);
            offset += 333;
            computed += visualizer.process_interleaved(&buffer, 2);
            thread::sleep(Duration::from_micros(200));
        }
        producer_done.store(true, Ordering::Release);
        (computed, visualizer.dropped_frames())
    });

    let mut received = 0usize;
    let mut strongest_hits = 0usize;
    loop {
        let finished = done.load(Ordering::Acquire);
        received += receiver.drain(|frame| {
            assert!(frame.bands.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)));
            let argmax = frame
                .bands
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i);
            if argmax == Some(target_band) {
                strongest_hits += 1;
            }
        });
        if finished {
            break;
        }
        thread::sleep(Duration::from_micros(100));
    }
    received += receiver.drain(|_| {});

    let (computed, dropped) = producer.join().expect("producer thread");
    // 200 * 333 samples with a 512-sample hop
    assert_eq!(computed, (200 * 333 - 1024) / 512 + 1);
    assert_eq!(received as u64 + dropped, computed as u64);
    assert_eq!(receiver.dropped_frames(), dropped);
    assert!(received > 0);
    assert_eq!(strongest_hits, received);
}

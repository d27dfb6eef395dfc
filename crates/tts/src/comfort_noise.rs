//! Comfort-noise emission
//!
//! Dead silence on a phone line reads as a dropped call. When enabled, a
//! low-amplitude noise loop plays whenever the agent does not hold the
//! floor. Comfort-noise frames never count toward floor ownership.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use parley_carrier::Egress;
use parley_codec::mulaw_encode_sample;
use parley_config::constants::carrier::EGRESS_PACE_MS;
use parley_core::{PlaybackLedger, FRAME_BYTES};

/// Peak amplitude of the generated noise, well under speech level
const NOISE_AMPLITUDE: i16 = 180;

/// Length of the pre-generated loop (10 s at 8 kHz)
const LOOP_BYTES: usize = 80_000;

/// Pre-generate a μ-law noise loop.
pub fn generate_noise_loop() -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..LOOP_BYTES)
        .map(|_| mulaw_encode_sample(rng.gen_range(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE)))
        .collect()
}

/// Background task emitting one noise frame per 20 ms while the floor is
/// free.
pub struct ComfortNoiseEmitter {
    task: JoinHandle<()>,
}

impl ComfortNoiseEmitter {
    pub fn spawn(ledger: Arc<PlaybackLedger>, egress: mpsc::Sender<Egress>) -> Self {
        let task = tokio::spawn(async move {
            let noise = generate_noise_loop();
            let mut position = 0usize;
            let mut tick = tokio::time::interval(Duration::from_millis(EGRESS_PACE_MS));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tick.tick().await;
                if ledger.is_holding_floor() {
                    continue;
                }
                let end = position + FRAME_BYTES;
                let frame = if end <= noise.len() {
                    noise[position..end].to_vec()
                } else {
                    position = 0;
                    noise[..FRAME_BYTES].to_vec()
                };
                position = (position + FRAME_BYTES) % noise.len();

                if egress.send(Egress::Media(frame)).await.is_err() {
                    break;
                }
            }
            tracing::debug!("comfort noise task ended");
        });
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ComfortNoiseEmitter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

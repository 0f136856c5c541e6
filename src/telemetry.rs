//! # Position telemetry
//!
//! Position estimates are not used by the control loop. They are relayed to visualization consumers: a
//! [TelemetryFeed] fans samples out to any number of subscribers, and a [TrajectoryTrail] keeps the most recent ones
//! to draw the path flown. A [TelemetryRecorder] holds both and is what producers write to, for example
//! [record_positions](crate::link::log::record_positions) for the Crazyflie position log block.
//!
//! ```
//! use flowdeck_pilot::telemetry::{TelemetrySample, TrajectoryTrail};
//!
//! let mut trail = TrajectoryTrail::default();
//! for i in 0..600 {
//!     trail.push(TelemetrySample { x: i as f32, y: 0.0, z: 0.5, timestamp: i });
//! }
//! assert_eq!(trail.len(), 500);
//! assert_eq!(trail.oldest().unwrap().timestamp, 100);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_broadcast::{broadcast, InactiveReceiver, Receiver, Sender};

/// Samples kept by a default [TrajectoryTrail]
pub const TRAIL_LENGTH: usize = 500;

const FEED_CAPACITY: usize = 64;

/// Estimated position
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    /// x (m)
    pub x: f32,
    /// y (m)
    pub y: f32,
    /// z (m)
    pub z: f32,
    /// Vehicle timestamp (ms)
    pub timestamp: u64,
}

/// Bounded trailing buffer of samples, oldest evicted first
#[derive(Debug, Clone)]
pub struct TrajectoryTrail {
    samples: VecDeque<TelemetrySample>,
    capacity: usize,
}

impl Default for TrajectoryTrail {
    fn default() -> Self {
        Self::with_capacity(TRAIL_LENGTH)
    }
}

impl TrajectoryTrail {
    /// Trail keeping the last `capacity` samples
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when full
    pub fn push(&mut self, sample: TelemetrySample) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Number of samples kept
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the trail holds no sample
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest sample kept
    pub fn oldest(&self) -> Option<&TelemetrySample> {
        self.samples.front()
    }

    /// Newest sample
    pub fn latest(&self) -> Option<&TelemetrySample> {
        self.samples.back()
    }

    /// Samples, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &TelemetrySample> {
        self.samples.iter()
    }

    /// Drop every sample
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Fan-out of position samples
///
/// Publishing never blocks: a subscriber that does not keep up loses its oldest samples.
#[derive(Clone)]
pub struct TelemetryFeed {
    sender: Sender<TelemetrySample>,
    inactive: InactiveReceiver<TelemetrySample>,
}

impl Default for TelemetryFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryFeed {
    /// New feed without subscribers
    pub fn new() -> Self {
        let (mut sender, receiver) = broadcast(FEED_CAPACITY);
        sender.set_overflow(true);
        Self {
            sender,
            inactive: receiver.deactivate(),
        }
    }

    /// Send a sample to every subscriber
    pub fn publish(&self, sample: TelemetrySample) {
        let _ = self.sender.try_broadcast(sample);
    }

    /// Receive the samples published from now on
    pub fn subscribe(&self) -> Receiver<TelemetrySample> {
        self.inactive.activate_cloned()
    }
}

/// Feed and trail written together, shared between the producer and the consumers
#[derive(Clone, Default)]
pub struct TelemetryRecorder {
    feed: TelemetryFeed,
    trail: Arc<Mutex<TrajectoryTrail>>,
}

impl TelemetryRecorder {
    /// Recorder with a default 500-sample trail
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample to the trail and publish it
    pub fn record(&self, sample: TelemetrySample) {
        self.trail().push(sample);
        self.feed.publish(sample);
    }

    /// Feed carrying every recorded sample
    pub fn feed(&self) -> &TelemetryFeed {
        &self.feed
    }

    /// Copy of the trail, oldest sample first
    pub fn trail_snapshot(&self) -> Vec<TelemetrySample> {
        self.trail().iter().copied().collect()
    }

    /// Forget the trail, on reconnect
    pub fn clear(&self) {
        self.trail().clear();
    }

    fn trail(&self) -> MutexGuard<'_, TrajectoryTrail> {
        self.trail.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: u64) -> TelemetrySample {
        TelemetrySample {
            timestamp,
            ..Default::default()
        }
    }

    #[test]
    fn trail_keeps_newest_samples_in_order() {
        let mut trail = TrajectoryTrail::with_capacity(3);
        assert!(trail.is_empty());
        for t in 0..5 {
            trail.push(sample(t));
        }
        let kept: Vec<u64> = trail.iter().map(|s| s.timestamp).collect();
        assert_eq!(kept, vec![2, 3, 4]);
        assert_eq!(trail.latest().unwrap().timestamp, 4);
    }

    #[test]
    fn default_trail_is_500_long() {
        let mut trail = TrajectoryTrail::default();
        for t in 0..501 {
            trail.push(sample(t));
        }
        assert_eq!(trail.len(), TRAIL_LENGTH);
        assert_eq!(trail.oldest().unwrap().timestamp, 1);
    }

    #[tokio::test]
    async fn feed_reaches_every_subscriber() {
        let feed = TelemetryFeed::new();
        feed.publish(sample(0));

        let mut a = feed.subscribe();
        let mut b = feed.subscribe();
        feed.publish(sample(1));

        assert_eq!(a.recv().await.unwrap().timestamp, 1);
        assert_eq!(b.recv().await.unwrap().timestamp, 1);
    }

    #[tokio::test]
    async fn recorder_fills_trail_and_feed() {
        let recorder = TelemetryRecorder::new();
        let mut positions = recorder.feed().subscribe();

        let producer = recorder.clone();
        for t in 0..3 {
            producer.record(sample(t));
        }

        assert_eq!(positions.recv().await.unwrap().timestamp, 0);
        let kept: Vec<u64> = recorder.trail_snapshot().iter().map(|s| s.timestamp).collect();
        assert_eq!(kept, vec![0, 1, 2]);

        recorder.clear();
        assert!(recorder.trail_snapshot().is_empty());
    }
}

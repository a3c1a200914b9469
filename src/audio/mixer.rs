// Audio mixing graph for combining display audio and microphone tracks
//
// Every connected track feeds its own buffer. Frames are converted to the
// graph format on arrival, time-aligned by timestamp, and summed with
// clipping into a single destination track. The mix is order independent:
// no source is privileged.

use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::convert::FormatConverter;
use super::frame::{AudioFrame, AudioStreamSource};
use crate::media::{MediaTrack, TrackSettings};

/// Label of the graph's destination track
pub const MIXED_TRACK_LABEL: &str = "mixed-audio";

/// Configuration for the mixing graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Sample rate of the destination track
    pub sample_rate: u32,
    /// Channel count of the destination track
    pub channels: u16,
    /// Maximum buffering delay in milliseconds (default: 200ms)
    /// A stalled source never holds the mix back longer than this
    pub max_buffer_delay_ms: u64,
    /// Sources allowed into the mix (empty = none)
    pub enabled_sources: HashSet<AudioStreamSource>,
}

impl Default for MixerConfig {
    fn default() -> Self {
        let mut enabled_sources = HashSet::new();
        enabled_sources.insert(AudioStreamSource::System);
        enabled_sources.insert(AudioStreamSource::Microphone);

        Self {
            sample_rate: 48000,
            channels: 2,
            max_buffer_delay_ms: 200,
            enabled_sources,
        }
    }
}

/// Time-aligned additive mixer over per-source buffers
pub struct AudioMixer {
    config: MixerConfig,
    /// Buffers for each audio source type
    buffers: HashMap<AudioStreamSource, VecDeque<AudioFrame>>,
    converter: FormatConverter,
    current_position_ms: u64,
}

impl AudioMixer {
    pub fn new(config: MixerConfig) -> Self {
        debug!(
            "Audio mixer initialized: {}Hz, {} channels, {} enabled sources",
            config.sample_rate,
            config.channels,
            config.enabled_sources.len()
        );

        let buffers = config
            .enabled_sources
            .iter()
            .map(|source| (*source, VecDeque::new()))
            .collect();

        let converter = FormatConverter::new(config.sample_rate, config.channels);

        Self {
            config,
            buffers,
            converter,
            current_position_ms: 0,
        }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    /// Buffer a frame and return every mix that became ready
    pub fn push(&mut self, frame: AudioFrame) -> Vec<AudioFrame> {
        self.buffer_frame(frame);

        let mut mixed = Vec::new();
        while let Some(frame) = self.mix_next_chunk() {
            mixed.push(frame);
        }
        mixed
    }

    /// Buffer a frame based on its source type
    fn buffer_frame(&mut self, frame: AudioFrame) {
        if !self.config.enabled_sources.contains(&frame.source) {
            debug!(
                "Skipping frame from disabled source: {:?} at {}ms",
                frame.source, frame.timestamp_ms
            );
            return;
        }

        let Some(frame) = self.converter.conform(frame) else {
            return;
        };

        if let Some(buffer) = self.buffers.get_mut(&frame.source) {
            buffer.push_back(frame);
        }

        self.cleanup_old_frames();
    }

    /// Remove frames that fell behind the mix position by more than the delay
    fn cleanup_old_frames(&mut self) {
        let cutoff_time = self
            .current_position_ms
            .saturating_sub(self.config.max_buffer_delay_ms);

        for (source, buffer) in &mut self.buffers {
            while let Some(frame) = buffer.front() {
                if frame.timestamp_ms < cutoff_time {
                    warn!(
                        "Dropping old {:?} frame at {}ms (current position: {}ms)",
                        source, frame.timestamp_ms, self.current_position_ms
                    );
                    buffer.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    /// Every source has a frame, or the oldest buffered frame waited too long
    fn is_ready(&self) -> bool {
        if self.buffers.values().all(|b| !b.is_empty()) && !self.buffers.is_empty() {
            return true;
        }

        let oldest = self
            .buffers
            .values()
            .filter_map(|b| b.front())
            .map(|f| f.timestamp_ms)
            .min();
        let newest = self
            .buffers
            .values()
            .filter_map(|b| b.back())
            .map(|f| f.timestamp_ms)
            .max();

        match (oldest, newest) {
            (Some(oldest), Some(newest)) => {
                newest.saturating_sub(oldest) > self.config.max_buffer_delay_ms
            }
            _ => false,
        }
    }

    /// Mix the next chunk from every non-empty buffer, if the buffers are ready
    fn mix_next_chunk(&mut self) -> Option<AudioFrame> {
        if !self.is_ready() {
            return None;
        }

        let frames_to_mix: Vec<AudioFrame> = self
            .buffers
            .values_mut()
            .filter_map(|buffer| buffer.pop_front())
            .collect();

        let mixed = self.mix_multiple_frames(&frames_to_mix)?;
        self.current_position_ms = self.current_position_ms.max(mixed.timestamp_ms);
        Some(mixed)
    }

    /// Sum frames sample by sample with clipping
    ///
    /// The output takes the earliest timestamp and the longest length.
    fn mix_multiple_frames(&self, frames: &[AudioFrame]) -> Option<AudioFrame> {
        let timestamp_ms = frames.iter().map(|f| f.timestamp_ms).min()?;
        let max_len = frames.iter().map(|f| f.samples.len()).max().unwrap_or(0);

        let mixed_samples = (0..max_len)
            .map(|i| {
                let sum: i32 = frames
                    .iter()
                    .map(|f| f.samples.get(i).copied().unwrap_or(0) as i32)
                    .sum();
                sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16
            })
            .collect();

        Some(AudioFrame {
            samples: mixed_samples,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            timestamp_ms,
            source: AudioStreamSource::Mixed,
        })
    }
}

/// A running graph: N source tracks fanned into one destination track
pub struct MixerGraph {
    output: MediaTrack,
    sources: Vec<AudioStreamSource>,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl MixerGraph {
    /// Connect every source to a fresh destination
    ///
    /// Returns `None` when there is nothing to mix, in which case the
    /// recording carries no audio track at all.
    pub fn connect(sources: Vec<(AudioStreamSource, MediaTrack)>, config: MixerConfig) -> Option<Self> {
        let mut connected = Vec::new();
        let mut inputs: Vec<BoxStream<'static, AudioFrame>> = Vec::new();

        for (source, track) in sources {
            if !config.enabled_sources.contains(&source) {
                debug!("Source {:?} is not enabled, leaving {} out of the mix", source, track.label());
                continue;
            }
            let Some(rx) = track.subscribe_audio() else {
                warn!("Track {} is not an audio track, leaving it out of the mix", track.label());
                continue;
            };

            connected.push(source);
            inputs.push(source_stream(source, rx));
        }

        if inputs.is_empty() {
            return None;
        }

        let output = MediaTrack::audio(
            MIXED_TRACK_LABEL,
            TrackSettings::audio(config.sample_rate, config.channels),
        );

        info!(
            "Mixer graph connected: {:?} -> {}Hz {}ch",
            connected, config.sample_rate, config.channels
        );

        let graph_config = MixerConfig {
            enabled_sources: connected.iter().copied().collect(),
            ..config
        };

        let task = tokio::spawn(run_graph(
            AudioMixer::new(graph_config),
            stream::select_all(inputs),
            output.clone(),
        ));

        Some(Self {
            output,
            sources: connected,
            task: Mutex::new(Some(task)),
            closed: AtomicBool::new(false),
        })
    }

    /// The destination track
    pub fn output_track(&self) -> &MediaTrack {
        &self.output
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Disconnect all sources and stop the destination track
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.output.stop();
        debug!("Mixer graph closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for MixerGraph {
    fn drop(&mut self) {
        self.close();
    }
}

/// Adapt a broadcast receiver into a stream tagged with its source
fn source_stream(
    source: AudioStreamSource,
    rx: tokio::sync::broadcast::Receiver<AudioFrame>,
) -> BoxStream<'static, AudioFrame> {
    stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(mut frame) => {
                    frame.source = source;
                    return Some((frame, rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("{:?} input lagged, {} frames skipped", source, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

async fn run_graph(
    mut mixer: AudioMixer,
    mut inputs: stream::SelectAll<BoxStream<'static, AudioFrame>>,
    output: MediaTrack,
) {
    while let Some(frame) = inputs.next().await {
        for mixed in mixer.push(frame) {
            if !output.push_audio(mixed) {
                debug!("Destination track stopped, mixer graph exiting");
                return;
            }
        }
    }
    debug!("All mixer inputs closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(samples: Vec<i16>, timestamp_ms: u64, source: AudioStreamSource) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate: 48000,
            channels: 2,
            timestamp_ms,
            source,
        }
    }

    #[test]
    fn test_mixer_creation() {
        let mixer = AudioMixer::new(MixerConfig::default());

        assert_eq!(mixer.buffers.len(), 2);
        assert_eq!(mixer.current_position_ms, 0);
        assert_eq!(mixer.config().sample_rate, 48000);
    }

    #[test]
    fn test_mix_frames_with_clipping() {
        let mixer = AudioMixer::new(MixerConfig::default());

        let frames = vec![
            frame(vec![i16::MAX - 100, -100], 0, AudioStreamSource::System),
            frame(vec![200, i16::MIN], 0, AudioStreamSource::Microphone),
        ];
        let mixed = mixer.mix_multiple_frames(&frames).unwrap();

        assert_eq!(mixed.samples, vec![i16::MAX, i16::MIN]);
        assert_eq!(mixed.source, AudioStreamSource::Mixed);
    }

    #[test]
    fn test_mix_frames_different_lengths() {
        let mixer = AudioMixer::new(MixerConfig::default());

        let frames = vec![
            frame(vec![100, 200], 0, AudioStreamSource::System),
            frame(vec![50, 100, 150, 200], 0, AudioStreamSource::Microphone),
        ];
        let mixed = mixer.mix_multiple_frames(&frames).unwrap();

        assert_eq!(mixed.samples, vec![150, 300, 150, 200]);
    }

    #[test]
    fn test_mix_is_order_independent() {
        let mut a = AudioMixer::new(MixerConfig::default());
        let mut b = AudioMixer::new(MixerConfig::default());

        let system = frame(vec![10, 20, 30, 40], 0, AudioStreamSource::System);
        let mic = frame(vec![1, 2, 3, 4], 0, AudioStreamSource::Microphone);

        assert!(a.push(system.clone()).is_empty());
        let from_a = a.push(mic.clone());
        assert!(b.push(mic).is_empty());
        let from_b = b.push(system);

        assert_eq!(from_a, from_b);
        assert_eq!(from_a[0].samples, vec![11, 22, 33, 44]);
    }

    #[test]
    fn test_waits_for_every_source() {
        let mut mixer = AudioMixer::new(MixerConfig::default());
        assert!(mixer
            .push(frame(vec![1, 1], 0, AudioStreamSource::System))
            .is_empty());
        assert!(mixer
            .push(frame(vec![1, 1], 10, AudioStreamSource::System))
            .is_empty());
        assert_eq!(
            mixer
                .push(frame(vec![2, 2], 0, AudioStreamSource::Microphone))
                .len(),
            1
        );
    }

    #[test]
    fn test_stalled_source_does_not_block() {
        let mut mixer = AudioMixer::new(MixerConfig::default());

        let mut emitted = Vec::new();
        for i in 0..30u64 {
            emitted.extend(mixer.push(frame(vec![5, 5], i * 10, AudioStreamSource::System)));
        }

        // Released once the backlog spans more than 200ms
        assert!(!emitted.is_empty());
        assert_eq!(emitted[0].timestamp_ms, 0);
        assert!(emitted.iter().all(|f| f.samples == vec![5, 5]));
    }

    #[test]
    fn test_late_frames_are_dropped() {
        let mut mixer = AudioMixer::new(MixerConfig::default());
        for i in 0..60u64 {
            mixer.push(frame(vec![1, 1], i * 10, AudioStreamSource::System));
        }
        assert!(mixer.current_position_ms > 200);

        // Microphone frame far behind the mix position never makes it out
        let late = mixer.push(frame(vec![9, 9], 0, AudioStreamSource::Microphone));
        assert!(late.iter().all(|f| f.samples != vec![10, 10]));
        assert!(mixer.buffers[&AudioStreamSource::Microphone].is_empty());
    }

    #[test]
    fn test_converts_foreign_format() {
        let mut config = MixerConfig::default();
        config.enabled_sources.remove(&AudioStreamSource::System);
        let mut mixer = AudioMixer::new(config);

        let mono = AudioFrame {
            samples: vec![100; 441],
            sample_rate: 44100,
            channels: 1,
            timestamp_ms: 0,
            source: AudioStreamSource::Microphone,
        };
        let mixed = mixer.push(mono);

        assert_eq!(mixed.len(), 1);
        assert_eq!(mixed[0].channels, 2);
        assert_eq!(mixed[0].sample_rate, 48000);
        let frames = mixed[0].frame_count();
        assert!((470..=490).contains(&frames), "got {} frames", frames);
    }

    #[tokio::test]
    async fn test_graph_with_no_sources() {
        assert!(MixerGraph::connect(Vec::new(), MixerConfig::default()).is_none());
    }

    #[tokio::test]
    async fn test_graph_mixes_two_tracks() {
        let system = MediaTrack::audio("system", TrackSettings::audio(48000, 2));
        let mic = MediaTrack::audio("mic", TrackSettings::audio(48000, 2));

        let graph = MixerGraph::connect(
            vec![
                (AudioStreamSource::System, system.clone()),
                (AudioStreamSource::Microphone, mic.clone()),
            ],
            MixerConfig::default(),
        )
        .unwrap();
        assert_eq!(graph.source_count(), 2);

        let mut out = graph.output_track().subscribe_audio().unwrap();
        system.push_audio(frame(vec![100, 100], 0, AudioStreamSource::System));
        mic.push_audio(frame(vec![20, 20], 0, AudioStreamSource::Microphone));

        let mixed = tokio::time::timeout(Duration::from_secs(1), out.recv())
            .await
            .expect("no mixed frame")
            .unwrap();
        assert_eq!(mixed.samples, vec![120, 120]);

        graph.close();
        graph.close();
        assert!(graph.is_closed());
        assert!(!graph.output_track().is_live());
    }
}

// Format conversion for frames entering the mixing graph
//
// Sources rarely agree on format: a microphone may run at 44.1kHz mono
// while display audio arrives at 48kHz stereo. The graph converts every
// frame to its own format before summing. Resampling is streaming: each
// source keeps its own sinc resampler so filter state carries across frames.

use rubato::{
    ResampleError, Resampler, ResamplerConstructionError, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use super::frame::{AudioFrame, AudioStreamSource};

const SINC_LEN: usize = 64;
const OVERSAMPLING: usize = 128;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Failed to build resampler: {0}")]
    Construction(#[from] ResamplerConstructionError),

    #[error("Resampling failed: {0}")]
    Resample(#[from] ResampleError),
}

/// Converts frames from any source into one target format
pub struct FormatConverter {
    sample_rate: u32,
    channels: u16,
    resamplers: HashMap<AudioStreamSource, FrameResampler>,
}

impl FormatConverter {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            resamplers: HashMap::new(),
        }
    }

    /// Convert a frame to the target sample rate and channel count
    ///
    /// Returns `None` when the resampler rejects the frame.
    pub fn conform(&mut self, frame: AudioFrame) -> Option<AudioFrame> {
        let mut converted = frame;

        if converted.channels != self.channels {
            converted = remix_channels(converted, self.channels);
        }

        if converted.sample_rate == self.sample_rate
            || converted.sample_rate == 0
            || self.sample_rate == 0
        {
            return Some(converted);
        }

        let source = converted.source;
        match self.resample(converted) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!("Dropping {:?} frame: {}", source, e);
                self.resamplers.remove(&source);
                None
            }
        }
    }

    fn resample(&mut self, frame: AudioFrame) -> Result<AudioFrame, ConvertError> {
        if frame.frame_count() == 0 {
            return Ok(AudioFrame {
                sample_rate: self.sample_rate,
                ..frame
            });
        }

        let source = frame.source;
        let resampler = match self.resamplers.remove(&source) {
            Some(resampler) if resampler.accepts(&frame) => resampler,
            _ => FrameResampler::new(
                frame.sample_rate,
                self.sample_rate,
                frame.channels,
                frame.frame_count(),
            )?,
        };

        let resampler = self.resamplers.entry(source).or_insert(resampler);
        Ok(resampler.process(frame)?)
    }
}

/// Streaming resampler for frames of one fixed format and size
pub struct FrameResampler {
    source_rate: u32,
    target_rate: u32,
    channels: usize,
    chunk_frames: usize,
    inner: SincFixedIn<f32>,
}

impl FrameResampler {
    pub fn new(
        source_rate: u32,
        target_rate: u32,
        channels: u16,
        chunk_frames: usize,
    ) -> Result<Self, ResamplerConstructionError> {
        let params = SincInterpolationParameters {
            sinc_len: SINC_LEN,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: OVERSAMPLING,
            window: WindowFunction::BlackmanHarris2,
        };

        let channels = channels.max(1) as usize;
        let inner = SincFixedIn::<f32>::new(
            target_rate as f64 / source_rate as f64,
            2.0,
            params,
            chunk_frames,
            channels,
        )?;

        debug!(
            "Resampler {}Hz -> {}Hz, {} channels, {} frames per chunk",
            source_rate, target_rate, channels, chunk_frames
        );

        Ok(Self {
            source_rate,
            target_rate,
            channels,
            chunk_frames,
            inner,
        })
    }

    /// Whether `frame` can go through without rebuilding
    pub fn accepts(&self, frame: &AudioFrame) -> bool {
        frame.sample_rate == self.source_rate
            && frame.channels.max(1) as usize == self.channels
            && frame.frame_count() == self.chunk_frames
    }

    pub fn process(&mut self, frame: AudioFrame) -> Result<AudioFrame, ResampleError> {
        let channels = self.channels;

        let mut planar: Vec<Vec<f32>> = vec![Vec::with_capacity(self.chunk_frames); channels];
        for interleaved in frame.samples.chunks_exact(channels) {
            for (plane, sample) in planar.iter_mut().zip(interleaved) {
                plane.push(*sample as f32 / 32768.0);
            }
        }

        let output = self.inner.process(&planar, None)?;
        let output_frames = output.first().map(Vec::len).unwrap_or(0);

        let mut samples = Vec::with_capacity(output_frames * channels);
        for n in 0..output_frames {
            for plane in &output {
                samples.push((plane[n] * 32768.0).round().clamp(-32768.0, 32767.0) as i16);
            }
        }

        Ok(AudioFrame {
            samples,
            sample_rate: self.target_rate,
            ..frame
        })
    }
}

/// Change channel count (mono <-> stereo, or N -> mono by averaging)
pub fn remix_channels(frame: AudioFrame, target_channels: u16) -> AudioFrame {
    if frame.channels == target_channels || frame.channels == 0 || target_channels == 0 {
        return frame;
    }

    let source_channels = frame.channels as usize;
    let target = target_channels as usize;
    let mut samples = Vec::with_capacity(frame.frame_count() * target);

    for chunk in frame.samples.chunks_exact(source_channels) {
        if target == 1 {
            // Average all channels into one
            let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
            samples.push((sum / source_channels as i32) as i16);
        } else if source_channels == 1 {
            // Duplicate mono into every output channel
            samples.extend(std::iter::repeat(chunk[0]).take(target));
        } else {
            // Keep the first channels, pad with the last one
            for c in 0..target {
                samples.push(chunk[c.min(source_channels - 1)]);
            }
        }
    }

    AudioFrame {
        samples,
        channels: target_channels,
        ..frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<i16>, sample_rate: u32, channels: u16) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate,
            channels,
            timestamp_ms: 0,
            source: AudioStreamSource::Microphone,
        }
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let mono = remix_channels(frame(vec![100, 300, -200, 200], 48000, 2), 1);
        assert_eq!(mono.channels, 1);
        assert_eq!(mono.samples, vec![200, 0]);
    }

    #[test]
    fn test_mono_to_stereo_duplicates() {
        let stereo = remix_channels(frame(vec![7, 9], 48000, 1), 2);
        assert_eq!(stereo.samples, vec![7, 7, 9, 9]);
    }

    #[test]
    fn test_conform_is_noop_for_matching_format() {
        let mut converter = FormatConverter::new(48000, 2);
        let input = frame(vec![1, 2, 3, 4], 48000, 2);
        assert_eq!(converter.conform(input.clone()), Some(input));
    }

    #[test]
    fn test_resample_tracks_rate_ratio() {
        let mut converter = FormatConverter::new(24000, 1);
        let mut total = 0;
        for i in 0..10 {
            let input = AudioFrame {
                timestamp_ms: i * 10,
                ..frame(vec![0; 480], 48000, 1)
            };
            let output = converter.conform(input).unwrap();
            assert_eq!(output.sample_rate, 24000);
            assert_eq!(output.timestamp_ms, i * 10);
            total += output.frame_count();
        }
        // 10 x 480 input frames halve to about 2400
        assert!((2350..=2450).contains(&total), "got {} frames", total);
    }

    #[test]
    fn test_resampler_state_carries_across_frames() {
        let mut converter = FormatConverter::new(48000, 2);
        let outputs: Vec<AudioFrame> = (0..8)
            .map(|_| converter.conform(frame(vec![8000; 441], 44100, 1)).unwrap())
            .collect();

        // Once the filter has warmed up, a constant input stays constant
        // across frame boundaries instead of ramping in every frame
        for output in &outputs[2..] {
            assert_eq!(output.channels, 2);
            assert!(
                output.samples.iter().all(|s| (7600..=8400).contains(s)),
                "frame not settled: {:?}",
                &output.samples[..8]
            );
        }
    }

    #[test]
    fn test_frame_size_change_rebuilds_resampler() {
        let mut converter = FormatConverter::new(48000, 1);
        converter.conform(frame(vec![0; 441], 44100, 1)).unwrap();
        let output = converter.conform(frame(vec![0; 882], 44100, 1)).unwrap();
        assert!((900..=1000).contains(&output.frame_count()));
    }
}

pub mod convert;
pub mod file;
pub mod frame;
pub mod mixer;

pub use file::AudioFile;
pub use frame::{AudioFrame, AudioStreamSource};
pub use mixer::{AudioMixer, MixerConfig, MixerGraph};

//! Error types for the mixer and the audio host bridge

/// Result type alias for mixer operations
pub type Result<T> = std::result::Result<T, MixerError>;

/// Errors that can occur while driving the audio host
///
/// None of these ever cross into the audio callback: the mixing path
/// reacts to inconsistencies by silencing the affected voice instead of
/// reporting upward.
#[derive(Debug, thiserror::Error)]
pub enum MixerError {
    /// No output device available on the default host
    #[error("No output device available")]
    NoDevice,

    /// The device refused to describe its output configuration
    #[error("Failed to get output config: {0}")]
    DeviceConfig(String),

    /// Building the output stream failed
    #[error("Failed to build output stream: {0}")]
    StreamBuild(String),

    /// The device exposes a sample format the bridge does not handle
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Stereo PCM with mismatched channel lengths
    #[error("PCM channel lengths differ: left={left}, right={right}")]
    ChannelMismatch { left: usize, right: usize },

    /// Operation requires an initialized engine
    #[error("Audio engine is not ready")]
    NotReady,
}

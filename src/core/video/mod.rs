pub mod composer;
pub mod diff_filter;
pub mod font;
pub mod frame;
pub mod sampler;
pub mod scene;
pub mod source;
pub mod text;
pub mod watermark;

pub use composer::{AnimatedArtifact, Composition, SequenceComposer};
pub use diff_filter::{ContentSignature, FrameDiffFilter};
pub use frame::Frame;
pub use sampler::{Keyframe, KeyframeSampler, SampleOutcome, SamplerConfig};
pub use scene::{DetectorConfig, SceneDetector, SceneInterval, SceneList};
pub use source::{DecodeOptions, FfmpegBackend, FrameSource, StreamInfo, SyntheticBackend, SyntheticVideo, VideoBackend};
pub use text::AccumulatedText;
pub use watermark::Watermark;

pub mod asset;
pub mod crop;
pub mod frame;
pub mod sampler;
pub mod transcoder;

pub use asset::{is_video_file, list_videos, CroppedVideoAsset, VideoAsset, VIDEO_EXTENSIONS};
pub use crop::{CoordinateMapper, CropSelection, DisplayGeometry, SourceCropRegion};
pub use frame::FrameSample;
pub use sampler::{DirectorySamples, FfmpegDecoder, FrameDecoder, FrameSampler, FrameStream, WorkDir};
pub use transcoder::{cropped_output_path, CropJob, FfmpegTranscoder, Transcoder};

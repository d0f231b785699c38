pub mod image;
pub mod job;
pub mod transform;

pub use image::{Image, ImageFormat, ImageView};
pub use job::{FailureKind, Job, JobState, JobType, TransformJobPayload};
pub use transform::{
    CompressOptions, CropOptions, FilterOptions, FlipOptions, OutputFormat, ResizeFit,
    ResizeOptions, RotateOptions, TransformMode, TransformOptions, TransformRequest,
    WatermarkOptions, WatermarkPosition,
};

pub mod transform;

pub use transform::TransformJobHandler;

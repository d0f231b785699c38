//! Fixed operation order.
//!
//! Spatial steps come first so tone and compression work on the final pixel
//! grid. Watermarking follows the filters so the text keeps its color, and
//! encoding is always last.

use std::fmt::{Display, Formatter, Result as FmtResult};

use pictor_core::models::TransformOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Crop,
    Resize,
    Rotate,
    Flip,
    Compress,
    Filter,
    Watermark,
    Format,
}

impl Step {
    pub const ORDER: [Step; 8] = [
        Step::Crop,
        Step::Resize,
        Step::Rotate,
        Step::Flip,
        Step::Compress,
        Step::Filter,
        Step::Watermark,
        Step::Format,
    ];

    fn is_requested(self, options: &TransformOptions) -> bool {
        match self {
            Step::Crop => options.crop.is_some(),
            Step::Resize => options.resize.is_some(),
            Step::Rotate => options.rotate.is_some(),
            Step::Flip => options.flip.is_some(),
            Step::Compress => options.compress.is_some(),
            Step::Filter => options.filter.is_some(),
            Step::Watermark => options.watermark.is_some(),
            Step::Format => options.format.is_some(),
        }
    }
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Step::Crop => "crop",
            Step::Resize => "resize",
            Step::Rotate => "rotate",
            Step::Flip => "flip",
            Step::Compress => "compress",
            Step::Filter => "filter",
            Step::Watermark => "watermark",
            Step::Format => "format",
        };
        f.write_str(name)
    }
}

/// The steps `options` asks for, in execution order.
pub fn plan(options: &TransformOptions) -> Vec<Step> {
    Step::ORDER
        .into_iter()
        .filter(|step| step.is_requested(options))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_plan_order() {
        // Keys deliberately listed in reverse.
        let options: TransformOptions = serde_json::from_str(
            r#"{
                "format": "png",
                "watermark": {"text": "w"},
                "filter": {"sepia": true},
                "compress": {"quality": 50},
                "flip": {"vertical": true},
                "rotate": {"angle": 90},
                "resize": {"width": 10},
                "crop": {"x": 0, "y": 0, "width": 5, "height": 5}
            }"#,
        )
        .unwrap();

        assert_eq!(plan(&options), Step::ORDER.to_vec());
    }

    #[test]
    fn test_partial_plans_keep_relative_order() {
        let options: TransformOptions = serde_json::from_str(
            r#"{
                "watermark": {"text": "w"},
                "crop": {"x": 0, "y": 0, "width": 1, "height": 1},
                "rotate": {"angle": 10}
            }"#,
        )
        .unwrap();
        assert_eq!(plan(&options), vec![Step::Crop, Step::Rotate, Step::Watermark]);

        assert!(plan(&TransformOptions::default()).is_empty());
    }

    #[test]
    fn test_plans_are_sorted() {
        let options: TransformOptions =
            serde_json::from_str(r#"{"filter": {}, "flip": {}, "format": "jpeg"}"#).unwrap();
        let steps = plan(&options);
        let mut sorted = steps.clone();
        sorted.sort();
        assert_eq!(steps, sorted);
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Pixel-space point. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Keypoint(pub f64, pub f64);

impl Keypoint {
    pub fn x(&self) -> f64 {
        self.0
    }

    pub fn y(&self) -> f64 {
        self.1
    }

    /// Whole-pixel form expected by the measurement engine.
    pub fn to_pixels(&self) -> [i64; 2] {
        [self.0.round() as i64, self.1.round() as i64]
    }
}

/// `[x1, y1, x2, y2]` placement guide in pixel space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PlacementBox(pub [f64; 4]);

impl PlacementBox {
    pub fn to_pixels(&self) -> [i64; 4] {
        self.0.map(|value| value.round() as i64)
    }
}

/// 1-based positional id -> expected distance in cm. Keys travel as strings.
pub type TargetDistanceMap = BTreeMap<u32, f64>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceImage {
    pub base64: String,
    pub mime_type: Option<String>,
}

/// Annotation record as the catalog delivers it. Every geometric field is
/// kept as raw JSON because its shape varies between producers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAnnotation {
    #[serde(default, alias = "keypoints_pixels", alias = "keypointsPixels")]
    pub keypoints: Option<Value>,
    #[serde(default, alias = "targetDistances")]
    pub target_distances: Option<Value>,
    #[serde(default, alias = "placementBox")]
    pub placement_box: Option<Value>,
    #[serde(default, alias = "imageWidth", deserialize_with = "lenient_dimension")]
    pub image_width: Option<u32>,
    #[serde(default, alias = "imageHeight", deserialize_with = "lenient_dimension")]
    pub image_height: Option<u32>,
    #[serde(default, alias = "annotationDate")]
    pub annotation_date: Option<String>,
    /// Fetched separately from the JSON record.
    #[serde(skip)]
    pub image: Option<ReferenceImage>,
}

fn lenient_dimension<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(super::normalize::number_from_value)
        .filter(|dimension| *dimension > 0.0 && *dimension <= u32::MAX as f64)
        .map(|dimension| dimension.round() as u32))
}

/// Canonical annotation handed to the measurement engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationDescriptor {
    pub keypoints: Vec<Keypoint>,
    pub target_distances: TargetDistanceMap,
    pub placement_box: Option<PlacementBox>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub image_base64: String,
    pub image_mime_type: String,
    /// Non-fatal problems found while normalizing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl AnnotationDescriptor {
    /// Keypoint pairs the engine can measure: (0,1), (2,3), ...
    pub fn measurable_pairs(&self) -> usize {
        self.keypoints.len() / 2
    }

    pub fn summary(&self) -> AnnotationSummary {
        AnnotationSummary {
            keypoint_count: self.keypoints.len(),
            target_count: self.target_distances.len(),
            has_placement_box: self.placement_box.is_some(),
            image_width: self.image_width,
            image_height: self.image_height,
            warnings: self.warnings.clone(),
        }
    }
}

/// Image-free view of a descriptor for the panel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationSummary {
    pub keypoint_count: usize,
    pub target_count: usize,
    pub has_placement_box: bool,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub warnings: Vec<String>,
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::annotation::AnnotationDescriptor;
use crate::error::{QcError, QcResult};

/// Body of `POST /measurement/start`.
///
/// Geometry travels as JSON strings and whole pixels, which is what the
/// engine parses.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StartRequest {
    /// Size label; the engine names its annotation after it.
    pub annotation_name: String,
    pub article_style: String,
    pub side: String,
    pub keypoints_pixels: String,
    pub target_distances: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement_box: Option<String>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub image_data: String,
    pub image_mime_type: String,
}

impl StartRequest {
    pub fn from_descriptor(
        size: &str,
        article_style: &str,
        side: &str,
        descriptor: &AnnotationDescriptor,
    ) -> QcResult<Self> {
        let keypoints: Vec<[i64; 2]> = descriptor.keypoints.iter().map(|k| k.to_pixels()).collect();
        let placement_box = descriptor
            .placement_box
            .map(|placement| encode(&placement.to_pixels(), "placement box"))
            .transpose()?;

        Ok(Self {
            annotation_name: size.trim().to_string(),
            article_style: article_style.to_string(),
            side: side.to_string(),
            keypoints_pixels: encode(&keypoints, "keypoints")?,
            target_distances: encode(&descriptor.target_distances, "target distances")?,
            placement_box,
            image_width: descriptor.image_width,
            image_height: descriptor.image_height,
            image_data: descriptor.image_base64.clone(),
            image_mime_type: descriptor.image_mime_type.clone(),
        })
    }
}

fn encode<T: Serialize + ?Sized>(value: &T, field: &str) -> QcResult<String> {
    serde_json::to_string(value)
        .map_err(|err| QcError::malformed(format!("failed to encode {field}: {err}")))
}

/// `{ status, message, data }` envelope every engine endpoint answers with.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EngineReply {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl EngineReply {
    pub fn is_error(&self) -> bool {
        self.status.eq_ignore_ascii_case("error")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, alias = "annotation_name")]
    pub annotation_name: Option<String>,
}

/// One measurement reported by the engine. `id` is the 1-based keypoint
/// pair index, not a specification id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveMeasurement {
    #[serde(alias = "positionalId", alias = "positional_id")]
    pub id: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "actual_cm")]
    pub actual_cm: f64,
    #[serde(default, alias = "qc_passed")]
    pub qc_passed: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveSnapshot {
    #[serde(default, alias = "is_live")]
    pub is_live: bool,
    #[serde(default)]
    pub measurements: Vec<LiveMeasurement>,
}

impl LiveSnapshot {
    pub fn events(&self) -> Vec<LiveMeasurementEvent> {
        self.measurements
            .iter()
            .map(|measurement| LiveMeasurementEvent {
                positional_id: measurement.id,
                actual_value_cm: measurement.actual_cm,
            })
            .collect()
    }
}

/// Positional reading fed into the reconciler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveMeasurementEvent {
    pub positional_id: u32,
    pub actual_value_cm: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationStatus {
    #[serde(default)]
    pub calibrated: bool,
    #[serde(default, alias = "pixels_per_cm")]
    pub pixels_per_cm: Option<f64>,
    #[serde(default, alias = "reference_length_cm")]
    pub reference_length_cm: Option<f64>,
    #[serde(default, alias = "calibration_date")]
    pub calibration_date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Keypoint, PlacementBox};
    use serde_json::json;

    fn descriptor() -> AnnotationDescriptor {
        AnnotationDescriptor {
            keypoints: vec![Keypoint(10.4, 20.6), Keypoint(300.0, 400.5)],
            target_distances: [(1, 52.0), (2, 70.5)].into_iter().collect(),
            placement_box: Some(PlacementBox([1.2, 2.7, 100.0, 200.0])),
            image_width: Some(640),
            image_height: Some(480),
            image_base64: "aGVsbG8=".into(),
            image_mime_type: "image/png".into(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn start_request_uses_engine_field_names() {
        let request = StartRequest::from_descriptor(" L ", "NKE-TS-001", "front", &descriptor()).unwrap();
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["annotation_name"], "L");
        assert_eq!(body["article_style"], "NKE-TS-001");
        assert_eq!(body["keypoints_pixels"], "[[10,21],[300,401]]");
        assert_eq!(body["target_distances"], "{\"1\":52.0,\"2\":70.5}");
        assert_eq!(body["placement_box"], "[1,3,100,200]");
        assert_eq!(body["image_data"], "aGVsbG8=");
        assert_eq!(body["image_mime_type"], "image/png");
        assert_eq!(body["image_width"], 640);
    }

    #[test]
    fn start_request_omits_missing_placement_box() {
        let mut descriptor = descriptor();
        descriptor.placement_box = None;

        let body = serde_json::to_value(
            StartRequest::from_descriptor("M", "X", "back", &descriptor).unwrap(),
        )
        .unwrap();

        assert!(body.get("placement_box").is_none());
    }

    #[test]
    fn live_snapshot_accepts_both_casings() {
        let snake: LiveSnapshot = serde_json::from_value(json!({
            "is_live": true,
            "measurements": [{"id": 1, "name": "Chest", "actual_cm": 52.31, "qc_passed": true}]
        }))
        .unwrap();
        let camel: LiveSnapshot = serde_json::from_value(json!({
            "isLive": true,
            "measurements": [{"positionalId": 1, "actualCm": 52.31, "qcPassed": true}]
        }))
        .unwrap();

        assert!(snake.is_live && camel.is_live);
        assert_eq!(snake.events(), camel.events());
        assert_eq!(
            snake.events(),
            vec![LiveMeasurementEvent { positional_id: 1, actual_value_cm: 52.31 }]
        );
    }
}

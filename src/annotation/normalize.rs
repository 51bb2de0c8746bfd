use serde_json::Value;

use crate::error::{QcError, QcResult};
use crate::models::MeasurementSpecification;

use super::types::{
    AnnotationDescriptor, Keypoint, PlacementBox, RawAnnotation, TargetDistanceMap,
};

const DEFAULT_MIME_TYPE: &str = "image/jpeg";
const MIN_KEYPOINTS: usize = 2;

/// Turns a catalog annotation into the canonical descriptor.
///
/// `catalog_specs` are the resolved specifications in display order. When
/// non-empty they define the target distances; the annotation's own map is
/// only used when nothing was resolved.
pub fn normalize(
    raw: &RawAnnotation,
    catalog_specs: &[MeasurementSpecification],
) -> QcResult<AnnotationDescriptor> {
    let mut warnings = Vec::new();

    let keypoints = normalize_keypoints(raw.keypoints.as_ref(), &mut warnings)?;

    let image = raw
        .image
        .as_ref()
        .filter(|image| !image.base64.trim().is_empty())
        .ok_or_else(|| QcError::malformed("reference image is missing"))?;
    let image_mime_type = image
        .mime_type
        .as_deref()
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string();

    let placement_box = normalize_placement_box(raw.placement_box.as_ref(), &mut warnings);

    let target_distances = if catalog_specs.is_empty() {
        embedded_target_distances(raw.target_distances.as_ref(), &mut warnings)
    } else {
        catalog_target_distances(catalog_specs)
    };

    let mut descriptor = AnnotationDescriptor {
        keypoints,
        target_distances,
        placement_box,
        image_width: raw.image_width,
        image_height: raw.image_height,
        image_base64: image.base64.trim().to_string(),
        image_mime_type,
        warnings,
    };
    check_consistency(&mut descriptor);

    Ok(descriptor)
}

/// Positional ids 1..=n over the specs in display order.
pub fn catalog_target_distances(specs: &[MeasurementSpecification]) -> TargetDistanceMap {
    specs
        .iter()
        .enumerate()
        .map(|(index, spec)| ((index + 1) as u32, spec.expected_value))
        .collect()
}

/// Numbers and numeric strings. Non-finite values are rejected.
pub(crate) fn number_from_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn normalize_keypoints(
    value: Option<&Value>,
    warnings: &mut Vec<String>,
) -> QcResult<Vec<Keypoint>> {
    let (keypoints, valid) = match value {
        None | Some(Value::Null) => (Vec::new(), 0),
        Some(Value::Array(elements)) => keypoints_from_elements(elements, warnings),
        Some(Value::String(text)) => {
            let text = text.trim();
            if text.starts_with('[') {
                let parsed: Value = serde_json::from_str(text).map_err(|err| {
                    QcError::malformed(format!("keypoints are not valid JSON: {err}"))
                })?;
                match parsed {
                    Value::Array(elements) => keypoints_from_elements(&elements, warnings),
                    _ => return Err(QcError::malformed("keypoints JSON is not an array")),
                }
            } else {
                let keypoints = keypoints_from_flat(text, warnings)?;
                let valid = keypoints.len();
                (keypoints, valid)
            }
        }
        Some(other) => {
            return Err(QcError::malformed(format!(
                "unsupported keypoints shape: {}",
                value_kind(other)
            )))
        }
    };

    if valid < MIN_KEYPOINTS {
        return Err(QcError::malformed(format!(
            "at least {MIN_KEYPOINTS} keypoints are required, found {valid}"
        )));
    }

    Ok(keypoints)
}

/// Returns the keypoints and how many of them were actually readable.
fn keypoints_from_elements(elements: &[Value], warnings: &mut Vec<String>) -> (Vec<Keypoint>, usize) {
    let mut valid = 0;
    let keypoints = elements
        .iter()
        .enumerate()
        .map(|(index, element)| match keypoint_from_element(element) {
            Some(keypoint) => {
                valid += 1;
                keypoint
            }
            None => {
                warnings.push(format!(
                    "keypoint {} is unreadable ({}), using [0, 0]",
                    index + 1,
                    value_kind(element)
                ));
                Keypoint(0.0, 0.0)
            }
        })
        .collect();
    (keypoints, valid)
}

fn keypoint_from_element(element: &Value) -> Option<Keypoint> {
    match element {
        Value::Array(pair) if pair.len() >= 2 => {
            Some(Keypoint(number_from_value(&pair[0])?, number_from_value(&pair[1])?))
        }
        Value::Object(map) => Some(Keypoint(
            number_from_value(map.get("x")?)?,
            number_from_value(map.get("y")?)?,
        )),
        _ => None,
    }
}

/// `"x1 y1 x2 y2 ..."`; an unpaired trailing value is dropped.
fn keypoints_from_flat(text: &str, warnings: &mut Vec<String>) -> QcResult<Vec<Keypoint>> {
    let values = text
        .split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| QcError::malformed(format!("keypoint value '{token}' is not a number")))
        })
        .collect::<QcResult<Vec<f64>>>()?;

    if values.len() % 2 == 1 {
        warnings.push("dropped unpaired trailing keypoint value".to_string());
    }

    Ok(values
        .chunks_exact(2)
        .map(|pair| Keypoint(pair[0], pair[1]))
        .collect())
}

fn normalize_placement_box(value: Option<&Value>, warnings: &mut Vec<String>) -> Option<PlacementBox> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => {
            let text = text.trim();
            if text.is_empty() {
                None
            } else if text.starts_with('[') || text.starts_with('{') {
                match serde_json::from_str::<Value>(text) {
                    Ok(parsed) => normalize_placement_box(Some(&parsed), warnings),
                    Err(err) => {
                        warnings.push(format!("placement box is not valid JSON: {err}"));
                        None
                    }
                }
            } else {
                let values: Option<Vec<f64>> = text
                    .split_whitespace()
                    .map(|token| token.parse::<f64>().ok().filter(|v| v.is_finite()))
                    .collect();
                box_from_numbers(values, warnings)
            }
        }
        Some(Value::Array(items)) if items.is_empty() => None,
        Some(Value::Array(items)) => {
            let values: Option<Vec<f64>> = items.iter().map(number_from_value).collect();
            box_from_numbers(values, warnings)
        }
        Some(Value::Object(map)) => {
            let field = |key: &str| map.get(key).and_then(number_from_value);
            match (field("width"), field("height")) {
                (Some(width), Some(height)) => {
                    let x = field("x").unwrap_or(0.0);
                    let y = field("y").unwrap_or(0.0);
                    Some(PlacementBox([x, y, x + width, y + height]))
                }
                _ => {
                    warnings.push("placement box object has no width/height, ignored".to_string());
                    None
                }
            }
        }
        Some(other) => {
            warnings.push(format!(
                "unsupported placement box shape: {}, ignored",
                value_kind(other)
            ));
            None
        }
    }
}

fn box_from_numbers(values: Option<Vec<f64>>, warnings: &mut Vec<String>) -> Option<PlacementBox> {
    match values {
        Some(values) if values.len() >= 4 => {
            Some(PlacementBox([values[0], values[1], values[2], values[3]]))
        }
        Some(values) => {
            warnings.push(format!(
                "placement box needs 4 values, found {}, ignored",
                values.len()
            ));
            None
        }
        None => {
            warnings.push("placement box has non-numeric values, ignored".to_string());
            None
        }
    }
}

fn embedded_target_distances(value: Option<&Value>, warnings: &mut Vec<String>) -> TargetDistanceMap {
    let mut targets = TargetDistanceMap::new();
    match value {
        None | Some(Value::Null) => {}
        Some(Value::String(text)) => {
            let text = text.trim();
            if !text.is_empty() {
                match serde_json::from_str::<Value>(text) {
                    Ok(parsed) => return embedded_target_distances(Some(&parsed), warnings),
                    Err(err) => warnings.push(format!("target distances are not valid JSON: {err}")),
                }
            }
        }
        Some(Value::Object(map)) => {
            for (key, raw_value) in map {
                let id = key.trim().parse::<u32>().ok().filter(|id| *id > 0);
                match (id, number_from_value(raw_value)) {
                    (Some(id), Some(distance)) => {
                        targets.insert(id, distance);
                    }
                    _ => warnings.push(format!("skipped target distance entry '{key}'")),
                }
            }
        }
        Some(other) => warnings.push(format!(
            "unsupported target distances shape: {}, ignored",
            value_kind(other)
        )),
    }
    targets
}

fn check_consistency(descriptor: &mut AnnotationDescriptor) {
    if let (Some(width), Some(height)) = (descriptor.image_width, descriptor.image_height) {
        let (width, height) = (f64::from(width), f64::from(height));
        for (index, keypoint) in descriptor.keypoints.iter().enumerate() {
            let inside = (0.0..=width).contains(&keypoint.x()) && (0.0..=height).contains(&keypoint.y());
            if !inside {
                descriptor.warnings.push(format!(
                    "keypoint {} ({}, {}) lies outside the {}x{} reference image",
                    index + 1,
                    keypoint.x(),
                    keypoint.y(),
                    width,
                    height
                ));
            }
        }
    }

    if descriptor.keypoints.len() % 2 == 1 {
        descriptor
            .warnings
            .push("odd keypoint count, the last keypoint has no partner".to_string());
    }

    let pairs = descriptor.measurable_pairs();
    let targets = descriptor.target_distances.len();
    if pairs < targets {
        descriptor.warnings.push(format!(
            "{pairs} keypoint pairs for {targets} target distances, positions past {pairs} will not be measured"
        ));
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub mod normalize;
pub mod types;

pub use normalize::{catalog_target_distances, normalize};
pub use types::{
    AnnotationDescriptor, AnnotationSummary, Keypoint, PlacementBox, RawAnnotation,
    ReferenceImage, TargetDistanceMap,
};

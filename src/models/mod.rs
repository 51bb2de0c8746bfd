pub mod session;
pub mod specification;

pub use session::SessionContext;
pub use specification::{
    ArticleIdentity, MeasuredValues, MeasurementSpecification, MeasurementStatus,
    ToleranceOverride, ToleranceOverrides,
};

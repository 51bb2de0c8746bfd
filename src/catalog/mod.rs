pub mod client;

pub use client::{AnnotationSource, HttpCatalogClient};

pub mod resolver;
pub mod sizes;

pub use resolver::{Resolution, ResolutionStrategy, ResolveContext, SpecResolver};
pub use sizes::{sort_by_ladder, SIZE_LADDER};

//! Cascaded shadow maps for directional lights.

pub mod atlas;
pub mod cascade;
pub mod caster_collector;
pub mod filter;
pub mod splits;

/// Upper bound on cascades per light; lit shaders carry this many shadow matrices.
pub const MAX_CASCADES: usize = 4;

pub use atlas::AtlasLayout;
pub use cascade::CascadeShadowMapRenderer;
pub use caster_collector::CascadeShadowCasterCollector;
pub use filter::{ShadowFilterKind, ShadowFilterSettings};
pub use splits::{default_split_ratios, validate_split_ratios, CascadeSplits};

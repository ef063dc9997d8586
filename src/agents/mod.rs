//! Analyst nodes and the external model-client contract (spec §4.F, §6).

pub mod analyst;
pub mod model;

pub use analyst::AnalystNode;
pub use model::{BoundModel, ModelFactory, ModelResponse};

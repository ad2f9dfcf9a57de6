pub mod alameda_recommendation;
pub mod alameda_scaler;
pub mod context;
pub mod deletions;
pub mod helpers;
pub mod namespace;
pub mod node;
pub mod owner_chain;
pub mod readiness;
pub mod startup_sync;
pub mod workload;

pub use context::Context;

pub mod annotator;
pub mod classifier;
pub mod frame;
pub mod fuser;
pub mod metrics;
pub mod rule;

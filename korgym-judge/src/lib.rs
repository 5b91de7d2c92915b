//! # korgym-judge
//!
//! Evaluation runner and experience cache built on `korgym-core`.
//!
//! The [`Judge`] plays a list of seeds with bounded concurrency and turns each
//! into an [`EvaluationSample`]; a seed that fails outright is recorded with
//! score 0 instead of stopping the run. [`ExperienceCache`] keeps the lessons
//! extracted at each training step.

pub mod cache;
pub mod judge;
pub mod sample;

pub use cache::{CacheEntry, ExperienceCache, FileStorage, MemoryStorage, Saved, StorageBackend};
pub use judge::{EvaluationReport, Judge, JudgeConfig};
pub use sample::EvaluationSample;

//! adaptest-core: Rasch ability estimation, item selection and session policy.
//!
//! This crate defines the data model, the estimation and selection algorithms,
//! and the engine that runs adaptive sessions on top of them. Persistence and
//! item contextualization are reached through the traits in [`store`] and
//! [`traits`].

pub mod bank;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod model;
pub mod normalizer;
pub mod policy;
pub mod rasch;
pub mod recorder;
pub mod report;
pub mod selector;
pub mod simulation;
pub mod store;
pub mod traits;

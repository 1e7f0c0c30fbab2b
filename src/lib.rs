//! Plan execution for declaratively managed applications.
//!
//! An operator version describes plans made of phases and steps; each step
//! names tasks whose templates render to cluster objects. The [`engine`]
//! advances one instance's plan by one idempotent tick, and the
//! [`controller`] schedules those ticks.

pub mod apply;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod health;
pub mod log;
pub mod model;
pub mod nats;
pub mod object;
pub mod operator;
pub mod render;
pub mod routes;
pub mod state;

pub use engine::{execute_plan, ActivePlan, ExecutionContext, ExecutionOutcome};
pub use error::EngineError;

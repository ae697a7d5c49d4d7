pub mod api;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod engine;
pub mod entitlement;
pub mod error;
pub mod observability;
pub mod permissions;
pub mod rules;
pub mod storage;
pub mod tenancy;

#[cfg(test)]
pub(crate) mod fixtures;

pub use config::Config;
pub use domain::{Provenance, ResolvedRule, Role, RuleValue, ValueType};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use tenancy::Actor;

//! Business rules: per-business overrides of platform rule templates.

pub mod assignment;
pub mod resolver;
pub mod value;

pub use assignment::{AssignMode, AssignmentManager};
pub use resolver::{resolve_value, RuleResolver};
pub use value::{decode, validate_input, ValueError};

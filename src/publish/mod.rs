//! Container lifecycle: create, wait for readiness, publish.

pub mod lifecycle;
pub mod poll;

pub use lifecycle::{Container, ContainerLifecycle};
pub use poll::{BudgetExhausted, PollBudget};

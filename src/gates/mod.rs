//! Blocking gates
//!
//! Synchronization primitives used inside individual action
//! implementations: a single in-flight action can pause for one
//! confirmation or for a sequence of clarification answers supplied by the
//! UI. Both gates suspend via a fixed-interval poll over store state; these
//! are human-latency interactions, so polling is acceptable here.

pub mod clarification;
pub mod confirmation;

pub use clarification::ClarificationGate;
pub use confirmation::ConfirmationGate;

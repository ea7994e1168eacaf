//! Side-effecting operations: filesystem, subprocesses, persisted state.
//!
//! Everything here is replaceable in tests, either through the collaborator
//! traits (agent invoker, test runner, vcs) or by pointing the layout at a
//! temp directory.

pub mod agent;
pub mod audit;
pub mod checklist;
pub mod config;
pub mod context;
pub mod control;
pub mod layout;
pub mod process;
pub mod state_store;
pub mod test_run;
pub mod vcs;

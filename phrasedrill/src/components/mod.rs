//! Contains the building blocks the engine is wired from.
//!
//! The `EventBus` carries every outbound signal to collaborators, and the
//! `Scheduler` holds the cancellable deferred callbacks that stand in for
//! real-world delays. The `ChallengeManager` owns one of each.

pub mod bus;
pub mod scheduler;

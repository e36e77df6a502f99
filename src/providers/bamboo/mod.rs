mod client;
mod resolver;
mod schedule;
mod types;

pub use client::{BambooClient, BuildRef};
pub use resolver::{BuildStateResolver, ReleaseState, Resolution};
pub use schedule::{Environment, EnvironmentTable, NextRun, RunSlot};
pub use types::Build;

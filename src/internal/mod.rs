//! Internal implementation details.

pub(crate) mod restart;
pub(crate) mod teardown;

pub(crate) use restart::{RestartKey, RestartSet};
pub(crate) use teardown::TeardownQueue;

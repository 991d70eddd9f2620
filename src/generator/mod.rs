pub mod agent_executor;
pub mod compose;
pub mod context;
pub mod outlet;
pub mod planner;
pub mod research;
pub mod scheduler;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

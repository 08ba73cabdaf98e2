pub mod api;
pub mod broker;
pub mod config;
pub mod context;
pub mod ledger;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod position_tracker;
pub mod reconciler;
pub mod scheduler;
pub mod statistics;

#[cfg(test)]
mod tests;

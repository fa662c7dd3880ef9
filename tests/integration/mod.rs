//! Integration tests for the querypipe execution pipeline

mod batch_plugin;
mod cache_policies;
mod dedup_concurrency;
mod subscriptions;

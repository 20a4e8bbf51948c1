//! Orchestration over the domain: the payment gateway, the per-transaction
//! settlement poller, and the registry that owns running pollers.

pub mod gateway;
pub mod poller;
pub mod registry;

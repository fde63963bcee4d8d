pub mod aggregate_handlers;
pub mod health_handlers;

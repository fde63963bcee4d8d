//! Core data models for the aggregation service.
//!
//! These entities describe one aggregation run: the validated date window,
//! the aggregation mode, and the candidate objects discovered in the blob
//! store. Everything here is scoped to a single pipeline invocation —
//! nothing is persisted or shared across requests.

pub mod object;
pub mod request;

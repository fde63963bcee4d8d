//! Service layer: blob-store access, the per-mode transforms, and the
//! aggregation pipeline that composes them.

pub mod aggregation_service;
pub mod blob_store;
pub mod transform;

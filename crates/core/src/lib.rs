//! Core data model for the photo-session fulfillment pipeline.
//!
//! This crate defines the value types shared by every other crate:
//! the client [`Brief`](brief::Brief), the queued unit of work
//! ([`Job`](job::Job) plus its wire envelope), [`Asset`](asset::Asset)
//! lineage records, the terminal [`PipelineOutcome`](outcome::PipelineOutcome),
//! the pipeline error taxonomy, and environment-driven configuration.
//!
//! It has no I/O and no async code on purpose -- everything here is a
//! plain value that the pipeline, worker, and adapter crates pass around.

pub mod asset;
pub mod brief;
pub mod config;
pub mod error;
pub mod job;
pub mod outcome;

//! # Groundlink Library
//!
//! Serial telemetry ingest and live ground-track export for ground stations.
//!
//! This library provides the pipeline behind the `groundlink` binary:
//! - [`serial`] - port enumeration, auto-reconnect and line framing
//! - [`codec`] - delimited records bound to a fixed schema
//! - [`pipeline`] - worker threads, channels and the record dispatcher
//! - [`storage`] - the record log and the KML ground-track documents
//! - [`geo`] - pointing angles and ranges from home to the tracked device
//! - [`telemetry`] - the JSON status snapshot
//! - [`app`] - wiring all of it together from a [`config::Config`]

pub mod app;
pub mod codec;
pub mod config;
pub mod error;
pub mod geo;
pub mod pipeline;
pub mod serial;
pub mod storage;
pub mod telemetry;

//! # Pipeline Module
//!
//! Stages between the serial port and the files on disk.
//!
//! ```text
//! IngestWorker -> Channel<Record> -> Dispatcher -> Channel<Vec<String>>   -> PersistenceWorker
//!                                              \-> Channel<GeoCoordinate> -/
//! ```
//!
//! The ingest and persistence stages each run on their own thread under a
//! [`Lifecycle`]; the dispatcher is polled by its owner.

pub mod channel;
pub mod dispatch;
pub mod ingest;
pub mod lifecycle;
pub mod persist;
pub mod series;

pub use channel::Channel;
pub use dispatch::{Dispatcher, FieldKeys};
pub use ingest::IngestWorker;
pub use lifecycle::{Lifecycle, PollTask, DEFAULT_JOIN_TIMEOUT, DEFAULT_POLL_INTERVAL};
pub use persist::PersistenceWorker;
pub use series::RecordSeries;

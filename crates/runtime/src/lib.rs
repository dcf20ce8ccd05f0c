//! Orchestration: ingestion, the digest pipeline, and the daily scheduler.

pub mod clock;
pub mod deliver;
pub mod ingest;
pub mod pipeline;
pub mod scheduler;

pub use clock::{Clock, SystemClock};
pub use deliver::Deliverer;
pub use ingest::Ingestor;
pub use pipeline::DigestService;
pub use scheduler::DigestScheduler;

//! clfleet — core library
//!
//! A fan-out executor that drives shell, upload, and download jobs across a
//! fleet of remote hosts through `rsh`/`rsync`, under a bounded-concurrency
//! supervisor, and reduces the resulting stream of completed jobs through a
//! pipeline of aggregators.
pub mod aggregate;
pub mod aggregators;
pub mod config;
pub mod driver;
pub mod exec;
pub mod job;
pub mod supervisor;

//! MCU-side firmware library: the sample loop and the two RPMSG tasks,
//! wired against `skifio-hal`'s board driver and `skifio-core`'s shared
//! wire/ring/stats types.
//!
//! This crate exposes async task bodies, not a binary; the board-specific
//! pin mux, clock tree, and `embassy-executor` spawn point are out of
//! scope and belong to the concrete board support package that links
//! against this crate.
#![no_std]

pub mod rpmsg;
pub mod sample_loop;
pub mod session;
pub mod stats_task;

pub use rpmsg::{recv_task, send_task, RpmsgChannel, RpmsgResources};
pub use sample_loop::{SampleLoop, ADC_RING_CAPACITY};
pub use session::Session;
pub use stats_task::stats_task;

//! Host-side device driver.
//!
//! This crate owns everything between a finalized execution set and the
//! device: the blocking transport seam, the phase-ordered upload driver
//! with kernel-reuse, and the task monitor fed by the transport-receive
//! thread.

pub mod error;
pub mod tasks;
pub mod transport;
pub mod upload;


pub use error::DeviceError;
pub use tasks::{ExceptionKind, TaskMonitor, TaskState, TaskUpdate};
pub use transport::{Frame, Transport};
pub use upload::{kernel_hash, UploadDriver, UploadOptions, UploadReport};

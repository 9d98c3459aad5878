//! Process-backed runnables for chainrig.
//!
//! Each component is an OS process whose output goes to
//! `<log_dir>/<component>.log`. Readiness is decided by a log marker or an
//! HTTP probe; pause and resume use `SIGSTOP`/`SIGCONT`.

pub mod component;
mod error;
pub mod factory;
pub mod probe;
pub mod spec;

pub use component::ProcessComponent;
pub use error::{ProcessError, ProcessResult};
pub use factory::ProcessFactory;
pub use spec::{Placeholders, ProcessSpec, ReadinessProbe};

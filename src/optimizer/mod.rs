//! Strategies that replay a [`crate::graph::CaptureGraph`] into a native
//! graph through a [`crate::backend::CaptureBackend`].

mod round_robin;
mod sequential;

pub use round_robin::RoundRobinOptimizer;
pub use sequential::SequentialOptimizer;

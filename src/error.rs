use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Errors surfaced by the capture optimizers.
///
/// Nothing is retried internally; every error propagates to the caller
/// synchronously with scoped stream/event handles released on the way out.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// A round-robin optimizer was configured with zero streams.
    #[error("number of streams must be at least one")]
    ZeroStreams,

    /// The input graph is not acyclic.
    #[error("capture graph contains a cycle")]
    Cycle,

    /// A driver call failed during capture. `context` names the primitive
    /// and the local reason ("failed to record fork", ...).
    #[error("{context}")]
    Driver {
        context: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A node's work closure failed while being recorded.
    #[error("task failed during capture")]
    Work(#[source] anyhow::Error),
}

impl CaptureError {
    pub(crate) fn driver<E>(context: &'static str) -> impl FnOnce(E) -> CaptureError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        move |source| CaptureError::Driver {
            context,
            source: Box::new(source),
        }
    }
}

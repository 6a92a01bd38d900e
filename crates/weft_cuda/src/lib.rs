#![allow(clippy::missing_safety_doc, clippy::not_unsafe_ptr_arg_deref)]
//! CUDA backend for the `weft` capture optimizer.
//!
//! Implements [`CaptureBackend`] over raw driver stream capture: streams are
//! put into thread-local capture mode so concurrent optimizations in sibling
//! threads do not interfere through process-wide driver state, and the
//! captured `CUgraph` comes back as a [`CudaGraphHandle`] the caller can
//! instantiate and launch.

use std::mem::MaybeUninit;
use std::sync::Arc;

use cudarc::driver::{CudaContext, DriverError, sys};
use tracing::debug;
use weft::backend::CaptureBackend;

mod graph;
mod pool;

pub use cudarc;
pub use graph::{CudaGraphExecHandle, CudaGraphHandle};
pub use pool::{ScopedEvent, ScopedStream};

use pool::{EventPool, StreamPool};

/// Capture backend over one CUDA context with per-thread stream and event
/// pools. Deliberately `!Sync`; each optimizing thread builds its own.
pub struct CudaBackend {
    ctx: Arc<CudaContext>,
    stream_pool: StreamPool,
    event_pool: EventPool,
}

impl CudaBackend {
    pub fn new(ctx: Arc<CudaContext>) -> Self {
        Self {
            ctx,
            stream_pool: StreamPool::default(),
            event_pool: EventPool::default(),
        }
    }

    /// Creates a backend on the given device ordinal.
    pub fn on_device(ordinal: usize) -> Result<Self, DriverError> {
        let ctx = CudaContext::new(ordinal)?;
        ctx.bind_to_thread()?;
        Ok(Self::new(ctx))
    }

    pub fn context(&self) -> &Arc<CudaContext> {
        &self.ctx
    }
}

impl Drop for CudaBackend {
    fn drop(&mut self) {
        pool::drain_events(&self.ctx, &self.event_pool);
    }
}

impl CaptureBackend for CudaBackend {
    type Stream = ScopedStream;
    type Event = ScopedEvent;
    type NativeGraph = CudaGraphHandle;
    type Error = DriverError;

    fn stream(&mut self) -> Result<ScopedStream, DriverError> {
        pool::acquire_stream(&self.ctx, &self.stream_pool)
    }

    fn event(&mut self) -> Result<ScopedEvent, DriverError> {
        pool::acquire_event(&self.ctx, &self.event_pool)
    }

    fn begin_capture(&mut self, stream: &ScopedStream) -> Result<(), DriverError> {
        self.ctx.bind_to_thread()?;
        debug!("beginning thread-local stream capture");
        unsafe {
            sys::cuStreamBeginCapture_v2(
                stream.cu_stream(),
                sys::CUstreamCaptureMode::CU_STREAM_CAPTURE_MODE_THREAD_LOCAL,
            )
            .result()
        }
    }

    fn end_capture(&mut self, stream: &ScopedStream) -> Result<CudaGraphHandle, DriverError> {
        self.ctx.bind_to_thread()?;
        let mut graph = MaybeUninit::uninit();
        unsafe {
            sys::cuStreamEndCapture(stream.cu_stream(), graph.as_mut_ptr()).result()?;
            debug!("stream capture ended");
            Ok(CudaGraphHandle::from_raw(
                graph.assume_init(),
                self.ctx.clone(),
            ))
        }
    }

    fn record_event(&mut self, event: &ScopedEvent, stream: &ScopedStream) -> Result<(), DriverError> {
        self.ctx.bind_to_thread()?;
        unsafe { sys::cuEventRecord(event.raw(), stream.cu_stream()).result() }
    }

    fn wait_event(&mut self, stream: &ScopedStream, event: &ScopedEvent) -> Result<(), DriverError> {
        self.ctx.bind_to_thread()?;
        unsafe { sys::cuStreamWaitEvent(stream.cu_stream(), event.raw(), 0).result() }
    }
}

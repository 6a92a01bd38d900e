//! Per-thread stream and event pools.
//!
//! Capture burns through streams and events on every optimize call, so the
//! backend recycles them instead of round-tripping the driver's create and
//! destroy paths. Handles are scoped: dropping one returns it to the pool it
//! came from. Pools are `Rc`-shared and single-threaded, matching the one
//! optimize-call-per-thread model; handles must not outlive their backend.

use std::{cell::RefCell, mem::MaybeUninit, ops::Deref, rc::Rc, sync::Arc};

use cudarc::driver::{
    CudaContext, CudaStream, DriverError,
    sys::{self, CUevent},
};

pub(crate) type StreamPool = Rc<RefCell<Vec<Arc<CudaStream>>>>;
pub(crate) type EventPool = Rc<RefCell<Vec<CUevent>>>;

/// Stream checked out of the backend's pool; returns on drop.
pub struct ScopedStream {
    stream: Option<Arc<CudaStream>>,
    pool: StreamPool,
}

impl Deref for ScopedStream {
    type Target = CudaStream;

    fn deref(&self) -> &CudaStream {
        self.stream.as_ref().expect("stream present until drop")
    }
}

impl Drop for ScopedStream {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.pool.borrow_mut().push(stream);
        }
    }
}

pub(crate) fn acquire_stream(
    ctx: &Arc<CudaContext>,
    pool: &StreamPool,
) -> Result<ScopedStream, DriverError> {
    let stream = match pool.borrow_mut().pop() {
        Some(stream) => stream,
        None => ctx.new_stream()?,
    };
    Ok(ScopedStream {
        stream: Some(stream),
        pool: pool.clone(),
    })
}

/// Event checked out of the backend's pool; returns on drop. The raw handle
/// stays valid for the backend's lifetime, so a recorded event can be waited
/// on until the capture that recorded it ends.
pub struct ScopedEvent {
    event: CUevent,
    pool: EventPool,
}

impl ScopedEvent {
    pub fn raw(&self) -> CUevent {
        self.event
    }
}

impl Drop for ScopedEvent {
    fn drop(&mut self) {
        self.pool.borrow_mut().push(self.event);
    }
}

pub(crate) fn acquire_event(
    ctx: &Arc<CudaContext>,
    pool: &EventPool,
) -> Result<ScopedEvent, DriverError> {
    if let Some(event) = pool.borrow_mut().pop() {
        return Ok(ScopedEvent {
            event,
            pool: pool.clone(),
        });
    }
    ctx.bind_to_thread()?;
    let mut event = MaybeUninit::uninit();
    unsafe {
        sys::cuEventCreate(
            event.as_mut_ptr(),
            sys::CUevent_flags::CU_EVENT_DEFAULT as u32,
        )
        .result()?;
        Ok(ScopedEvent {
            event: event.assume_init(),
            pool: pool.clone(),
        })
    }
}

/// Destroys every pooled event. Called when the backend drops.
pub(crate) fn drain_events(ctx: &Arc<CudaContext>, pool: &EventPool) {
    let _ = ctx.bind_to_thread();
    for event in pool.borrow_mut().drain(..) {
        if !event.is_null() {
            unsafe {
                let _ = sys::cuEventDestroy_v2(event);
            }
        }
    }
}

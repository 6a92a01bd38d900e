//! A backend that records the capture command stream instead of driving a
//! GPU. The "native graph" it returns is the exact interleaving of stream
//! operations between begin and end capture, which makes schedules
//! inspectable in tests and usable as a dry run of an optimizer.

use std::{cell::RefCell, rc::Rc};

use thiserror::Error;

use crate::backend::CaptureBackend;

/// One stream operation observed during capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceCommand {
    BeginCapture { stream: usize },
    /// Pushed by [`TraceStream::work`] from inside a node's work closure.
    Work { stream: usize, name: String },
    Record { stream: usize, event: usize },
    Wait { stream: usize, event: usize },
    EndCapture { stream: usize },
}

/// Stream handle issued by [`TraceBackend`]. Clones share the backend's log.
#[derive(Clone)]
pub struct TraceStream {
    id: usize,
    log: Rc<RefCell<Vec<TraceCommand>>>,
}

impl TraceStream {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Marks a unit of work as enqueued on this stream.
    pub fn work(&self, name: impl Into<String>) {
        self.log.borrow_mut().push(TraceCommand::Work {
            stream: self.id,
            name: name.into(),
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent(usize);

impl TraceEvent {
    pub fn id(&self) -> usize {
        self.0
    }
}

/// The command interleaving captured between begin and end capture.
#[derive(Debug, Clone, Default)]
pub struct TraceGraph {
    pub commands: Vec<TraceCommand>,
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("stream {0} is not capturing")]
    NotCapturing(usize),
    #[error("stream {0} is already capturing")]
    AlreadyCapturing(usize),
}

/// In-process [`CaptureBackend`] recording every driver call into a log.
#[derive(Default)]
pub struct TraceBackend {
    log: Rc<RefCell<Vec<TraceCommand>>>,
    next_stream: usize,
    next_event: usize,
    capture_origin: Option<usize>,
    capture_start: usize,
}

impl TraceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, across capture scopes.
    pub fn commands(&self) -> Vec<TraceCommand> {
        self.log.borrow().clone()
    }
}

impl CaptureBackend for TraceBackend {
    type Stream = TraceStream;
    type Event = TraceEvent;
    type NativeGraph = TraceGraph;
    type Error = TraceError;

    fn stream(&mut self) -> Result<TraceStream, TraceError> {
        let id = self.next_stream;
        self.next_stream += 1;
        Ok(TraceStream {
            id,
            log: self.log.clone(),
        })
    }

    fn event(&mut self) -> Result<TraceEvent, TraceError> {
        let id = self.next_event;
        self.next_event += 1;
        Ok(TraceEvent(id))
    }

    fn begin_capture(&mut self, stream: &TraceStream) -> Result<(), TraceError> {
        if let Some(origin) = self.capture_origin {
            return Err(TraceError::AlreadyCapturing(origin));
        }
        self.capture_origin = Some(stream.id);
        self.capture_start = self.log.borrow().len();
        self.log
            .borrow_mut()
            .push(TraceCommand::BeginCapture { stream: stream.id });
        Ok(())
    }

    fn end_capture(&mut self, stream: &TraceStream) -> Result<TraceGraph, TraceError> {
        match self.capture_origin {
            Some(origin) if origin == stream.id => {
                self.log
                    .borrow_mut()
                    .push(TraceCommand::EndCapture { stream: stream.id });
                self.capture_origin = None;
                let commands = self.log.borrow()[self.capture_start..].to_vec();
                Ok(TraceGraph { commands })
            }
            _ => Err(TraceError::NotCapturing(stream.id)),
        }
    }

    fn record_event(&mut self, event: &TraceEvent, stream: &TraceStream) -> Result<(), TraceError> {
        self.log.borrow_mut().push(TraceCommand::Record {
            stream: stream.id,
            event: event.0,
        });
        Ok(())
    }

    fn wait_event(&mut self, stream: &TraceStream, event: &TraceEvent) -> Result<(), TraceError> {
        self.log.borrow_mut().push(TraceCommand::Wait {
            stream: stream.id,
            event: event.0,
        });
        Ok(())
    }
}

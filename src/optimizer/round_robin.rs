use itertools::Itertools;
use tracing::{debug, trace};

use crate::backend::CaptureBackend;
use crate::error::{CaptureError, Result};
use crate::graph::{CaptureGraph, NodeIndex};
use crate::topo::levelize;

/// Captures the described graph using a greedy round-robin assignment over a
/// fixed number of streams.
///
/// The graph is levelized; within each level the node at position `i` is
/// replayed on stream `i % num_streams`. A fork event makes every side
/// stream downstream of the start of capture, one event per cross-stream
/// producer covers the edges that leave its stream, and join events funnel
/// every side stream back into stream 0 before capture ends.
#[derive(Debug, Clone, Copy)]
pub struct RoundRobinOptimizer {
    num_streams: usize,
}

impl Default for RoundRobinOptimizer {
    /// Four streams.
    fn default() -> Self {
        Self { num_streams: 4 }
    }
}

impl RoundRobinOptimizer {
    pub fn new(num_streams: usize) -> Result<Self> {
        if num_streams == 0 {
            return Err(CaptureError::ZeroStreams);
        }
        Ok(Self { num_streams })
    }

    pub fn num_streams(&self) -> usize {
        self.num_streams
    }

    pub fn set_num_streams(&mut self, num_streams: usize) -> Result<()> {
        if num_streams == 0 {
            return Err(CaptureError::ZeroStreams);
        }
        self.num_streams = num_streams;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(nodes = graph.node_count(), streams = self.num_streams))]
    pub fn optimize<B: CaptureBackend>(
        &self,
        backend: &mut B,
        graph: &mut CaptureGraph<B::Stream>,
    ) -> Result<B::NativeGraph> {
        let levels = levelize(graph)?;

        let mut streams = Vec::with_capacity(self.num_streams);
        for _ in 0..self.num_streams {
            streams.push(
                backend
                    .stream()
                    .map_err(CaptureError::driver("failed to acquire stream"))?,
            );
        }

        // Recorded events must stay alive until capture ends; node metadata
        // refers to them by index.
        let mut events: Vec<B::Event> =
            Vec::with_capacity((self.num_streams >> 1) + levels.len());

        backend
            .begin_capture(&streams[0])
            .map_err(CaptureError::driver(
                "failed to turn stream into per-thread capture mode",
            ))?;
        debug!(levels = levels.len(), "capture begun");

        match self.schedule(backend, graph, &levels, &streams, &mut events) {
            Ok(()) => backend
                .end_capture(&streams[0])
                .map_err(CaptureError::driver("failed to end capture")),
            Err(err) => {
                // Terminate the active capture before propagating; stream
                // and event handles roll back on drop.
                let _ = backend.end_capture(&streams[0]);
                Err(err)
            }
        }
    }

    fn schedule<B: CaptureBackend>(
        &self,
        backend: &mut B,
        graph: &mut CaptureGraph<B::Stream>,
        levels: &[Vec<NodeIndex>],
        streams: &[B::Stream],
        events: &mut Vec<B::Event>,
    ) -> Result<()> {
        // Fork: every side stream becomes downstream of the start of capture.
        let fork = self.acquire_event(backend, events)?;
        backend
            .record_event(&events[fork], &streams[0])
            .map_err(CaptureError::driver("failed to record fork"))?;
        for stream in &streams[1..] {
            backend
                .wait_event(stream, &events[fork])
                .map_err(CaptureError::driver("failed to wait on fork"))?;
        }

        for level in levels {
            for (i, &node) in level.iter().enumerate() {
                let sid = i % self.num_streams;
                trace!(
                    task = graph.name(node),
                    level = graph.meta(node).level,
                    sid,
                    "replaying"
                );

                // Wait on predecessors replayed on other streams; same-stream
                // predecessors are covered by FIFO order.
                for pred in graph.dependents(node).collect_vec() {
                    let meta = graph.meta(pred);
                    if meta.idx % self.num_streams != sid {
                        let event = meta
                            .event
                            .expect("cross-stream predecessor was scheduled without an event");
                        backend
                            .wait_event(&streams[sid], &events[event])
                            .map_err(CaptureError::driver("failed to wait on predecessor"))?;
                    }
                }

                graph
                    .run_work(node, &streams[sid])
                    .map_err(CaptureError::Work)?;

                // One event regardless of how many successors leave the
                // stream; each of them waits on the same record point.
                let crosses = graph
                    .successors(node)
                    .any(|s| graph.meta(s).idx % self.num_streams != sid);
                if crosses {
                    let event = self.acquire_event(backend, events)?;
                    backend
                        .record_event(&events[event], &streams[sid])
                        .map_err(CaptureError::driver("failed to record event"))?;
                    graph.meta_mut(node).event = Some(event);
                }
            }
        }

        // Join: stream 0 becomes downstream of every side stream.
        for stream in &streams[1..] {
            let join = self.acquire_event(backend, events)?;
            backend
                .record_event(&events[join], stream)
                .map_err(CaptureError::driver("failed to record join"))?;
            backend
                .wait_event(&streams[0], &events[join])
                .map_err(CaptureError::driver("failed to wait on join"))?;
        }

        Ok(())
    }

    fn acquire_event<B: CaptureBackend>(
        &self,
        backend: &mut B,
        events: &mut Vec<B::Event>,
    ) -> Result<usize> {
        let event = backend
            .event()
            .map_err(CaptureError::driver("failed to acquire event"))?;
        events.push(event);
        Ok(events.len() - 1)
    }
}

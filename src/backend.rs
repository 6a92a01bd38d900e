/// Driver seam the optimizers capture through.
///
/// One implementation wraps the real GPU driver (see the `weft_cuda` crate);
/// [`crate::trace::TraceBackend`] records the command interleaving for
/// inspection and tests. Stream and event acquisition hand out scoped
/// handles drawn from per-thread pools: dropping a handle releases it, so
/// every optimizer exit path rolls resources back.
///
/// Capture is a thread-local scope: between `begin_capture` and
/// `end_capture` on a stream, commands issued to the optimizer's streams are
/// recorded into a native graph instead of executing. Concurrent captures on
/// other host threads must not interfere.
pub trait CaptureBackend {
    type Stream;
    type Event;
    /// The captured graph, returned by value. The caller owns instantiation
    /// and execution; the backend retains no reference.
    type NativeGraph;
    type Error: std::error::Error + Send + Sync + 'static;

    fn stream(&mut self) -> Result<Self::Stream, Self::Error>;

    fn event(&mut self) -> Result<Self::Event, Self::Error>;

    /// Puts `stream` into thread-local capture mode.
    fn begin_capture(&mut self, stream: &Self::Stream) -> Result<(), Self::Error>;

    /// Ends the capture begun on `stream` and returns the native graph.
    fn end_capture(&mut self, stream: &Self::Stream) -> Result<Self::NativeGraph, Self::Error>;

    /// Records `event` on `stream` after all work submitted to it so far.
    fn record_event(
        &mut self,
        event: &Self::Event,
        stream: &Self::Stream,
    ) -> Result<(), Self::Error>;

    /// Makes `stream` wait until `event`'s record point is reached.
    fn wait_event(
        &mut self,
        stream: &Self::Stream,
        event: &Self::Event,
    ) -> Result<(), Self::Error>;
}

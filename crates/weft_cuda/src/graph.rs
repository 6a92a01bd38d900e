//! Handles for captured CUDA graphs.

use std::mem::MaybeUninit;
use std::sync::Arc;

use cudarc::driver::{
    CudaContext, CudaStream, DriverError,
    sys::{self, CUgraph, CUgraphExec},
};

/// A CUDA graph produced by ending a stream capture. Owns the underlying
/// `CUgraph` and destroys it on drop.
pub struct CudaGraphHandle {
    cu_graph: CUgraph,
    ctx: Arc<CudaContext>,
}

impl CudaGraphHandle {
    pub(crate) fn from_raw(cu_graph: CUgraph, ctx: Arc<CudaContext>) -> Self {
        Self { cu_graph, ctx }
    }

    pub fn raw(&self) -> CUgraph {
        self.cu_graph
    }

    /// Instantiates the graph, creating an executable graph.
    pub fn instantiate(&self) -> Result<CudaGraphExecHandle, DriverError> {
        self.ctx.bind_to_thread()?;
        let mut graph_exec = MaybeUninit::uninit();
        unsafe {
            sys::cuGraphInstantiateWithFlags(graph_exec.as_mut_ptr(), self.cu_graph, 0).result()?;
            Ok(CudaGraphExecHandle {
                cu_graph_exec: graph_exec.assume_init(),
                ctx: self.ctx.clone(),
            })
        }
    }
}

impl Drop for CudaGraphHandle {
    fn drop(&mut self) {
        let _ = self.ctx.bind_to_thread();
        if !self.cu_graph.is_null() {
            unsafe {
                let _ = sys::cuGraphDestroy(self.cu_graph);
            }
        }
    }
}

/// An instantiated CUDA graph that can be launched.
pub struct CudaGraphExecHandle {
    cu_graph_exec: CUgraphExec,
    ctx: Arc<CudaContext>,
}

impl CudaGraphExecHandle {
    /// Launches the graph on the given stream.
    pub fn launch(&self, stream: &CudaStream) -> Result<(), DriverError> {
        self.ctx.bind_to_thread()?;
        unsafe { sys::cuGraphLaunch(self.cu_graph_exec, stream.cu_stream()).result() }
    }
}

impl Drop for CudaGraphExecHandle {
    fn drop(&mut self) {
        let _ = self.ctx.bind_to_thread();
        if !self.cu_graph_exec.is_null() {
            unsafe {
                let _ = sys::cuGraphExecDestroy(self.cu_graph_exec);
            }
        }
    }
}

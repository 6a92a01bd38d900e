use crate::graph::{CaptureGraph, NodeIndex};
use crate::trace::{TraceCommand, TraceGraph, TraceStream};

/// Adds a node whose work logs its own name on the stream it runs on.
pub fn traced(graph: &mut CaptureGraph<TraceStream>, name: &str) -> NodeIndex {
    let tag = name.to_string();
    graph.add_node(name, move |stream: &TraceStream| {
        stream.work(tag.as_str());
        Ok(())
    })
}

/// (log position, stream) of the named work item. Panics if it never ran.
pub fn work_pos(trace: &TraceGraph, name: &str) -> (usize, usize) {
    trace
        .commands
        .iter()
        .enumerate()
        .find_map(|(pos, c)| match c {
            TraceCommand::Work { stream, name: n } if n == name => Some((pos, *stream)),
            _ => None,
        })
        .unwrap_or_else(|| panic!("work '{name}' was never replayed"))
}

/// All work commands as (position, stream, name).
pub fn works(trace: &TraceGraph) -> Vec<(usize, usize, String)> {
    trace
        .commands
        .iter()
        .enumerate()
        .filter_map(|(pos, c)| match c {
            TraceCommand::Work { stream, name } => Some((pos, *stream, name.clone())),
            _ => None,
        })
        .collect()
}

/// All event records as (position, stream, event).
pub fn records(trace: &TraceGraph) -> Vec<(usize, usize, usize)> {
    trace
        .commands
        .iter()
        .enumerate()
        .filter_map(|(pos, c)| match c {
            TraceCommand::Record { stream, event } => Some((pos, *stream, *event)),
            _ => None,
        })
        .collect()
}

/// All event waits as (position, stream, event).
pub fn waits(trace: &TraceGraph) -> Vec<(usize, usize, usize)> {
    trace
        .commands
        .iter()
        .enumerate()
        .filter_map(|(pos, c)| match c {
            TraceCommand::Wait { stream, event } => Some((pos, *stream, *event)),
            _ => None,
        })
        .collect()
}

/// True when the dependency u -> v is honored in the captured command
/// stream: either both ran on one stream in order, or u recorded an event
/// after its work and v's stream waited on it before v's work.
pub fn edge_covered(trace: &TraceGraph, u: &str, v: &str) -> bool {
    let (pu, su) = work_pos(trace, u);
    let (pv, sv) = work_pos(trace, v);
    if su == sv {
        return pu < pv;
    }
    records(trace).iter().any(|&(pr, sr, event)| {
        sr == su
            && pr > pu
            && waits(trace)
                .iter()
                .any(|&(pw, sw, ew)| sw == sv && ew == event && pw > pr && pw < pv)
    })
}

/// Exactly one begin and one end, bracketing the log on the same stream.
pub fn assert_single_capture_region(trace: &TraceGraph) {
    let begins: Vec<_> = trace
        .commands
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, TraceCommand::BeginCapture { .. }))
        .collect();
    let ends: Vec<_> = trace
        .commands
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, TraceCommand::EndCapture { .. }))
        .collect();
    assert_eq!(begins.len(), 1);
    assert_eq!(ends.len(), 1);
    assert_eq!(begins[0].0, 0);
    assert_eq!(ends[0].0, trace.commands.len() - 1);
    let (TraceCommand::BeginCapture { stream: bs }, TraceCommand::EndCapture { stream: es }) =
        (begins[0].1, ends[0].1)
    else {
        unreachable!()
    };
    assert_eq!(bs, es);
}

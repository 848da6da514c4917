use std::net::SocketAddr;

use log::{trace, warn};

use lumen_shared::{
    CodecError, Micros, NodeId, StreamFrame, StreamSeq, StreamZone, STREAM_PERIOD_MS,
};

use crate::batch::DeltaBatcher;
use crate::registry::Registry;

/// One fanout round: a single encoded frame and the addresses it goes
/// to. The same bytes are sent to every target.
#[derive(Clone, Debug)]
pub struct StreamTick {
    pub seq: StreamSeq,
    pub frame: Vec<u8>,
    pub targets: Vec<(NodeId, SocketAddr)>,
}

// StreamFanout
//
// Best-effort current-state datagrams to READY nodes, fully decoupled
// from the control channel. No applyAt and no retries: a dropped frame
// is obsoleted by the next one ~10 ms later. The sequence number only
// exists so receivers can discard reordered frames.
pub struct StreamFanout {
    seq: StreamSeq,
    last_send_us: Option<Micros>,
}

impl StreamFanout {
    pub fn new() -> Self {
        Self {
            seq: 0,
            last_send_us: None,
        }
    }

    pub fn seq(&self) -> StreamSeq {
        self.seq
    }

    /// Produce the next frame if the period has elapsed and anyone is
    /// listening. Counts a send against each target's record.
    pub fn tick(
        &mut self,
        now_us: Micros,
        batcher: &DeltaBatcher,
        registry: &mut Registry,
    ) -> Result<Option<StreamTick>, CodecError> {
        if let Some(last) = self.last_send_us {
            if now_us.saturating_sub(last) < STREAM_PERIOD_MS * 1_000 {
                return Ok(None);
            }
        }

        let targets: Vec<(NodeId, SocketAddr)> = registry
            .ready_nodes()
            .filter_map(|record| match record.stream_addr() {
                Some(addr) => Some((record.node_id(), addr)),
                None => {
                    trace!(
                        "node {} is ready but has no stream address yet",
                        record.node_id()
                    );
                    None
                }
            })
            .collect();
        if targets.is_empty() {
            return Ok(None);
        }

        self.last_send_us = Some(now_us);
        self.seq = self.seq.wrapping_add(1);

        let frame = StreamFrame {
            seq: self.seq,
            hub_epoch_us: now_us,
            global: *batcher.global(),
            zones: batcher.zones().iter().map(StreamZone::from_state).collect(),
        };
        let bytes = match frame.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("stream frame {} failed to encode: {}", self.seq, err);
                return Err(err);
            }
        };

        for (node_id, _) in &targets {
            registry.count_stream_send(*node_id);
        }
        trace!(
            "stream frame {} ({} bytes) to {} nodes",
            self.seq,
            bytes.len(),
            targets.len()
        );

        Ok(Some(StreamTick {
            seq: self.seq,
            frame: bytes,
            targets,
        }))
    }
}

impl Default for StreamFanout {
    fn default() -> Self {
        Self::new()
    }
}

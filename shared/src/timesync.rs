/// One completed ping/pong exchange, reduced to an offset and a
/// round-trip estimate.
///
/// Timestamps: t1 node send, t2 hub receive, t3 hub send, t4 node
/// receive. t1/t4 are on the node clock, t2/t3 on the hub epoch.
/// `offset_us` is hub minus node; adding it to a node-local time yields
/// hub epoch time. The midpoint formula assumes symmetric path delay,
/// which holds well enough on a single LAN segment; the node-side
/// filter rejects high-RTT samples where it does not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TsSample {
    pub offset_us: i64,
    pub rtt_us: i64,
}

impl TsSample {
    pub fn from_exchange(t1: u64, t2: u64, t3: u64, t4: u64) -> TsSample {
        let t1 = t1 as i64;
        let t2 = t2 as i64;
        let t3 = t3 as i64;
        let t4 = t4 as i64;
        TsSample {
            offset_us: ((t2 - t1) + (t3 - t4)) / 2,
            rtt_us: (t4 - t1) - (t3 - t2),
        }
    }
}

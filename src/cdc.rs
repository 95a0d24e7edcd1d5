//! Clock-domain crossing primitives.
//!
//! Nothing here is shared between domains: each side owns its registers, and the other side only
//! ever looks at them through a `Synchronizer` clocked in its own domain.  A request carries a
//! payload that the source holds stable until the matching acknowledge comes back, so the sink
//! may read it directly once the synchronised request toggle has arrived.

/// Flops in every synchronizer chain
pub const SYNC_STAGES: usize = 2;

/// A level synchronizer: the input becomes visible `SYNC_STAGES` clocks of the sampling domain
/// after it settles
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Synchronizer<T> {
    stages: [T; SYNC_STAGES],
}

impl<T: Copy + Default> Synchronizer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock the chain with `input`, returning the synchronised output after the edge
    pub fn sample(&mut self, input: T) -> T {
        self.stages.copy_within(1.., 0);
        self.stages[SYNC_STAGES - 1] = input;
        self.stages[0]
    }

    pub fn output(&self) -> T {
        self.stages[0]
    }
}

/// Source side of a toggle handshake.  Lives in the producer's clock domain.
#[derive(Clone, Debug, Default)]
pub struct HandshakeSource<T> {
    req: bool,
    ack_seen: bool,
    ack_sync: Synchronizer<bool>,
    payload: T,
}

impl<T: Copy + Default> HandshakeSource<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request toggle, for the sink to synchronise
    pub fn req(&self) -> bool {
        self.req
    }

    /// The payload of the pending request; stable while `busy()`
    pub fn payload(&self) -> T {
        self.payload
    }

    pub fn busy(&self) -> bool {
        self.req != self.ack_seen
    }

    /// Start a request.  Returns false, leaving the pending one alone, if one is still
    /// outstanding.
    pub fn request(&mut self, payload: T) -> bool {
        if self.busy() {
            return false;
        }
        self.payload = payload;
        self.req = !self.req;
        true
    }

    /// Clock in the sink's acknowledge toggle.  Returns true on the clock the request completes.
    pub fn tick(&mut self, ack: bool) -> bool {
        let was_busy = self.busy();
        self.ack_seen = self.ack_sync.sample(ack);
        was_busy && !self.busy()
    }
}

/// Sink side of a toggle handshake.  Lives in the consumer's clock domain.
#[derive(Clone, Debug, Default)]
pub struct HandshakeSink<T> {
    ack: bool,
    req_seen: bool,
    req_sync: Synchronizer<bool>,
    response: T,
}

impl<T: Copy + Default> HandshakeSink<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acknowledge toggle, for the source to synchronise
    pub fn ack(&self) -> bool {
        self.ack
    }

    /// The response that came with the last acknowledge; stable until the next one
    pub fn response(&self) -> T {
        self.response
    }

    /// Clock in the source's request toggle
    pub fn tick(&mut self, req: bool) {
        self.req_seen = self.req_sync.sample(req);
    }

    /// A request has arrived and not been acknowledged yet
    pub fn pending(&self) -> bool {
        self.req_seen != self.ack
    }

    /// Complete the pending request with `response`
    pub fn acknowledge(&mut self, response: T) {
        if self.pending() {
            self.response = response;
            self.ack = !self.ack;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synchronizer_delays_by_stages() {
        let mut s = Synchronizer::new();
        assert!(!s.sample(true));
        assert!(s.sample(true));
        assert!(s.output());
        assert!(s.sample(false));
        assert!(!s.sample(false));
    }

    #[test]
    fn round_trip_with_unrelated_clocks() {
        let mut src: HandshakeSource<u32> = HandshakeSource::new();
        let mut sink: HandshakeSink<u32> = HandshakeSink::new();

        assert!(src.request(7));
        assert!(src.busy());
        assert!(!src.request(8));

        // Sink runs three times faster than the source
        let mut served = 0;
        let mut done = false;
        for _ in 0..10 {
            for _ in 0..3 {
                sink.tick(src.req());
                if sink.pending() {
                    served += 1;
                    sink.acknowledge(src.payload() * 2);
                }
            }
            if src.tick(sink.ack()) {
                done = true;
                break;
            }
        }
        assert!(done);
        assert_eq!(served, 1);
        assert_eq!(sink.response(), 14);
        assert!(!src.busy());
        assert!(src.request(9));
    }
}

use crate::sync::{Arc, Mutex};

/// A packet travelling over a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Packet<T> {
    pub data: T,
    /// Cycle at which the packet was sent.
    pub time: u64,
}

impl<T> std::fmt::Display for Packet<T>
where
    T: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.data, self.time)
    }
}

/// A connection to the next level of the memory hierarchy.
///
/// A cache only ever pushes into a connection.
/// Rejected packets stay with the sender and are retried in a later cycle.
pub trait Connection<P>: Send + Sync + 'static {
    /// Checks if the connection can accept packets of the given sizes.
    #[must_use]
    fn can_send(&self, packets: &[u32]) -> bool;

    /// Sends a packet.
    ///
    /// Callers must check `can_send` first.
    fn send(&mut self, packet: P);
}

/// Shared memory port of a cache.
pub type Port<P> = Arc<Mutex<dyn Connection<Packet<P>>>>;

use crate::interconn as ic;

/// Fixed capacity ring buffer.
///
/// Slots keep their index while occupied, so an entry pushed at index `i`
/// can be looked up with `peek(i)` until it is popped.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fifo<T> {
    slots: Vec<Option<T>>,
    head: usize,
    tail: usize,
    len: usize,
}

impl<T> std::fmt::Display for Fifo<T>
where
    T: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Fifo({:>2}/{:<2}){:?}",
            self.len,
            self.capacity(),
            self.iter()
                .map(std::string::ToString::to_string)
                .collect::<Vec<_>>()
        )
    }
}

impl<T> Fifo<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Pushes a value to the back of the queue.
    ///
    /// # Returns
    /// The slot index of the pushed value.
    ///
    /// # Panics
    /// If the queue is full.
    pub fn push(&mut self, value: T) -> usize {
        assert!(!self.full(), "push into full fifo");
        let index = self.tail;
        debug_assert!(self.slots[index].is_none());
        self.slots[index] = Some(value);
        self.tail = (self.tail + 1) % self.capacity();
        self.len += 1;
        index
    }

    /// Pops the oldest value.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let value = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        value
    }

    #[must_use]
    pub fn first(&self) -> Option<&T> {
        self.peek(self.head)
    }

    #[must_use]
    pub fn peek(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn peek_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    #[must_use]
    pub fn full(&self) -> bool {
        self.len >= self.capacity()
    }

    #[must_use]
    pub fn can_fit(&self, n: usize) -> bool {
        self.len + n <= self.capacity()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterates from the oldest to the newest value.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |offset| {
            let index = (self.head + offset) % self.capacity();
            self.slots[index].as_ref()
        })
    }
}

impl<P> ic::Connection<P> for Fifo<P>
where
    P: Send + Sync + 'static,
{
    fn can_send(&self, packets: &[u32]) -> bool {
        self.can_fit(packets.len())
    }

    fn send(&mut self, packet: P) {
        self.push(packet);
    }
}

use dogesync_primitives::SealedHeader;
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 512;

/// How the canonical chain moved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    /// New head block.
    Head,
    /// A side-chain block was observed; the canonical chain is unchanged.
    Fork,
    /// The chain switched branches. The core never produces these itself
    /// (the chain is consensus-finalized), subscribers may still want the
    /// variant.
    Reorg,
}

/// Published to subscribers after every successful block write.
#[derive(Clone, Debug)]
pub struct Event {
    pub new_chain: Vec<SealedHeader>,
    pub old_chain: Vec<SealedHeader>,
    /// Total difficulty after the event.
    pub difficulty: u64,
    pub event_type: EventType,
}

impl Event {
    pub fn new(event_type: EventType) -> Self {
        Self { new_chain: Vec::new(), old_chain: Vec::new(), difficulty: 0, event_type }
    }

    pub fn add_new_header(&mut self, header: SealedHeader) {
        self.new_chain.push(header);
    }

    pub fn add_old_header(&mut self, header: SealedHeader) {
        self.old_chain.push(header);
    }
}

/// A live feed of chain events.
pub type Subscription = broadcast::Receiver<Event>;

#[derive(Debug)]
pub(crate) struct EventStream {
    sender: broadcast::Sender<Event>,
}

impl EventStream {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> Subscription {
        self.sender.subscribe()
    }

    /// Best-effort publish; an event with no subscribers is simply dropped.
    pub(crate) fn push(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

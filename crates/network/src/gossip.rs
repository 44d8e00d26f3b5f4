use prost::Message;
use std::{marker::PhantomData, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
    time::timeout,
};
use tracing::error;

/// Ceiling on draining the worker pool when a topic is closed.
const UNSUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum GossipError {
    #[error("failed to publish to topic: {0}")]
    Publish(String),
}

/// The raw pubsub the gossip layer sits on. Implemented by the external
/// libp2p transport; tests use loopback channels.
pub trait PubsubDriver: Send + Sync {
    fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), GossipError>;

    /// Raw message stream of a joined topic.
    fn subscribe(&self, topic: &str) -> mpsc::Receiver<Vec<u8>>;
}

/// A joined pubsub topic of protobuf messages of one type.
///
/// Subscribers are invoked from a fixed worker pool so one slow handler does
/// not stall the topic; the queue between the reader and the workers is
/// bounded at four slots per worker.
pub struct Topic<M> {
    name: String,
    driver: Arc<dyn PubsubDriver>,
    workers: JoinSet<()>,
    shutdown: watch::Sender<bool>,
    _marker: PhantomData<M>,
}

/// Worker pool bounds; at least two workers, at most 64.
fn worker_count() -> usize {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
    cpus.clamp(2, 64)
}

impl<M> Topic<M>
where
    M: Message + Default + 'static,
{
    /// Joins a topic by name.
    pub fn new(name: impl Into<String>, driver: Arc<dyn PubsubDriver>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            name: name.into(),
            driver,
            workers: JoinSet::new(),
            shutdown,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Serializes and submits a message to the underlying pubsub.
    pub fn publish(&self, message: &M) -> Result<(), GossipError> {
        self.driver.publish(&self.name, message.encode_to_vec())
    }

    /// Starts delivering decoded messages to `handler` on the worker pool.
    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: Fn(M) + Send + Sync + 'static,
    {
        let workers = worker_count();
        let (queue_tx, queue_rx) = mpsc::channel::<M>(workers * 4);
        let queue_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));
        let handler = Arc::new(handler);

        for _ in 0..workers {
            let queue_rx = Arc::clone(&queue_rx);
            let handler = Arc::clone(&handler);
            self.workers.spawn(async move {
                loop {
                    let message = queue_rx.lock().await.recv().await;
                    match message {
                        Some(message) => handler(message),
                        None => return,
                    }
                }
            });
        }

        let mut raw = self.driver.subscribe(&self.name);
        let mut shutdown = self.shutdown.subscribe();
        let name = self.name.clone();
        self.workers.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    raw_message = raw.recv() => {
                        let Some(raw_message) = raw_message else { return };
                        match M::decode(raw_message.as_slice()) {
                            Ok(message) => {
                                if queue_tx.send(message).await.is_err() {
                                    return;
                                }
                            }
                            Err(err) => {
                                error!(target: "gossip", topic = %name, %err, "failed to unmarshal topic message");
                            }
                        }
                    }
                }
            }
        });
    }

    /// Stops delivery and drains the workers, waiting at most thirty
    /// seconds.
    pub async fn close(mut self) {
        let _ = self.shutdown.send(true);

        let drain = async {
            while self.workers.join_next().await.is_some() {}
        };
        if timeout(UNSUBSCRIBE_TIMEOUT, drain).await.is_err() {
            error!(target: "gossip", topic = %self.name, "timed out draining topic workers");
            self.workers.abort_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::TxnMessage;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Loopback pubsub: published messages are delivered to local
    /// subscribers of the same topic.
    #[derive(Default)]
    struct LoopbackPubsub {
        topics: Mutex<HashMap<String, Vec<mpsc::Sender<Vec<u8>>>>>,
    }

    impl PubsubDriver for LoopbackPubsub {
        fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), GossipError> {
            let subscribers = self.topics.lock().get(topic).cloned().unwrap_or_default();
            for subscriber in subscribers {
                let _ = subscriber.try_send(data.clone());
            }
            Ok(())
        }

        fn subscribe(&self, topic: &str) -> mpsc::Receiver<Vec<u8>> {
            let (tx, rx) = mpsc::channel(1024);
            self.topics.lock().entry(topic.to_string()).or_default().push(tx);
            rx
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn messages_fan_out_to_workers() {
        let driver = Arc::new(LoopbackPubsub::default());
        let mut topic: Topic<TxnMessage> = Topic::new("txpool/0.1", Arc::clone(&driver) as _);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        topic.subscribe(move |message| {
            sink.lock().push(message.raw);
        });

        for i in 0u8..16 {
            topic.publish(&TxnMessage { raw: vec![i] }).unwrap();
        }

        // wait for the pool to drain the queue
        for _ in 0..100 {
            if seen.lock().len() == 16 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let mut seen: Vec<u8> = seen.lock().iter().map(|raw| raw[0]).collect();
        seen.sort();
        assert_eq!(seen, (0u8..16).collect::<Vec<_>>());

        topic.close().await;
    }

    #[tokio::test]
    async fn malformed_messages_are_skipped() {
        let driver = Arc::new(LoopbackPubsub::default());
        let mut topic: Topic<TxnMessage> = Topic::new("txpool/0.1", Arc::clone(&driver) as _);

        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        topic.subscribe(move |_| {
            *sink.lock() += 1;
        });

        // a protobuf field tag of 0 is invalid
        driver.publish("txpool/0.1", vec![0x00, 0x01, 0x02]).unwrap();
        topic.publish(&TxnMessage { raw: vec![7] }).unwrap();

        for _ in 0..100 {
            if *seen.lock() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*seen.lock(), 1);

        topic.close().await;
    }
}

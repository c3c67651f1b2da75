//! # World Events
//!
//! Outbound notifications for rendering, physics and other collaborators.
//! Every subscriber gets its own unbounded channel; dropping the receiver
//! unsubscribes. Events are published after store locks are released, so a
//! subscriber may call back into the store from its receive loop.

use crossbeam_channel::{unbounded, Receiver, Sender};
use geode_procedural::{BlockId, BlockPos, ChunkCoord};
use parking_lot::Mutex;

/// Where a newly resident chunk came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadOrigin {
    /// Produced by the terrain generator.
    Generated,
    /// Decoded from the persistence backend.
    Persisted,
}

/// A change in world state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorldEvent {
    /// A chunk became resident.
    ChunkLoaded {
        /// Chunk coordinate.
        coord: ChunkCoord,
        /// Generated or read back.
        origin: LoadOrigin,
    },
    /// A block was replaced.
    BlockChanged {
        /// World position.
        pos: BlockPos,
        /// Previous block.
        old: BlockId,
        /// New block.
        new: BlockId,
    },
    /// A chunk was written to the backend.
    ChunkSaved(ChunkCoord),
    /// A chunk left the cache.
    ChunkUnloaded(ChunkCoord),
    /// Saving failed after every retry; the chunk is still resident and dirty.
    SaveFailed {
        /// Chunk coordinate.
        coord: ChunkCoord,
        /// Last backend error.
        reason: String,
    },
}

/// Fan-out of [`WorldEvent`]s to any number of subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<WorldEvent>>>,
}

impl EventBus {
    /// Bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber.
    pub fn subscribe(&self) -> Receiver<WorldEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Sends `event` to every live subscriber, pruning closed ones.
    pub fn publish(&self, event: &WorldEvent) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Live subscriber count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

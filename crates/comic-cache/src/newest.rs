//! NewestComicActor for the most recently observed newest comic.
//!
//! The actor is the only owner of the value. Everything else reads or
//! replaces it by sending messages, so no lock guards it and no caller can
//! observe a torn update.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::{CacheError, ComicRecord};

/// Channel buffer size for the actor.
const NEWEST_CHANNEL_SIZE: usize = 32;

/// Operations that can be sent to the NewestComicActor.
pub enum NewestOp {
    /// Read the current value. `None` means no newest comic is known yet.
    Get {
        response: oneshot::Sender<Option<ComicRecord>>,
    },
    /// Offer a newer comic. Ignored if its number is lower than the held one.
    /// Responds with the value held afterwards.
    Replace {
        comic: ComicRecord,
        response: oneshot::Sender<Option<ComicRecord>>,
    },
    /// Forget the current value so the next read refetches.
    Reset { response: oneshot::Sender<()> },
    /// Shutdown the actor.
    Shutdown,
}

/// The NewestComicActor owns the newest-comic state.
pub struct NewestComicActor {
    current: Option<ComicRecord>,
    op_rx: mpsc::Receiver<NewestOp>,
}

impl NewestComicActor {
    /// Create a new actor with no known newest comic.
    ///
    /// Returns the actor and a handle for sending operations.
    pub fn new() -> (Self, NewestComicHandle) {
        let (op_tx, op_rx) = mpsc::channel(NEWEST_CHANNEL_SIZE);
        let actor = Self {
            current: None,
            op_rx,
        };
        let handle = NewestComicHandle { op_tx };
        (actor, handle)
    }

    /// Run the actor event loop.
    ///
    /// This processes operations until a Shutdown message is received
    /// or all senders are dropped.
    pub async fn run(mut self) {
        debug!("newest comic actor started");

        while let Some(op) = self.op_rx.recv().await {
            match op {
                NewestOp::Get { response } => {
                    let _ = response.send(self.current.clone());
                }
                NewestOp::Replace { comic, response } => {
                    self.replace(comic);
                    let _ = response.send(self.current.clone());
                }
                NewestOp::Reset { response } => {
                    trace!("newest comic reset");
                    self.current = None;
                    let _ = response.send(());
                }
                NewestOp::Shutdown => {
                    debug!("newest comic actor received shutdown");
                    break;
                }
            }
        }

        debug!("newest comic actor stopped");
    }

    fn replace(&mut self, comic: ComicRecord) {
        match &self.current {
            Some(held) if comic.number < held.number => {
                trace!(
                    offered = comic.number,
                    held = held.number,
                    "ignoring older newest comic"
                );
            }
            _ => {
                trace!(number = comic.number, "newest comic updated");
                self.current = Some(comic);
            }
        }
    }

    /// Spawn the actor as a background task.
    ///
    /// Returns a handle for sending operations.
    pub fn spawn() -> NewestComicHandle {
        let (actor, handle) = Self::new();
        tokio::spawn(actor.run());
        handle
    }
}

/// Handle for sending operations to the NewestComicActor.
///
/// This is cheaply cloneable and can be shared across tasks.
#[derive(Clone)]
pub struct NewestComicHandle {
    op_tx: mpsc::Sender<NewestOp>,
}

impl NewestComicHandle {
    /// Read the current newest comic.
    pub async fn get(&self) -> Result<Option<ComicRecord>, CacheError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(NewestOp::Get {
            response: response_tx,
        })
        .await?;
        response_rx.await.map_err(|_| CacheError::Closed)
    }

    /// Offer `comic` as the newest and return the value held afterwards.
    pub async fn replace(&self, comic: ComicRecord) -> Result<Option<ComicRecord>, CacheError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(NewestOp::Replace {
            comic,
            response: response_tx,
        })
        .await?;
        response_rx.await.map_err(|_| CacheError::Closed)
    }

    /// Forget the current newest comic.
    pub async fn reset(&self) -> Result<(), CacheError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(NewestOp::Reset {
            response: response_tx,
        })
        .await?;
        response_rx.await.map_err(|_| CacheError::Closed)
    }

    /// Shutdown the actor.
    ///
    /// After calling this, no more operations can be sent.
    pub async fn shutdown(&self) {
        if let Err(e) = self.op_tx.send(NewestOp::Shutdown).await {
            warn!(error = %e, "failed to send shutdown to newest comic actor");
        }
    }

    /// Check if the actor channel is closed.
    pub fn is_closed(&self) -> bool {
        self.op_tx.is_closed()
    }

    async fn send(&self, op: NewestOp) -> Result<(), CacheError> {
        self.op_tx.send(op).await.map_err(|_| CacheError::Closed)
    }
}

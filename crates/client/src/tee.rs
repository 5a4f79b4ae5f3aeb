//! Stream duplicator.
//!
//! A single pump task reads the source and pushes every item into one
//! queue per branch. Each branch buffers at most `max_buffered_bytes`.
//! When no branch has room the pump stops reading upstream until one of
//! them is read. A branch that is still full once the other has drained
//! everything receives `BodyError::Overflow` and is detached, so an
//! abandoned branch never stalls a live one.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::{Notify, mpsc};

use crate::fetch::{BodyError, BodyStream};

type Item = Result<Bytes, BodyError>;

/// One readable side of a teed stream.
#[derive(Debug)]
pub struct Branch {
    rx: mpsc::UnboundedReceiver<Item>,
    buffered: Arc<AtomicUsize>,
    read: Arc<Notify>,
}

impl Branch {
    /// Bytes queued for this branch and not yet read.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }
}

impl Stream for Branch {
    type Item = Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.rx.poll_recv(cx);
        if let Poll::Ready(Some(Ok(bytes))) = &polled {
            this.buffered.fetch_sub(bytes.len(), Ordering::AcqRel);
            this.read.notify_one();
        }
        polled
    }
}

impl Drop for Branch {
    fn drop(&mut self) {
        // Close first so the woken pump sees this branch as gone.
        self.rx.close();
        self.read.notify_one();
    }
}

struct Feed {
    tx: mpsc::UnboundedSender<Item>,
    buffered: Arc<AtomicUsize>,
}

impl Feed {
    fn queued(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    /// An empty branch always takes the next chunk, even one larger than `cap`.
    fn fits(&self, len: usize, cap: usize) -> bool {
        let queued = self.queued();
        queued == 0 || queued + len <= cap
    }

    /// Returns false once the branch is gone.
    fn send(&self, item: Item) -> bool {
        if let Ok(bytes) = &item {
            self.buffered.fetch_add(bytes.len(), Ordering::AcqRel);
        }
        self.tx.send(item).is_ok()
    }

    fn overflow(&self, cap: usize) {
        let _ = self.tx.send(Err(BodyError::Overflow { cap }));
    }
}

fn channel(read: &Arc<Notify>) -> (Feed, Branch) {
    let (tx, rx) = mpsc::unbounded_channel();
    let buffered = Arc::new(AtomicUsize::new(0));
    (Feed { tx, buffered: buffered.clone() }, Branch { rx, buffered, read: read.clone() })
}

/// Split `source` into two branches carrying identical bytes.
///
/// Must be called inside a tokio runtime; the pump runs as a spawned task
/// and stops once the source ends or both branches are gone.
pub fn tee(source: BodyStream, max_buffered_bytes: usize) -> (Branch, Branch) {
    let read = Arc::new(Notify::new());
    let (left_feed, left) = channel(&read);
    let (right_feed, right) = channel(&read);

    tokio::spawn(pump(source, [Some(left_feed), Some(right_feed)], read, max_buffered_bytes));

    (left, right)
}

fn detach_closed(feeds: &mut [Option<Feed>; 2]) -> bool {
    for slot in feeds.iter_mut() {
        if slot.as_ref().is_some_and(|feed| feed.tx.is_closed()) {
            *slot = None;
        }
    }
    feeds.iter().any(Option::is_some)
}

async fn pump(mut source: BodyStream, mut feeds: [Option<Feed>; 2], read: Arc<Notify>, cap: usize) {
    loop {
        if !detach_closed(&mut feeds) {
            tracing::debug!("all tee branches detached; stopping upstream read");
            return;
        }
        let Some(item) = source.next().await else { return };

        let len = match &item {
            Ok(bytes) => bytes.len(),
            Err(_) => {
                for feed in feeds.iter().flatten() {
                    feed.send(item.clone());
                }
                return;
            }
        };

        // Hold the chunk until every branch has room, or until one branch
        // has drained completely while another is still full.
        loop {
            if !detach_closed(&mut feeds) {
                tracing::debug!("all tee branches detached; stopping upstream read");
                return;
            }
            let live = || feeds.iter().flatten();
            if live().all(|feed| feed.fits(len, cap)) {
                break;
            }
            if live().any(|feed| feed.queued() == 0) {
                for slot in feeds.iter_mut() {
                    if slot.as_ref().is_some_and(|feed| !feed.fits(len, cap))
                        && let Some(feed) = slot.take()
                    {
                        tracing::debug!(cap, queued = feed.queued(), "tee branch fell behind; detaching");
                        feed.overflow(cap);
                    }
                }
                break;
            }
            read.notified().await;
        }

        for slot in feeds.iter_mut() {
            if slot.as_ref().is_some_and(|feed| !feed.send(item.clone())) {
                *slot = None;
            }
        }
    }
}

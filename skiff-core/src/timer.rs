//! Deadline timers served by a dedicated thread.
//!
//! compio 0.10 keeps its timers in a max-heap and never drops cancelled
//! entries, so one long-lived timer (a 10s handshake limit, say) holds every
//! shorter timer back until it expires. Every deadline in this crate goes
//! through [`sleep_until`] instead: a background thread keeps a min-heap of
//! deadlines and wakes the waiting task through its `Waker`, which works from
//! any thread.

use futures::future::{select, Either};
use futures::task::AtomicWaker;
use once_cell::sync::Lazy;
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::{pin, Pin};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Cancelled entries are swept once the heap grows past this.
const SWEEP_THRESHOLD: usize = 1024;

/// Returned by [`timeout`] when the deadline passed first.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("deadline has elapsed")]
pub struct Elapsed;

#[derive(Debug, Default)]
struct Shared {
    fired: AtomicBool,
    cancelled: AtomicBool,
    waker: AtomicWaker,
}

impl Shared {
    fn fire(&self) {
        self.fired.store(true, Ordering::Release);
        self.waker.wake();
    }
}

struct Entry {
    deadline: Instant,
    shared: Arc<Shared>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.deadline.cmp(&other.deadline)
    }
}

static TIMER: Lazy<Mutex<Sender<Entry>>> = Lazy::new(|| {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("skiff-timer".to_string())
        .spawn(move || run_timer(&rx))
        .map_err(|e| tracing::error!("[TIMER] Failed to start timer thread: {}", e))
        .ok();
    Mutex::new(tx)
});

fn run_timer(rx: &mpsc::Receiver<Entry>) {
    let mut heap: BinaryHeap<Reverse<Entry>> = BinaryHeap::new();
    loop {
        let next = match heap.peek() {
            None => match rx.recv() {
                Ok(entry) => entry,
                Err(_) => return,
            },
            Some(Reverse(top)) => {
                let now = Instant::now();
                if top.deadline <= now {
                    if let Some(Reverse(entry)) = heap.pop() {
                        if !entry.shared.cancelled.load(Ordering::Acquire) {
                            entry.shared.fire();
                        }
                    }
                    continue;
                }
                match rx.recv_timeout(top.deadline - now) {
                    Ok(entry) => entry,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
        };

        heap.push(Reverse(next));
        if heap.len() > SWEEP_THRESHOLD {
            heap.retain(|Reverse(e)| !e.shared.cancelled.load(Ordering::Acquire));
        }
    }
}

/// Future that completes once `deadline` has passed.
///
/// The deadline is registered with the timer thread on first poll; dropping
/// the future cancels it.
#[derive(Debug)]
pub struct Sleep {
    deadline: Instant,
    shared: Option<Arc<Shared>>,
}

/// Complete at `deadline`.
pub fn sleep_until(deadline: Instant) -> Sleep {
    Sleep {
        deadline,
        shared: None,
    }
}

/// Complete after `duration`.
pub fn sleep(duration: Duration) -> Sleep {
    sleep_until(Instant::now() + duration)
}

impl Sleep {
    fn register(&mut self) -> Arc<Shared> {
        let shared = Arc::new(Shared::default());
        let entry = Entry {
            deadline: self.deadline,
            shared: shared.clone(),
        };
        let sent = TIMER
            .lock()
            .map(|tx| tx.send(entry).is_ok())
            .unwrap_or(false);
        if !sent {
            // No timer thread: fire now rather than hang forever.
            shared.fire();
        }
        self.shared = Some(shared.clone());
        shared
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(());
        }

        let shared = if let Some(shared) = self.shared.clone() {
            shared
        } else {
            self.register()
        };

        shared.waker.register(cx.waker());
        // Check after registering so a concurrent fire is not lost.
        if shared.fired.load(Ordering::Acquire) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(shared) = &self.shared {
            shared.cancelled.store(true, Ordering::Release);
        }
    }
}

/// Run `fut` until `deadline`.
///
/// # Errors
///
/// [`Elapsed`] if the deadline passed before `fut` completed. `fut` is
/// dropped in that case.
pub async fn timeout_at<F: Future>(deadline: Instant, fut: F) -> Result<F::Output, Elapsed> {
    let fut = pin!(fut);
    let timer = pin!(sleep_until(deadline));
    match select(fut, timer).await {
        Either::Left((output, _)) => Ok(output),
        Either::Right(((), _)) => Err(Elapsed),
    }
}

/// Run `fut` for at most `duration`.
///
/// # Errors
///
/// [`Elapsed`] if `duration` passed before `fut` completed.
pub async fn timeout<F: Future>(duration: Duration, fut: F) -> Result<F::Output, Elapsed> {
    timeout_at(Instant::now() + duration, fut).await
}

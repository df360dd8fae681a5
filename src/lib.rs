//! A bounded, lock-free, multi-producer multi-consumer FIFO queue for passing many small messages
//! between threads with low latency. It is meant as a faster stand-in for a blocking channel on
//! machines with enough cores to let producers and consumers run in parallel.
//!
//! Producers and consumers take tickets from atomic counters. Writes become visible to readers
//! strictly in ticket order, so the queue is globally FIFO across all producers, and each item is
//! read exactly once. The counters live on separate cache lines to avoid false sharing, and items
//! are stored inline in a power-of-two ring.
//!
//! Waiting never parks a thread: a `put` on a full queue or a `read` on an empty one spins (by
//! default yielding its time slice each iteration, see [`WaitStrategy`]) until a peer makes
//! progress. That trades CPU for latency. There is no timeout; a caller whose peer never arrives
//! spins forever.
//!
//! ```
//! use std::thread;
//!
//! let (tx, rx) = fastchan::mpmc::<u64>(1024).unwrap();
//!
//! let producer = thread::spawn(move || {
//!     for i in 0..10_000 {
//!         tx.put(i);
//!     }
//! });
//!
//! for i in 0..10_000 {
//!     assert_eq!(rx.read(), i);
//! }
//! producer.join().unwrap();
//! ```
//!
//! Build with `--features tracing` to get `tracing` events for queue setup, reset and waits.

pub use queue::{
    builder,
    mpmc,
    Builder,
    Error,
    FastChan,
    Receiver,
    Sender,
};
pub use trace::init_tracing;
pub use wait::WaitStrategy;

mod queue;
mod loom_exports;
mod trace;
mod wait;

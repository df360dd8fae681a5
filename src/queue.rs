use core::{
    cell::UnsafeCell,
    fmt,
    mem::MaybeUninit,
    sync::atomic::Ordering,
};

use crossbeam_utils::CachePadded;

use crate::loom_exports::sync::{
    atomic::AtomicU64,
    Arc,
};
use crate::trace::{debug, trace};
use crate::wait::{WaitStrategy, Waiter};

/// Why a queue could not be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A capacity of 0 was requested.
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,
    /// The next power of two above `requested` does not fit in a `usize`.
    #[error("queue capacity {requested} cannot be rounded up to a power of two")]
    CapacityOverflow { requested: usize },
}

type Slot<T> = UnsafeCell<MaybeUninit<T>>;

/// Read-only after construction, so it shares one cache line between every thread.
struct Ring<T> {
    capacity: u64,
    mask: u64,
    slots: Box<[Slot<T>]>,
    wait: WaitStrategy,
}

/// A bounded, lock-free, multi-producer multi-consumer FIFO queue.
///
/// Every `put` and `read` takes a ticket from an atomic counter. Writes are published, and
/// slots are handed back to writers, strictly in ticket order through two commit counters, so
/// items come out in exactly the order their `put` calls took tickets, across all producers.
///
/// Neither side ever parks: a `put` on a full queue and a `read` on an empty one spin according
/// to the queue's [`WaitStrategy`] until a peer makes progress. There is no timeout, so a caller
/// whose peer never shows up spins forever.
///
/// Each direction supports `u64::MAX` operations over the queue's lifetime (or between two
/// [`FastChan::reset`] calls). Debug builds panic past that point.
pub struct FastChan<T> {
    ring: CachePadded<Ring<T>>,

    // Write tickets handed out.
    next_free: CachePadded<AtomicU64>,
    // Writes visible to readers.
    last_committed: CachePadded<AtomicU64>,
    // Read tickets handed out.
    reader: CachePadded<AtomicU64>,
    // Reads that have moved their item out of the slot.
    read_committed: CachePadded<AtomicU64>,
}

/// Configuration for a [`FastChan`].
#[derive(Clone, Copy, Debug)]
pub struct Builder {
    capacity: usize,
    wait: WaitStrategy,
}

impl Builder {
    /// Start a configuration for a queue holding at least `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            wait: WaitStrategy::default(),
        }
    }

    /// Set how `put` and `read` wait. Defaults to [`WaitStrategy::Yield`].
    pub fn wait_strategy(mut self, wait: WaitStrategy) -> Self {
        self.wait = wait;
        self
    }

    /// Allocate the queue.
    pub fn build<T>(self) -> Result<FastChan<T>, Error> {
        let capacity = round_capacity(self.capacity)?;

        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Box<[_]>>();

        debug!(
            requested = self.capacity,
            capacity,
            wait = ?self.wait,
            "allocated queue"
        );

        Ok(FastChan {
            ring: CachePadded::new(Ring {
                capacity: capacity as u64,
                mask: capacity as u64 - 1,
                slots,
                wait: self.wait,
            }),
            next_free: CachePadded::new(AtomicU64::new(0)),
            last_committed: CachePadded::new(AtomicU64::new(0)),
            reader: CachePadded::new(AtomicU64::new(0)),
            read_committed: CachePadded::new(AtomicU64::new(0)),
        })
    }

    /// Allocate the queue behind a pair of cloneable handles.
    pub fn build_mpmc<T>(self) -> Result<(Sender<T>, Receiver<T>), Error> {
        let shared = Arc::new(self.build()?);

        let sender = Sender { shared: shared.clone() };
        let receiver = Receiver { shared };

        Ok((sender, receiver))
    }
}

/// Start configuring a queue holding at least `capacity` items.
///
/// ```
/// use fastchan::WaitStrategy;
///
/// let q = fastchan::builder(100)
///     .wait_strategy(WaitStrategy::Backoff)
///     .build::<u64>()
///     .unwrap();
/// assert_eq!(q.capacity(), 128);
/// ```
pub fn builder(capacity: usize) -> Builder {
    Builder::new(capacity)
}

/// Round a requested capacity up to the next power of two.
fn round_capacity(requested: usize) -> Result<usize, Error> {
    if requested == 0 {
        return Err(Error::ZeroCapacity);
    }
    requested
        .checked_next_power_of_two()
        .ok_or(Error::CapacityOverflow { requested })
}

impl<T> FastChan<T> {
    /// Create a queue holding at least `capacity` items, using [`WaitStrategy::Yield`].
    ///
    /// The capacity is rounded up to the next power of two.
    ///
    /// ```
    /// let q = fastchan::FastChan::<u32>::new(1000).unwrap();
    /// assert_eq!(q.capacity(), 1024);
    /// ```
    pub fn new(capacity: usize) -> Result<Self, Error> {
        Builder::new(capacity).build()
    }

    /// Append `value` to the queue, spinning while the queue is full.
    #[inline]
    pub fn put(&self, value: T) {
        let ticket = self.next_free.fetch_add(1, Ordering::AcqRel) + 1;
        let waiter = Waiter::new(self.ring.wait);

        // The slot belongs to ticket `ticket - capacity` until that reader is done with it.
        // `read_committed < ticket` because this ticket is not committed yet.
        let slot_free = || {
            ticket - self.read_committed.load(Ordering::Acquire) <= self.ring.capacity
        };
        if !slot_free() {
            trace!(ticket, "queue full, waiting for a reader");
            waiter.until(slot_free);
        }

        // SAFETY: the ticket gives this thread sole ownership of the slot, and its previous
        // item has been moved out by its reader.
        unsafe {
            (*self.slot(ticket).get()).write(value);
        }

        // Publish strictly after the previous ticket. Pairs with the Acquire load in `read`.
        waiter.until(|| {
            self.last_committed
                .compare_exchange(ticket - 1, ticket, Ordering::Release, Ordering::Relaxed)
                .is_ok()
        });
    }

    /// Remove the oldest item from the queue, spinning while the queue is empty.
    #[inline]
    pub fn read(&self) -> T {
        let ticket = self.reader.fetch_add(1, Ordering::AcqRel) + 1;
        let waiter = Waiter::new(self.ring.wait);

        let committed = || ticket <= self.last_committed.load(Ordering::Acquire);
        if !committed() {
            trace!(ticket, "queue empty, waiting for a writer");
            waiter.until(committed);
        }

        // SAFETY: the ticket is committed, so the slot is initialized, and no other reader holds
        // this ticket. Writers leave the slot alone until `read_committed` passes it.
        let value = unsafe { (*self.slot(ticket).get()).assume_init_read() };

        // Hand the slot back strictly after the previous reader. Pairs with the Acquire load in
        // `put`.
        waiter.until(|| {
            self.read_committed
                .compare_exchange(ticket - 1, ticket, Ordering::Release, Ordering::Relaxed)
                .is_ok()
        });

        value
    }

    /// Number of committed items not yet claimed by a reader.
    ///
    /// The two counters are loaded separately, so under concurrency this is a snapshot that may
    /// already be stale. Good for monitoring, not for deciding whether `read` will wait.
    pub fn len(&self) -> usize {
        let reader = self.reader.load(Ordering::Acquire);
        let committed = self.last_committed.load(Ordering::Acquire);
        committed.saturating_sub(reader) as usize
    }

    /// Whether every committed item has been claimed by a reader. A snapshot, like `len`.
    pub fn is_empty(&self) -> bool {
        self.reader.load(Ordering::Acquire) >= self.last_committed.load(Ordering::Acquire)
    }

    /// Whether a `put` right now would have to wait.
    ///
    /// Counts claimed writes, committed or not, so it can report full slightly before every
    /// claimed slot has been filled.
    pub fn is_full(&self) -> bool {
        let reader = self.reader.load(Ordering::Acquire);
        let next_free = self.next_free.load(Ordering::Acquire);
        next_free.saturating_sub(reader) >= self.ring.capacity
    }

    /// The rounded capacity.
    pub fn capacity(&self) -> usize {
        self.ring.slots.len()
    }

    /// How `put` and `read` wait on this queue.
    pub fn wait_strategy(&self) -> WaitStrategy {
        self.ring.wait
    }

    /// Drop every unread item and rewind all counters to zero.
    pub fn reset(&mut self) {
        let dropped = self.drop_unread();

        for counter in [
            &self.next_free,
            &self.last_committed,
            &self.reader,
            &self.read_committed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }

        if dropped > 0 {
            debug!(dropped, "reset queue with unread items");
        }
    }

    #[inline(always)]
    fn slot(&self, ticket: u64) -> &Slot<T> {
        &self.ring.slots[(ticket & self.ring.mask) as usize]
    }

    /// Drop the items between the read and write commit points. Returns how many there were.
    ///
    /// The items are marked read before any of them is dropped, so a panicking `Drop` leaks the
    /// rest instead of leaving them to be dropped again later.
    fn drop_unread(&mut self) -> u64 {
        // `&mut self` means no operation is in flight, so claims equal commits.
        let first = self.reader.load(Ordering::Acquire);
        let last = self.last_committed.load(Ordering::Acquire);

        self.reader.store(last, Ordering::Relaxed);
        self.read_committed.store(last, Ordering::Relaxed);

        if core::mem::needs_drop::<T>() {
            for ticket in first + 1..=last {
                // SAFETY: tickets in `first + 1..=last` are committed and were never read.
                unsafe {
                    (*self.slot(ticket).get()).assume_init_drop();
                }
            }
        }

        last.saturating_sub(first)
    }
}

impl<T> Drop for FastChan<T> {
    fn drop(&mut self) {
        let dropped = self.drop_unread();
        if dropped > 0 {
            trace!(dropped, "dropped queue with unread items");
        }
    }
}

// SAFETY: slots are only touched by the thread holding their ticket, with the commit counters
// ordering the handoffs, so sharing the queue only requires that items can move between threads.
unsafe impl<T: Send> Sync for FastChan<T> { }

impl<T> fmt::Debug for FastChan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FastChan")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("wait", &self.ring.wait)
            .finish()
    }
}

/// Create a shared queue with [`WaitStrategy::Yield`] and return a sending and a receiving
/// handle to it. Both handles can be cloned freely.
pub fn mpmc<T>(capacity: usize) -> Result<(Sender<T>, Receiver<T>), Error> {
    Builder::new(capacity).build_mpmc()
}

pub struct Sender<T> {
    shared: Arc<FastChan<T>>,
}

pub struct Receiver<T> {
    shared: Arc<FastChan<T>>,
}

impl<T> Sender<T> {
    #[inline(always)]
    pub fn put(&self, value: T) {
        self.shared.put(value)
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.shared.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

impl<T> Receiver<T> {
    #[inline(always)]
    pub fn read(&self) -> T {
        self.shared.read()
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.shared.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Reset the queue if this is the last handle to it. Returns `false`, leaving the queue
    /// untouched, while any other sender or receiver is alive.
    pub fn try_reset(&mut self) -> bool {
        match Arc::get_mut(&mut self.shared) {
            Some(queue) => {
                queue.reset();
                true
            }
            None => false,
        }
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender").field("queue", &*self.shared).finish()
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver").field("queue", &*self.shared).finish()
    }
}

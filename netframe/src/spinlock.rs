//! Recursive reader-writer spinlock.
//!
//! Intended for very short critical sections on hot paths where parking a
//! thread costs more than spinning. The whole lock state lives in one 32-bit
//! atomic word so every transition is a single compare-and-swap:
//!
//! ```text
//! [unused: 1][writer thread id: 15][reader count: 16]
//! ```
//!
//! A non-zero writer field means that thread holds exclusive access; the
//! reader field counts shared holders. The writer may recursively re-enter
//! both the write and the read path. Spin policy: `MAX_SPIN` CAS attempts,
//! then yield the core and start over.
//!
//! Known risk, documented rather than fixed: there is no writer-priority
//! bit, so a continuous stream of readers can starve a waiting writer
//! indefinitely. Use a [`JobQueue`](crate::JobQueue) instead when that
//! matters.

use std::sync::atomic::{AtomicU32, Ordering};

const EMPTY: u32 = 0;
const WRITE_MASK: u32 = 0x7FFF_0000;
const READ_MASK: u32 = 0x0000_FFFF;
const MAX_SPIN: u32 = 5000;

/// Process-local thread id that fits the 15-bit writer field (1..=0x7FFF).
/// `std::thread::ThreadId` has no stable integer form, so ids come from a
/// thread-local counter. Ids wrap after 32766 threads; collisions would
/// allow a false recursive acquire, acceptable for this primitive's scope.
fn current_thread_id() -> u32 {
    static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(0);
    thread_local! {
        static THREAD_ID: u32 = {
            let raw = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
            (raw % 0x7FFF) + 1
        };
    }
    THREAD_ID.with(|id| *id)
}

/// Recursive reader-writer spinlock over a single atomic word.
pub struct RwSpinLock {
    flag: AtomicU32,
    /// Writer recursion depth. Only the thread owning the write lock ever
    /// mutates it, so relaxed ordering suffices.
    write_count: AtomicU32,
}

impl RwSpinLock {
    pub const fn new() -> Self {
        Self {
            flag: AtomicU32::new(EMPTY),
            write_count: AtomicU32::new(0),
        }
    }

    /// Acquires exclusive access. Reentrant: the owning thread may call this
    /// again and must balance every call with [`write_unlock`](Self::write_unlock).
    pub fn write_lock(&self) {
        let tid = current_thread_id();

        // Recursion: already the owner, bump the depth and go.
        let owner = (self.flag.load(Ordering::Relaxed) & WRITE_MASK) >> 16;
        if owner == tid {
            self.write_count.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let desired = (tid << 16) & WRITE_MASK;
        loop {
            for _ in 0..MAX_SPIN {
                // Only an entirely idle lock (no writer, no readers) may
                // transition to write-owned.
                if self
                    .flag
                    .compare_exchange_weak(EMPTY, desired, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    self.write_count.store(1, Ordering::Relaxed);
                    return;
                }
                std::hint::spin_loop();
            }
            std::thread::yield_now();
        }
    }

    /// Releases one level of write ownership; the lock opens once the depth
    /// returns to zero.
    pub fn write_unlock(&self) {
        if self.write_count.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.flag.store(EMPTY, Ordering::Release);
        }
    }

    /// Acquires shared access. The thread holding the write lock may read
    /// recursively; everyone else waits for the writer field to clear.
    pub fn read_lock(&self) {
        let tid = current_thread_id();

        // A writer reading its own data: take a reader slot unconditionally.
        let owner = (self.flag.load(Ordering::Relaxed) & WRITE_MASK) >> 16;
        if owner == tid {
            self.flag.fetch_add(1, Ordering::Acquire);
            return;
        }

        loop {
            for _ in 0..MAX_SPIN {
                // Admit a reader only when no writer holds the word: the
                // expected value has a zero writer field by construction.
                let expected = self.flag.load(Ordering::Relaxed) & READ_MASK;
                if self
                    .flag
                    .compare_exchange_weak(
                        expected,
                        expected + 1,
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    return;
                }
                std::hint::spin_loop();
            }
            // The C# original omitted this yield and busy-spins a full core
            // under writer contention; the read path deliberately mirrors
            // the write path's spin-then-yield policy instead.
            std::thread::yield_now();
        }
    }

    /// Releases one reader slot.
    pub fn read_unlock(&self) {
        self.flag.fetch_sub(1, Ordering::Release);
    }

    /// RAII shared access.
    pub fn read(&self) -> ReadGuard<'_> {
        self.read_lock();
        ReadGuard { lock: self }
    }

    /// RAII exclusive access.
    pub fn write(&self) -> WriteGuard<'_> {
        self.write_lock();
        WriteGuard { lock: self }
    }
}

impl Default for RwSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the reader slot on drop.
pub struct ReadGuard<'a> {
    lock: &'a RwSpinLock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.read_unlock();
    }
}

/// Releases one level of write ownership on drop.
pub struct WriteGuard<'a> {
    lock: &'a RwSpinLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.write_unlock();
    }
}

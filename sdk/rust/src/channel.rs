//! The shared channel: one status word plus a fixed payload area.
//!
//! Word 0 is the status cell. `0` means the channel is empty and the worker
//! is waiting for the host; any `v > 0` means `v - 1` payload bytes are ready
//! in words `1..`. The host only ever publishes and notifies, the worker is
//! the only party that waits.

use crate::codec;
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

const STATUS: usize = 0;
const STATUS_EMPTY: u32 = 0;

/// Result of waiting on the status cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A chunk of this many bytes is ready.
    Ready(usize),
    /// The wait bound elapsed with the channel still empty.
    TimedOut,
}

/// Single-producer/single-consumer handoff of one chunk at a time.
///
/// [`SharedChannel`] is the real implementation; tests wrap it to observe
/// the order in which chunks are published and consumed.
pub trait ChunkChannel: Send + Sync {
    /// Marks the channel empty.
    fn reset(&self);

    /// Blocks until the status cell is non-empty, or until `timeout` elapses.
    /// `None` waits forever.
    fn wait(&self, timeout: Option<Duration>) -> WaitOutcome;

    /// Reads the packed words that carry a ready chunk of `len` bytes.
    fn read_words(&self, len: usize) -> Vec<u32>;

    /// Stores `words` as the payload, then sets the status cell to `len + 1`
    /// and wakes the waiter.
    fn publish(&self, words: &[u32], len: usize) -> Result<()>;

    /// Largest chunk, in bytes, the payload area can carry.
    fn capacity(&self) -> usize;
}

/// Fixed-size array of atomic words shared by the host and one worker.
pub struct SharedChannel {
    words: Box<[AtomicU32]>,
    max_chunk: usize,
    lock: Mutex<()>,
    wakeup: Condvar,
}

impl SharedChannel {
    /// Allocates a channel able to carry chunks of up to `max_chunk` bytes.
    pub fn new(max_chunk: usize) -> Self {
        let words = (0..1 + codec::words_for(max_chunk))
            .map(|_| AtomicU32::new(STATUS_EMPTY))
            .collect();
        Self {
            words,
            max_chunk,
            lock: Mutex::new(()),
            wakeup: Condvar::new(),
        }
    }

    /// Current value of the status cell.
    pub fn status(&self) -> u32 {
        self.words[STATUS].load(Ordering::Acquire)
    }

    /// Total number of words, status cell included.
    #[cfg(test)]
    fn word_count(&self) -> usize {
        self.words.len()
    }

    fn ready_len(&self) -> Option<usize> {
        match self.status() {
            STATUS_EMPTY => None,
            v => Some((v - 1) as usize),
        }
    }
}

impl std::fmt::Debug for SharedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedChannel")
            .field("words", &self.words.len())
            .field("max_chunk", &self.max_chunk)
            .field("status", &self.status())
            .finish()
    }
}

impl ChunkChannel for SharedChannel {
    fn reset(&self) {
        self.words[STATUS].store(STATUS_EMPTY, Ordering::Release);
    }

    fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.lock.lock();
        loop {
            if let Some(len) = self.ready_len() {
                return WaitOutcome::Ready(len);
            }
            match deadline {
                None => self.wakeup.wait(&mut guard),
                Some(deadline) => {
                    if self.wakeup.wait_until(&mut guard, deadline).timed_out() {
                        return match self.ready_len() {
                            Some(len) => WaitOutcome::Ready(len),
                            None => WaitOutcome::TimedOut,
                        };
                    }
                }
            }
        }
    }

    fn read_words(&self, len: usize) -> Vec<u32> {
        let count = codec::words_for(len.min(self.max_chunk));
        self.words[1..1 + count]
            .iter()
            .map(|word| word.load(Ordering::Relaxed))
            .collect()
    }

    fn publish(&self, words: &[u32], len: usize) -> Result<()> {
        if len > self.max_chunk || words.len() < codec::words_for(len) {
            return Err(Error::ChunkTooLarge {
                len,
                capacity: self.max_chunk,
            });
        }
        for (slot, word) in self.words[1..].iter().zip(words) {
            slot.store(*word, Ordering::Relaxed);
        }
        // The status store happens under the lock so a waiter cannot miss the
        // notify between checking the cell and going to sleep.
        let _guard = self.lock.lock();
        self.words[STATUS].store(len as u32 + 1, Ordering::Release);
        self.wakeup.notify_all();
        trace!(len, "chunk published");
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.max_chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_default_release_size_needs_2049_words() {
        let channel = SharedChannel::new(8192);
        assert_eq!(channel.word_count(), 2049);
        assert_eq!(channel.capacity(), 8192);
        assert_eq!(channel.status(), 0);
    }

    #[test]
    fn test_publish_sets_status_to_len_plus_one() {
        let channel = SharedChannel::new(16);
        let (words, n) = codec::encode(b"hello", 0, 16);
        channel.publish(&words, n).unwrap();
        assert_eq!(channel.status(), 6);
        assert_eq!(channel.wait(None), WaitOutcome::Ready(5));
        assert_eq!(codec::decode(&channel.read_words(5), 5), b"hello");
    }

    #[test]
    fn test_empty_chunk_is_status_one() {
        let channel = SharedChannel::new(16);
        channel.publish(&[], 0).unwrap();
        assert_eq!(channel.status(), 1);
        assert_eq!(channel.wait(Some(Duration::ZERO)), WaitOutcome::Ready(0));
    }

    #[test]
    fn test_publish_rejects_oversized_chunk() {
        let channel = SharedChannel::new(8);
        let (words, n) = codec::encode(&[7u8; 9], 0, 9);
        let err = channel.publish(&words, n).unwrap_err();
        assert!(matches!(err, Error::ChunkTooLarge { len: 9, capacity: 8 }));
        assert_eq!(channel.status(), 0);
    }

    #[test]
    fn test_reset_empties_channel() {
        let channel = SharedChannel::new(8);
        channel.publish(&[1], 1).unwrap();
        channel.reset();
        assert_eq!(channel.status(), 0);
        assert_eq!(
            channel.wait(Some(Duration::from_millis(10))),
            WaitOutcome::TimedOut
        );
    }

    #[test]
    fn test_waiter_is_woken_by_publish_from_other_thread() {
        let channel = Arc::new(SharedChannel::new(64));
        let producer = Arc::clone(&channel);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let (words, n) = codec::encode("ünï".as_bytes(), 0, 64);
            producer.publish(&words, n).unwrap();
        });

        let len = match channel.wait(None) {
            WaitOutcome::Ready(len) => len,
            WaitOutcome::TimedOut => panic!("untimed wait cannot time out"),
        };
        let bytes = codec::decode(&channel.read_words(len), len);
        assert_eq!(String::from_utf8(bytes).unwrap(), "ünï");
        handle.join().unwrap();
    }

    #[test]
    fn test_timed_wait_returns_once_published() {
        let channel = Arc::new(SharedChannel::new(8));
        let producer = Arc::clone(&channel);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.publish(&[0x41], 1).unwrap();
        });
        assert_eq!(
            channel.wait(Some(Duration::from_secs(5))),
            WaitOutcome::Ready(1)
        );
        handle.join().unwrap();
    }
}

//! Receive staging for backends whose input arrives on a channel.

use crate::{CommsError, CommsResult, Timeout};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::collections::VecDeque;
use std::time::Instant;

/// Buffers chunks from a reader thread or task until a read can be satisfied
/// in full.
///
/// A read either takes exactly `dest.len()` bytes or takes none. An empty
/// chunk ([`RxQueue::RESET`]) discards every byte received before it, which
/// lets a backend drop the unread input of a peer that went away.
#[derive(Debug)]
pub struct RxQueue {
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

impl RxQueue {
    /// Chunk that discards everything queued ahead of it.
    pub const RESET: Vec<u8> = Vec::new();

    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        RxQueue {
            rx,
            pending: VecDeque::new(),
        }
    }

    /// Bytes already received but not yet read.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Fill `dest`, waiting for more input no longer than `timeout`.
    pub fn read_exact(&mut self, dest: &mut [u8], timeout: Timeout) -> CommsResult<()> {
        let deadline = timeout.deadline();
        let mut disconnected = self.drain();

        loop {
            let count = dest.len();
            if self.pending.len() >= count {
                for (slot, byte) in dest.iter_mut().zip(self.pending.drain(..count)) {
                    *slot = byte;
                }
                return Ok(());
            }
            if disconnected {
                return Err(CommsError::Disconnected);
            }

            let chunk = match deadline {
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(CommsError::Timeout);
                    }
                    self.rx.recv_timeout(deadline - now)
                }
            };
            match chunk {
                Ok(chunk) => {
                    self.accept(chunk);
                    disconnected = self.drain();
                }
                Err(RecvTimeoutError::Timeout) => return Err(CommsError::Timeout),
                Err(RecvTimeoutError::Disconnected) => disconnected = true,
            }
        }
    }

    /// Move every chunk already on the channel into `pending`; true if the
    /// sender is gone.
    fn drain(&mut self) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => self.accept(chunk),
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
    }

    fn accept(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            self.pending.clear();
        } else {
            self.pending.extend(chunk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_exact_count_across_chunks() {
        let (tx, rx) = unbounded();
        let mut queue = RxQueue::new(rx);
        tx.send(b"fea".to_vec()).unwrap();
        tx.send(b"ture".to_vec()).unwrap();

        let mut buf = [0u8; 5];
        queue.read_exact(&mut buf, Timeout::NoWait).unwrap();
        assert_eq!(&buf, b"featu");
        assert_eq!(queue.pending(), 2);
    }

    #[test]
    fn test_short_read_consumes_nothing() {
        let (tx, rx) = unbounded();
        let mut queue = RxQueue::new(rx);
        tx.send(b"ab".to_vec()).unwrap();

        let mut buf = [0u8; 3];
        assert!(matches!(queue.read_exact(&mut buf, Timeout::NoWait), Err(CommsError::Timeout)));
        assert!(matches!(
            queue.read_exact(&mut buf, Timeout::from_millis(20)),
            Err(CommsError::Timeout)
        ));
        assert_eq!(queue.pending(), 2);

        tx.send(b"c".to_vec()).unwrap();
        queue.read_exact(&mut buf, Timeout::NoWait).unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn test_waits_for_late_input() {
        let (tx, rx) = unbounded();
        let mut queue = RxQueue::new(rx);
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.send(b"x".to_vec()).unwrap();
            tx
        });

        let mut buf = [0u8; 1];
        queue.read_exact(&mut buf, Timeout::Forever).unwrap();
        assert_eq!(buf[0], b'x');
        drop(sender.join().unwrap());
    }

    #[test]
    fn test_reset_discards_earlier_input() {
        let (tx, rx) = unbounded();
        let mut queue = RxQueue::new(rx);
        tx.send(b"feature st".to_vec()).unwrap();

        let mut buf = [0u8; 1];
        queue.read_exact(&mut buf, Timeout::NoWait).unwrap();
        assert_eq!(queue.pending(), 9);

        tx.send(RxQueue::RESET).unwrap();
        tx.send(b"?".to_vec()).unwrap();
        queue.read_exact(&mut buf, Timeout::NoWait).unwrap();
        assert_eq!(buf[0], b'?');
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_disconnect_after_buffered_bytes() {
        let (tx, rx) = unbounded();
        let mut queue = RxQueue::new(rx);
        tx.send(b"z".to_vec()).unwrap();
        drop(tx);

        let mut buf = [0u8; 1];
        queue.read_exact(&mut buf, Timeout::Forever).unwrap();
        assert!(matches!(queue.read_exact(&mut buf, Timeout::Forever), Err(CommsError::Disconnected)));
    }
}

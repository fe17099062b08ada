use heapless::Vec;

use super::transport::{Connection, TransportError};

const READ_CHUNK: usize = 64;

/// Fixed-capacity capture of one response
///
/// One slot of `N` is reserved for a NUL terminator so the captured bytes
/// can be handed to C-string style consumers; at most `N - 1` data bytes are
/// kept and anything past that is left unread.
#[derive(Debug, Clone)]
pub struct ResponseBuffer<const N: usize> {
    bytes: Vec<u8, N>,
    terminated: bool,
}

impl<const N: usize> Default for ResponseBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ResponseBuffer<N> {
    /// Data bytes the buffer can hold
    pub const CAPACITY: usize = N - 1;

    pub const fn new() -> Self {
        const { assert!(N >= 2, "response buffer needs room for data and terminator") };
        Self {
            bytes: Vec::new(),
            terminated: false,
        }
    }

    fn len(&self) -> usize {
        self.bytes.len() - self.terminated as usize
    }

    pub fn is_full(&self) -> bool {
        self.len() >= Self::CAPACITY
    }

    pub fn remaining(&self) -> usize {
        Self::CAPACITY - self.len()
    }

    /// Append as much of `data` as fits, returning the number of bytes taken
    pub fn extend(&mut self, data: &[u8]) -> usize {
        if self.terminated {
            self.bytes.pop();
            self.terminated = false;
        }

        let take = data.len().min(self.remaining());
        // Cannot fail: `take` never exceeds the free space.
        let _ = self.bytes.extend_from_slice(&data[..take]);
        take
    }

    /// Drain whatever `connection` has available right now.
    ///
    /// Stops when the connection has nothing more or the buffer is full.
    pub fn fill_from<C: Connection>(&mut self, connection: &mut C) -> Result<usize, TransportError> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0;

        while !self.is_full() {
            let want = self.remaining().min(READ_CHUNK);
            let read = connection.read(&mut chunk[..want])?.min(want);
            if read == 0 {
                break;
            }
            total += self.extend(&chunk[..read]);
        }

        Ok(total)
    }

    /// Terminate the data and return it with the trailing NUL
    pub fn terminate(&mut self) -> &[u8] {
        if !self.terminated {
            // The terminator slot is always free.
            let _ = self.bytes.push(0);
            self.terminated = true;
        }
        &self.bytes
    }

    /// Captured data without the terminator
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.terminated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::is_success;

    struct Chunked {
        data: &'static [u8],
        pos: usize,
        per_read: usize,
    }

    impl Connection for Chunked {
        fn write(&mut self, _bytes: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let n = self.per_read.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }

        fn is_closed(&self) -> bool {
            self.pos == self.data.len()
        }
    }

    #[test]
    fn test_capacity_reserves_terminator() {
        let mut buffer = ResponseBuffer::<8>::new();
        assert_eq!(ResponseBuffer::<8>::CAPACITY, 7);
        assert_eq!(buffer.extend(b"0123456789"), 7);
        assert!(buffer.is_full());
        assert_eq!(buffer.terminate(), b"0123456\0");
        assert_eq!(buffer.as_bytes(), b"0123456");
    }

    #[test]
    fn test_fill_from_drains_available_bytes() {
        let mut connection = Chunked {
            data: b"HTTP/1.1 200 OK\r\n\r\n{\"status\":\"success\"}",
            pos: 0,
            per_read: 5,
        };
        let mut buffer = ResponseBuffer::<128>::new();

        let read = buffer.fill_from(&mut connection).unwrap();
        assert_eq!(read, connection.data.len());
        assert!(connection.is_closed());
        assert!(is_success(buffer.as_bytes()));
    }

    #[test]
    fn test_fill_stops_when_full() {
        let mut connection = Chunked {
            data: b"abcdefghijklmnopqrstuvwxyz",
            pos: 0,
            per_read: 64,
        };
        let mut buffer = ResponseBuffer::<11>::new();

        assert_eq!(buffer.fill_from(&mut connection).unwrap(), 10);
        assert!(buffer.is_full());
        assert!(!connection.is_closed());
        assert_eq!(buffer.as_bytes(), b"abcdefghij");
    }

    #[test]
    fn test_extend_after_terminate_and_clear() {
        let mut buffer = ResponseBuffer::<16>::new();
        buffer.extend(b"abc");
        buffer.terminate();
        buffer.extend(b"def");
        assert_eq!(buffer.as_bytes(), b"abcdef");
        assert_eq!(buffer.terminate(), b"abcdef\0");

        buffer.clear();
        assert!(buffer.as_bytes().is_empty());
        assert_eq!(buffer.terminate(), b"\0");
    }
}

//! Scripted in-memory transport for unit tests

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use super::transport::{Connection, Transport, TransportError};
use crate::config::EndpointConfig;

/// What the next opened connection does
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// `open` fails
    Refuse,
    /// Connection opens but never sends anything
    Silent,
    /// Sends `bytes`, `per_read` at a time with one empty read in between,
    /// then closes if `close` is set
    Respond {
        bytes: Vec<u8>,
        per_read: usize,
        close: bool,
    },
}

impl Reply {
    pub(crate) fn success() -> Self {
        Self::Respond {
            bytes: b"HTTP/1.1 200 OK\r\n\r\n{\"status\":\"success\",\"value\":null}".to_vec(),
            per_read: usize::MAX,
            close: true,
        }
    }

    pub(crate) fn rejected() -> Self {
        Self::Respond {
            bytes: b"HTTP/1.1 200 OK\r\n\r\n{\"status\":\"error\"}".to_vec(),
            per_read: usize::MAX,
            close: true,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub replies: VecDeque<Reply>,
    pub fallback: Option<Reply>,
    pub opened: u32,
    pub live: u32,
    pub max_live: u32,
    pub requests: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeTransport {
    pub state: Rc<RefCell<FakeState>>,
}

impl FakeTransport {
    /// Every connection behaves like `reply`
    pub(crate) fn always(reply: Reply) -> Self {
        let transport = Self::default();
        transport.state.borrow_mut().fallback = Some(reply);
        transport
    }

    pub(crate) fn scripted(replies: impl IntoIterator<Item = Reply>) -> Self {
        let transport = Self::default();
        transport.state.borrow_mut().replies = replies.into_iter().collect();
        transport
    }

    pub(crate) fn opened(&self) -> u32 {
        self.state.borrow().opened
    }

    pub(crate) fn live(&self) -> u32 {
        self.state.borrow().live
    }

    pub(crate) fn max_live(&self) -> u32 {
        self.state.borrow().max_live
    }

    pub(crate) fn requests(&self) -> Vec<Vec<u8>> {
        self.state.borrow().requests.clone()
    }
}

impl Transport for FakeTransport {
    type Connection = FakeConnection;

    fn open(&mut self, _endpoint: &EndpointConfig<'_>) -> Result<FakeConnection, TransportError> {
        let mut state = self.state.borrow_mut();
        state.opened += 1;

        let reply = state
            .replies
            .pop_front()
            .or_else(|| state.fallback.clone())
            .unwrap_or(Reply::Silent);

        let (pending, per_read, close) = match reply {
            Reply::Refuse => return Err(TransportError::ConnectFailed),
            Reply::Silent => (VecDeque::new(), 0, false),
            Reply::Respond {
                bytes,
                per_read,
                close,
            } => (bytes.into_iter().collect(), per_read, close),
        };

        state.live += 1;
        state.max_live = state.max_live.max(state.live);

        Ok(FakeConnection {
            shared: Rc::clone(&self.state),
            pending,
            per_read,
            close,
            paused: false,
        })
    }
}

#[derive(Debug)]
pub(crate) struct FakeConnection {
    shared: Rc<RefCell<FakeState>>,
    pending: VecDeque<u8>,
    per_read: usize,
    close: bool,
    paused: bool,
}

impl Connection for FakeConnection {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.shared.borrow_mut().requests.push(bytes.to_vec());
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        // Alternate data and empty reads so each drain sees one chunk.
        if self.paused {
            self.paused = false;
            return Ok(0);
        }

        let n = self.per_read.min(buf.len()).min(self.pending.len());
        for slot in buf.iter_mut().take(n) {
            if let Some(byte) = self.pending.pop_front() {
                *slot = byte;
            }
        }
        self.paused = n > 0;
        Ok(n)
    }

    fn is_closed(&self) -> bool {
        self.close && self.pending.is_empty()
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.shared.borrow_mut().live -= 1;
    }
}

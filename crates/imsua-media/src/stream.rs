//! The push/pull stream abstractions an [`crate::rtp_stream::RtpStream`] sits between: a source
//! of outbound PCM chunks and a sink for decoded inbound ones.

use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;

/// A pull source of raw PCM chunks, one call-duration's worth of audio at a time. `recv_chunk`
/// blocks the calling (audio source) thread; `None` means the source is exhausted.
pub trait AudioSource: Send {
    fn recv_chunk(&mut self) -> Option<Bytes>;
}

/// A push sink for decoded PCM chunks. Returns `false` once the sink has been closed downstream,
/// telling the caller to stop feeding it.
pub trait AudioSink: Send {
    fn write_chunk(&mut self, chunk: Bytes) -> bool;
}

/// A playlist source: plays a queue of [`AudioSource`]s back to back. When one is exhausted the
/// next begins; when the queue itself empties, `on_empty` fires once.
pub struct CallOutStream {
    queue: VecDeque<Box<dyn AudioSource>>,
    current: Option<Box<dyn AudioSource>>,
    on_empty: Option<Box<dyn FnOnce() + Send>>,
}

impl CallOutStream {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            current: None,
            on_empty: None,
        }
    }

    pub fn push(&mut self, source: Box<dyn AudioSource>) {
        self.queue.push_back(source);
    }

    pub fn on_empty(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.on_empty = Some(Box::new(callback));
    }
}

impl Default for CallOutStream {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for CallOutStream {
    fn recv_chunk(&mut self) -> Option<Bytes> {
        loop {
            if self.current.is_none() {
                self.current = self.queue.pop_front();
            }
            let Some(source) = self.current.as_mut() else {
                if let Some(callback) = self.on_empty.take() {
                    callback();
                }
                return None;
            };
            match source.recv_chunk() {
                Some(chunk) => return Some(chunk),
                None => self.current = None, // this entry is exhausted, advance to the next
            }
        }
    }
}

/// A buffered sink: writes accumulate in memory until a real downstream sink is attached, at
/// which point the buffered bytes flush through it first.
pub struct CallInStream {
    inner: Mutex<CallInState>,
}

struct CallInState {
    buffer: VecDeque<Bytes>,
    attached: Option<Box<dyn AudioSink>>,
    closed: bool,
}

impl CallInStream {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CallInState {
                buffer: VecDeque::new(),
                attached: None,
                closed: false,
            }),
        }
    }

    /// Attaches `sink`, flushing any buffered chunks through it immediately.
    pub fn attach(&self, mut sink: Box<dyn AudioSink>) {
        let mut state = self.inner.lock();
        let chunks: Vec<_> = state.buffer.drain(..).collect();
        for chunk in chunks {
            if !sink.write_chunk(chunk) {
                state.closed = true;
                return;
            }
        }
        state.attached = Some(sink);
    }
}

impl Default for CallInStream {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for CallInStream {
    fn write_chunk(&mut self, chunk: Bytes) -> bool {
        let mut state = self.inner.lock();
        if state.closed {
            return false;
        }
        match state.attached.as_mut() {
            Some(sink) => {
                if sink.write_chunk(chunk) {
                    true
                } else {
                    state.closed = true;
                    false
                }
            }
            None => {
                state.buffer.push_back(chunk);
                true
            }
        }
    }
}

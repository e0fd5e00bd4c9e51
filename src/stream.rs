use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::{mpsc, oneshot};

use crate::{
    mux::{PageoutOutcome, Signal},
    packet::Packet,
    source::{PageMode, SourceStream},
};

/// Stream state shared between the caller's handle and the
/// multiplexer's active-stream table. The encoder state is opaque and
/// never copied; the mutex exists only because the submitting handle
/// and the pull loop are distinct owners.
pub(crate) struct StreamShared {
    serial: u32,
    state: Mutex<Box<dyn SourceStream>>,
    retired: AtomicBool,
}

impl StreamShared {
    pub(crate) fn new(serial: u32, state: Box<dyn SourceStream>) -> Self {
        Self {
            serial,
            state: Mutex::new(state),
            retired: AtomicBool::new(false),
        }
    }

    pub(crate) fn serial(&self) -> u32 {
        self.serial
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub(crate) fn lock_state(&self) -> anyhow::Result<MutexGuard<'_, Box<dyn SourceStream>>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("encoder state poisoned for stream {}", self.serial))
    }
}

/// Resolution of a queued pageout/flush request, delivered once the
/// pull loop has processed (or abandoned) it.
pub type Completion = Pin<Box<dyn Future<Output = anyhow::Result<PageoutOutcome>> + Send>>;

/// Caller-facing handle to one logical stream.
///
/// Cheaply cloneable. The handle submits packets into the encoder state
/// and signals the multiplexer when the stream has become a candidate
/// for page emission; it does not own the stream's lifetime — the
/// multiplexer retires the stream once the page source reports end of
/// stream.
#[derive(Clone)]
pub struct StreamHandle {
    shared: Arc<StreamShared>,
    signal_tx: mpsc::UnboundedSender<Signal>,
}

impl StreamHandle {
    pub(crate) fn new(shared: Arc<StreamShared>, signal_tx: mpsc::UnboundedSender<Signal>) -> Self {
        Self { shared, signal_tx }
    }

    pub fn serial(&self) -> u32 {
        self.shared.serial()
    }

    /// Whether the multiplexer has retired this stream.
    pub fn is_retired(&self) -> bool {
        self.shared.is_retired()
    }

    /// Buffers one packet into the encoder state and signals the
    /// multiplexer that this stream may have a page ready. A packet
    /// carrying the end-of-stream flag additionally requests a forced
    /// flush.
    pub fn submit_packet(&self, packet: Packet) -> anyhow::Result<()> {
        if self.is_retired() {
            anyhow::bail!("stream {} already ended", self.serial());
        }
        self.shared.lock_state()?.submit(&packet)?;
        log::debug!(
            "stream({}): packet in, {} bytes{}",
            self.serial(),
            packet.size(),
            if packet.is_eos() { " (eos)" } else { "" }
        );
        self.raise(PageMode::Pageout);
        if packet.is_eos() {
            self.raise(PageMode::Flush);
        }
        Ok(())
    }

    /// Requests a normal pageout on the next pull cycle. Resolves once
    /// the request has been processed, or with
    /// [`PageoutOutcome::Abandoned`] if a later request for this stream
    /// replaced it first.
    pub fn pageout(&self) -> Completion {
        self.request(PageMode::Pageout)
    }

    /// Requests a forced flush on the next pull cycle. Same completion
    /// contract as [`StreamHandle::pageout`].
    pub fn flush(&self) -> Completion {
        self.request(PageMode::Flush)
    }

    fn request(&self, mode: PageMode) -> Completion {
        // Enqueue eagerly so the request is queued whether or not the
        // returned future is ever polled.
        let enqueued = self.enqueue(mode);
        Box::pin(async move {
            match enqueued {
                Ok(rx) => Ok(rx.await.unwrap_or(PageoutOutcome::Abandoned)),
                Err(e) => Err(e),
            }
        })
    }

    fn enqueue(&self, mode: PageMode) -> anyhow::Result<oneshot::Receiver<PageoutOutcome>> {
        if self.is_retired() {
            anyhow::bail!("stream {} already ended", self.serial());
        }
        let (done, rx) = oneshot::channel();
        self.signal_tx
            .send(Signal {
                serial: self.serial(),
                mode,
                done: Some(done),
            })
            .map_err(|_| anyhow::anyhow!("multiplexer closed"))?;
        Ok(rx)
    }

    fn raise(&self, mode: PageMode) {
        // Multiplexer gone: nothing left to deliver pages to.
        let _ = self.signal_tx.send(Signal {
            serial: self.serial(),
            mode,
            done: None,
        });
    }
}

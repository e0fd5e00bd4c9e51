use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use bytes::BytesMut;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    reader::Pull,
    source::{PageMode, PageSource},
    stream::{StreamHandle, StreamShared},
};

/// How a queued pageout request ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageoutOutcome {
    /// The request recovered this many pages.
    Produced(usize),
    /// No page was ready; the stream keeps buffering.
    Empty,
    /// The request was replaced by a newer one for the same stream
    /// before the queue drained, or the multiplexer shut down first.
    Abandoned,
}

/// One queued "produce a page" instruction for a single stream.
pub(crate) struct Signal {
    pub(crate) serial: u32,
    pub(crate) mode: PageMode,
    pub(crate) done: Option<oneshot::Sender<PageoutOutcome>>,
}

/// The processing batch of one pull cycle: requests in arrival order,
/// coalesced to at most one per stream. A re-signal replaces the
/// pending request in its original slot (last write wins) and resolves
/// the replaced one as abandoned.
#[derive(Default)]
struct Batch {
    requests: Vec<Signal>,
    slots: HashMap<u32, usize>,
}

impl Batch {
    fn push(&mut self, sig: Signal) {
        match self.slots.entry(sig.serial) {
            Entry::Occupied(slot) => {
                let prev = std::mem::replace(&mut self.requests[*slot.get()], sig);
                if let Some(done) = prev.done {
                    let _ = done.send(PageoutOutcome::Abandoned);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(self.requests.len());
                self.requests.push(sig);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Welds one or more logical streams into a single page bitstream.
///
/// Streams are registered with [`Mux::stream`]; their readiness signals
/// queue pageout requests which the next [`Mux::pull`] drains in
/// arrival order, concatenating every recovered page into one chunk.
pub struct Mux {
    source: Arc<dyn PageSource>,
    streams: HashMap<u32, Arc<StreamShared>>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
    cancel: CancellationToken,
}

impl Mux {
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            source,
            streams: HashMap::new(),
            signal_tx,
            signal_rx,
            cancel: CancellationToken::new(),
        }
    }

    /// Registers a logical stream and returns a handle for submitting
    /// packets to it. Idempotent per serial number: a serial that is
    /// already active yields a handle to the existing stream rather
    /// than a duplicate. `None` draws an unused random serial.
    pub fn stream(&mut self, serial: Option<u32>) -> anyhow::Result<StreamHandle> {
        if self.cancel.is_cancelled() {
            anyhow::bail!("multiplexer closed");
        }
        let serial = match serial {
            Some(n) => {
                if let Some(existing) = self.streams.get(&n) {
                    log::debug!("stream({n}): already registered, returning existing handle");
                    return Ok(StreamHandle::new(existing.clone(), self.signal_tx.clone()));
                }
                n
            }
            None => self.draw_serial(),
        };
        let state = self.source.open(serial)?;
        let shared = Arc::new(StreamShared::new(serial, state));
        self.streams.insert(serial, shared.clone());
        log::debug!("stream({serial}): registered");
        Ok(StreamHandle::new(shared, self.signal_tx.clone()))
    }

    /// Number of streams still in the active set.
    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    /// Releases a suspended [`Mux::pull`] without delivering a chunk;
    /// subsequent pulls return [`Pull::End`].
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Token cancelled when the multiplexer closes. Lets another task
    /// observe or trigger shutdown while this one owns the mux.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// One pull cycle. Returns the concatenation of every page the
    /// current request batch recovered, in request arrival order;
    /// suspends (without busy-waiting) while no request yields data.
    ///
    /// `size_hint` is advisory only — a cycle returns whatever its
    /// batch produced; pass 0 for no preference. Returns
    /// [`Pull::End`] once no streams remain active, idempotently.
    /// Fatal page-source errors abort the cycle via `Err`.
    ///
    /// Cancel-safe: a pull dropped while suspended leaves every queued
    /// request in the channel for the next pull to drain.
    pub async fn pull(&mut self, size_hint: usize) -> anyhow::Result<Pull> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Pull::End);
            }
            if self.streams.is_empty() {
                log::debug!("pull: no active streams, end of output");
                return Ok(Pull::End);
            }

            let mut batch = Batch::default();
            while let Ok(sig) = self.signal_rx.try_recv() {
                batch.push(sig);
            }

            if batch.is_empty() {
                // Sole blocking boundary: park until the next readiness
                // signal (or shutdown) arrives.
                tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(Pull::End),
                    sig = self.signal_rx.recv() => {
                        match sig {
                            Some(sig) => batch.push(sig),
                            None => return Ok(Pull::End),
                        }
                        while let Ok(sig) = self.signal_rx.try_recv() {
                            batch.push(sig);
                        }
                    }
                }
            }

            let out = self.process(batch)?;
            if !out.is_empty() {
                log::debug!("pull: delivering {} bytes (hint {size_hint})", out.len());
                return Ok(Pull::Data(out.freeze()));
            }
            // The batch recovered nothing; go back to waiting rather
            // than deliver an empty non-terminal chunk.
        }
    }

    /// Drives the page source once per queued request, strictly in
    /// batch order. Each request loops until the source reports
    /// exhaustion, so a stream with several buffered pages empties in
    /// one cycle. An unproductive attempt checks end of stream and
    /// retires the stream; retirement does not abort the rest of the
    /// batch.
    fn process(&mut self, batch: Batch) -> anyhow::Result<BytesMut> {
        let mut out = BytesMut::new();
        for req in batch.requests {
            let Some(shared) = self.streams.get(&req.serial).cloned() else {
                log::error!(
                    "request for serial {} absent from the active set: \
                     request queue and stream table desynchronized",
                    req.serial
                );
                if let Some(done) = req.done {
                    let _ = done.send(PageoutOutcome::Abandoned);
                }
                continue;
            };

            let mut pages = 0usize;
            let eos;
            {
                let mut state = shared.lock_state()?;
                loop {
                    match state.produce(req.mode)? {
                        Some(page) => {
                            page.write_into(&mut out);
                            pages += 1;
                        }
                        None => {
                            eos = state.eos();
                            break;
                        }
                    }
                }
            }
            if eos {
                self.retire(req.serial);
            }
            if let Some(done) = req.done {
                let outcome = if pages > 0 {
                    PageoutOutcome::Produced(pages)
                } else {
                    PageoutOutcome::Empty
                };
                let _ = done.send(outcome);
            }
        }
        Ok(out)
    }

    fn retire(&mut self, serial: u32) {
        if let Some(shared) = self.streams.remove(&serial) {
            shared.retire();
            log::debug!("stream({serial}): end of stream, retired from the active set");
        }
    }

    fn draw_serial(&self) -> u32 {
        let mut rng = rand::rng();
        loop {
            let serial = rng.random::<u32>();
            if !self.streams.contains_key(&serial) {
                return serial;
            }
        }
    }
}

impl Drop for Mux {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[path = "mux_test.rs"]
mod mux_test;

use crate::{packet::Packet, page::Page};

/// How a page is requested from the encoder state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageMode {
    /// Emit only when the encoder's buffering threshold is met.
    Pageout,
    /// Force emission regardless of buffered size, e.g. at stream end.
    Flush,
}

/// The native page-encoding capability the multiplexer drives.
///
/// An implementation owns the binary page layout (segment tables,
/// checksums, granule bookkeeping); the multiplexer only schedules
/// calls into it and concatenates the pages it returns.
pub trait PageSource: Send + Sync {
    /// Creates the opaque encoder state for one logical stream.
    fn open(&self, serial: u32) -> anyhow::Result<Box<dyn SourceStream>>;
}

/// Per-stream encoder state. Owned behind the multiplexer's stream
/// table and never copied; the submission handle and the pull loop are
/// the only callers.
pub trait SourceStream: Send {
    /// Buffers one packet into the encoder state.
    fn submit(&mut self, packet: &Packet) -> anyhow::Result<()>;

    /// Attempts to emit the next page. `None` means no page is ready
    /// yet, which is an ordinary outcome, not an error. `Err` is
    /// reserved for fatal encoder failure.
    fn produce(&mut self, mode: PageMode) -> anyhow::Result<Option<Page>>;

    /// Whether the stream has reached end of stream. Queried after an
    /// unproductive `produce`, never cached.
    fn eos(&self) -> bool;
}

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

use crate::mux::Mux;

/// Result of one pull cycle.
#[derive(Debug)]
pub enum Pull {
    /// Concatenated pages recovered by this cycle.
    Data(Bytes),
    /// Terminal: no streams remain active, no more data will ever come.
    End,
}

pub type OggPageStream = Pin<Box<dyn Stream<Item = anyhow::Result<Bytes>> + Send>>;

impl Mux {
    /// Adapts the pull loop into a `Stream` of page chunks, for
    /// consumers that want `StreamExt::next` instead of driving
    /// [`Mux::pull`] directly. Yields `Err` at most once, on fatal
    /// page-source failure, and terminates afterwards.
    pub fn into_stream(self) -> OggPageStream {
        Box::pin(futures_util::stream::unfold(Some(self), |mux| async move {
            let mut mux = mux?;
            match mux.pull(0).await {
                Ok(Pull::Data(chunk)) => Some((Ok(chunk), Some(mux))),
                Ok(Pull::End) => None,
                Err(e) => Some((Err(e), None)),
            }
        }))
    }
}

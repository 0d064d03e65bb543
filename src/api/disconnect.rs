//! Client-disconnect detection for streamed responses.

use crate::core::relay::RelayStatus;
use bytes::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A stream wrapper that classifies its own drop.
///
/// The response body is dropped when the client disconnects, when the
/// stream finishes normally, or after an upstream error; the relay status
/// tells the cases apart. Dropping the body drops the inner stream and
/// with it the upstream connection, so a disconnect stops the relay
/// without any further signalling.
pub struct DisconnectStream<S> {
    pub stream: S,
    pub status: RelayStatus,
}

impl<S, E> Stream for DisconnectStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl<S> Drop for DisconnectStream<S> {
    fn drop(&mut self) {
        if self.status.is_active() {
            tracing::debug!("Client disconnect detected, upstream connection dropped");
        }
    }
}

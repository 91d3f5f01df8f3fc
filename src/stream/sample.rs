//! Latest-value sampling for update streams

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Extension trait adding [`sample_every`](SampleExt::sample_every) to any stream
pub trait SampleExt: Stream {
    /// Yield at most one item per `period`, always the most recent one.
    ///
    /// Items that arrive between ticks replace each other. A tick with
    /// nothing new yields nothing, and the stream ends once the inner stream
    /// has ended and the last item has been yielded.
    fn sample_every(self, period: Duration) -> Sample<Self>
    where
        Self: Sized,
    {
        Sample::new(self, period)
    }
}

impl<T: Stream> SampleExt for T {}

pin_project! {
    /// Stream returned by [`SampleExt::sample_every`]
    pub struct Sample<S: Stream> {
        #[pin]
        inner: S,
        ticks: Interval,
        latest: Option<S::Item>,
        exhausted: bool,
    }
}

impl<S: Stream> Sample<S> {
    /// Must be called from within a tokio runtime.
    pub fn new(inner: S, period: Duration) -> Self {
        let mut ticks = interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { inner, ticks, latest: None, exhausted: false }
    }
}

impl<S: Stream> Stream for Sample<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        while !*this.exhausted {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.latest = Some(item),
                Poll::Ready(None) => *this.exhausted = true,
                Poll::Pending => break,
            }
        }

        if this.latest.is_none() {
            // Inner stream has registered the waker if it is still live
            return if *this.exhausted { Poll::Ready(None) } else { Poll::Pending };
        }

        ready!(this.ticks.poll_tick(cx));
        Poll::Ready(this.latest.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    #[tokio::test]
    async fn keeps_only_latest_between_ticks() {
        let (tx, rx) = mpsc::channel(16);
        let mut sampled = ReceiverStream::new(rx).sample_every(Duration::from_millis(50));

        for i in 0..5 {
            tx.send(i).await.unwrap();
        }
        // First tick fires immediately
        assert_eq!(sampled.next().await, Some(4));

        tx.send(5).await.unwrap();
        tx.send(6).await.unwrap();
        drop(tx);
        assert_eq!(sampled.next().await, Some(6));
        assert_eq!(sampled.next().await, None);
    }

    #[tokio::test]
    async fn ends_with_empty_inner_stream() {
        let mut sampled = futures::stream::empty::<u32>().sample_every(Duration::from_millis(10));
        assert_eq!(sampled.next().await, None);
    }
}

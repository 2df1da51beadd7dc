//! Side-channel body observer
//!
//! [`ObservedBody`] forwards every frame of the wrapped body untouched while
//! copying data frames into a [`BodyRecorder`]. It can also run a one-shot
//! hook once the body has been fully produced or discarded unread, which is
//! how the capture layer learns that an exchange has finished.

use bytes::{Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};
use pin_project::{pin_project, pinned_drop};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{ready, Context, Poll};

/// Upper bound on bytes kept per recorded body
pub const MAX_RECORDED_BYTES: usize = 1024 * 1024;

/// Hook fired once when an observed body reaches its end
pub type FinishHook = Box<dyn FnOnce() + Send + 'static>;

/// Shared buffer receiving a copy of the bytes that pass through a body
#[derive(Debug, Clone, Default)]
pub struct BodyRecorder {
    buffer: Arc<Mutex<BytesMut>>,
}

impl BodyRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk, dropping whatever exceeds [`MAX_RECORDED_BYTES`]
    pub fn record(&self, chunk: &[u8]) {
        let mut buffer = self.lock();
        let room = MAX_RECORDED_BYTES.saturating_sub(buffer.len());
        buffer.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    /// Take the recorded bytes, leaving the recorder empty
    pub fn take(&self) -> Bytes {
        std::mem::take(&mut *self.lock()).freeze()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Body wrapper that records frames and signals completion
///
/// The finish hook runs exactly once: when the inner body yields its last
/// frame, or on drop if the body had ended or was never polled at all (empty
/// bodies, HEAD responses whose body the router discards). A body dropped
/// mid-stream never fires the hook.
#[pin_project(PinnedDrop)]
pub struct ObservedBody<B> {
    #[pin]
    inner: B,
    recorder: Option<BodyRecorder>,
    on_finish: Option<FinishHook>,
    ended: bool,
    polled: bool,
}

impl<B> ObservedBody<B>
where
    B: Body,
{
    pub fn new(inner: B, recorder: Option<BodyRecorder>, on_finish: Option<FinishHook>) -> Self {
        let ended = inner.is_end_stream();
        Self {
            inner,
            recorder,
            on_finish,
            ended,
            polled: false,
        }
    }
}

fn fire(on_finish: &mut Option<FinishHook>) {
    if let Some(hook) = on_finish.take() {
        hook();
    }
}

impl<B> Body for ObservedBody<B>
where
    B: Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        *this.polled = true;
        let frame = ready!(this.inner.as_mut().poll_frame(cx));

        match &frame {
            Some(Ok(frame)) => {
                if let (Some(recorder), Some(data)) = (this.recorder.as_ref(), frame.data_ref()) {
                    recorder.record(data);
                }
                if this.inner.is_end_stream() {
                    *this.ended = true;
                    fire(this.on_finish);
                }
            }
            None => {
                *this.ended = true;
                fire(this.on_finish);
            }
            Some(Err(_)) => {}
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[pinned_drop]
impl<B> PinnedDrop for ObservedBody<B> {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if *this.ended || !*this.polled {
            fire(this.on_finish);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body as AxumBody;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_hook() -> (Arc<AtomicUsize>, FinishHook) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let hook: FinishHook = Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (count, hook)
    }

    fn chunked(chunks: &[&'static str]) -> AxumBody {
        let items: Vec<Result<Bytes, std::io::Error>> =
            chunks.iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect();
        AxumBody::from_stream(futures_util::stream::iter(items))
    }

    #[test]
    fn test_recorder_caps_size() {
        let recorder = BodyRecorder::new();
        recorder.record(&vec![b'a'; MAX_RECORDED_BYTES - 2]);
        recorder.record(b"abcdef");

        assert_eq!(recorder.len(), MAX_RECORDED_BYTES);
        let bytes = recorder.take();
        assert!(bytes.ends_with(b"ab"));
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_records_and_forwards_unchanged() {
        let recorder = BodyRecorder::new();
        let (count, hook) = counting_hook();
        let body = ObservedBody::new(chunked(&["hel", "lo"]), Some(recorder.clone()), Some(hook));

        let forwarded = axum::body::to_bytes(AxumBody::new(body), usize::MAX)
            .await
            .unwrap();

        assert_eq!(&forwarded[..], b"hello");
        assert_eq!(&recorder.take()[..], b"hello");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_full_body_fires_once() {
        let (count, hook) = counting_hook();
        let body = ObservedBody::new(AxumBody::from("done"), None, Some(hook));

        axum::body::to_bytes(AxumBody::new(body), usize::MAX)
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_body_fires_on_drop() {
        let (count, hook) = counting_hook();
        let body = ObservedBody::new(AxumBody::empty(), None, Some(hook));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        drop(body);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unpolled_body_fires_on_drop() {
        let (count, hook) = counting_hook();
        let recorder = BodyRecorder::new();
        let body =
            ObservedBody::new(chunked(&["never", "read"]), Some(recorder.clone()), Some(hook));

        drop(body);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_aborted_stream_never_fires() {
        let (count, hook) = counting_hook();
        let mut body = ObservedBody::new(chunked(&["a", "b"]), None, Some(hook));

        let first = std::future::poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await;
        assert!(first.is_some());

        drop(body);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}

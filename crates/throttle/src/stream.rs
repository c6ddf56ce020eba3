use crate::Link;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep_until, Sleep};

/// A stream whose reads and writes are paced by a [Link].
///
/// Each operation moves at most [Link::chunk_size] bytes and then
/// holds off the next operation in the same direction until the link
/// has paid for the transfer. Flush and shutdown wait for any
/// outstanding write delay so that a flushed write has fully "arrived".
#[derive(Debug)]
pub struct Throttled<T> {
    inner: T,
    link: Arc<Link>,
    read_delay: Option<Pin<Box<Sleep>>>,
    write_delay: Option<Pin<Box<Sleep>>>,
}

impl<T> Throttled<T> {
    pub fn new(inner: T, link: Arc<Link>) -> Self {
        Self {
            inner,
            link,
            read_delay: None,
            write_delay: None,
        }
    }
}

fn poll_delay(delay: &mut Option<Pin<Box<Sleep>>>, cx: &mut Context<'_>) -> Poll<()> {
    if let Some(sleep) = delay.as_mut() {
        ready!(sleep.as_mut().poll(cx));
        delay.take();
    }
    Poll::Ready(())
}

impl<T: AsyncRead + Unpin> AsyncRead for Throttled<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(poll_delay(&mut this.read_delay, cx));

        let limit = this.link.chunk_size().min(buf.remaining());
        let mut limited = ReadBuf::new(buf.initialize_unfilled_to(limit));
        ready!(Pin::new(&mut this.inner).poll_read(cx, &mut limited))?;
        let n = limited.filled().len();
        buf.advance(n);

        if n > 0 {
            let deadline = this.link.consume(n);
            this.read_delay = Some(Box::pin(sleep_until(deadline)));
        }
        Poll::Ready(Ok(()))
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Throttled<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(poll_delay(&mut this.write_delay, cx));

        let limit = this.link.chunk_size().min(buf.len());
        let n = ready!(Pin::new(&mut this.inner).poll_write(cx, &buf[..limit]))?;

        if n > 0 {
            let deadline = this.link.consume(n);
            this.write_delay = Some(Box::pin(sleep_until(deadline)));
        }
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(poll_delay(&mut this.write_delay, cx));
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(poll_delay(&mut this.write_delay, cx));
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

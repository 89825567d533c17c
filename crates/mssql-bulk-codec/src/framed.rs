//! Packet-level views of an async transport.
//!
//! [`Connection`](crate::Connection) splits its transport and drives a
//! [`PacketReader`] and a shared [`PacketWriter`], so an attention can go out
//! while a read is parked. The mock server has no such need and uses the
//! single [`PacketStream`].

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::Sink;
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, FramedRead, FramedWrite};

use crate::error::CodecError;
use crate::packet_codec::{Packet, TdsCodec};

/// Forward `Sink<Packet>` to the projected `inner` field.
macro_rules! forward_packet_sink {
    ($ty:ident) => {
        impl<T> Sink<Packet> for $ty<T>
        where
            T: AsyncWrite + Unpin,
        {
            type Error = CodecError;

            fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), CodecError>> {
                self.project().inner.poll_ready(cx)
            }

            fn start_send(self: Pin<&mut Self>, packet: Packet) -> Result<(), CodecError> {
                self.project().inner.start_send(packet)
            }

            fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), CodecError>> {
                self.project().inner.poll_flush(cx)
            }

            fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), CodecError>> {
                self.project().inner.poll_close(cx)
            }
        }
    };
}

/// Forward `Stream` to the projected `inner` field.
macro_rules! forward_packet_stream {
    ($ty:ident) => {
        impl<T> Stream for $ty<T>
        where
            T: AsyncRead + Unpin,
        {
            type Item = Result<Packet, CodecError>;

            fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
                self.project().inner.poll_next(cx)
            }
        }
    };
}

pin_project! {
    /// Packets in both directions over one transport.
    pub struct PacketStream<T> {
        #[pin]
        inner: Framed<T, TdsCodec>,
    }
}

impl<T> PacketStream<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Frame `transport` with a default codec.
    pub fn new(transport: T) -> Self {
        Self {
            inner: Framed::new(transport, TdsCodec::new()),
        }
    }
}

forward_packet_stream!(PacketStream);
forward_packet_sink!(PacketStream);

impl<T> std::fmt::Debug for PacketStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketStream")
            .field("codec", self.inner.codec())
            .finish_non_exhaustive()
    }
}

pin_project! {
    /// Incoming packets from the read half of a split transport.
    pub struct PacketReader<T> {
        #[pin]
        inner: FramedRead<T, TdsCodec>,
    }
}

impl<T: AsyncRead> PacketReader<T> {
    /// Frame the read half with a default codec.
    pub fn new(read_half: T) -> Self {
        Self {
            inner: FramedRead::new(read_half, TdsCodec::new()),
        }
    }
}

forward_packet_stream!(PacketReader);

pin_project! {
    /// Outgoing packets to the write half of a split transport.
    pub struct PacketWriter<T> {
        #[pin]
        inner: FramedWrite<T, TdsCodec>,
    }
}

impl<T: AsyncWrite> PacketWriter<T> {
    /// Frame the write half with `codec`, whose packet size caps each write.
    pub fn new(write_half: T, codec: TdsCodec) -> Self {
        Self {
            inner: FramedWrite::new(write_half, codec),
        }
    }
}

forward_packet_sink!(PacketWriter);

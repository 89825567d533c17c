//! Split I/O connection.
//!
//! The transport is split into read and write halves so an attention
//! packet can be written from another task while the owner is blocked
//! reading a reply.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tds_wire::packet::{
    DEFAULT_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader, PacketStatus, PacketType,
};
use tds_wire::{Token, TokenParser};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, Notify};

use crate::error::CodecError;
use crate::framed::{PacketReader, PacketWriter};
use crate::message::{Message, MessageAssembler};
use crate::packet_codec::{Packet, TdsCodec};

/// A TDS connection with split I/O.
///
/// Outgoing messages are cut into packets of the negotiated packet size.
/// Long messages (a BULK_LOAD row stream) can be pushed incrementally with
/// [`send_partial`](Self::send_partial) and closed with
/// [`finish_message`](Self::finish_message).
///
/// # Example
///
/// ```rust,ignore
/// use mssql_bulk_codec::Connection;
/// use tokio::net::TcpStream;
///
/// let stream = TcpStream::connect("localhost:1433").await?;
/// let mut conn = Connection::with_packet_size(stream, 8000);
/// let cancel = conn.cancel_handle();
/// ```
pub struct Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    reader: PacketReader<ReadHalf<T>>,
    writer: Arc<Mutex<PacketWriter<WriteHalf<T>>>>,
    assembler: MessageAssembler,
    packet_size: usize,
    cancel_notify: Arc<Notify>,
    cancelling: Arc<AtomicBool>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Create a connection using the default 4096-byte packet size.
    pub fn new(transport: T) -> Self {
        Self::with_packet_size(transport, DEFAULT_PACKET_SIZE)
    }

    /// Create a connection with a negotiated packet size.
    ///
    /// The size is clamped to the protocol bounds.
    pub fn with_packet_size(transport: T, packet_size: usize) -> Self {
        let codec = TdsCodec::new().with_max_packet_size(packet_size);
        let packet_size = codec.max_packet_size();
        let (read_half, write_half) = tokio::io::split(transport);

        Self {
            // Replies may use the full protocol maximum.
            reader: PacketReader::new(read_half),
            writer: Arc::new(Mutex::new(PacketWriter::new(write_half, codec))),
            assembler: MessageAssembler::new(),
            packet_size,
            cancel_notify: Arc::new(Notify::new()),
            cancelling: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Packet size used for outgoing messages.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    fn max_payload(&self) -> usize {
        self.packet_size - PACKET_HEADER_SIZE
    }

    /// Get a handle for cancelling the current request.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle<T> {
        CancelHandle {
            writer: Arc::clone(&self.writer),
            notify: Arc::clone(&self.cancel_notify),
            cancelling: Arc::clone(&self.cancelling),
        }
    }

    /// Check if a cancellation is in progress.
    #[must_use]
    pub fn is_cancelling(&self) -> bool {
        self.cancelling.load(Ordering::Acquire)
    }

    /// Read the next complete message.
    ///
    /// While a cancellation is in progress the reply stream is drained up
    /// to the server's attention acknowledgement and `None` is returned.
    pub async fn read_message(&mut self) -> Result<Option<Message>, CodecError> {
        loop {
            if self.is_cancelling() {
                return self.drain_after_cancel().await;
            }

            match self.reader.next().await {
                Some(Ok(packet)) => {
                    if let Some(message) = self.assembler.push(packet) {
                        return Ok(Some(message));
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    if self.assembler.has_partial() {
                        return Err(CodecError::ConnectionClosed);
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Send a complete message.
    pub async fn send_message(
        &mut self,
        packet_type: PacketType,
        payload: Bytes,
    ) -> Result<(), CodecError> {
        let mut buf = BytesMut::from(payload.as_ref());
        self.finish_message(packet_type, &mut buf).await
    }

    /// Send every whole packet's worth of `buf`, keeping the remainder.
    ///
    /// None of the packets carries `END_OF_MESSAGE`. Returns the number of
    /// packets written.
    pub async fn send_partial(
        &mut self,
        packet_type: PacketType,
        buf: &mut BytesMut,
    ) -> Result<usize, CodecError> {
        let max_payload = self.max_payload();
        let count = buf.len() / max_payload;
        if count == 0 {
            return Ok(0);
        }

        let mut writer = self.writer.lock().await;
        for _ in 0..count {
            let chunk = buf.split_to(max_payload);
            let header = PacketHeader::new(packet_type, PacketStatus::NORMAL, 0);
            writer.feed(Packet::new(header, chunk)).await?;
        }
        writer.flush().await?;

        tracing::trace!(packet_type = ?packet_type, packets = count, "sent partial message");
        Ok(count)
    }

    /// Send what is left of `buf`, marking the last packet `END_OF_MESSAGE`.
    ///
    /// An empty buffer still produces one (empty) closing packet.
    pub async fn finish_message(
        &mut self,
        packet_type: PacketType,
        buf: &mut BytesMut,
    ) -> Result<(), CodecError> {
        let max_payload = self.max_payload();
        let mut writer = self.writer.lock().await;
        loop {
            let is_last = buf.len() <= max_payload;
            let chunk = buf.split_to(buf.len().min(max_payload));
            let status = if is_last {
                PacketStatus::END_OF_MESSAGE
            } else {
                PacketStatus::NORMAL
            };
            writer
                .feed(Packet::new(PacketHeader::new(packet_type, status, 0), chunk))
                .await?;
            if is_last {
                break;
            }
        }
        writer.flush().await
    }

    /// Drain replies after an attention until the acknowledging DONE.
    async fn drain_after_cancel(&mut self) -> Result<Option<Message>, CodecError> {
        tracing::debug!("draining replies after cancellation");
        self.assembler.clear();

        let result = loop {
            match self.reader.next().await {
                Some(Ok(packet)) => {
                    if let Some(message) = self.assembler.push(packet) {
                        if acknowledges_attention(&message) {
                            tracing::debug!("received DONE with ATTN, cancellation complete");
                            break Ok(None);
                        }
                    }
                }
                Some(Err(e)) => break Err(e),
                None => break Err(CodecError::ConnectionClosed),
            }
        };

        self.cancelling.store(false, Ordering::Release);
        self.cancel_notify.notify_waiters();
        result
    }
}

/// Whether a reply contains a DONE token with the ATTN status bit.
fn acknowledges_attention(message: &Message) -> bool {
    if message.packet_type != PacketType::TabularResult {
        return false;
    }
    let mut parser = TokenParser::new(message.payload.clone());
    while let Ok(Some(token)) = parser.next_token() {
        if let Token::Done(done) | Token::DoneProc(done) | Token::DoneInProc(done) = token {
            if done.status.attn {
                return true;
            }
        }
    }
    false
}

impl<T> std::fmt::Debug for Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("packet_size", &self.packet_size)
            .field("cancelling", &self.is_cancelling())
            .field("has_partial_message", &self.assembler.has_partial())
            .finish_non_exhaustive()
    }
}

/// Handle for cancelling the request running on a connection.
///
/// Clone it and move it to another task to cancel from there.
pub struct CancelHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    writer: Arc<Mutex<PacketWriter<WriteHalf<T>>>>,
    notify: Arc<Notify>,
    cancelling: Arc<AtomicBool>,
}

impl<T> CancelHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Send an attention packet.
    ///
    /// The owner of the connection observes the acknowledgement on its next
    /// `read_message`.
    pub async fn cancel(&self) -> Result<(), CodecError> {
        self.cancelling.store(true, Ordering::Release);
        tracing::debug!("sending attention packet");

        let header = PacketHeader::new(
            PacketType::Attention,
            PacketStatus::END_OF_MESSAGE,
            PACKET_HEADER_SIZE as u16,
        );
        let mut writer = self.writer.lock().await;
        writer.send(Packet::new(header, BytesMut::new())).await
    }

    /// Wait until the server acknowledges the attention.
    pub async fn wait_cancelled(&self) {
        let notified = self.notify.notified();
        if self.cancelling.load(Ordering::Acquire) {
            notified.await;
        }
    }

    /// Check if a cancellation is in progress.
    #[must_use]
    pub fn is_cancelling(&self) -> bool {
        self.cancelling.load(Ordering::Acquire)
    }
}

impl<T> Clone for CancelHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            notify: Arc::clone(&self.notify),
            cancelling: Arc::clone(&self.cancelling),
        }
    }
}

impl<T> std::fmt::Debug for CancelHandle<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelling", &self.is_cancelling())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tds_wire::{Done, DoneStatus};

    fn reply(done: Done) -> Message {
        let mut payload = BytesMut::new();
        done.encode(&mut payload);
        Message {
            packet_type: PacketType::TabularResult,
            payload: payload.freeze(),
        }
    }

    #[test]
    fn test_attention_acknowledgement_detected() {
        let ack = Done {
            status: DoneStatus {
                attn: true,
                ..DoneStatus::default()
            },
            cur_cmd: 0,
            row_count: 0,
        };
        assert!(acknowledges_attention(&reply(ack)));
        assert!(!acknowledges_attention(&reply(Done::with_count(3))));
    }

    #[tokio::test]
    async fn test_message_exchange_over_scripted_io() {
        let mut done = BytesMut::new();
        Done::with_count(2).encode(&mut done);
        let mut reply_packet = vec![0x04, 0x01, 0x00, 8 + done.len() as u8, 0, 0, 1, 0];
        reply_packet.extend_from_slice(&done);

        let io = tokio_test::io::Builder::new()
            .write(&[0x07, 0x01, 0x00, 0x0B, 0, 0, 1, 0, 0xAA, 0xBB, 0xCC])
            .read(&reply_packet)
            .build();
        let mut conn = Connection::new(io);
        conn.send_message(PacketType::BulkLoad, Bytes::from_static(&[0xAA, 0xBB, 0xCC]))
            .await
            .unwrap();

        let message = conn.read_message().await.unwrap().unwrap();
        assert_eq!(message.packet_type, PacketType::TabularResult);
        assert_eq!(message.payload, done.freeze());
    }

    #[test]
    fn test_attention_bit_in_other_token_ignored() {
        // 0x20 inside a row count must not look like an acknowledgement.
        let done = Done::with_count(0x20FD);
        assert!(!acknowledges_attention(&reply(done)));
    }
}

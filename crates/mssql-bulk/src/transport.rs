//! The byte sink/source a bulk session runs over.
//!
//! [`BulkTransport`] is the narrow surface a session needs: framed message
//! writes, incremental writes for the row stream, reading a reply, and an
//! attention signal. [`Connection`] implements it for any tokio stream; tests
//! may substitute their own.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use mssql_bulk_codec::{CodecError, Connection, Message};
use tds_wire::packet::PacketType;
use tds_wire::{Token, TokenParser};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};

/// Transport capability used by a bulk session.
///
/// A session holds its transport exclusively for the whole exchange;
/// nothing else may be sent on it meanwhile.
#[async_trait]
pub trait BulkTransport: Send {
    /// Packet size used for outgoing messages.
    fn packet_size(&self) -> usize;

    /// Send a complete message.
    async fn send_message(&mut self, packet_type: PacketType, payload: Bytes)
    -> std::result::Result<(), CodecError>;

    /// Send whole packets from the front of `buf`, keeping the remainder.
    async fn send_partial(
        &mut self,
        packet_type: PacketType,
        buf: &mut BytesMut,
    ) -> std::result::Result<usize, CodecError>;

    /// Send the rest of `buf` and close the message.
    async fn finish_message(
        &mut self,
        packet_type: PacketType,
        buf: &mut BytesMut,
    ) -> std::result::Result<(), CodecError>;

    /// Read the next reply message; `None` once a cancellation has been
    /// acknowledged or the peer closed cleanly.
    async fn read_message(&mut self) -> std::result::Result<Option<Message>, CodecError>;

    /// Signal attention and drain replies up to its acknowledgement.
    async fn cancel(&mut self) -> std::result::Result<(), CodecError>;
}

#[async_trait]
impl<T> BulkTransport for Connection<T>
where
    T: AsyncRead + AsyncWrite + Send,
{
    fn packet_size(&self) -> usize {
        Connection::packet_size(self)
    }

    async fn send_message(
        &mut self,
        packet_type: PacketType,
        payload: Bytes,
    ) -> std::result::Result<(), CodecError> {
        Connection::send_message(self, packet_type, payload).await
    }

    async fn send_partial(
        &mut self,
        packet_type: PacketType,
        buf: &mut BytesMut,
    ) -> std::result::Result<usize, CodecError> {
        Connection::send_partial(self, packet_type, buf).await
    }

    async fn finish_message(
        &mut self,
        packet_type: PacketType,
        buf: &mut BytesMut,
    ) -> std::result::Result<(), CodecError> {
        Connection::finish_message(self, packet_type, buf).await
    }

    async fn read_message(&mut self) -> std::result::Result<Option<Message>, CodecError> {
        Connection::read_message(self).await
    }

    async fn cancel(&mut self) -> std::result::Result<(), CodecError> {
        self.cancel_handle().cancel().await?;
        // Drains up to the DONE carrying ATTN.
        while Connection::read_message(self).await?.is_some() {}
        Ok(())
    }
}

#[async_trait]
impl<B> BulkTransport for &mut B
where
    B: BulkTransport + ?Sized,
{
    fn packet_size(&self) -> usize {
        (**self).packet_size()
    }

    async fn send_message(
        &mut self,
        packet_type: PacketType,
        payload: Bytes,
    ) -> std::result::Result<(), CodecError> {
        (**self).send_message(packet_type, payload).await
    }

    async fn send_partial(
        &mut self,
        packet_type: PacketType,
        buf: &mut BytesMut,
    ) -> std::result::Result<usize, CodecError> {
        (**self).send_partial(packet_type, buf).await
    }

    async fn finish_message(
        &mut self,
        packet_type: PacketType,
        buf: &mut BytesMut,
    ) -> std::result::Result<(), CodecError> {
        (**self).finish_message(packet_type, buf).await
    }

    async fn read_message(&mut self) -> std::result::Result<Option<Message>, CodecError> {
        (**self).read_message().await
    }

    async fn cancel(&mut self) -> std::result::Result<(), CodecError> {
        (**self).cancel().await
    }
}

/// Outcome of one request as reported by its DONE tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Completion {
    /// Row count from the final DONE, if it carried one.
    pub rows_affected: Option<u64>,
}

/// Read the reply to one request.
///
/// The first ERROR token becomes [`Error::Server`]; INFO tokens are logged
/// and otherwise ignored. The reply ends at a DONE without the MORE bit.
pub async fn read_completion<B>(transport: &mut B) -> Result<Completion>
where
    B: BulkTransport + ?Sized,
{
    let mut first_error = None;
    let mut rows_affected = None;

    loop {
        let message = transport
            .read_message()
            .await?
            .ok_or(Error::ConnectionClosed)?;
        if message.packet_type != PacketType::TabularResult {
            return Err(Error::Protocol(tds_wire::ProtocolError::InvalidPacketType(
                message.packet_type as u8,
            )));
        }

        let mut parser = TokenParser::new(message.payload);
        while let Some(token) = parser.next_token()? {
            match token {
                Token::Error(err) => {
                    tracing::warn!(
                        number = err.number,
                        class = err.class,
                        message = %err.message,
                        "server error"
                    );
                    first_error.get_or_insert(err);
                }
                Token::Info(info) => {
                    tracing::debug!(number = info.number, message = %info.message, "server info");
                }
                Token::Done(done) | Token::DoneProc(done) | Token::DoneInProc(done) => {
                    if done.has_count() {
                        rows_affected = Some(done.row_count);
                    }
                    if !done.has_more() {
                        return match first_error {
                            Some(err) => Err(Error::from_server(err)),
                            None => Ok(Completion { rows_affected }),
                        };
                    }
                }
                Token::ColMetaData(_) | Token::ReturnStatus(_) => {}
            }
        }
    }
}

//! One request/response exchange over a freshly opened transport.
//!
//! A [`Session`] owns its transport for the duration of one lifecycle
//! operation. The transport is released when the session is dropped, so
//! every exit path (success, kernel rejection, `?` propagation) closes it.

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{MessageIter, NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, NlMsgError};
use super::parse::FromNetlink;
use super::socket::{Backend, Protocol, Transport};

/// A scoped netlink session.
pub struct Session<T: Transport> {
    transport: T,
    protocol: Protocol,
    seq: u32,
}

impl<T: Transport> Session<T> {
    /// Open a session through `backend`.
    pub fn open<B>(backend: &B, protocol: Protocol) -> Result<Self>
    where
        B: Backend<Transport = T> + ?Sized,
    {
        let transport = backend.open(protocol)?;
        tracing::trace!(?protocol, pid = transport.pid(), "session opened");
        Ok(Self {
            transport,
            protocol,
            seq: 1,
        })
    }

    /// Port id of the underlying transport.
    pub fn pid(&self) -> u32 {
        self.transport.pid()
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Next sequence number for a request on this session.
    pub fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// Send raw bytes (one or more messages) in a single datagram.
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        tracing::trace!(len = bytes.len(), "send");
        self.transport.send(bytes)
    }

    /// Receive one datagram.
    pub fn receive(&mut self) -> Result<Vec<u8>> {
        let data = self.transport.recv()?;
        tracing::trace!(len = data.len(), "recv");
        Ok(data)
    }

    fn stamp(&mut self, builder: &mut MessageBuilder) -> u32 {
        let seq = self.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.pid());
        seq
    }

    /// Send a request and wait for its ACK.
    ///
    /// Replies to other sequence numbers are skipped. A negative error code
    /// becomes [`Error::KernelRejected`].
    pub fn request_ack(&mut self, mut builder: MessageBuilder) -> Result<()> {
        let seq = self.stamp(&mut builder);
        tracing::debug!(msg_type = builder.msg_type(), seq, "request");
        self.send(&builder.finish())?;

        loop {
            let data = self.receive()?;
            if data.is_empty() {
                return Err(stream_ended());
            }

            for result in MessageIter::new(&data) {
                let (header, payload) = result?;
                if header.nlmsg_seq != seq {
                    continue;
                }

                if header.is_error() {
                    return NlMsgError::from_bytes(payload)?.into_result();
                }

                if header.is_done() {
                    return Ok(());
                }
            }
        }
    }

    /// Send a request and return the payload of the single reply.
    pub fn request(&mut self, mut builder: MessageBuilder) -> Result<Vec<u8>> {
        let seq = self.stamp(&mut builder);
        tracing::debug!(msg_type = builder.msg_type(), seq, "request");
        self.send(&builder.finish())?;

        loop {
            let data = self.receive()?;
            if data.is_empty() {
                return Err(stream_ended());
            }

            for result in MessageIter::new(&data) {
                let (header, payload) = result?;
                if header.nlmsg_seq != seq {
                    continue;
                }

                if header.is_error() {
                    NlMsgError::from_bytes(payload)?.into_result()?;
                    continue;
                }

                return Ok(payload.to_vec());
            }
        }
    }

    /// Send a dump request and collect every reply payload until NLMSG_DONE.
    pub fn dump(&mut self, mut builder: MessageBuilder) -> Result<Vec<Vec<u8>>> {
        let seq = self.stamp(&mut builder);
        tracing::debug!(msg_type = builder.msg_type(), seq, "dump");
        self.send(&builder.finish())?;

        let mut responses = Vec::new();

        loop {
            let data = self.receive()?;
            if data.is_empty() {
                return Err(stream_ended());
            }

            for result in MessageIter::new(&data) {
                let (header, payload) = result?;
                if header.nlmsg_seq != seq {
                    continue;
                }

                if header.is_error() {
                    NlMsgError::from_bytes(payload)?.into_result()?;
                    continue;
                }

                if header.is_done() {
                    // NLMSG_DONE may carry a dump error code.
                    if let Some(code) = payload.get(..4) {
                        let code = i32::from_ne_bytes([code[0], code[1], code[2], code[3]]);
                        if code < 0 {
                            return Err(Error::from_errno(code));
                        }
                    }
                    return Ok(responses);
                }

                responses.push(payload.to_vec());
            }
        }
    }

    /// Dump all objects of type `M` with request type `msg_type`.
    pub fn dump_typed<M: FromNetlink>(&mut self, msg_type: u16) -> Result<Vec<M>> {
        let mut builder = dump_request(msg_type);
        let mut header = Vec::new();
        M::write_dump_header(&mut header);
        builder.append_bytes(&header);

        self.dump(builder)?
            .iter()
            .map(|payload| M::from_bytes(payload))
            .collect()
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        tracing::trace!(protocol = ?self.protocol, pid = self.transport.pid(), "session closed");
    }
}

fn stream_ended() -> Error {
    Error::ReceiveFailed(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "netlink stream ended before a reply",
    ))
}

/// Create a message builder for a dump request.
pub fn dump_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_DUMP)
}

/// Create a message builder for a request with ACK.
pub fn ack_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_ACK)
}

/// Create a message builder for a request whose single reply is data.
pub fn get_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST)
}

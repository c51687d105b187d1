//! nfnetlink batch transactions.
//!
//! nftables changes are applied atomically: every message sits between a
//! BEGIN and an END marker and the kernel commits or rejects the whole
//! batch. A [`Batch`] walks `NotStarted -> Begun -> Ended -> Sent`:
//!
//! ```ignore
//! let mut batch = Batch::open(&backend)?;
//! batch.begin(Batch::<_>::initial_seq())?;
//! let seq = batch.append(table_msg)?;
//! batch.end()?;
//! let receipt = batch.send()?;
//! ```

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{
    MessageIter, NLM_F_ACK, NLM_F_CREATE, NLM_F_REQUEST, NlMsgError, NlMsgHdr, NlMsgType,
};
use super::nftables::consts::{NFNL_SUBSYS_NFTABLES, msg, nft_msg_type};
use super::session::Session;
use super::socket::{Backend, Protocol, Transport};
use super::types::nfgen::NfGenMsg;

/// Batch begin marker.
pub const NFNL_MSG_BATCH_BEGIN: u16 = 0x10;
/// Batch end marker.
pub const NFNL_MSG_BATCH_END: u16 = 0x11;

/// Preferred batch buffer size.
const BATCH_PAGE_SIZE: usize = 8192;

/// Size of an encoded BEGIN/END marker.
const MARKER_LEN: usize = 20;

/// Buffer capacity for one batch: 8 KiB, or the page size when smaller.
pub fn batch_buffer_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page > 0 {
        BATCH_PAGE_SIZE.min(page as usize)
    } else {
        BATCH_PAGE_SIZE
    }
}

/// Position of a batch in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    NotStarted,
    Begun,
    Ended,
    Sent,
}

/// Object notification echoed back for a message sent with `NLM_F_ECHO`.
#[derive(Debug, Clone)]
pub struct Echo {
    pub msg_type: u16,
    pub payload: Vec<u8>,
}

/// What the kernel returned for a committed batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReceipt {
    echoes: HashMap<u32, Echo>,
}

impl BatchReceipt {
    /// Echo for the message appended with sequence `seq`.
    pub fn echo(&self, seq: u32) -> Option<&Echo> {
        self.echoes.get(&seq)
    }

    pub fn len(&self) -> usize {
        self.echoes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.echoes.is_empty()
    }
}

enum Flow {
    Continue,
    Stop,
}

/// One nfnetlink transaction over its own session.
pub struct Batch<T: Transport> {
    session: Session<T>,
    buf: Vec<u8>,
    capacity: usize,
    seq: u32,
    state: BatchState,
    pending: Vec<u32>,
    /// Message type appended at each sequence number.
    appended: HashMap<u32, u16>,
}

impl<T: Transport> Batch<T> {
    /// Check batching support, then open a netfilter session and allocate
    /// the batch buffer.
    ///
    /// Fails with [`Error::BatchingUnsupported`] before anything is sent on
    /// the transaction's behalf.
    pub fn open<B>(backend: &B) -> Result<Self>
    where
        B: Backend<Transport = T> + ?Sized,
    {
        if !backend.batching_supported()? {
            return Err(Error::BatchingUnsupported);
        }

        let capacity = batch_buffer_size();
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|e| Error::AllocationFailed {
                what: format!("batch buffer of {} bytes: {}", capacity, e),
            })?;

        Ok(Self {
            session: Session::open(backend, Protocol::Netfilter)?,
            buf,
            capacity,
            seq: 0,
            state: BatchState::NotStarted,
            pending: Vec::new(),
            appended: HashMap::new(),
        })
    }

    /// A sequence seed derived from the wall clock.
    pub fn initial_seq() -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(1)
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Last sequence number written.
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Encoded size so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn expect_state(&self, expected: BatchState, action: &str) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState(format!(
                "cannot {} a batch in state {:?}",
                action, self.state
            )));
        }
        Ok(())
    }

    fn push(&mut self, bytes: &[u8], reserve: usize) -> Result<()> {
        if self.buf.len() + bytes.len() + reserve > self.capacity {
            return Err(Error::AllocationFailed {
                what: format!(
                    "batch message of {} bytes exceeds remaining buffer ({} of {} used)",
                    bytes.len(),
                    self.buf.len(),
                    self.capacity
                ),
            });
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Write the BEGIN marker, stamped with `seq + 1`.
    pub fn begin(&mut self, seq: u32) -> Result<()> {
        self.expect_state(BatchState::NotStarted, "begin")?;
        self.seq = seq.wrapping_add(1);
        let marker = marker(NFNL_MSG_BATCH_BEGIN, self.seq);
        self.push(&marker, MARKER_LEN)?;
        self.state = BatchState::Begun;
        Ok(())
    }

    /// Append one message, stamped with the next sequence number.
    ///
    /// Returns the sequence the message was sent with, which keys its
    /// echo in the [`BatchReceipt`].
    pub fn append(&mut self, mut builder: MessageBuilder) -> Result<u32> {
        self.expect_state(BatchState::Begun, "append to")?;
        let seq = self.seq.wrapping_add(1);
        builder.set_seq(seq);
        builder.set_pid(0);
        let wants_ack = builder.flags() & NLM_F_ACK != 0;
        let msg_type = builder.msg_type();
        self.push(&builder.finish(), MARKER_LEN)?;

        tracing::debug!(msg_type, seq, "batched");
        self.seq = seq;
        self.appended.insert(seq, msg_type);
        if wants_ack {
            self.pending.push(seq);
        }
        Ok(seq)
    }

    /// Write the END marker, stamped with the next sequence number.
    pub fn end(&mut self) -> Result<()> {
        self.expect_state(BatchState::Begun, "end")?;
        self.seq = self.seq.wrapping_add(1);
        let marker = marker(NFNL_MSG_BATCH_END, self.seq);
        self.push(&marker, 0)?;
        self.state = BatchState::Ended;
        Ok(())
    }

    /// Transmit the whole buffer in one send and drain the replies.
    ///
    /// Returns once every message that asked for an ACK is acknowledged.
    /// The first kernel error stops the drain and is returned with that
    /// message's errno.
    pub fn send(&mut self) -> Result<BatchReceipt> {
        self.expect_state(BatchState::Ended, "send")?;
        self.session.send(&self.buf)?;
        self.state = BatchState::Sent;

        let pid = self.session.pid();
        let mut receipt = BatchReceipt::default();
        let mut pending = std::mem::take(&mut self.pending);

        while !pending.is_empty() {
            let data = self.session.receive()?;
            if data.is_empty() {
                return Err(Error::ReceiveFailed(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "netlink stream ended before the batch was acknowledged",
                )));
            }

            for result in MessageIter::new(&data) {
                let (header, payload) = result?;
                if header.nlmsg_pid != 0 && header.nlmsg_pid != pid {
                    continue;
                }
                match self.dispatch(header, payload, &mut pending, &mut receipt)? {
                    Flow::Continue => {}
                    Flow::Stop => return Ok(receipt),
                }
            }
        }

        Ok(receipt)
    }

    fn dispatch(
        &self,
        header: &NlMsgHdr,
        payload: &[u8],
        pending: &mut Vec<u32>,
        receipt: &mut BatchReceipt,
    ) -> Result<Flow> {
        let seq = header.nlmsg_seq;
        match header.nlmsg_type {
            NlMsgType::ERROR => {
                let err = NlMsgError::from_bytes(payload)?;
                if let Err(e) = err.into_result() {
                    tracing::debug!(
                        seq,
                        msg_type = err.msg.nlmsg_type,
                        error = %e,
                        "batch message rejected"
                    );
                    return Err(e);
                }
                pending.retain(|&s| s != seq);
                Ok(Flow::Continue)
            }
            NlMsgType::DONE => Ok(Flow::Stop),
            NlMsgType::NOOP => Ok(Flow::Continue),
            // The kernel follows each echo with an NFT_MSG_NEWGEN under the
            // same seq; only the echo of the appended message is kept.
            msg_type if self.appended.get(&seq) == Some(&msg_type) => {
                receipt.echoes.entry(seq).or_insert_with(|| Echo {
                    msg_type,
                    payload: payload.to_vec(),
                });
                Ok(Flow::Continue)
            }
            msg_type => {
                tracing::trace!(seq, msg_type, "ignoring notification");
                Ok(Flow::Continue)
            }
        }
    }
}

fn marker(msg_type: u16, seq: u32) -> Vec<u8> {
    let mut builder = MessageBuilder::new(msg_type, NLM_F_REQUEST);
    builder.append(&NfGenMsg::new(libc::AF_UNSPEC as u8).with_res_id(NFNL_SUBSYS_NFTABLES as u16));
    builder.set_seq(seq);
    builder.finish()
}

/// Ask the kernel whether it understands nfnetlink batches.
///
/// Sends BEGIN, an attribute-less NEWSET and END on a private session.
/// A batching kernel accepts the markers, processes the NEWSET and rejects
/// it with `EINVAL` for its missing attributes. A rejected marker, or any
/// other answer to the NEWSET, means no batching.
pub fn probe_batching<B: Backend + ?Sized>(backend: &B) -> Result<bool> {
    let mut session = Session::open(backend, Protocol::Netfilter)?;
    let seq = Batch::<B::Transport>::initial_seq();

    let mut buf = marker(NFNL_MSG_BATCH_BEGIN, seq);
    let mut newset = MessageBuilder::new(nft_msg_type(msg::NEWSET), NLM_F_REQUEST | NLM_F_CREATE);
    newset.append(&NfGenMsg::new(libc::AF_INET as u8));
    newset.set_seq(seq.wrapping_add(1));
    buf.extend(newset.finish());
    buf.extend(marker(NFNL_MSG_BATCH_END, seq.wrapping_add(2)));

    session.send(&buf)?;
    let data = session.receive()?;

    let mut errno = None;
    for result in MessageIter::new(&data) {
        let (header, payload) = result?;
        if !header.is_error() {
            continue;
        }
        let reply = NlMsgError::from_bytes(payload)?;
        let Err(e) = reply.into_result() else {
            continue;
        };
        match reply.msg.nlmsg_type {
            NFNL_MSG_BATCH_BEGIN | NFNL_MSG_BATCH_END => {
                tracing::debug!(error = %e, "batch marker rejected");
                return Ok(false);
            }
            t if t == nft_msg_type(msg::NEWSET) => errno = e.errno(),
            _ => {}
        }
    }

    let supported = errno == Some(libc::EINVAL);
    tracing::debug!(supported, ?errno, "checked nfnetlink batching");
    Ok(supported)
}

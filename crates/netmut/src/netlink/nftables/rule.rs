use std::net::IpAddr;

use super::consts::{msg, rule};
use super::expr::{CmpOp, Expr, MetaKey, NatKind, PayloadBase, Register, Verdict};
use super::{Chain, Family, NftObject, Op, submit};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::error::{Error, Result};
use crate::netlink::message::{NLM_F_APPEND, NLM_F_CREATE};
use crate::netlink::socket::Backend;

const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;

/// A rule appended to a [`Chain`].
///
/// Expressions run in order; the `match_*` helpers push a load followed by
/// a comparison, so a mismatch ends evaluation of the rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    table: String,
    chain: String,
    family: Family,
    exprs: Vec<Expr>,
    handle: Option<u64>,
}

impl Rule {
    pub fn new(chain: &Chain) -> Self {
        Self {
            table: chain.table().to_string(),
            chain: chain.name().to_string(),
            family: chain.family(),
            exprs: Vec::new(),
            handle: None,
        }
    }

    /// Refer to an existing rule, e.g. to delete it.
    pub fn with_handle(mut self, handle: u64) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn push(mut self, expr: Expr) -> Self {
        self.exprs.push(expr);
        self
    }

    fn cmp_eq(self, data: impl Into<Vec<u8>>) -> Self {
        self.push(Expr::Cmp {
            sreg: Register::R1,
            op: CmpOp::Eq,
            data: data.into(),
        })
    }

    fn load(self, base: PayloadBase, offset: u32, len: u32) -> Self {
        self.push(Expr::Payload {
            base,
            offset,
            len,
            dreg: Register::R1,
        })
    }

    /// Match the transport protocol number.
    pub fn match_l4proto(self, proto: u8) -> Self {
        let rule = match self.family {
            Family::Ip => self.load(PayloadBase::Network, 9, 1),
            Family::Ip6 => self.load(PayloadBase::Network, 6, 1),
            _ => self.push(Expr::Meta {
                key: MetaKey::L4Proto,
                dreg: Register::R1,
            }),
        };
        rule.cmp_eq([proto])
    }

    pub fn match_tcp_dport(self, port: u16) -> Self {
        self.match_l4proto(IPPROTO_TCP)
            .load(PayloadBase::Transport, 2, 2)
            .cmp_eq(port.to_be_bytes())
    }

    pub fn match_udp_dport(self, port: u16) -> Self {
        self.match_l4proto(IPPROTO_UDP)
            .load(PayloadBase::Transport, 2, 2)
            .cmp_eq(port.to_be_bytes())
    }

    /// Match the destination address. Mixed-family tables first match the
    /// network protocol of `ip`.
    pub fn match_ip_daddr(self, ip: IpAddr) -> Self {
        let (proto, offset, bytes) = match ip {
            IpAddr::V4(v4) => (Family::Ip, 16, v4.octets().to_vec()),
            IpAddr::V6(v6) => (Family::Ip6, 24, v6.octets().to_vec()),
        };

        let rule = if matches!(self.family, Family::Ip | Family::Ip6) {
            self
        } else {
            self.push(Expr::Meta {
                key: MetaKey::NfProto,
                dreg: Register::R1,
            })
            .cmp_eq([proto.nfproto()])
        };
        let len = bytes.len() as u32;
        rule.load(PayloadBase::Network, offset, len).cmp_eq(bytes)
    }

    pub fn verdict(self, verdict: Verdict) -> Self {
        self.push(Expr::verdict(verdict))
    }

    pub fn accept(self) -> Self {
        self.verdict(Verdict::Accept)
    }

    /// Terminal DROP verdict.
    pub fn drop_packet(self) -> Self {
        self.verdict(Verdict::Drop)
    }

    pub fn jump(self, chain: impl Into<String>) -> Self {
        self.verdict(Verdict::Jump(chain.into()))
    }

    fn nat(self, kind: NatKind, ip: IpAddr, port: Option<u16>) -> Self {
        let family = match ip {
            IpAddr::V4(_) => Family::Ip,
            IpAddr::V6(_) => Family::Ip6,
        };
        let mut rule = self.push(Expr::address(Register::R1, ip));
        if let Some(port) = port {
            rule = rule.push(Expr::value(Register::R2, port.to_be_bytes()));
        }
        rule.push(Expr::Nat {
            kind,
            family,
            reg_addr_min: Some(Register::R1),
            reg_addr_max: None,
            reg_proto_min: port.map(|_| Register::R2),
            reg_proto_max: None,
        })
    }

    /// Rewrite the destination to `ip` (and `port`).
    pub fn dnat(self, ip: IpAddr, port: Option<u16>) -> Self {
        self.nat(NatKind::Dnat, ip, port)
    }

    /// Rewrite the source to `ip` (and `port`).
    pub fn snat(self, ip: IpAddr, port: Option<u16>) -> Self {
        self.nat(NatKind::Snat, ip, port)
    }

    pub fn create_with<B: Backend + ?Sized>(&mut self, backend: &B) -> Result<()> {
        tracing::debug!(
            table = %self.table,
            chain = %self.chain,
            exprs = self.exprs.len(),
            "appending rule"
        );
        submit(backend, self, Op::Create)
    }

    /// Delete the rule; it must carry a handle.
    pub fn delete_with<B: Backend + ?Sized>(&mut self, backend: &B) -> Result<()> {
        submit(backend, self, Op::Delete)?;
        self.handle = None;
        Ok(())
    }

    pub fn exprs(&self) -> &[Expr] {
        &self.exprs
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn handle(&self) -> Option<u64> {
        self.handle
    }
}

impl NftObject for Rule {
    fn kind(&self) -> &'static str {
        "rule"
    }

    fn describe(&self) -> String {
        match self.handle {
            Some(handle) => format!("{} {} {} handle {}", self.family, self.table, self.chain, handle),
            None => format!("{} {} {}", self.family, self.table, self.chain),
        }
    }

    fn family(&self) -> Family {
        self.family
    }

    fn new_command(&self) -> u8 {
        msg::NEWRULE
    }

    fn del_command(&self) -> u8 {
        msg::DELRULE
    }

    fn create_flags(&self) -> u16 {
        NLM_F_CREATE | NLM_F_APPEND
    }

    fn handle_attr(&self) -> u16 {
        rule::HANDLE
    }

    fn write_attrs(&self, builder: &mut MessageBuilder, op: Op) -> Result<()> {
        builder.append_attr_str(rule::TABLE, &self.table);
        builder.append_attr_str(rule::CHAIN, &self.chain);

        match op {
            Op::Create => {
                let list = builder.nest_start(rule::EXPRESSIONS);
                for expr in &self.exprs {
                    expr.write(builder);
                }
                builder.nest_end(list);
            }
            Op::Delete => {
                let handle = self.handle.ok_or_else(|| {
                    Error::InvalidState(format!(
                        "rule in {} {} has no handle",
                        self.table, self.chain
                    ))
                })?;
                builder.append_attr_u64_be(rule::HANDLE, handle);
            }
        }
        Ok(())
    }

    fn handle(&self) -> Option<u64> {
        self.handle
    }

    fn set_handle(&mut self, handle: u64) {
        self.handle = Some(handle);
    }
}

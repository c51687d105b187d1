//! Rule expressions.
//!
//! Each [`Expr`] encodes as one `NFTA_LIST_ELEM` holding the expression
//! name and its nested `NFTA_EXPR_DATA`.

use std::net::IpAddr;

use super::Family;
use super::consts::{LIST_ELEM, cmp, data, expr, immediate, meta, nat, payload};
use crate::netlink::builder::MessageBuilder;

/// nf_tables data registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Verdict = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
}

/// Header a payload load reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadBase {
    LinkLayer = 0,
    Network = 1,
    Transport = 2,
}

/// Packet metadata a meta load reads (NFT_META_*).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKey {
    Len = 0,
    Protocol = 1,
    Mark = 3,
    Iif = 4,
    Oif = 5,
    NfProto = 15,
    L4Proto = 16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq = 0,
    Neq = 1,
    Lt = 2,
    Lte = 3,
    Gt = 4,
    Gte = 5,
}

/// Rule verdicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Drop,
    Accept,
    Continue,
    Break,
    Return,
    Jump(String),
    Goto(String),
}

impl Verdict {
    /// NF_* / NFT_* verdict code.
    pub fn code(&self) -> i32 {
        match self {
            Verdict::Drop => 0,
            Verdict::Accept => 1,
            Verdict::Continue => -1,
            Verdict::Break => -2,
            Verdict::Jump(_) => -3,
            Verdict::Goto(_) => -4,
            Verdict::Return => -5,
        }
    }

    fn chain(&self) -> Option<&str> {
        match self {
            Verdict::Jump(chain) | Verdict::Goto(chain) => Some(chain),
            _ => None,
        }
    }
}

/// What an immediate expression loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImmediateData {
    Value(Vec<u8>),
    Verdict(Verdict),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatKind {
    Snat = 0,
    Dnat = 1,
}

/// A single nf_tables expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Load `len` bytes at `offset` of `base` into `dreg`.
    Payload {
        base: PayloadBase,
        offset: u32,
        len: u32,
        dreg: Register,
    },
    /// Load packet metadata into `dreg`.
    Meta { key: MetaKey, dreg: Register },
    /// Compare `sreg` against `data`; a mismatch ends the rule.
    Cmp {
        sreg: Register,
        op: CmpOp,
        data: Vec<u8>,
    },
    Immediate {
        dreg: Register,
        data: ImmediateData,
    },
    /// Rewrite addresses (and optionally ports) from registers.
    Nat {
        kind: NatKind,
        family: Family,
        reg_addr_min: Option<Register>,
        reg_addr_max: Option<Register>,
        reg_proto_min: Option<Register>,
        reg_proto_max: Option<Register>,
    },
}

impl Expr {
    pub fn name(&self) -> &'static str {
        match self {
            Expr::Payload { .. } => "payload",
            Expr::Meta { .. } => "meta",
            Expr::Cmp { .. } => "cmp",
            Expr::Immediate { .. } => "immediate",
            Expr::Nat { .. } => "nat",
        }
    }

    /// Load an immediate value into `dreg`.
    pub fn value(dreg: Register, bytes: impl Into<Vec<u8>>) -> Self {
        Expr::Immediate {
            dreg,
            data: ImmediateData::Value(bytes.into()),
        }
    }

    /// Load the address of `ip` into `dreg`.
    pub fn address(dreg: Register, ip: IpAddr) -> Self {
        let bytes = match ip {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        };
        Self::value(dreg, bytes)
    }

    pub fn verdict(verdict: Verdict) -> Self {
        Expr::Immediate {
            dreg: Register::Verdict,
            data: ImmediateData::Verdict(verdict),
        }
    }

    /// Append this expression as one list element.
    pub(crate) fn write(&self, builder: &mut MessageBuilder) {
        let elem = builder.nest_start(LIST_ELEM);
        builder.append_attr_str(expr::NAME, self.name());
        let body = builder.nest_start(expr::DATA);

        match self {
            Expr::Payload {
                base,
                offset,
                len,
                dreg,
            } => {
                builder.append_attr_u32_be(payload::DREG, *dreg as u32);
                builder.append_attr_u32_be(payload::BASE, *base as u32);
                builder.append_attr_u32_be(payload::OFFSET, *offset);
                builder.append_attr_u32_be(payload::LEN, *len);
            }
            Expr::Meta { key, dreg } => {
                builder.append_attr_u32_be(meta::DREG, *dreg as u32);
                builder.append_attr_u32_be(meta::KEY, *key as u32);
            }
            Expr::Cmp { sreg, op, data: bytes } => {
                builder.append_attr_u32_be(cmp::SREG, *sreg as u32);
                builder.append_attr_u32_be(cmp::OP, *op as u32);
                let value = builder.nest_start(cmp::DATA);
                builder.append_attr(data::VALUE, bytes);
                builder.nest_end(value);
            }
            Expr::Immediate { dreg, data: loaded } => {
                builder.append_attr_u32_be(immediate::DREG, *dreg as u32);
                let outer = builder.nest_start(immediate::DATA);
                match loaded {
                    ImmediateData::Value(bytes) => builder.append_attr(data::VALUE, bytes),
                    ImmediateData::Verdict(verdict) => {
                        let inner = builder.nest_start(data::VERDICT);
                        builder.append_attr_u32_be(data::VERDICT_CODE, verdict.code() as u32);
                        if let Some(chain) = verdict.chain() {
                            builder.append_attr_str(data::VERDICT_CHAIN, chain);
                        }
                        builder.nest_end(inner);
                    }
                }
                builder.nest_end(outer);
            }
            Expr::Nat {
                kind,
                family,
                reg_addr_min,
                reg_addr_max,
                reg_proto_min,
                reg_proto_max,
            } => {
                builder.append_attr_u32_be(nat::TYPE, *kind as u32);
                builder.append_attr_u32_be(nat::FAMILY, family.nfproto() as u32);
                let regs = [
                    (nat::REG_ADDR_MIN, reg_addr_min),
                    (nat::REG_ADDR_MAX, reg_addr_max),
                    (nat::REG_PROTO_MIN, reg_proto_min),
                    (nat::REG_PROTO_MAX, reg_proto_max),
                ];
                for (attr, reg) in regs {
                    if let Some(reg) = reg {
                        builder.append_attr_u32_be(attr, *reg as u32);
                    }
                }
            }
        }

        builder.nest_end(body);
        builder.nest_end(elem);
    }
}

//! nf_tables message types and attribute tags.
//!
//! Integers inside nf_tables attributes are big-endian.

/// nfnetlink subsystem id of nf_tables.
pub const NFNL_SUBSYS_NFTABLES: u8 = 10;

/// Full message type for an nf_tables command.
pub const fn nft_msg_type(cmd: u8) -> u16 {
    ((NFNL_SUBSYS_NFTABLES as u16) << 8) | cmd as u16
}

/// nf_tables commands (NFT_MSG_*).
pub mod msg {
    pub const NEWTABLE: u8 = 0;
    pub const GETTABLE: u8 = 1;
    pub const DELTABLE: u8 = 2;
    pub const NEWCHAIN: u8 = 3;
    pub const GETCHAIN: u8 = 4;
    pub const DELCHAIN: u8 = 5;
    pub const NEWRULE: u8 = 6;
    pub const GETRULE: u8 = 7;
    pub const DELRULE: u8 = 8;
    pub const NEWSET: u8 = 9;
    /// Ruleset generation notification sent after every commit.
    pub const NEWGEN: u8 = 15;
}

/// NFTA_GEN_*
pub mod generation {
    pub const ID: u16 = 1;
    pub const PROC_PID: u16 = 2;
    pub const PROC_NAME: u16 = 3;
}

/// NFTA_TABLE_*
pub mod table {
    pub const NAME: u16 = 1;
    pub const FLAGS: u16 = 2;
    pub const USE: u16 = 3;
    pub const HANDLE: u16 = 4;
}

/// NFTA_CHAIN_*
pub mod chain {
    pub const TABLE: u16 = 1;
    pub const HANDLE: u16 = 2;
    pub const NAME: u16 = 3;
    pub const HOOK: u16 = 4;
    pub const POLICY: u16 = 5;
    pub const USE: u16 = 6;
    pub const TYPE: u16 = 7;

    /// NFTA_HOOK_*
    pub mod hook {
        pub const HOOKNUM: u16 = 1;
        pub const PRIORITY: u16 = 2;
        pub const DEV: u16 = 3;
    }
}

/// NFTA_RULE_*
pub mod rule {
    pub const TABLE: u16 = 1;
    pub const CHAIN: u16 = 2;
    pub const HANDLE: u16 = 3;
    pub const EXPRESSIONS: u16 = 4;
    pub const POSITION: u16 = 6;
}

/// NFTA_LIST_ELEM
pub const LIST_ELEM: u16 = 1;

/// NFTA_EXPR_*
pub mod expr {
    pub const NAME: u16 = 1;
    pub const DATA: u16 = 2;
}

/// NFTA_PAYLOAD_*
pub mod payload {
    pub const DREG: u16 = 1;
    pub const BASE: u16 = 2;
    pub const OFFSET: u16 = 3;
    pub const LEN: u16 = 4;
}

/// NFTA_META_*
pub mod meta {
    pub const DREG: u16 = 1;
    pub const KEY: u16 = 2;
}

/// NFTA_CMP_*
pub mod cmp {
    pub const SREG: u16 = 1;
    pub const OP: u16 = 2;
    pub const DATA: u16 = 3;
}

/// NFTA_IMMEDIATE_*
pub mod immediate {
    pub const DREG: u16 = 1;
    pub const DATA: u16 = 2;
}

/// NFTA_DATA_* and NFTA_VERDICT_*
pub mod data {
    pub const VALUE: u16 = 1;
    pub const VERDICT: u16 = 2;

    pub const VERDICT_CODE: u16 = 1;
    pub const VERDICT_CHAIN: u16 = 2;
}

/// NFTA_NAT_*
pub mod nat {
    pub const TYPE: u16 = 1;
    pub const FAMILY: u16 = 2;
    pub const REG_ADDR_MIN: u16 = 3;
    pub const REG_ADDR_MAX: u16 = 4;
    pub const REG_PROTO_MIN: u16 = 5;
    pub const REG_PROTO_MAX: u16 = 6;
    pub const FLAGS: u16 = 7;
}

/// NFPROTO_*
pub mod nfproto {
    pub const INET: u8 = 1;
    pub const IPV4: u8 = 2;
    pub const ARP: u8 = 3;
    pub const BRIDGE: u8 = 7;
    pub const IPV6: u8 = 10;
}

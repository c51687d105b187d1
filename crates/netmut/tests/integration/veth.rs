//! Veth integration tests.

use netmut::Result;
use netmut::netlink::{LinkCache, OperState, Side};

use crate::common::TestNamespace;

type Veth = netmut::Veth<netmut::SystemBackend>;

#[test]
fn test_veth_pair_addresses() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("veth")?;
    let mut pair = Veth::with_backend(ns.backend(), "v0", "v0p")?;

    let cache = LinkCache::refresh(&ns.backend())?;
    let v0 = cache.lookup("v0").unwrap();
    let v0p = cache.lookup("v0p").unwrap();
    assert_eq!(v0.link(), Some(v0p.ifindex()));

    pair.add_address(Side::Veth, "10.0.0.1/24")?;
    assert!(pair.veth().has_address("10.0.0.1/24"));
    assert!(!pair.peer().has_address("10.0.0.1/24"));

    pair.set_state(Side::Veth, OperState::Up)?;
    pair.set_state(Side::Peer, OperState::Up)?;
    assert_eq!(pair.state(Side::Peer)?, OperState::Up);

    pair.delete()?;
    let cache = LinkCache::refresh(&ns.backend())?;
    assert!(cache.index_of("v0").is_none());
    assert!(cache.index_of("v0p").is_none());

    Ok(())
}

#[test]
fn test_orphan_repair() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("orphan")?;
    ns.exec("ip", &["link", "add", "v1", "type", "dummy"])?;

    let err = Veth::with_backend(ns.backend(), "v1", "v1p").err().unwrap();
    assert!(matches!(err, netmut::Error::VethPairIncomplete { .. }));

    assert_eq!(Veth::remove_orphan(&ns.backend(), "v1", "v1p")?, Some(Side::Veth));
    let pair = Veth::with_backend(ns.backend(), "v1", "v1p")?;
    assert!(pair.exists());

    Ok(())
}

//! Link integration tests.

use netmut::Result;
use netmut::netlink::{LinkCache, LinkKind, LinkOptions, OperState};

use crate::common::TestNamespace;

type Link = netmut::Link<netmut::SystemBackend>;

#[test]
fn test_dummy_lifecycle() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("dummy")?;
    let mut link = Link::with_options(ns.backend(), "eth-test", LinkOptions::new())?;

    assert_eq!(link.state()?, OperState::Down);
    link.set_state(OperState::Up)?;
    assert_eq!(link.state()?, OperState::Up);

    let cache = LinkCache::refresh(&ns.backend())?;
    assert_eq!(cache.lookup("eth-test").and_then(|l| l.kind()), Some("dummy"));

    link.delete()?;
    assert!(!link.exists());
    assert!(LinkCache::refresh(&ns.backend())?.index_of("eth-test").is_none());

    Ok(())
}

#[test]
fn test_link_attributes() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("attrs")?;
    let link = Link::with_options(ns.backend(), "attr0", LinkOptions::new())?;

    link.set_mtu(1400)?;
    assert_eq!(link.mtu()?, Some(1400));

    link.set_tx_queue_length(500)?;
    assert_eq!(link.tx_queue_length()?, Some(500));

    link.set_group(7)?;
    assert_eq!(link.group()?, 7);

    link.set_mac("02:00:00:aa:bb:cc")?;
    assert_eq!(link.mac()?.as_deref(), Some("02:00:00:aa:bb:cc"));

    Ok(())
}

#[test]
fn test_bridge_master() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("bridge")?;
    let bridge = Link::with_options(
        ns.backend(),
        "br-test",
        LinkOptions::new().kind(LinkKind::Bridge),
    )?;
    let port = Link::with_options(ns.backend(), "port0", LinkOptions::new())?;

    port.set_master(&bridge)?;
    assert_eq!(port.master()?, Some(bridge.index()?));

    port.release_master()?;
    assert_eq!(port.master()?, None);

    Ok(())
}

#[test]
fn test_addresses() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("addr")?;
    let mut link = Link::with_options(ns.backend(), "addr0", LinkOptions::new())?;
    link.set_state(OperState::Up)?;

    link.add_address("192.168.100.1/24")?;
    link.add_address("fd00:100::1/64")?;
    assert!(link.has_address("192.168.100.1/24"));
    assert_eq!(link.addresses().count(), 2);

    let shown = ns.exec("ip", &["-o", "addr", "show", "dev", "addr0"])?;
    assert!(shown.contains("192.168.100.1/24"));

    link.remove_address("192.168.100.1/24")?;
    assert!(!link.has_address("192.168.100.1/24"));

    let shown = ns.exec("ip", &["-o", "addr", "show", "dev", "addr0"])?;
    assert!(!shown.contains("192.168.100.1/24"));

    Ok(())
}

#[test]
fn test_lookup_missing_link() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("missing")?;
    let err = Link::with_options(
        ns.backend(),
        "nope0",
        LinkOptions::new().create_if_missing(false),
    )
    .err()
    .unwrap();
    assert!(err.is_not_found());

    Ok(())
}

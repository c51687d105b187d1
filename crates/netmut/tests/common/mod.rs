//! Scratch namespaces for the root-only integration suite.

use netmut::netlink::SystemBackend;
use netmut::{Error, Result};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_ID: AtomicU32 = AtomicU32::new(0);

fn ip(args: &[&str]) -> Result<Output> {
    let output = Command::new("ip")
        .args(args)
        .output()
        .map_err(Error::SocketUnavailable)?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(Error::InvalidMessage(format!(
            "ip {}: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Network namespace that lives as long as the test.
pub struct TestNamespace {
    name: String,
}

impl TestNamespace {
    pub fn new(tag: &str) -> Result<Self> {
        let name = format!(
            "netmut-{}-{}-{}",
            tag,
            std::process::id(),
            NEXT_ID.fetch_add(1, Ordering::Relaxed)
        );
        ip(&["netns", "add", &name])?;
        Ok(Self { name })
    }

    pub fn backend(&self) -> SystemBackend {
        SystemBackend::in_namespace(format!("/var/run/netns/{}", self.name))
    }

    /// Stdout of `cmd args...` run inside the namespace.
    pub fn exec(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let mut argv = vec!["netns", "exec", self.name.as_str(), cmd];
        argv.extend_from_slice(args);
        let output = ip(&argv)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub fn has_nft(&self) -> bool {
        self.exec("nft", &["--version"]).is_ok()
    }
}

impl Drop for TestNamespace {
    fn drop(&mut self) {
        let _ = ip(&["netns", "del", &self.name]);
    }
}

pub fn is_root() -> bool {
    // SAFETY: geteuid cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("skipped: needs CAP_NET_ADMIN (run as root)");
            return Ok(());
        }
    };
}

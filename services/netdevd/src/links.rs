//! Link lookups.
//!
//! The orchestrator asks a [`LinkRegistry`] whether the interface a stacked
//! device sits on exists yet, and whether it carries an address.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use tracing::trace;

/// What is known about a live interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkInfo {
    pub ifindex: u32,
    pub has_address: bool,
}

/// Resolves interface names.
pub trait LinkRegistry: Send + Sync {
    /// `None` while the link does not exist.
    fn resolve(&self, name: &str) -> Option<LinkInfo>;
}

/// Queries the running host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostLinks;

impl LinkRegistry for HostLinks {
    fn resolve(&self, name: &str) -> Option<LinkInfo> {
        let c_name = CString::new(name).ok()?;
        let ifindex = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
        if ifindex == 0 {
            trace!(link = name, "Link not present");
            return None;
        }

        Some(LinkInfo {
            ifindex,
            has_address: has_address(name),
        })
    }
}

/// Whether `name` carries at least one IPv4 or IPv6 address.
fn has_address(name: &str) -> bool {
    let mut addrs: *mut libc::ifaddrs = std::ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut addrs) } != 0 {
        return false;
    }

    let mut found = false;
    let mut cursor = addrs;
    while !cursor.is_null() {
        let ifa = unsafe { &*cursor };
        if !ifa.ifa_addr.is_null() && !ifa.ifa_name.is_null() {
            let family = i32::from(unsafe { (*ifa.ifa_addr).sa_family });
            let ifa_name = unsafe { CStr::from_ptr(ifa.ifa_name) };
            if (family == libc::AF_INET || family == libc::AF_INET6)
                && ifa_name.to_bytes() == name.as_bytes()
            {
                found = true;
                break;
            }
        }
        cursor = ifa.ifa_next;
    }

    unsafe { libc::freeifaddrs(addrs) };
    found
}

/// In-memory links, editable at runtime.
#[derive(Debug, Default)]
pub struct StaticLinks {
    links: RwLock<HashMap<String, LinkInfo>>,
}

impl StaticLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_link(self, name: &str, ifindex: u32, has_address: bool) -> Self {
        self.insert(name, ifindex, has_address);
        self
    }

    pub fn insert(&self, name: &str, ifindex: u32, has_address: bool) {
        self.links
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                name.to_string(),
                LinkInfo {
                    ifindex,
                    has_address,
                },
            );
    }

    pub fn remove(&self, name: &str) {
        self.links
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}

impl LinkRegistry for StaticLinks {
    fn resolve(&self, name: &str) -> Option<LinkInfo> {
        self.links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }
}

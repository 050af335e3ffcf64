//! Protocol constants.
//!
//! Values match `linux/netlink.h`, `linux/rtnetlink.h`, and `linux/if_link.h`.

use crate::attr::AttrKey;

// ============================================================================
// Header
// ============================================================================

/// Size of `struct nlmsghdr`.
pub const NLMSG_HDRLEN: usize = 16;

/// Size of `struct ifinfomsg`.
pub const IFINFOMSG_LEN: usize = 16;

pub const NLMSG_NOOP: u16 = 1;
pub const NLMSG_ERROR: u16 = 2;
pub const NLMSG_DONE: u16 = 3;

pub const RTM_NEWLINK: u16 = 16;

pub const NLM_F_REQUEST: u16 = 0x001;
pub const NLM_F_ACK: u16 = 0x004;
pub const NLM_F_EXCL: u16 = 0x200;
pub const NLM_F_CREATE: u16 = 0x400;

/// Mask that strips the nested/byte-order bits from an attribute type.
pub const NLA_TYPE_MASK: u16 = 0x3fff;

// ============================================================================
// Link attributes (IFLA_*)
// ============================================================================

pub const IFLA_ADDRESS: AttrKey = AttrKey::new(1, "IFLA_ADDRESS");
pub const IFLA_IFNAME: AttrKey = AttrKey::new(3, "IFLA_IFNAME");
pub const IFLA_MTU: AttrKey = AttrKey::new(4, "IFLA_MTU");
pub const IFLA_LINK: AttrKey = AttrKey::new(5, "IFLA_LINK");
pub const IFLA_LINKINFO: AttrKey = AttrKey::new(18, "IFLA_LINKINFO");

pub const IFLA_INFO_KIND: AttrKey = AttrKey::new(1, "IFLA_INFO_KIND");
pub const IFLA_INFO_DATA: AttrKey = AttrKey::new(2, "IFLA_INFO_DATA");

// ============================================================================
// VXLAN attributes (IFLA_VXLAN_*)
// ============================================================================

pub const IFLA_VXLAN_ID: AttrKey = AttrKey::new(1, "IFLA_VXLAN_ID");
pub const IFLA_VXLAN_GROUP: AttrKey = AttrKey::new(2, "IFLA_VXLAN_GROUP");
pub const IFLA_VXLAN_LINK: AttrKey = AttrKey::new(3, "IFLA_VXLAN_LINK");
pub const IFLA_VXLAN_LOCAL: AttrKey = AttrKey::new(4, "IFLA_VXLAN_LOCAL");
pub const IFLA_VXLAN_TTL: AttrKey = AttrKey::new(5, "IFLA_VXLAN_TTL");
pub const IFLA_VXLAN_TOS: AttrKey = AttrKey::new(6, "IFLA_VXLAN_TOS");
pub const IFLA_VXLAN_LEARNING: AttrKey = AttrKey::new(7, "IFLA_VXLAN_LEARNING");
pub const IFLA_VXLAN_AGEING: AttrKey = AttrKey::new(8, "IFLA_VXLAN_AGEING");
pub const IFLA_VXLAN_PROXY: AttrKey = AttrKey::new(11, "IFLA_VXLAN_PROXY");
pub const IFLA_VXLAN_RSC: AttrKey = AttrKey::new(12, "IFLA_VXLAN_RSC");
pub const IFLA_VXLAN_L2MISS: AttrKey = AttrKey::new(13, "IFLA_VXLAN_L2MISS");
pub const IFLA_VXLAN_L3MISS: AttrKey = AttrKey::new(14, "IFLA_VXLAN_L3MISS");
pub const IFLA_VXLAN_GROUP6: AttrKey = AttrKey::new(16, "IFLA_VXLAN_GROUP6");
pub const IFLA_VXLAN_LOCAL6: AttrKey = AttrKey::new(17, "IFLA_VXLAN_LOCAL6");

/// Largest VXLAN network identifier (24 bits).
pub const VXLAN_VID_MAX: u32 = (1 << 24) - 1;

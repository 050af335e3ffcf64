//! # netdevd-rtnl
//!
//! Wire format for the kernel's link-management protocol (rtnetlink).
//!
//! ## Modules
//!
//! - `attr`: attribute keys, typed values, and TLV iteration
//! - `consts`: message types, header flags, and the `IFLA_*` key table
//! - `builder`: single-use request builder with poisoning on the first error
//! - `reply`: acknowledgment/error parsing keyed by sequence number
//! - `socket`: non-blocking `NETLINK_ROUTE` socket driven by tokio (Linux only)
//!
//! ## Message Layout
//!
//! ```text
//! nlmsghdr (16) | ifinfomsg (16) | rtattr TLV | rtattr TLV | ...
//! ```
//!
//! Every TLV is padded to a 4-byte boundary. Integers are in host byte order,
//! addresses in network byte order.

pub mod attr;
pub mod builder;
pub mod consts;
pub mod reply;
#[cfg(target_os = "linux")]
pub mod socket;

pub use attr::{AttrIter, AttrKey, AttrValue, NlAttr};
pub use builder::{EncodeError, MessageBuilder, MessageKind, NestToken, Request, DEFAULT_CAPACITY};
pub use reply::{parse_replies, Errno, Reply, ReplyError, ReplyStatus};
#[cfg(target_os = "linux")]
pub use socket::{RtnlSocket, SocketError};

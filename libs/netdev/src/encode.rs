//! Create-link request pipeline shared by every kind.

use netdevd_rtnl::consts::{
    IFLA_ADDRESS, IFLA_IFNAME, IFLA_INFO_DATA, IFLA_INFO_KIND, IFLA_LINK, IFLA_LINKINFO, IFLA_MTU,
};
use netdevd_rtnl::{AttrValue, MessageBuilder, MessageKind, Request};

use crate::config::NetDevConfig;
use crate::error::BuildError;
use crate::kind::DependencyClass;

/// Build the `RTM_NEWLINK` request for a device.
///
/// ```text
/// IFLA_IFNAME, [IFLA_MTU], [IFLA_ADDRESS], [IFLA_LINK],
/// IFLA_LINKINFO { IFLA_INFO_KIND, [IFLA_INFO_DATA { kind attributes }] }
/// ```
///
/// The sequence number is left at zero for the caller to stamp.
pub fn build_create_request(config: &NetDevConfig, capacity: usize) -> Result<Request, BuildError> {
    let kind = config.kind();
    let link = config.underlying_ifindex();
    let mut builder = MessageBuilder::with_capacity(MessageKind::new_link(), capacity);

    builder.append_string(IFLA_IFNAME, &config.name)?;

    if let Some(mtu) = config.mtu {
        builder.append_u32(IFLA_MTU, mtu)?;
    }

    if let Some(mac) = config.mac {
        builder.append(IFLA_ADDRESS, AttrValue::Bytes(mac.octets().to_vec()))?;
    }

    if kind.dependency_class() != DependencyClass::Independent {
        if let Some(ifindex) = link {
            builder.append_u32(IFLA_LINK, ifindex)?;
        }
    }

    let linkinfo = builder.begin_nested(IFLA_LINKINFO)?;
    builder.append_string(IFLA_INFO_KIND, kind.kind_name())?;
    if kind.has_kind_data() {
        let data = builder.begin_nested(IFLA_INFO_DATA)?;
        kind.encode(config, link, &mut builder)?;
        builder.end_nested(data)?;
    }
    builder.end_nested(linkinfo)?;

    Ok(builder.finish()?)
}

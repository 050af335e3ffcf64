//! VXLAN overlay devices.
//!
//! Configured from the `[VXLAN]` section; stacked on the link named by a
//! `.network` file's `VXLAN=` entry.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use netdevd_rtnl::consts::{
    IFLA_VXLAN_AGEING, IFLA_VXLAN_GROUP, IFLA_VXLAN_GROUP6, IFLA_VXLAN_ID, IFLA_VXLAN_L2MISS,
    IFLA_VXLAN_L3MISS, IFLA_VXLAN_LEARNING, IFLA_VXLAN_LINK, IFLA_VXLAN_LOCAL, IFLA_VXLAN_LOCAL6,
    IFLA_VXLAN_PROXY, IFLA_VXLAN_RSC, IFLA_VXLAN_TOS, IFLA_VXLAN_TTL, VXLAN_VID_MAX,
};
use netdevd_rtnl::MessageBuilder;

use crate::config::{NetDevConfig, VerifyContext};
use crate::error::{BuildError, VerifyError};
use crate::field::{
    assign_address, parse_bool, parse_timespan, parse_u32, parse_u8, FieldError, FieldSpec,
};
use crate::kind::{DependencyClass, KindConfig, NetDevKind};

/// VXLAN-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VxlanConfig {
    /// Network identifier; `None` until `Id=` is assigned.
    pub id: Option<u32>,
    /// Multicast group or unicast remote.
    pub group: Option<IpAddr>,
    pub local: Option<IpAddr>,
    /// 0 leaves the kernel default.
    pub ttl: u8,
    /// 0 leaves the kernel default.
    pub tos: u8,
    pub learning: bool,
    pub route_short_circuit: bool,
    pub arp_proxy: bool,
    pub l2miss: bool,
    pub l3miss: bool,
    /// Forwarding database entry lifetime; zero leaves the kernel default.
    pub fdb_ageing: Duration,
}

impl Default for VxlanConfig {
    fn default() -> Self {
        Self {
            id: None,
            group: None,
            local: None,
            ttl: 0,
            tos: 0,
            learning: true,
            route_short_circuit: false,
            arp_proxy: false,
            l2miss: false,
            l3miss: false,
            fdb_ageing: Duration::ZERO,
        }
    }
}

const SECTIONS: &[&str] = &["Match", "NetDev", "VXLAN"];

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("VXLAN", "Id", parse_id),
    FieldSpec::new("VXLAN", "Group", parse_group),
    FieldSpec::new("VXLAN", "Local", parse_local),
    FieldSpec::new("VXLAN", "TTL", parse_ttl),
    FieldSpec::new("VXLAN", "TOS", parse_tos),
    FieldSpec::new("VXLAN", "MacLearning", parse_learning),
    FieldSpec::new("VXLAN", "FDBAgeingSec", parse_fdb_ageing),
    FieldSpec::new("VXLAN", "ARPProxy", parse_arp_proxy),
    FieldSpec::new("VXLAN", "L2MissNotification", parse_l2miss),
    FieldSpec::new("VXLAN", "L3MissNotification", parse_l3miss),
    FieldSpec::new("VXLAN", "RouteShortCircuit", parse_route_short_circuit),
];

fn vxlan(config: &mut NetDevConfig) -> Result<&mut VxlanConfig, FieldError> {
    Ok(config.kind_config.as_vxlan_mut()?)
}

fn parse_id(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    let id = parse_u32(value)?;
    vxlan(config)?.id = Some(id);
    Ok(())
}

fn parse_group(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    let vxlan = config.kind_config.as_vxlan_mut()?;
    assign_address(&mut config.address_family, &mut vxlan.group, value)
}

fn parse_local(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    let vxlan = config.kind_config.as_vxlan_mut()?;
    assign_address(&mut config.address_family, &mut vxlan.local, value)
}

fn parse_ttl(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    let ttl = parse_u8(value)?;
    vxlan(config)?.ttl = ttl;
    Ok(())
}

fn parse_tos(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    let tos = parse_u8(value)?;
    vxlan(config)?.tos = tos;
    Ok(())
}

fn parse_learning(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    let learning = parse_bool(value)?;
    vxlan(config)?.learning = learning;
    Ok(())
}

fn parse_fdb_ageing(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    let ageing = parse_timespan(value)?;
    if u32::try_from(ageing.as_secs()).is_err() {
        return Err(FieldError::Invalid {
            expected: "ageing time of at most 4294967295 seconds",
        });
    }
    vxlan(config)?.fdb_ageing = ageing;
    Ok(())
}

fn parse_arp_proxy(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    let arp_proxy = parse_bool(value)?;
    vxlan(config)?.arp_proxy = arp_proxy;
    Ok(())
}

fn parse_l2miss(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    let l2miss = parse_bool(value)?;
    vxlan(config)?.l2miss = l2miss;
    Ok(())
}

fn parse_l3miss(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    let l3miss = parse_bool(value)?;
    vxlan(config)?.l3miss = l3miss;
    Ok(())
}

fn parse_route_short_circuit(config: &mut NetDevConfig, value: &str) -> Result<(), FieldError> {
    let rsc = parse_bool(value)?;
    vxlan(config)?.route_short_circuit = rsc;
    Ok(())
}

/// The `vxlan` kind.
#[derive(Debug, Default)]
pub struct Vxlan;

impl NetDevKind for Vxlan {
    fn kind_name(&self) -> &'static str {
        "vxlan"
    }

    fn sections(&self) -> &'static [&'static str] {
        SECTIONS
    }

    fn schema(&self) -> &'static [FieldSpec] {
        FIELDS
    }

    fn dependency_class(&self) -> DependencyClass {
        DependencyClass::StackedOnLink
    }

    fn default_init(&self) -> KindConfig {
        KindConfig::Vxlan(VxlanConfig::default())
    }

    fn verify(&self, config: &NetDevConfig, _ctx: &VerifyContext) -> Result<(), VerifyError> {
        match config.kind_config.as_vxlan()?.id {
            Some(id) if id <= VXLAN_VID_MAX => Ok(()),
            _ => Err(VerifyError::InvalidId {
                kind: "VXLAN",
                file: config.source.clone(),
            }),
        }
    }

    fn encode(
        &self,
        config: &NetDevConfig,
        link: Option<u32>,
        builder: &mut MessageBuilder,
    ) -> Result<(), BuildError> {
        let vxlan = config.kind_config.as_vxlan()?;
        let link = link.ok_or_else(|| BuildError::MissingLink {
            device: config.name.clone(),
        })?;

        if let Some(id) = vxlan.id.filter(|id| *id <= VXLAN_VID_MAX) {
            builder.append_u32(IFLA_VXLAN_ID, id)?;
        }

        match vxlan.group {
            Some(IpAddr::V4(addr)) => builder.append(IFLA_VXLAN_GROUP, addr)?,
            Some(IpAddr::V6(addr)) => builder.append(IFLA_VXLAN_GROUP6, addr)?,
            None => builder.append(IFLA_VXLAN_GROUP, Ipv4Addr::UNSPECIFIED)?,
        }

        match vxlan.local {
            Some(IpAddr::V4(addr)) => builder.append(IFLA_VXLAN_LOCAL, addr)?,
            Some(IpAddr::V6(addr)) => builder.append(IFLA_VXLAN_LOCAL6, addr)?,
            None => {}
        }

        builder.append_u32(IFLA_VXLAN_LINK, link)?;

        if vxlan.ttl != 0 {
            builder.append_u8(IFLA_VXLAN_TTL, vxlan.ttl)?;
        }

        if vxlan.tos != 0 {
            builder.append_u8(IFLA_VXLAN_TOS, vxlan.tos)?;
        }

        builder.append_flag(IFLA_VXLAN_LEARNING, vxlan.learning)?;
        builder.append_flag(IFLA_VXLAN_RSC, vxlan.route_short_circuit)?;
        builder.append_flag(IFLA_VXLAN_PROXY, vxlan.arp_proxy)?;
        builder.append_flag(IFLA_VXLAN_L2MISS, vxlan.l2miss)?;
        builder.append_flag(IFLA_VXLAN_L3MISS, vxlan.l3miss)?;

        if !vxlan.fdb_ageing.is_zero() {
            // FDBAgeingSec= is bounded on parse; direct assignments saturate
            let secs = u32::try_from(vxlan.fdb_ageing.as_secs()).unwrap_or(u32::MAX);
            builder.append_u32(IFLA_VXLAN_AGEING, secs)?;
        }

        Ok(())
    }
}

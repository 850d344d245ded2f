//! Conflict detection for prospective customer allocations.
//!
//! Pure functions over a candidate and the current set of allocations.
//! Nothing here reads or writes storage.

use ipnet::IpNet;

use crate::models::CustomerAllocation;

/// Outcome of validating a candidate allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clear,
    Conflict(String),
}

impl Verdict {
    pub fn message(&self) -> Option<&str> {
        match self {
            Verdict::Clear => None,
            Verdict::Conflict(msg) => Some(msg),
        }
    }
}

type Check = fn(&CustomerAllocation, &CustomerAllocation) -> Option<String>;

// Most specific first
const CHECKS: [Check; 7] = [
    vlan_conflict,
    pseudowire_conflict,
    circuit_conflict,
    irb_v4_conflict,
    irb_v6_conflict,
    lan_v4_conflict,
    lan_v6_conflict,
];

/// Validate a candidate against existing allocations, reporting the first violation.
/// A record with the candidate's own name is its prior version and is skipped.
pub fn validate(candidate: &CustomerAllocation, existing: &[CustomerAllocation]) -> Verdict {
    match conflicts(candidate, existing).next() {
        Some(msg) => Verdict::Conflict(msg),
        None => Verdict::Clear,
    }
}

/// Every violation, in the same order `validate` would report them one at a time
pub fn all_conflicts(candidate: &CustomerAllocation, existing: &[CustomerAllocation]) -> Vec<String> {
    conflicts(candidate, existing).collect()
}

fn conflicts<'a>(
    candidate: &'a CustomerAllocation,
    existing: &'a [CustomerAllocation],
) -> impl Iterator<Item = String> + 'a {
    CHECKS.iter().flat_map(move |check| {
        existing
            .iter()
            .filter(move |other| other.name != candidate.name)
            .filter_map(move |other| check(candidate, other))
    })
}

fn same_port(a: &CustomerAllocation, b: &CustomerAllocation) -> bool {
    a.access_device_name == b.access_device_name && a.access_interface == b.access_interface
}

fn vlan_conflict(c: &CustomerAllocation, other: &CustomerAllocation) -> Option<String> {
    (same_port(c, other) && c.vlan_id == other.vlan_id).then(|| {
        format!(
            "Conflict: VLAN ID {} on {} {} is already in use by customer {}.",
            c.vlan_id, c.access_device_name, c.access_interface, other.name
        )
    })
}

fn pseudowire_conflict(c: &CustomerAllocation, other: &CustomerAllocation) -> Option<String> {
    if c.pseudowire_id != other.pseudowire_id {
        return None;
    }
    let device = if c.access_device_name == other.access_device_name {
        &c.access_device_name
    } else if c.pe_device_name == other.pe_device_name {
        &c.pe_device_name
    } else {
        return None;
    };
    Some(format!(
        "Conflict: Pseudowire ID {} is already in use by customer {} on {}.",
        c.pseudowire_id, other.name, device
    ))
}

fn circuit_conflict(c: &CustomerAllocation, other: &CustomerAllocation) -> Option<String> {
    (same_port(c, other) && c.circuit_id == other.circuit_id).then(|| {
        format!(
            "Conflict: Circuit ID {} on {} {} is already in use by customer {}.",
            c.circuit_id, c.access_device_name, c.access_interface, other.name
        )
    })
}

fn irb_v4_conflict(c: &CustomerAllocation, other: &CustomerAllocation) -> Option<String> {
    prefix_conflict("IRB IPv4 prefix", c.irb_v4(), other.irb_v4(), &other.name)
}

fn irb_v6_conflict(c: &CustomerAllocation, other: &CustomerAllocation) -> Option<String> {
    prefix_conflict("IRB IPv6 prefix", c.irb_v6(), other.irb_v6(), &other.name)
}

fn lan_v4_conflict(c: &CustomerAllocation, other: &CustomerAllocation) -> Option<String> {
    prefix_conflict("LAN IPv4 route", c.lan_v4(), other.lan_v4(), &other.name)
}

fn lan_v6_conflict(c: &CustomerAllocation, other: &CustomerAllocation) -> Option<String> {
    prefix_conflict("LAN IPv6 route", c.lan_v6(), other.lan_v6(), &other.name)
}

/// Relationship between two CIDR blocks of the same family
#[derive(Debug, PartialEq, Eq)]
enum Overlap {
    Identical,
    Partial,
    Disjoint,
}

fn overlap(a: &IpNet, b: &IpNet) -> Overlap {
    if a.trunc() == b.trunc() {
        Overlap::Identical
    } else if a.contains(b) || b.contains(a) {
        Overlap::Partial
    } else {
        Overlap::Disjoint
    }
}

fn prefix_conflict(
    label: &str,
    candidate: Option<IpNet>,
    other: Option<IpNet>,
    owner: &str,
) -> Option<String> {
    let (candidate, other) = (candidate?, other?);
    match overlap(&candidate, &other) {
        Overlap::Identical => Some(format!(
            "Conflict: {} {} is already in use by customer {}.",
            label, candidate, owner
        )),
        Overlap::Partial => Some(format!(
            "Conflict: {} {} overlaps with {} owned by customer {}.",
            label, candidate, other, owner
        )),
        Overlap::Disjoint => None,
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `VlanEngine`: port VLAN membership, tagging policy, and ingress/egress tag processing (§4.5).

use crate::PortId;
use concurrency::{Arc, RwLock};
use net::vlan::Vid;
use std::collections::{HashMap, HashSet};
use tracectl::LevelFilter;
use tracectl::trace_target;

trace_target!(LevelFilter::INFO, &["l2", "vlan"]);

/// What to do with a frame's VLAN tag on egress out of a given port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAction {
    /// Send the frame untagged.
    Untag,
    /// Send the frame tagged with its VLAN id.
    Tag,
}

/// Per-VLAN metadata.
#[derive(Debug, Clone)]
pub struct VlanInfo {
    /// The VLAN id.
    pub vid: Vid,
    /// Human-readable name.
    pub name: String,
}

/// Errors raised by `VlanEngine` operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VlanError {
    /// The referenced VLAN does not exist.
    #[error("vlan {0} does not exist")]
    NoSuchVlan(Vid),
    /// The VLAN already exists.
    #[error("vlan {0} already exists")]
    VlanAlreadyExists(Vid),
    /// The port is not a member of the VLAN.
    #[error("port {port} is not a member of vlan {vlan}")]
    NotMember {
        /// The port queried.
        port: PortId,
        /// The VLAN queried.
        vlan: Vid,
    },
    /// The frame's tag (or lack of one) does not match the port's admission policy.
    #[error("tagged/untagged frame rejected by port {0} admission policy")]
    AdmissionDenied(PortId),
    /// VLAN 1 is the default VLAN and cannot be deleted.
    #[error("vlan {0} is protected and cannot be deleted")]
    ProtectedVlan(Vid),
}

#[derive(Debug, Clone)]
struct PortVlanConfig {
    native_vlan: Option<Vid>,
    allowed: HashSet<Vid>,
    tagged: HashSet<Vid>,
    accept_untagged: bool,
}

impl Default for PortVlanConfig {
    fn default() -> Self {
        Self {
            native_vlan: None,
            allowed: HashSet::new(),
            tagged: HashSet::new(),
            accept_untagged: true,
        }
    }
}

struct Inner {
    vlans: HashMap<Vid, VlanInfo>,
    ports: HashMap<PortId, PortVlanConfig>,
}

type Callback = Box<dyn FnMut(Vid, bool) + Send>;

/// Engine governing VLAN membership and ingress/egress tagging decisions. Membership state is
/// guarded by one lock; the event callback lives behind a separate lock so it always fires
/// after the membership lock has been released.
pub struct VlanEngine {
    inner: Arc<RwLock<Inner>>,
    callback: Arc<concurrency::Mutex<Option<Callback>>>,
}

impl Default for VlanEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl VlanEngine {
    /// Create an engine with no VLANs and no ports configured.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                vlans: HashMap::new(),
                ports: HashMap::new(),
            })),
            callback: Arc::new(concurrency::Mutex::new(None)),
        }
    }

    /// Register the callback fired on VLAN create (`true`) / delete (`false`).
    pub fn register_callback<F>(&self, cb: F)
    where
        F: FnMut(Vid, bool) + Send + 'static,
    {
        *self.callback.lock() = Some(Box::new(cb));
    }

    fn fire(&self, vid: Vid, added: bool) {
        if let Some(cb) = self.callback.lock().as_mut() {
            cb(vid, added);
        }
    }

    /// Create a new VLAN.
    ///
    /// # Errors
    ///
    /// Returns [`VlanError::VlanAlreadyExists`] if `vid` is already defined.
    pub fn create_vlan(&self, vid: Vid, name: impl Into<String>) -> Result<(), VlanError> {
        {
            let mut inner = self.inner.write();
            if inner.vlans.contains_key(&vid) {
                return Err(VlanError::VlanAlreadyExists(vid));
            }
            inner.vlans.insert(vid, VlanInfo { vid, name: name.into() });
        }
        self.fire(vid, true);
        Ok(())
    }

    /// Delete a VLAN, evicting it from every port's membership set.
    ///
    /// # Errors
    ///
    /// Returns [`VlanError::ProtectedVlan`] if `vid` is VLAN 1, the default VLAN every port is
    /// admitted to at boot. Returns [`VlanError::NoSuchVlan`] if `vid` is not defined.
    pub fn delete_vlan(&self, vid: Vid) -> Result<(), VlanError> {
        if vid == Vid::MIN {
            return Err(VlanError::ProtectedVlan(vid));
        }
        {
            let mut inner = self.inner.write();
            if inner.vlans.remove(&vid).is_none() {
                return Err(VlanError::NoSuchVlan(vid));
            }
            for cfg in inner.ports.values_mut() {
                cfg.allowed.remove(&vid);
                cfg.tagged.remove(&vid);
                if cfg.native_vlan == Some(vid) {
                    cfg.native_vlan = None;
                }
            }
        }
        self.fire(vid, false);
        Ok(())
    }

    /// Add `port` to `vid`'s membership, tagged or untagged per `tag_action`.
    ///
    /// # Errors
    ///
    /// Returns [`VlanError::NoSuchVlan`] if `vid` is not defined.
    pub fn add_port(&self, port: PortId, vid: Vid, tag_action: TagAction) -> Result<(), VlanError> {
        let mut inner = self.inner.write();
        if !inner.vlans.contains_key(&vid) {
            return Err(VlanError::NoSuchVlan(vid));
        }
        let cfg = inner.ports.entry(port).or_default();
        cfg.allowed.insert(vid);
        match tag_action {
            TagAction::Tag => {
                cfg.tagged.insert(vid);
            }
            TagAction::Untag => {
                cfg.tagged.remove(&vid);
                cfg.native_vlan = Some(vid);
            }
        }
        Ok(())
    }

    /// Remove `port` from `vid`'s membership.
    pub fn remove_port(&self, port: PortId, vid: Vid) {
        let mut inner = self.inner.write();
        if let Some(cfg) = inner.ports.get_mut(&port) {
            cfg.allowed.remove(&vid);
            cfg.tagged.remove(&vid);
            if cfg.native_vlan == Some(vid) {
                cfg.native_vlan = None;
            }
        }
    }

    /// Set whether `port` accepts untagged frames, classifying them onto its native VLAN.
    pub fn set_accept_untagged(&self, port: PortId, accept: bool) {
        self.inner.write().ports.entry(port).or_default().accept_untagged = accept;
    }

    /// Classify an ingress frame, returning the VLAN it belongs to.
    ///
    /// `tag` is the 802.1Q vlan id present on the wire, if any.
    ///
    /// # Errors
    ///
    /// Returns [`VlanError::AdmissionDenied`] if the port rejects untagged frames and `tag` is
    /// `None`, or if `tag` is `Some` but the port is not a member of that VLAN.
    pub fn process_ingress(&self, port: PortId, tag: Option<Vid>) -> Result<Vid, VlanError> {
        let inner = self.inner.read();
        let cfg = inner.ports.get(&port);
        match tag {
            Some(vid) => {
                let is_member = cfg.is_some_and(|c| c.allowed.contains(&vid));
                if is_member {
                    Ok(vid)
                } else {
                    Err(VlanError::AdmissionDenied(port))
                }
            }
            None => {
                let cfg = cfg.ok_or(VlanError::AdmissionDenied(port))?;
                if !cfg.accept_untagged {
                    return Err(VlanError::AdmissionDenied(port));
                }
                cfg.native_vlan.ok_or(VlanError::AdmissionDenied(port))
            }
        }
    }

    /// Decide how to emit a frame classified on `vid` out of `port`: whether to tag it, and
    /// whether the port may carry it at all.
    ///
    /// # Errors
    ///
    /// Returns [`VlanError::NotMember`] if `port` is not a member of `vid`.
    pub fn process_egress(&self, port: PortId, vid: Vid) -> Result<TagAction, VlanError> {
        let inner = self.inner.read();
        let cfg = inner
            .ports
            .get(&port)
            .filter(|c| c.allowed.contains(&vid))
            .ok_or(VlanError::NotMember { port, vlan: vid })?;
        if cfg.tagged.contains(&vid) {
            Ok(TagAction::Tag)
        } else {
            Ok(TagAction::Untag)
        }
    }

    /// True if `port` is a member of `vid`.
    #[must_use]
    pub fn is_member(&self, port: PortId, vid: Vid) -> bool {
        self.inner
            .read()
            .ports
            .get(&port)
            .is_some_and(|c| c.allowed.contains(&vid))
    }

    /// All ports currently a member of `vid`.
    #[must_use]
    pub fn members(&self, vid: Vid) -> Vec<PortId> {
        self.inner
            .read()
            .ports
            .iter()
            .filter(|(_, cfg)| cfg.allowed.contains(&vid))
            .map(|(port, _)| *port)
            .collect()
    }

    /// True if `vid` has been created.
    #[must_use]
    pub fn vlan_exists(&self, vid: Vid) -> bool {
        self.inner.read().vlans.contains_key(&vid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vid(n: u16) -> Vid {
        Vid::new(n).unwrap()
    }

    #[test]
    fn create_and_delete_vlan() {
        let engine = VlanEngine::new();
        engine.create_vlan(vid(10), "ten").unwrap();
        assert!(engine.vlan_exists(vid(10)));
        engine.delete_vlan(vid(10)).unwrap();
        assert!(!engine.vlan_exists(vid(10)));
    }

    #[test]
    fn deleting_vlan_1_is_rejected() {
        let engine = VlanEngine::new();
        engine.create_vlan(Vid::MIN, "default").unwrap();
        assert!(matches!(engine.delete_vlan(Vid::MIN), Err(VlanError::ProtectedVlan(_))));
        assert!(engine.vlan_exists(Vid::MIN));
    }

    #[test]
    fn create_duplicate_vlan_errors() {
        let engine = VlanEngine::new();
        engine.create_vlan(vid(10), "ten").unwrap();
        assert!(matches!(
            engine.create_vlan(vid(10), "ten-again"),
            Err(VlanError::VlanAlreadyExists(_))
        ));
    }

    #[test]
    fn untagged_port_classifies_to_native_vlan() {
        let engine = VlanEngine::new();
        engine.create_vlan(vid(10), "ten").unwrap();
        engine.add_port(1, vid(10), TagAction::Untag).unwrap();
        assert_eq!(engine.process_ingress(1, None).unwrap(), vid(10));
    }

    #[test]
    fn tagged_frame_on_nonmember_port_is_denied() {
        let engine = VlanEngine::new();
        engine.create_vlan(vid(10), "ten").unwrap();
        assert!(matches!(
            engine.process_ingress(1, Some(vid(10))),
            Err(VlanError::AdmissionDenied(_))
        ));
    }

    #[test]
    fn untagged_frame_denied_when_port_rejects_untagged() {
        let engine = VlanEngine::new();
        engine.create_vlan(vid(10), "ten").unwrap();
        engine.add_port(1, vid(10), TagAction::Untag).unwrap();
        engine.set_accept_untagged(1, false);
        assert!(matches!(
            engine.process_ingress(1, None),
            Err(VlanError::AdmissionDenied(_))
        ));
    }

    #[test]
    fn egress_tag_action_matches_membership_kind() {
        let engine = VlanEngine::new();
        engine.create_vlan(vid(10), "ten").unwrap();
        engine.create_vlan(vid(20), "twenty").unwrap();
        engine.add_port(1, vid(10), TagAction::Untag).unwrap();
        engine.add_port(1, vid(20), TagAction::Tag).unwrap();
        assert_eq!(engine.process_egress(1, vid(10)).unwrap(), TagAction::Untag);
        assert_eq!(engine.process_egress(1, vid(20)).unwrap(), TagAction::Tag);
    }

    #[test]
    fn egress_on_nonmember_port_errors() {
        let engine = VlanEngine::new();
        engine.create_vlan(vid(10), "ten").unwrap();
        assert!(matches!(
            engine.process_egress(1, vid(10)),
            Err(VlanError::NotMember { .. })
        ));
    }

    #[test]
    fn delete_vlan_evicts_port_membership() {
        let engine = VlanEngine::new();
        engine.create_vlan(vid(10), "ten").unwrap();
        engine.add_port(1, vid(10), TagAction::Untag).unwrap();
        engine.delete_vlan(vid(10)).unwrap();
        assert!(!engine.is_member(1, vid(10)));
    }

    #[test]
    fn members_lists_all_ports_in_vlan() {
        let engine = VlanEngine::new();
        engine.create_vlan(vid(10), "ten").unwrap();
        engine.add_port(1, vid(10), TagAction::Tag).unwrap();
        engine.add_port(2, vid(10), TagAction::Tag).unwrap();
        let mut members = engine.members(vid(10));
        members.sort_unstable();
        assert_eq!(members, vec![1, 2]);
    }
}

//! ---
//! gpm_section: "02-power-management"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Power-transition orchestration and client-object replay."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::rpc::{AllocRequest, ClassId, Handle};

/// Category of a tracked client object. Parentage runs root -> device -> subdevice ->
/// display objects, which fixes the order objects can be re-created in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SlotKind {
    Root,
    Device,
    Subdevice,
    Display,
    DisplaySoftware,
}

impl SlotKind {
    /// Kinds stored in arrays indexed by client, in per-index replay order.
    pub const PER_CLIENT: [SlotKind; 3] = [SlotKind::Root, SlotKind::Device, SlotKind::Subdevice];
    /// One-slot kinds, replayed after every per-client index.
    pub const SINGLETONS: [SlotKind; 2] = [SlotKind::Display, SlotKind::DisplaySoftware];

    pub const fn is_singleton(self) -> bool {
        matches!(self, SlotKind::Display | SlotKind::DisplaySoftware)
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Descriptor of a firmware-side object, enough to allocate it again.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteObject {
    pub client: Handle,
    pub parent: Handle,
    pub object: Handle,
    pub class: ClassId,
    pub params: Bytes,
}

impl RemoteObject {
    pub fn alloc_request(&self) -> AllocRequest<'_> {
        AllocRequest {
            client: self.client,
            parent: self.parent,
            object: self.object,
            class: self.class,
            params: &self.params,
        }
    }
}

/// Slot in the registry. The descriptor is only meaningful while `valid` is set.
#[derive(Debug, Clone, Default)]
pub struct ClientSlot {
    valid: bool,
    object: RemoteObject,
}

impl ClientSlot {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn object(&self) -> Option<&RemoteObject> {
        self.valid.then_some(&self.object)
    }

    pub(crate) fn occupy(&mut self, object: RemoteObject) {
        self.object = object;
        self.valid = true;
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
    }
}

/// Fixed-capacity run of slots of one kind. Singletons are arrays of one.
#[derive(Debug, Clone)]
pub struct SlotArray {
    kind: SlotKind,
    slots: Box<[ClientSlot]>,
}

impl SlotArray {
    pub fn new(kind: SlotKind, capacity: usize) -> Self {
        let capacity = if kind.is_singleton() { 1 } else { capacity };
        Self {
            kind,
            slots: vec![ClientSlot::default(); capacity].into_boxed_slice(),
        }
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, index: usize) -> Option<&ClientSlot> {
        self.slots.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut ClientSlot> {
        self.slots.get_mut(index)
    }

    pub fn valid_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.valid).count()
    }

    pub fn iter_valid(&self) -> impl Iterator<Item = (usize, &RemoteObject)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.object().map(|object| (index, object)))
    }

    pub(crate) fn invalidate_all(&mut self) {
        self.slots.iter_mut().for_each(ClientSlot::invalidate);
    }
}

/// Serialisable view of one valid slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub kind: SlotKind,
    pub index: usize,
    pub client: Handle,
    pub parent: Handle,
    pub object: Handle,
    pub class: ClassId,
    pub params_len: usize,
}

impl SlotSnapshot {
    pub(crate) fn new(kind: SlotKind, index: usize, object: &RemoteObject) -> Self {
        Self {
            kind,
            index,
            client: object.client,
            parent: object.parent,
            object: object.object,
            class: object.class,
            params_len: object.params.len(),
        }
    }
}

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use xenrpc_transport::{wire_enum, wire_record, Invoke};

use crate::api::{VbdRef, VmRef};
use crate::{Method, Release, Result, Session};

pub const CREATE: Method = Method::new("VM.create", Release::Rio);
pub const DESTROY: Method = Method::new("VM.destroy", Release::Rio);
pub const GET_RECORD: Method = Method::new("VM.get_record", Release::Rio);
pub const GET_ALL: Method = Method::new("VM.get_all", Release::Rio);
pub const GET_ALL_RECORDS: Method = Method::new("VM.get_all_records", Release::Rio);
pub const GET_BY_UUID: Method = Method::new("VM.get_by_uuid", Release::Rio);
pub const GET_BY_NAME_LABEL: Method = Method::new("VM.get_by_name_label", Release::Rio);
pub const GET_NAME_LABEL: Method = Method::new("VM.get_name_label", Release::Rio);
pub const SET_NAME_LABEL: Method = Method::new("VM.set_name_label", Release::Rio);
pub const GET_POWER_STATE: Method = Method::new("VM.get_power_state", Release::Rio);
pub const GET_VBDS: Method = Method::new("VM.get_VBDs", Release::Rio);

wire_enum! {
    pub enum VmPowerState {
        Halted => "Halted",
        Paused => "Paused",
        Running => "Running",
        Suspended => "Suspended",
    }
}

wire_record! {
    /// A virtual machine or template
    pub struct VmRecord {
        pub uuid: String => "uuid",
        pub name_label: String => "name_label",
        pub name_description: String => "name_description",
        pub power_state: VmPowerState => "power_state",
        pub is_a_template: bool => "is_a_template",
        pub memory_static_max: i64 => "memory_static_max",
        pub vcpus_max: i64 => "VCPUs_max",
        pub vbds: Vec<VbdRef> => "VBDs",
        pub tags: Vec<String> => "tags",
        pub other_config: BTreeMap<String, String> => "other_config",
        /// When the VM was snapshotted, the epoch for VMs which are not snapshots
        pub snapshot_time: DateTime<Utc> => "snapshot_time",
    }
}

pub struct Vms<'a, T> {
    session: &'a Session<T>,
}

impl<'a, T> Vms<'a, T> {
    pub(crate) fn new(session: &'a Session<T>) -> Self {
        Self { session }
    }
}

impl<T: Invoke> Vms<'_, T> {
    /// Creates a VM from `record`, server-managed fields are ignored
    pub async fn create(&self, record: &VmRecord) -> Result<VmRef> {
        self.session.call(CREATE, (record,)).await
    }

    pub async fn destroy(&self, vm: &VmRef) -> Result<()> {
        self.session.call(DESTROY, (vm,)).await
    }

    pub async fn get_record(&self, vm: &VmRef) -> Result<VmRecord> {
        self.session.call(GET_RECORD, (vm,)).await
    }

    pub async fn get_all(&self) -> Result<Vec<VmRef>> {
        self.session.call(GET_ALL, ()).await
    }

    pub async fn get_all_records(&self) -> Result<HashMap<VmRef, VmRecord>> {
        self.session.call(GET_ALL_RECORDS, ()).await
    }

    pub async fn get_by_uuid(&self, uuid: &str) -> Result<VmRef> {
        self.session.call(GET_BY_UUID, (uuid,)).await
    }

    pub async fn get_by_name_label(&self, label: &str) -> Result<Vec<VmRef>> {
        self.session.call(GET_BY_NAME_LABEL, (label,)).await
    }

    pub async fn get_name_label(&self, vm: &VmRef) -> Result<String> {
        self.session.call(GET_NAME_LABEL, (vm,)).await
    }

    pub async fn set_name_label(&self, vm: &VmRef, label: &str) -> Result<()> {
        self.session.call(SET_NAME_LABEL, (vm, label)).await
    }

    pub async fn get_power_state(&self, vm: &VmRef) -> Result<VmPowerState> {
        self.session.call(GET_POWER_STATE, (vm,)).await
    }

    pub async fn get_vbds(&self, vm: &VmRef) -> Result<Vec<VbdRef>> {
        self.session.call(GET_VBDS, (vm,)).await
    }
}

use std::collections::{BTreeMap, HashMap};

use xenrpc_transport::{wire_enum, wire_record, Invoke};

use crate::api::{VbdRef, VdiRef, VmRef};
use crate::task::TaskHandle;
use crate::{Method, Release, Result, Session};

pub const CREATE: Method = Method::new("VBD.create", Release::Rio);
pub const DESTROY: Method = Method::new("VBD.destroy", Release::Rio);
pub const GET_RECORD: Method = Method::new("VBD.get_record", Release::Rio);
pub const GET_ALL_RECORDS: Method = Method::new("VBD.get_all_records", Release::Rio);
pub const GET_CURRENTLY_ATTACHED: Method = Method::new("VBD.get_currently_attached", Release::Rio);
pub const GET_VM: Method = Method::new("VBD.get_VM", Release::Rio);
pub const PLUG: Method = Method::new("VBD.plug", Release::Rio);
pub const UNPLUG: Method = Method::new("VBD.unplug", Release::Rio);
pub const INSERT: Method = Method::new("VBD.insert", Release::Rio);
pub const EJECT: Method = Method::new("VBD.eject", Release::Rio);

wire_enum! {
    pub enum VbdMode {
        ReadOnly => "RO",
        ReadWrite => "RW",
    }
}

wire_enum! {
    pub enum VbdType {
        Cd => "CD",
        Disk => "Disk",
        Floppy => "Floppy",
    }
}

wire_record! {
    /// A virtual block device, connecting a VM to a VDI
    pub struct VbdRecord {
        pub uuid: String => "uuid",
        pub vm: VmRef => "VM",
        /// Null for an empty CD drive
        pub vdi: VdiRef => "VDI",
        pub device: String => "device",
        pub userdevice: String => "userdevice",
        pub bootable: bool => "bootable",
        pub mode: VbdMode => "mode",
        pub r#type: VbdType => "type",
        pub unpluggable: bool => "unpluggable",
        pub empty: bool => "empty",
        pub currently_attached: bool => "currently_attached",
        pub other_config: BTreeMap<String, String> => "other_config",
    }
}

pub struct Vbds<'a, T> {
    session: &'a Session<T>,
}

impl<'a, T> Vbds<'a, T> {
    pub(crate) fn new(session: &'a Session<T>) -> Self {
        Self { session }
    }
}

impl<T: Invoke> Vbds<'_, T> {
    /// Creates a VBD from `record`, server-managed fields are ignored
    pub async fn create(&self, record: &VbdRecord) -> Result<VbdRef> {
        self.session.call(CREATE, (record,)).await
    }

    pub async fn create_async(&self, record: &VbdRecord) -> Result<TaskHandle<VbdRef>> {
        self.session.call_async(CREATE, (record,)).await
    }

    pub async fn destroy(&self, vbd: &VbdRef) -> Result<()> {
        self.session.call(DESTROY, (vbd,)).await
    }

    pub async fn get_record(&self, vbd: &VbdRef) -> Result<VbdRecord> {
        self.session.call(GET_RECORD, (vbd,)).await
    }

    pub async fn get_all_records(&self) -> Result<HashMap<VbdRef, VbdRecord>> {
        self.session.call(GET_ALL_RECORDS, ()).await
    }

    pub async fn get_currently_attached(&self, vbd: &VbdRef) -> Result<bool> {
        self.session.call(GET_CURRENTLY_ATTACHED, (vbd,)).await
    }

    pub async fn get_vm(&self, vbd: &VbdRef) -> Result<VmRef> {
        self.session.call(GET_VM, (vbd,)).await
    }

    /// Hot-plugs the device, fails with `DEVICE_ALREADY_ATTACHED` if attached
    pub async fn plug(&self, vbd: &VbdRef) -> Result<()> {
        self.session.call(PLUG, (vbd,)).await
    }

    pub async fn plug_async(&self, vbd: &VbdRef) -> Result<TaskHandle<()>> {
        self.session.call_async(PLUG, (vbd,)).await
    }

    /// Hot-unplugs the device, fails with `DEVICE_ALREADY_DETACHED` if detached
    pub async fn unplug(&self, vbd: &VbdRef) -> Result<()> {
        self.session.call(UNPLUG, (vbd,)).await
    }

    pub async fn unplug_async(&self, vbd: &VbdRef) -> Result<TaskHandle<()>> {
        self.session.call_async(UNPLUG, (vbd,)).await
    }

    /// Inserts `vdi` into an empty removable device, fails with `VBD_NOT_EMPTY` otherwise
    pub async fn insert(&self, vbd: &VbdRef, vdi: &VdiRef) -> Result<()> {
        self.session.call(INSERT, (vbd, vdi)).await
    }

    /// Ejects the medium of a removable device, fails with `VBD_IS_EMPTY` if there is none
    pub async fn eject(&self, vbd: &VbdRef) -> Result<()> {
        self.session.call(EJECT, (vbd,)).await
    }
}

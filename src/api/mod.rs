//! Typed operations of individual classes.
//!
//! Every operation is a [Method](crate::Method) constant plus a thin wrapper
//! forwarding to [Session::call](crate::Session::call).

use xenrpc_transport::Ref;

pub mod event;
pub mod session;
pub mod task;
pub mod vbd;
pub mod vm;

/// Class markers, only used to tell references apart at compile time
pub mod class {
    pub enum Session {}
    pub enum Vm {}
    pub enum Vbd {}
    pub enum Vdi {}
    pub enum Task {}
}

pub type SessionRef = Ref<class::Session>;
pub type VmRef = Ref<class::Vm>;
pub type VbdRef = Ref<class::Vbd>;
pub type VdiRef = Ref<class::Vdi>;
pub type TaskRef = Ref<class::Task>;

//! Standard simulation events.

// VM EVENTS ///////////////////////////////////////////////////////////////////////////////////////

pub mod vm {
    use serde::Serialize;

    use crate::core::error::CloudError;
    use crate::core::vm::VmSpec;

    #[derive(Serialize, Clone)]
    pub struct VmCreateRequest {
        pub vm: VmSpec,
    }

    #[derive(Serialize, Clone)]
    pub struct VmCreated {
        pub vm_id: u32,
        pub host_id: u32,
    }

    #[derive(Serialize, Clone)]
    pub struct VmCreateFailed {
        pub vm_id: u32,
        pub reason: CloudError,
    }

    #[derive(Serialize, Clone)]
    pub struct VmDestroyRequest {
        pub vm_id: u32,
    }

    #[derive(Serialize, Clone)]
    pub struct VmDestroyed {
        pub vm_id: u32,
        pub host_id: u32,
    }
}

// CLOUDLET EVENTS /////////////////////////////////////////////////////////////////////////////////

pub mod cloudlet {
    use serde::Serialize;

    use crate::core::cloudlet::Cloudlet;

    #[derive(Serialize, Clone)]
    pub struct CloudletSubmit {
        pub cloudlet: Cloudlet,
    }

    /// Cloudlet reached a terminal status and is returned to its owner.
    #[derive(Serialize, Clone)]
    pub struct CloudletReturn {
        pub cloudlet: Cloudlet,
    }

    #[derive(Serialize, Clone)]
    pub struct CloudletCancel {
        pub cloudlet_id: u32,
    }

    #[derive(Serialize, Clone)]
    pub struct CloudletPause {
        pub cloudlet_id: u32,
    }

    #[derive(Serialize, Clone)]
    pub struct CloudletResume {
        pub cloudlet_id: u32,
    }
}

// DATACENTER EVENTS ///////////////////////////////////////////////////////////////////////////////

pub mod datacenter {
    use serde::Serialize;

    /// Self-event of datacenter scheduled at the earliest predicted cloudlet completion.
    #[derive(Serialize, Clone)]
    pub struct UpdateProcessing {}
}

// BROKER EVENTS ///////////////////////////////////////////////////////////////////////////////////

pub mod broker {
    use serde::Serialize;

    #[derive(Serialize, Clone)]
    pub struct BrokerStart {}
}

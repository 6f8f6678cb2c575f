//! Host collaborators shared by lookups and compiled forms.

use crate::linker::{BytecodeLinker, ExecutableLinker};
use mh_core::host::{AccessCheck, ClassTableLookup, MemberLookup, PermitAll};
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, OnceLock};

#[derive(Clone)]
pub struct HostServices {
    pub access: Arc<dyn AccessCheck>,
    pub members: Arc<dyn MemberLookup>,
    pub linker: Arc<dyn ExecutableLinker>,
}

impl Default for HostServices {
    fn default() -> Self {
        Self {
            access: Arc::new(PermitAll),
            members: Arc::new(ClassTableLookup),
            linker: Arc::new(BytecodeLinker),
        }
    }
}

impl Debug for HostServices {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}

static SERVICES: OnceLock<HostServices> = OnceLock::new();

/// The installed services, or the defaults if none were installed.
pub fn services() -> &'static HostServices {
    SERVICES.get_or_init(HostServices::default)
}

/// Installs process-wide services. Fails, handing them back, once
/// [`services`] has been read or another set installed.
pub fn install(services: HostServices) -> Result<(), HostServices> {
    SERVICES.set(services)
}

//! Placeholder virtual-machine dispatch.
//!
//! Transactions are routed by a contract-kind discriminant. Only the
//! native value-transfer VM is wired in; the EVM/WASM variants and the
//! dynamically loaded plugin range exist so a real execution layer can
//! register without touching the ledger.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::state::{StateError, WorldState};
use crate::tx::Transaction;
use crate::types::Address;

/// First discriminant value reserved for dynamically loaded plugins.
pub const PLUGIN_KIND_BASE: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    /// Built-in value transfer.
    Native,
    /// Reserved future extension.
    Evm,
    /// Reserved future extension.
    Wasm,
    /// Plugin slot, addressed as `PLUGIN_KIND_BASE + offset`.
    Plugin(u8),
}

impl ContractKind {
    /// Dispatch hook on the transaction destination. Every destination is
    /// native until an execution layer claims address ranges.
    pub fn for_destination(_to: &Address) -> ContractKind {
        ContractKind::Native
    }
}

pub trait ContractVm: Send + Sync {
    fn name(&self) -> &'static str;
    fn kind(&self) -> ContractKind;
    fn execute(&self, tx: &Transaction, state: &mut WorldState) -> Result<(), StateError>;
}

/// Plain value transfer.
pub struct NativeVm;

impl ContractVm for NativeVm {
    fn name(&self) -> &'static str {
        "native"
    }

    fn kind(&self) -> ContractKind {
        ContractKind::Native
    }

    fn execute(&self, tx: &Transaction, state: &mut WorldState) -> Result<(), StateError> {
        state.apply_transaction(tx.from, tx)
    }
}

/// Registration happens under a lock at boot; execution-path reads take a
/// cheap read guard.
#[derive(Default)]
pub struct VmRegistry {
    table: RwLock<HashMap<ContractKind, Arc<dyn ContractVm>>>,
}

impl VmRegistry {
    /// Registry with the native VM installed.
    pub fn with_builtin() -> Self {
        let registry = Self::default();
        registry.register(Arc::new(NativeVm));
        registry
    }

    pub fn register(&self, vm: Arc<dyn ContractVm>) {
        self.table.write().insert(vm.kind(), vm);
    }

    pub fn get(&self, kind: ContractKind) -> Option<Arc<dyn ContractVm>> {
        self.table.read().get(&kind).cloned()
    }

    pub fn has(&self, kind: ContractKind) -> bool {
        self.table.read().contains_key(&kind)
    }

    /// Route a transaction to the VM owning its destination.
    pub fn execute(&self, tx: &Transaction, state: &mut WorldState) -> Result<(), StateError> {
        let kind = ContractKind::for_destination(&tx.to);
        // The native VM is registered at construction and never removed.
        let vm = self.get(kind).expect("VM registered for dispatched kind");
        vm.execute(tx, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_native_only() {
        let registry = VmRegistry::with_builtin();
        assert!(registry.has(ContractKind::Native));
        assert!(!registry.has(ContractKind::Evm));
        assert!(!registry.has(ContractKind::Wasm));
        assert!(!registry.has(ContractKind::Plugin(0)));
    }

    #[test]
    fn native_vm_transfers_value() {
        let registry = VmRegistry::with_builtin();
        let from = Address::from_bytes([0x01; 20]);
        let to = Address::from_bytes([0x02; 20]);
        let mut state = WorldState::with_premine(&[(from, 100)]);

        let tx = Transaction {
            from,
            to,
            value: 40,
            ..Default::default()
        };
        registry.execute(&tx, &mut state).unwrap();

        assert_eq!(state.balance(&from), 60);
        assert_eq!(state.balance(&to), 40);
    }

    #[test]
    fn reregistration_replaces() {
        let registry = VmRegistry::with_builtin();
        registry.register(Arc::new(NativeVm));
        assert_eq!(
            registry.get(ContractKind::Native).unwrap().name(),
            "native"
        );
    }
}

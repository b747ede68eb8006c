pub mod accessor;
pub mod context;
pub mod memory;
pub mod mode;
pub mod patch;
pub mod processor;
pub mod ram;
pub mod registers;
pub mod stack;

pub use accessor::{Global, GuestObject, Member, PointerWidth, Word};
pub use context::EmulationContext;
pub use memory::{GuestMemory, Memory, MemoryFault};
pub use patch::{Exit, NativePatch, PatchResult, PatchTable};
pub use processor::{Processor, ProcessorState};

#[doc(hidden)]
pub use paste;

/// A native patch broke its contract with the bridge. Guest state can no
/// longer be trusted, so there is no way back.
#[cold]
#[track_caller]
pub(crate) fn contract_violation(what: &str) -> ! {
    panic!("contract violation: {what}");
}

// Queue status state machine
//
// Transition table for customer queue status plus the role capability gate
// that decides who may take which edge.

pub mod capabilities;
pub mod errors;
pub mod queue_state_machine;
pub mod roles;
pub mod states;

pub use capabilities::{CapabilityTable, VALID_EDGES};
pub use errors::{TransitionError, TransitionResult};
pub use queue_state_machine::QueueStateMachine;
pub use roles::Role;
pub use states::QueueStatus;

// Agent execution state machine
//
// pending -> queued -> running -> completed | failed, with cancellation of work
// that has not started and an explicit failed -> pending retry.

pub mod errors;
pub mod events;
pub mod execution_state_machine;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::ExecutionEvent;
pub use execution_state_machine::{ExecutionStateMachine, Transition};
pub use states::ExecutionStatus;

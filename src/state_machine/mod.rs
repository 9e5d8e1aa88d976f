pub mod rapid_trigger;
pub mod system;

/// The [`StateMachine`] trait provides calling semantics for pure, deterministic state machines.
///
/// # Functionality
/// A state machine consumes a single [`Input`](StateMachine::Input) type and produces a single
/// [`Output`](StateMachine::Output) type. When there are several kinds of input or output these
/// are enums, and the implementor maps each variant onto an inherent method in
/// [`process_input`](StateMachine::process_input) and [`poll_output`](StateMachine::poll_output).
///
/// Keeping that dispatch in the trait impl lets the inherent impl focus on transitions.
///
/// # Invariants
/// Implementors *must* be pure so that replaying the same inputs always yields the same states
/// and outputs:
///
/// - **No interior mutability.** State changes only through `&mut self`. No [`std::cell`] types,
///   no locks, no reference counted sharing.
/// - **No IO.** Nothing from [`std::io`], [`std::net`] or similar.
/// - **No system time or entropy.** Instants, durations and seeds arrive through input. The
///   [`system`] module provides the [`SystemResource`](system::SystemResource) trait that a
///   runner uses to produce them.
/// - **No concurrency, async or blocking.** Synchronisation is the job of the container holding
///   the machine, typically a [`Mutex`](std::sync::Mutex) owned by a per-client context.
///
/// Logging is allowed as a side effect as long as no transition depends on it.
///
/// # Example
/// ```ignore
/// pub struct Toggle {
///     on: bool,
///     pending: bool,
/// }
///
/// pub enum ToggleInput {
///     Flip,
/// }
///
/// pub enum ToggleOutput {
///     Changed(bool),
/// }
///
/// impl StateMachine for Toggle {
///     type Input = ToggleInput;
///     type Output = ToggleOutput;
///
///     fn process_input(&mut self, input: Self::Input) {
///         match input {
///             ToggleInput::Flip => {
///                 self.on = !self.on;
///                 self.pending = true;
///             }
///         }
///     }
///
///     fn poll_output(&mut self) -> Option<Self::Output> {
///         std::mem::take(&mut self.pending).then(|| ToggleOutput::Changed(self.on))
///     }
/// }
/// ```
pub trait StateMachine {
    /// The type of input that is [processed](StateMachine::process_input) by the state machine.
    type Input;
    /// The type of output that is [polled](StateMachine::poll_output) from the state machine.
    type Output;

    /// Process the provided `input` into the state machine.
    fn process_input(&mut self, input: Self::Input);

    /// Poll the state machine for output, returning the first available output if present.
    fn poll_output(&mut self) -> Option<Self::Output>;
}

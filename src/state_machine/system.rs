/// The [`SystemResource`] trait indicates that a type is a resource inherently provided by the
/// system context of the application, such as the current time.
///
/// Runners call [`generate`](SystemResource::generate) outside of a
/// [`StateMachine`](super::StateMachine) and hand the result in as input, keeping the machine
/// itself deterministic.
pub trait SystemResource {
    /// Produce an instance of this resource from the implicit system context.
    fn generate() -> Self;
}

impl SystemResource for std::time::Instant {
    fn generate() -> Self {
        std::time::Instant::now()
    }
}

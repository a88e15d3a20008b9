/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    /// A component requested shutdown after an unrecoverable error
    Fatal(String),
    UserRequest,
}

impl ShutdownReason {
    /// Process exit code for a clean shutdown with this reason
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Signal(_) | ShutdownReason::UserRequest => 0,
            ShutdownReason::Fatal(_) => 1,
        }
    }
}

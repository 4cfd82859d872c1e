use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Cancelled once the scheduler starts shutting down.
    pub cancellation_token: CancellationToken,

    /// What caused this run ("schedule", "startup", ...).
    pub triggered_by: &'static str,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, triggered_by: &'static str) -> Self {
        Self {
            cancellation_token,
            triggered_by,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

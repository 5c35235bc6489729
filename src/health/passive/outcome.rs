//! Classification of proxied request outcomes.

use serde::Serialize;

/// Why forwarding a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ForwardError {
    /// Connecting to or sending the request to the destination failed.
    Request,
    /// The destination did not answer in time.
    RequestTimedOut,
    /// The client went away.
    RequestCanceled,
    /// Reading the request body from the client failed.
    RequestBodyClient,
    /// Writing the request body to the destination failed.
    RequestBodyDestination,
    /// Writing the response body to the client failed.
    ResponseBodyClient,
    /// Reading the response body from the destination failed.
    ResponseBodyDestination,
    /// Copying the upgraded request stream to the destination failed.
    UpgradeRequestDestination,
    /// Copying the upgraded response stream from the destination failed.
    UpgradeResponseDestination,
    /// No destination was available to forward to.
    NoAvailableDestinations,
}

impl ForwardError {
    /// Whether the destination is to blame.
    pub fn is_destination_failure(self) -> bool {
        matches!(
            self,
            ForwardError::Request
                | ForwardError::RequestTimedOut
                | ForwardError::RequestBodyDestination
                | ForwardError::ResponseBodyDestination
                | ForwardError::UpgradeRequestDestination
                | ForwardError::UpgradeResponseDestination
        )
    }
}

/// Result of forwarding one request to a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ForwardOutcome {
    Success,
    Failed(ForwardError),
}

impl ForwardOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ForwardOutcome::Success)
    }

    /// Failed for a reason attributable to the destination.
    pub fn is_destination_failure(&self) -> bool {
        match self {
            ForwardOutcome::Success => false,
            ForwardOutcome::Failed(error) => error.is_destination_failure(),
        }
    }

    /// Failed for a reason that says nothing about the destination.
    pub fn is_inconclusive(&self) -> bool {
        !self.is_success() && !self.is_destination_failure()
    }
}

impl From<ForwardError> for ForwardOutcome {
    fn from(error: ForwardError) -> Self {
        ForwardOutcome::Failed(error)
    }
}

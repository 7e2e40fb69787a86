use thiserror::Error;

use crate::report::SmokeReport;

#[derive(Debug, Error)]
pub enum SmokeError {
    /// Failed before anything was provisioned; there is nothing to destroy.
    #[error("setup failed: {0}")]
    Setup(#[from] tfsmoke_driver::DriverError),

    #[error("invalid configuration: {0}")]
    Domain(#[from] tfsmoke_domain::DomainError),

    /// Provisioning started and something went wrong afterwards. The report
    /// says what failed and whether destroy succeeded.
    #[error("smoke test {} failed: {}", .0.test_name, .0.summary())]
    Run(Box<SmokeReport>),
}

impl SmokeError {
    pub fn report(&self) -> Option<&SmokeReport> {
        match self {
            SmokeError::Run(report) => Some(report),
            _ => None,
        }
    }
}

use thiserror::Error;

// Admission errors split along the spec's fault line: a missing client
// address is the caller breaking the contract and gets reported back,
// while store faults are internal and the controller converts them to
// an admit (fail-open).
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("no client address could be resolved from request candidates")]
    NoClientAddress,

    #[error("counter store lock poisoned: {0}")]
    StorePoisoned(String),
}

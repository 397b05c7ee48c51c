//! Outcome classification for circuit breaker decisions.
//!
//! Every finished call is reduced to a [`Verdict`]. Successes and failures are
//! counted; ignored outcomes are not counted and give back their admission
//! slot, which matters in the half-open state where slots are scarce.
//!
//! Cancellation is the main reason to ignore an outcome: a caller that gave
//! up says nothing about the dependency's health.

use outbound_core::CallError;
use std::sync::Arc;

/// How the breaker should count a finished call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Count as a success.
    Success,
    /// Count as a failure.
    Failure,
    /// Do not count, release the admission slot.
    Ignored,
}

/// Errors that know how the breaker should count them.
///
/// The default treats every error as a failure, so opting in is a one-liner:
///
/// ```rust
/// use outbound_circuitbreaker::Classify;
///
/// #[derive(Debug)]
/// struct LookupFailed;
///
/// impl Classify for LookupFailed {}
/// ```
pub trait Classify {
    /// The verdict for this error.
    fn verdict(&self) -> Verdict {
        Verdict::Failure
    }
}

impl Classify for CallError {
    fn verdict(&self) -> Verdict {
        match self {
            CallError::Cancelled(_) | CallError::CircuitOpen { .. } => Verdict::Ignored,
            CallError::Transient(_) | CallError::Permanent(_) | CallError::Exhausted { .. } => {
                Verdict::Failure
            }
        }
    }
}

impl Classify for std::io::Error {}
impl Classify for String {}
impl Classify for &'static str {}
impl Classify for Box<dyn std::error::Error + Send + Sync> {}

/// Maps a call result to a [`Verdict`].
pub trait FailureClassifier<Res, Err>: Send + Sync {
    /// Classifies `result`.
    fn classify(&self, result: &Result<Res, Err>) -> Verdict;
}

/// Counts `Ok` as success and defers to [`Classify`] for errors.
///
/// ```rust
/// use outbound_circuitbreaker::{DefaultClassifier, FailureClassifier, Verdict};
/// use outbound_core::{CallError, CancelReason};
///
/// let classifier = DefaultClassifier;
/// let cancelled: Result<(), CallError> = Err(CancelReason::Cancelled.into());
/// assert_eq!(classifier.classify(&cancelled), Verdict::Ignored);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl<Res, Err: Classify> FailureClassifier<Res, Err> for DefaultClassifier {
    fn classify(&self, result: &Result<Res, Err>) -> Verdict {
        match result {
            Ok(_) => Verdict::Success,
            Err(err) => err.verdict(),
        }
    }
}

/// A classifier backed by a closure.
///
/// ```rust
/// use outbound_circuitbreaker::{FailureClassifier, FnClassifier, Verdict};
/// use std::io::{Error, ErrorKind};
///
/// // Not-found answers mean the dependency is up.
/// let classifier = FnClassifier::new(|result: &Result<String, Error>| match result {
///     Ok(_) => Verdict::Success,
///     Err(e) if e.kind() == ErrorKind::NotFound => Verdict::Success,
///     Err(_) => Verdict::Failure,
/// });
///
/// assert_eq!(
///     classifier.classify(&Err(Error::new(ErrorKind::NotFound, "missing"))),
///     Verdict::Success
/// );
/// ```
#[derive(Clone)]
pub struct FnClassifier<F> {
    f: Arc<F>,
}

impl<F> FnClassifier<F> {
    /// Creates a new `FnClassifier` from the given closure.
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F, Res, Err> FailureClassifier<Res, Err> for FnClassifier<F>
where
    F: Fn(&Result<Res, Err>) -> Verdict + Send + Sync,
{
    fn classify(&self, result: &Result<Res, Err>) -> Verdict {
        (self.f)(result)
    }
}

impl<F> std::fmt::Debug for FnClassifier<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnClassifier")
            .field("f", &"<closure>")
            .finish()
    }
}

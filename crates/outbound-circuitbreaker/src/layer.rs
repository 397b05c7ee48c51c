use crate::classifier::{DefaultClassifier, FailureClassifier, FnClassifier, Verdict};
use crate::error::CircuitBreakerError;
use crate::CircuitBreaker;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// A Tower layer that guards services with a shared [`CircuitBreaker`].
///
/// Every service produced by the layer drives the same breaker, so a
/// dependency reached from several call sites trips once for all of them.
///
/// ```rust
/// use outbound_circuitbreaker::{CircuitBreaker, Verdict};
/// use tower::{ServiceBuilder, service_fn};
/// use std::io::{Error, ErrorKind};
///
/// let breaker = CircuitBreaker::builder().name("search").build().unwrap();
///
/// // Timeouts are the caller's budget, not the dependency's fault.
/// let layer = breaker.layer().with_classifier(|result: &Result<String, Error>| match result {
///     Ok(_) => Verdict::Success,
///     Err(e) if e.kind() == ErrorKind::TimedOut => Verdict::Ignored,
///     Err(_) => Verdict::Failure,
/// });
///
/// let service = ServiceBuilder::new()
///     .layer(layer)
///     .service(service_fn(|req: String| async move { Ok::<_, Error>(req) }));
/// # drop(service);
/// ```
#[derive(Clone)]
pub struct CircuitBreakerLayer<C = DefaultClassifier> {
    breaker: CircuitBreaker,
    classifier: Arc<C>,
}

impl CircuitBreakerLayer {
    /// Creates a layer that classifies errors with [`DefaultClassifier`].
    pub fn new(breaker: CircuitBreaker) -> Self {
        Self {
            breaker,
            classifier: Arc::new(DefaultClassifier),
        }
    }
}

impl<C> CircuitBreakerLayer<C> {
    /// Replaces the classifier with a closure.
    pub fn with_classifier<F, Res, Err>(self, f: F) -> CircuitBreakerLayer<FnClassifier<F>>
    where
        F: Fn(&Result<Res, Err>) -> Verdict + Send + Sync + 'static,
    {
        CircuitBreakerLayer {
            breaker: self.breaker,
            classifier: Arc::new(FnClassifier::new(f)),
        }
    }

    /// The breaker this layer drives.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl<S, C> Layer<S> for CircuitBreakerLayer<C> {
    type Service = CircuitBreakerService<S, C>;

    fn layer(&self, service: S) -> Self::Service {
        CircuitBreakerService {
            inner: service,
            breaker: self.breaker.clone(),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

/// A service guarded by a circuit breaker.
pub struct CircuitBreakerService<S, C = DefaultClassifier> {
    inner: S,
    breaker: CircuitBreaker,
    classifier: Arc<C>,
}

impl<S, C> CircuitBreakerService<S, C> {
    /// The breaker guarding this service.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl<S: Clone, C> Clone for CircuitBreakerService<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            breaker: self.breaker.clone(),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<S, C, Req> Service<Req> for CircuitBreakerService<S, C>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
    C: FailureClassifier<S::Response, S::Error> + 'static,
{
    type Response = S::Response;
    type Error = CircuitBreakerError<S::Error>;
    type Future = BoxFuture<'static, Result<S::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(CircuitBreakerError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        // The ready service is the one that must serve this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let breaker = self.breaker.clone();
        let classifier = Arc::clone(&self.classifier);

        Box::pin(async move {
            breaker
                .execute_with(classifier.as_ref(), move || inner.call(req))
                .await
        })
    }
}

//! Cancellation scopes
//!
//! A session owns several independent [`CancelScope`]s. Renewing or
//! cancelling one never touches another, so a material refetch cannot abort
//! a deploy that is already in flight.

use crate::error::ServiceError;
use parking_lot::Mutex;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Named, renewable cancellation token
#[derive(Debug)]
pub struct CancelScope {
    name: &'static str,
    token: Mutex<CancellationToken>,
}

impl CancelScope {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            token: Mutex::new(CancellationToken::new()),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cancel the current token and install a fresh one
    ///
    /// Returns a clone of the new token for the request about to start.
    pub fn renew(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        let previous = std::mem::replace(&mut *self.token.lock(), fresh.clone());
        if !previous.is_cancelled() {
            tracing::debug!(scope = self.name, "superseding in-flight request");
            previous.cancel();
        }
        fresh
    }

    /// Token for a request that should share the current lifetime
    #[must_use]
    pub fn current(&self) -> CancellationToken {
        self.token.lock().clone()
    }

    /// Cancel without renewing
    pub fn cancel(&self) {
        tracing::debug!(scope = self.name, "cancelling scope");
        self.token.lock().cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.lock().is_cancelled()
    }
}

/// Drive `fut` until it completes or `token` fires
///
/// A fired token always yields [`ServiceError::Aborted`], even if the
/// collaborator ignores the token it was handed.
pub async fn run_cancellable<F, T>(token: &CancellationToken, fut: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(ServiceError::Aborted),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renew_cancels_previous_token_only() {
        let scope = CancelScope::new("fetch");
        let first = scope.current();
        let second = scope.renew();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(!scope.is_cancelled());
    }

    #[test]
    fn scopes_are_independent() {
        let fetch = CancelScope::new("fetch");
        let deploy = CancelScope::new("deploy");
        let deploy_token = deploy.current();
        fetch.renew();
        fetch.cancel();
        assert!(!deploy_token.is_cancelled());
    }

    #[test]
    fn deploy_cancel_leaves_fetch_and_page_alive() {
        let fetch = CancelScope::new("fetch");
        let page = CancelScope::new("page");
        let deploy = CancelScope::new("deploy");
        let fetch_token = fetch.current();
        let page_token = page.current();

        deploy.cancel();

        assert!(deploy.is_cancelled());
        assert!(!fetch_token.is_cancelled());
        assert!(!page_token.is_cancelled());
        assert!(!fetch.is_cancelled());
        assert!(!page.is_cancelled());
    }

    #[tokio::test]
    async fn run_cancellable_reports_abort() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<(), _> =
            run_cancellable(&token, futures::future::pending::<Result<(), ServiceError>>()).await;
        assert_eq!(result, Err(ServiceError::Aborted));
    }

    #[tokio::test]
    async fn run_cancellable_passes_through() {
        let token = CancellationToken::new();
        let result = run_cancellable(&token, async { Ok::<_, ServiceError>(7) }).await;
        assert_eq!(result, Ok(7));
    }
}

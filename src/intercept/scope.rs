//=====================================================
// File: intercept/scope.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Tie interception lifetimes to scopes
// Objective: Restore the loader when a scope exits, whether it returns,
//            unwinds or, for async work, settles or is dropped
//=====================================================

use super::RestoreToken;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Deactivates the owning interceptor when dropped.
#[derive(Debug)]
pub struct ScopeGuard {
    token: Option<RestoreToken>,
}

impl ScopeGuard {
    pub fn new(token: RestoreToken) -> Self {
        Self { token: Some(token) }
    }

    /// Restore now instead of at drop.
    pub fn release(mut self) -> bool {
        self.token.take().is_some_and(RestoreToken::restore)
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.restore();
        }
    }
}

/// Future returned by `Interceptor::run_scoped_async`.
///
/// Interception stays active while the inner future is pending. The guard
/// is released as soon as it settles, before its output is handed back, and
/// also when this future is dropped unfinished.
#[must_use = "interception stays active until this future is awaited or dropped"]
pub struct ScopedFuture<Fut> {
    inner: Pin<Box<Fut>>,
    guard: Option<ScopeGuard>,
}

impl<Fut: Future> ScopedFuture<Fut> {
    pub(crate) fn new(inner: Fut, guard: ScopeGuard) -> Self {
        Self {
            inner: Box::pin(inner),
            guard: Some(guard),
        }
    }

    /// Whether the scope still holds interception.
    pub fn is_pending(&self) -> bool {
        self.guard.is_some()
    }
}

impl<Fut: Future> Future for ScopedFuture<Fut> {
    type Output = Fut::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.inner.as_mut().poll(cx) {
            Poll::Ready(output) => {
                if let Some(guard) = this.guard.take() {
                    guard.release();
                }
                Poll::Ready(output)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<Fut> std::fmt::Debug for ScopedFuture<Fut> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedFuture")
            .field("pending", &self.guard.is_some())
            .finish_non_exhaustive()
    }
}

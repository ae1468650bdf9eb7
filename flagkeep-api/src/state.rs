//! Shared application state for Axum routers.

use std::time::{Duration, Instant};

use flagkeep_core::OpContext;

use crate::service::FlagService;

/// Deadline applied to the store operations of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeout(pub Duration);

impl RequestTimeout {
    /// A fresh operation context that expires after this timeout.
    pub fn context(&self) -> OpContext {
        OpContext::with_timeout(self.0)
    }
}

/// Application-wide state shared across all routes.
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: FlagService,
    pub request_timeout: RequestTimeout,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(service: FlagService, request_timeout: Duration) -> Self {
        Self {
            service,
            request_timeout: RequestTimeout(request_timeout),
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(FlagService, service);
crate::impl_from_ref!(RequestTimeout, request_timeout);
crate::impl_from_ref!(Instant, start_time);

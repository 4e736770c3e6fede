//! The persistence seam for lead imports.

use std::future::Future;

use crate::error::Result;
use crate::types::NewLead;

/// A fallible destination for batches of new leads.
///
/// Implementations own uniqueness, authorization, and durability. One call
/// covers one batch; the import loop awaits each call before issuing the next.
pub trait LeadSink: Send + Sync {
    /// Insert `batch` as a single request.
    ///
    /// Returns the number of rows the store confirms it inserted, or `None`
    /// when the store does not report counts.
    fn insert_batch(&self, batch: &[NewLead]) -> impl Future<Output = Result<Option<usize>>> + Send;
}

impl<S: LeadSink + ?Sized> LeadSink for &S {
    fn insert_batch(&self, batch: &[NewLead]) -> impl Future<Output = Result<Option<usize>>> + Send {
        (**self).insert_batch(batch)
    }
}

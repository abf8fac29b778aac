//! Business logic services.

pub mod reconciler;

pub use reconciler::IdentityReconciler;

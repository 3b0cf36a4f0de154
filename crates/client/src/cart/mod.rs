//! The dual-mode cart: a durable local store plus the reconciler that keeps
//! it consistent with the server-owned cart.

pub mod local;
pub mod reconciler;

pub use local::LocalCartStore;
pub use reconciler::{CartError, CartReconciler};

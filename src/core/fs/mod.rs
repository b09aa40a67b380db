pub mod keys;
pub mod links;
pub mod normalize;

pub use keys::{KeyMode, KeyStore};
pub use links::{LinkKind, LinkReconciler, PresentationLink, Reconciled};
pub use normalize::{normalize_tree, NormalizeOutcome};

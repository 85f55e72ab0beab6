//! Error types for the `cadence-objects` crate.

use cadence_types::ObjectId;

/// Precondition violations reported by the [`ObjectRegistry`].
///
/// [`ObjectRegistry`]: crate::ObjectRegistry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The object is not (or no longer) stored in the registry.
    #[error("object {id} is not registered")]
    NotRegistered {
        /// The unknown object.
        id: ObjectId,
    },

    /// The object was already claimed by an earlier destroy request.
    #[error("object {id} has already been destroyed")]
    AlreadyRemoved {
        /// The object.
        id: ObjectId,
    },

    /// The requested owner is unregistered or being torn down.
    #[error("owner {owner} is not available")]
    OwnerUnavailable {
        /// The requested owner.
        owner: ObjectId,
    },
}

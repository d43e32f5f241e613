use crate::{
    config::ObjectConfig,
    model::{AttributeFamily, DesiredAttributeSet, OwnershipSet},
};

/// The names a configuration block mentions, whatever their value.
///
/// An entry that asks for removal is still owned. Ownership lives only as long
/// as the call that computed it; a name dropped from the configuration is
/// simply no longer owned, and the remote value stays as it is.
pub fn extract_ownership(config: &ObjectConfig, family: AttributeFamily) -> OwnershipSet {
    config.names(family).into_iter().cloned().collect()
}

/// Ownership of an already validated desired set.
pub fn owned_keys<V>(desired: &DesiredAttributeSet<V>) -> OwnershipSet {
    desired.keys().cloned().collect()
}

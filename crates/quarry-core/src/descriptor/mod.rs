//! Descriptor sets: the per-model tables driving navigation expansion,
//! identity resolution and polymorphic materialization.

mod cache;
mod provider;
mod set;

pub use cache::DescriptorSetCache;
pub use provider::{MetadataProvider, ModelProvider};
pub use set::{
    ColumnDescriptor, DescriptorSet, EntityDescriptor, NavigationDescriptor,
    PolymorphicTypeDescriptor, PrimaryKeyDescriptor,
};

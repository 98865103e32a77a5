//! Per-compilation state.

use std::sync::Arc;

use quarry_expr::{Parameter, ParameterValue, Type};

use crate::config::QueryOptions;
use crate::descriptor::DescriptorSet;

/// Scratch state of one `execute` call.
///
/// Owned by a single invocation and discarded once the plan is compiled or
/// found in the cache.
#[derive(Debug)]
pub struct QueryProcessingContext {
    parameters: Vec<(Parameter, ParameterValue)>,
    descriptors: Arc<DescriptorSet>,
    options: QueryOptions,
}

impl QueryProcessingContext {
    /// Create a context over a descriptor set.
    pub fn new(descriptors: Arc<DescriptorSet>, options: QueryOptions) -> Self {
        Self {
            parameters: Vec::new(),
            descriptors,
            options,
        }
    }

    /// Record a captured value, returning the synthetic parameter that
    /// replaces it. Slots are assigned in first-seen order.
    pub fn add_parameter(&mut self, ty: Type, value: ParameterValue) -> Parameter {
        let parameter = Parameter::synthetic(self.parameters.len(), ty);
        self.parameters.push((parameter.clone(), value));
        parameter
    }

    /// The parameter mapping in slot order.
    pub fn parameters(&self) -> &[(Parameter, ParameterValue)] {
        &self.parameters
    }

    /// Static types of the parameters in slot order.
    pub fn parameter_types(&self) -> Vec<Type> {
        self.parameters.iter().map(|(p, _)| p.ty.clone()).collect()
    }

    /// Runtime values of the parameters in slot order.
    pub fn parameter_values(&self) -> Vec<ParameterValue> {
        self.parameters.iter().map(|(_, v)| v.clone()).collect()
    }

    /// The descriptor set.
    pub fn descriptors(&self) -> &DescriptorSet {
        &self.descriptors
    }

    /// Shared handle to the descriptor set.
    pub fn descriptors_arc(&self) -> &Arc<DescriptorSet> {
        &self.descriptors
    }

    /// The query options.
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_expr::Value;

    #[test]
    fn test_parameters_in_first_seen_order() {
        let mut context =
            QueryProcessingContext::new(Arc::new(DescriptorSet::new()), QueryOptions::default());
        let a = context.add_parameter(Type::int32(), Value::Int32(1).into());
        let b = context.add_parameter(Type::string(), Value::from("x").into());

        assert_eq!(a.slot, Some(0));
        assert_eq!(b.slot, Some(1));
        assert_eq!(a.name, "__p0");
        assert_eq!(context.parameter_types(), vec![Type::int32(), Type::string()]);
        assert_eq!(
            context.parameter_values()[1],
            ParameterValue::Scalar(Value::from("x"))
        );
    }
}

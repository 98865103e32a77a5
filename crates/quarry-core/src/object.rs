//! Materialized result objects.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use quarry_expr::Value;

/// A materialized result value.
#[derive(Debug, Clone)]
pub enum Object {
    /// Absent value (null scalar, missing optional entity).
    Null,
    /// A scalar.
    Value(Value),
    /// An entity instance, shared with the identity resolver.
    Entity(Arc<Entity>),
    /// An anonymous record.
    Record(Record),
    /// A list (collection navigation, complex results).
    List(Vec<Object>),
}

impl Object {
    /// Wrap a scalar, mapping `Value::Null` to `Object::Null`.
    pub fn from_value(value: Value) -> Self {
        if value.is_null() {
            Object::Null
        } else {
            Object::Value(value)
        }
    }

    /// Check if this is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// The scalar, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Object::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The scalar, with null mapped to `Value::Null`.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Object::Null => Some(Value::Null),
            Object::Value(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// The entity, if this is one.
    pub fn as_entity(&self) -> Option<&Arc<Entity>> {
        match self {
            Object::Entity(e) => Some(e),
            _ => None,
        }
    }

    /// The record, if this is one.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Object::Record(r) => Some(r),
            _ => None,
        }
    }

    /// The list, if this is one.
    pub fn as_list(&self) -> Option<&[Object]> {
        match self {
            Object::List(items) => Some(items),
            _ => None,
        }
    }
}

impl PartialEq for Object {
    /// Entities compare by identity, everything else by value.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Object::Null, Object::Null) => true,
            (Object::Value(a), Object::Value(b)) => a == b,
            (Object::Entity(a), Object::Entity(b)) => Arc::ptr_eq(a, b),
            (Object::Record(a), Object::Record(b)) => a == b,
            (Object::List(a), Object::List(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Value> for Object {
    fn from(value: Value) -> Self {
        Object::from_value(value)
    }
}

/// An anonymous record with named members.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Object)>,
}

impl Record {
    /// Create a record from its members.
    pub fn new(fields: Vec<(String, Object)>) -> Self {
        Self { fields }
    }

    /// Get a member by name.
    pub fn get(&self, name: &str) -> Option<&Object> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Iterate members in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Object)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the record has no members.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// An entity instance.
///
/// Scalar fields are fixed at materialization. Navigation slots are filled
/// by includes, possibly on an instance the identity resolver already
/// handed out, so they sit behind a lock.
#[derive(Debug)]
pub struct Entity {
    ty: String,
    fields: Vec<(String, Value)>,
    navigations: RwLock<HashMap<String, Object>>,
}

impl Entity {
    /// Create an entity of type `ty` with the given field values.
    pub fn new(ty: impl Into<String>, fields: Vec<(String, Value)>) -> Self {
        Self {
            ty: ty.into(),
            fields,
            navigations: RwLock::new(HashMap::new()),
        }
    }

    /// Entity type name.
    pub fn entity_type(&self) -> &str {
        &self.ty
    }

    /// Get a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Iterate fields in column order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// A loaded navigation.
    pub fn navigation(&self, member: &str) -> Option<Object> {
        self.navigations.read().get(member).cloned()
    }

    /// Fill a navigation slot.
    pub fn set_navigation(&self, member: impl Into<String>, value: Object) {
        self.navigations.write().insert(member.into(), value);
    }

    /// Check if a navigation has been loaded.
    pub fn is_loaded(&self, member: &str) -> bool {
        self.navigations.read().contains_key(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64) -> Arc<Entity> {
        Arc::new(Entity::new(
            "User",
            vec![
                ("id".into(), Value::Int64(id)),
                ("name".into(), Value::String("ann".into())),
            ],
        ))
    }

    #[test]
    fn test_entity_fields() {
        let u = user(1);
        assert_eq!(u.entity_type(), "User");
        assert_eq!(u.get("id"), Some(&Value::Int64(1)));
        assert_eq!(u.get("missing"), None);
        assert_eq!(u.fields().count(), 2);
    }

    #[test]
    fn test_navigation_slots() {
        let u = user(1);
        assert!(!u.is_loaded("posts"));
        u.set_navigation("posts", Object::List(vec![]));
        assert!(u.is_loaded("posts"));
        assert_eq!(u.navigation("posts"), Some(Object::List(vec![])));
    }

    #[test]
    fn test_entity_identity_equality() {
        let a = user(1);
        let b = user(1);
        assert_eq!(Object::Entity(a.clone()), Object::Entity(a.clone()));
        assert_ne!(Object::Entity(a), Object::Entity(b));
    }

    #[test]
    fn test_null_value_maps_to_null_object() {
        assert!(Object::from(Value::Null).is_null());
        assert_eq!(
            Object::from(Value::Int32(3)).as_value(),
            Some(&Value::Int32(3))
        );
    }
}

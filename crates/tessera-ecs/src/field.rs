//! Field accessor tables.
//!
//! Collaborators that need to read or write arbitrary component fields
//! (snapshot loaders, entity-reference linkers, inspectors) go through a
//! table the component author registers, not through introspection.
//!
//! ```ignore
//! world.register_with_fields(
//!     FieldTable::<Position>::new()
//!         .float("x", |p| f64::from(p.x), |p, v| p.x = v as f32)
//!         .float("y", |p| f64::from(p.y), |p, v| p.y = v as f32),
//! );
//!
//! let x = world.read_field(entity, pos_id, "x")?;
//! ```

use std::{any::Any, fmt, marker::PhantomData};

use crate::{
    component::Component,
    entity::Entity,
    error::{EcsError, EcsResult},
};

/// Kind of value a field holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Text,
    /// Reference to another entity.
    Entity,
}

/// A field value exchanged through accessors.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Entity(Option<Entity>),
}

impl FieldValue {
    /// Kind of this value.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Bool(_) => FieldKind::Bool,
            Self::Int(_) => FieldKind::Int,
            Self::Float(_) => FieldKind::Float,
            Self::Text(_) => FieldKind::Text,
            Self::Entity(_) => FieldKind::Entity,
        }
    }
}

type Getter<T> = Box<dyn Fn(&T) -> FieldValue + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, FieldValue) + Send + Sync>;

struct TypedField<T> {
    name: &'static str,
    kind: FieldKind,
    get: Getter<T>,
    set: Setter<T>,
}

/// Typed builder for the accessors of one component type.
pub struct FieldTable<T> {
    fields: Vec<TypedField<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> Default for FieldTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> FieldTable<T> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Add a field with raw [`FieldValue`] accessors.
    ///
    /// `set` is only called with values of `kind`.
    #[must_use]
    pub fn field(
        mut self,
        name: &'static str,
        kind: FieldKind,
        get: impl Fn(&T) -> FieldValue + Send + Sync + 'static,
        set: impl Fn(&mut T, FieldValue) + Send + Sync + 'static,
    ) -> Self {
        self.fields.push(TypedField {
            name,
            kind,
            get: Box::new(get),
            set: Box::new(set),
        });
        self
    }

    /// Add a boolean field.
    #[must_use]
    pub fn bool(
        self,
        name: &'static str,
        get: impl Fn(&T) -> bool + Send + Sync + 'static,
        set: impl Fn(&mut T, bool) + Send + Sync + 'static,
    ) -> Self {
        self.field(
            name,
            FieldKind::Bool,
            move |c| FieldValue::Bool(get(c)),
            move |c, v| {
                if let FieldValue::Bool(v) = v {
                    set(c, v);
                }
            },
        )
    }

    /// Add an integer field.
    #[must_use]
    pub fn int(
        self,
        name: &'static str,
        get: impl Fn(&T) -> i64 + Send + Sync + 'static,
        set: impl Fn(&mut T, i64) + Send + Sync + 'static,
    ) -> Self {
        self.field(
            name,
            FieldKind::Int,
            move |c| FieldValue::Int(get(c)),
            move |c, v| {
                if let FieldValue::Int(v) = v {
                    set(c, v);
                }
            },
        )
    }

    /// Add a floating point field.
    #[must_use]
    pub fn float(
        self,
        name: &'static str,
        get: impl Fn(&T) -> f64 + Send + Sync + 'static,
        set: impl Fn(&mut T, f64) + Send + Sync + 'static,
    ) -> Self {
        self.field(
            name,
            FieldKind::Float,
            move |c| FieldValue::Float(get(c)),
            move |c, v| {
                if let FieldValue::Float(v) = v {
                    set(c, v);
                }
            },
        )
    }

    /// Add a text field.
    #[must_use]
    pub fn text(
        self,
        name: &'static str,
        get: impl Fn(&T) -> String + Send + Sync + 'static,
        set: impl Fn(&mut T, String) + Send + Sync + 'static,
    ) -> Self {
        self.field(
            name,
            FieldKind::Text,
            move |c| FieldValue::Text(get(c)),
            move |c, v| {
                if let FieldValue::Text(v) = v {
                    set(c, v);
                }
            },
        )
    }

    /// Add an entity-reference field.
    #[must_use]
    pub fn entity(
        self,
        name: &'static str,
        get: impl Fn(&T) -> Option<Entity> + Send + Sync + 'static,
        set: impl Fn(&mut T, Option<Entity>) + Send + Sync + 'static,
    ) -> Self {
        self.field(
            name,
            FieldKind::Entity,
            move |c| FieldValue::Entity(get(c)),
            move |c, v| {
                if let FieldValue::Entity(v) = v {
                    set(c, v);
                }
            },
        )
    }

    pub(crate) fn into_erased(self) -> ErasedFieldTable {
        let fields = self
            .fields
            .into_iter()
            .map(|field| {
                let TypedField {
                    name,
                    kind,
                    get,
                    set,
                } = field;
                ErasedField {
                    name,
                    kind,
                    get: Box::new(move |any| any.downcast_ref::<T>().map(&get)),
                    set: Box::new(move |any, value| match any.downcast_mut::<T>() {
                        Some(component) => {
                            set(component, value);
                            true
                        }
                        None => false,
                    }),
                }
            })
            .collect();

        ErasedFieldTable {
            component: std::any::type_name::<T>(),
            fields,
        }
    }
}

struct ErasedField {
    name: &'static str,
    kind: FieldKind,
    get: Box<dyn Fn(&dyn Any) -> Option<FieldValue> + Send + Sync>,
    set: Box<dyn Fn(&mut dyn Any, FieldValue) -> bool + Send + Sync>,
}

/// Type-erased accessor table stored on a component's info.
pub struct ErasedFieldTable {
    component: &'static str,
    fields: Vec<ErasedField>,
}

impl ErasedFieldTable {
    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the table has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names and kinds in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, FieldKind)> + '_ {
        self.fields.iter().map(|f| (f.name, f.kind))
    }

    /// Names of entity-reference fields.
    pub fn entity_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(|f| f.kind == FieldKind::Entity)
            .map(|f| f.name)
    }

    fn find(&self, name: &str) -> EcsResult<&ErasedField> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| EcsError::UnknownField {
                component: self.component,
                field: name.to_owned(),
            })
    }

    /// Read a field from a component instance.
    pub fn read(&self, component: &dyn Any, name: &str) -> EcsResult<FieldValue> {
        let field = self.find(name)?;
        (field.get)(component).ok_or(EcsError::UnknownType(self.component))
    }

    /// Write a field on a component instance.
    pub fn write(&self, component: &mut dyn Any, name: &str, value: FieldValue) -> EcsResult<()> {
        let field = self.find(name)?;
        if value.kind() != field.kind {
            return Err(EcsError::FieldMismatch {
                component: self.component,
                field: field.name,
                expected: field.kind,
                found: value.kind(),
            });
        }
        if (field.set)(component, value) {
            Ok(())
        } else {
            Err(EcsError::UnknownType(self.component))
        }
    }
}

impl fmt::Debug for ErasedFieldTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Follow {
        target: Option<Entity>,
        distance: f32,
        label: String,
    }

    impl Component for Follow {}

    fn table() -> ErasedFieldTable {
        FieldTable::<Follow>::new()
            .entity("target", |f| f.target, |f, v| f.target = v)
            .float("distance", |f| f64::from(f.distance), |f, v| f.distance = v as f32)
            .text("label", |f| f.label.clone(), |f, v| f.label = v)
            .into_erased()
    }

    #[test]
    fn test_read_write_fields() {
        let table = table();
        let mut follow = Follow {
            target: Some(Entity::from_raw(4)),
            distance: 2.5,
            label: "scout".into(),
        };

        assert_eq!(
            table.read(&follow, "target").unwrap(),
            FieldValue::Entity(Some(Entity::from_raw(4)))
        );
        assert_eq!(table.read(&follow, "distance").unwrap(), FieldValue::Float(2.5));

        table.write(&mut follow, "target", FieldValue::Entity(None)).unwrap();
        table
            .write(&mut follow, "label", FieldValue::Text("guard".into()))
            .unwrap();
        assert_eq!(follow.target, None);
        assert_eq!(follow.label, "guard");
    }

    #[test]
    fn test_field_errors() {
        let table = table();
        let mut follow = Follow::default();

        assert!(matches!(
            table.read(&follow, "speed"),
            Err(EcsError::UnknownField { field, .. }) if field == "speed"
        ));
        assert!(matches!(
            table.write(&mut follow, "distance", FieldValue::Int(3)),
            Err(EcsError::FieldMismatch { expected: FieldKind::Float, found: FieldKind::Int, .. })
        ));
        assert!(matches!(table.read(&5u8, "distance"), Err(EcsError::UnknownType(_))));
    }

    #[test]
    fn test_entity_fields() {
        let table = table();
        assert_eq!(table.entity_fields().collect::<Vec<_>>(), vec!["target"]);
        assert_eq!(table.len(), 3);
    }
}

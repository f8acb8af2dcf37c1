//! Element wrappers: re-evaluatable accessors for script elements.
//!
//! A wrapper is created from its script text against the object store, which
//! decides its kind (a bare name can be a variable, an array, a string or a
//! whole object). Object-backed wrappers keep a handle, never a reference,
//! and renaming an object drops the handle until [`ElementWrapper::rebind`].

use std::fmt;

use mcs_core::time::Epoch;
use mcs_objects::{
    Array, MissionObject, ObjectError, ObjectHandle, ObjectStore, PropertyValue,
    SpacecraftParameter, format_real,
};

use crate::WrapperError;

/// Discriminant of a wrapper, as seen by command slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperKind {
    Number,
    StringLiteral,
    OnOff,
    Boolean,
    Variable,
    Array,
    ArrayElement,
    ObjectProperty,
    Parameter,
    BodyProperty,
    Object,
    StringObject,
}

/// Value type a wrapper produces, used by the assignment coercion rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Real,
    Integer,
    String,
    OnOff,
    Boolean,
    Object,
    Array,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Real => "Real",
            Self::Integer => "Integer",
            Self::String => "String",
            Self::OnOff => "OnOff",
            Self::Boolean => "Boolean",
            Self::Object => "Object",
            Self::Array => "Array",
        }
    }

    fn of(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::Real(_) => Self::Real,
            PropertyValue::Integer(_) => Self::Integer,
            PropertyValue::Text(_) => Self::String,
            PropertyValue::Boolean(_) => Self::Boolean,
            PropertyValue::OnOff(_) => Self::OnOff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyField {
    Mu,
    Radius,
}

#[derive(Debug, Clone, PartialEq)]
struct Binding {
    name: String,
    handle: Option<ObjectHandle>,
}

impl Binding {
    fn bound(name: &str, handle: ObjectHandle) -> Self {
        Self {
            name: name.to_string(),
            handle: Some(handle),
        }
    }

    fn handle(&self) -> Result<ObjectHandle, WrapperError> {
        self.handle
            .ok_or_else(|| WrapperError::Unbound(self.name.clone()))
    }

    fn rename(&mut self, old: &str, new: &str) -> bool {
        if self.name == old {
            self.name = new.to_string();
            self.handle = None;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Element {
    Number(f64),
    StringLiteral(String),
    OnOff(bool),
    Boolean(bool),
    Variable(Binding),
    Array(Binding),
    ArrayElement {
        array: Binding,
        row: Box<ElementWrapper>,
        col: Box<ElementWrapper>,
    },
    ObjectProperty {
        object: Binding,
        property: String,
        value_type: ValueType,
    },
    Parameter {
        object: Binding,
        parameter: SpacecraftParameter,
        reference: Option<Epoch>,
    },
    BodyProperty {
        body: String,
        field: BodyField,
    },
    Object(Binding),
    StringObject(Binding),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementWrapper {
    description: String,
    element: Element,
}

/// True for text that reads as a numeric literal rather than a name.
pub fn is_number(text: &str) -> bool {
    let first = text.chars().next();
    matches!(first, Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.')
        && text.parse::<f64>().is_ok()
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ElementWrapper {
    /// Resolve `description` against the store and body registry.
    pub fn create(description: &str, store: &ObjectStore) -> Result<Self, WrapperError> {
        let text = description.trim();
        let element = if is_number(text) {
            Element::Number(text.parse().map_err(|_| WrapperError::Syntax(text.into()))?)
        } else if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
            Element::StringLiteral(text[1..text.len() - 1].to_string())
        } else if text == "On" || text == "Off" {
            Element::OnOff(text == "On")
        } else if text == "true" || text == "false" {
            Element::Boolean(text == "true")
        } else if let Some(open) = text.find('(') {
            Self::array_element(text, open, store)?
        } else if let Some((object, property)) = text.split_once('.') {
            Self::property(text, object, property, store)?
        } else if is_identifier(text) {
            let handle = store.require(text)?;
            let binding = Binding::bound(text, handle);
            match store.get(handle)? {
                MissionObject::Variable(_) => Element::Variable(binding),
                MissionObject::Array(_) => Element::Array(binding),
                MissionObject::String(_) => Element::StringObject(binding),
                _ => Element::Object(binding),
            }
        } else {
            return Err(WrapperError::Syntax(text.into()));
        };
        Ok(Self {
            description: text.to_string(),
            element,
        })
    }

    fn array_element(text: &str, open: usize, store: &ObjectStore) -> Result<Element, WrapperError> {
        let name = text[..open].trim();
        let inner = text[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| WrapperError::Syntax(text.into()))?;
        if !is_identifier(name) {
            return Err(WrapperError::Syntax(text.into()));
        }
        let handle = store.require(name)?;
        let MissionObject::Array(array) = store.get(handle)? else {
            return Err(ObjectError::WrongKind {
                name: name.into(),
                expected: "Array",
                found: store.get(handle)?.type_name(),
            }
            .into());
        };
        let indices: Vec<&str> = inner.split(',').map(str::trim).collect();
        let (row, col) = match indices.as_slice() {
            [row, col] => (*row, *col),
            // Single index addresses a row or column vector.
            [index] if array.rows == 1 => ("1", *index),
            [index] if array.cols == 1 => (*index, "1"),
            _ => return Err(WrapperError::Syntax(text.into())),
        };
        Ok(Element::ArrayElement {
            array: Binding::bound(name, handle),
            row: Box::new(Self::create(row, store)?),
            col: Box::new(Self::create(col, store)?),
        })
    }

    fn property(
        text: &str,
        object: &str,
        property: &str,
        store: &ObjectStore,
    ) -> Result<Element, WrapperError> {
        if !is_identifier(object) || !is_identifier(property) {
            return Err(WrapperError::Syntax(text.into()));
        }
        if let Some(handle) = store.resolve(object) {
            let target = store.get(handle)?;
            if target.as_spacecraft().is_some() {
                if let Some(parameter) = SpacecraftParameter::from_name(property) {
                    return Ok(Element::Parameter {
                        object: Binding::bound(object, handle),
                        parameter,
                        reference: None,
                    });
                }
            }
            let value = target.property(property)?;
            return Ok(Element::ObjectProperty {
                object: Binding::bound(object, handle),
                property: property.to_string(),
                value_type: ValueType::of(&value),
            });
        }
        if let Some(body) = store.solar_system().body(object) {
            let field = match property {
                "Mu" => BodyField::Mu,
                "Radius" | "EquatorialRadius" => BodyField::Radius,
                _ => {
                    return Err(ObjectError::UnknownProperty {
                        kind: "CelestialBody",
                        object: body.name.clone(),
                        property: property.into(),
                    }
                    .into());
                }
            };
            return Ok(Element::BodyProperty {
                body: body.name.clone(),
                field,
            });
        }
        Err(ObjectError::NotFound(object.to_string()).into())
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> WrapperKind {
        match &self.element {
            Element::Number(_) => WrapperKind::Number,
            Element::StringLiteral(_) => WrapperKind::StringLiteral,
            Element::OnOff(_) => WrapperKind::OnOff,
            Element::Boolean(_) => WrapperKind::Boolean,
            Element::Variable(_) => WrapperKind::Variable,
            Element::Array(_) => WrapperKind::Array,
            Element::ArrayElement { .. } => WrapperKind::ArrayElement,
            Element::ObjectProperty { .. } => WrapperKind::ObjectProperty,
            Element::Parameter { .. } => WrapperKind::Parameter,
            Element::BodyProperty { .. } => WrapperKind::BodyProperty,
            Element::Object(_) => WrapperKind::Object,
            Element::StringObject(_) => WrapperKind::StringObject,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match &self.element {
            Element::Number(_)
            | Element::Variable(_)
            | Element::ArrayElement { .. }
            | Element::Parameter { .. }
            | Element::BodyProperty { .. } => ValueType::Real,
            Element::StringLiteral(_) | Element::StringObject(_) => ValueType::String,
            Element::OnOff(_) => ValueType::OnOff,
            Element::Boolean(_) => ValueType::Boolean,
            Element::Array(_) => ValueType::Array,
            Element::Object(_) => ValueType::Object,
            Element::ObjectProperty { value_type, .. } => *value_type,
        }
    }

    /// True when the wrapper yields a single real number.
    pub fn is_scalar(&self) -> bool {
        matches!(self.value_type(), ValueType::Real | ValueType::Integer)
    }

    /// The calculated spacecraft parameter behind this wrapper, if any.
    pub fn parameter(&self) -> Option<SpacecraftParameter> {
        match &self.element {
            Element::Parameter { parameter, .. } => Some(*parameter),
            _ => None,
        }
    }

    /// Handle of the object owning this element, for property and parameter wrappers.
    pub fn owner(&self) -> Option<ObjectHandle> {
        match &self.element {
            Element::Parameter { object, .. }
            | Element::ObjectProperty { object, .. }
            | Element::ArrayElement { array: object, .. } => object.handle,
            Element::Variable(b) | Element::Array(b) | Element::Object(b) | Element::StringObject(b) => {
                b.handle
            }
            _ => None,
        }
    }

    /// Name of the owning object, when there is one.
    pub fn owner_name(&self) -> Option<&str> {
        match &self.element {
            Element::Parameter { object, .. }
            | Element::ObjectProperty { object, .. }
            | Element::ArrayElement { array: object, .. } => Some(&object.name),
            Element::Variable(b) | Element::Array(b) | Element::Object(b) | Element::StringObject(b) => {
                Some(&b.name)
            }
            _ => None,
        }
    }

    /// Reference epoch for elapsed-time parameters.
    pub fn set_reference_epoch(&mut self, epoch: Epoch) {
        if let Element::Parameter { reference, .. } = &mut self.element {
            *reference = Some(epoch);
        }
    }

    /// Rewrite embedded object names. Renamed bindings must be rebound before use.
    pub fn rename_object(&mut self, old: &str, new: &str) -> bool {
        let changed = match &mut self.element {
            Element::Variable(b) | Element::Array(b) | Element::Object(b) | Element::StringObject(b) => {
                b.rename(old, new)
            }
            Element::ObjectProperty { object, .. } | Element::Parameter { object, .. } => {
                object.rename(old, new)
            }
            Element::ArrayElement { array, row, col } => {
                let a = array.rename(old, new);
                let r = row.rename_object(old, new);
                let c = col.rename_object(old, new);
                a || r || c
            }
            _ => false,
        };
        if changed {
            self.description = self.compose_description();
        }
        changed
    }

    fn compose_description(&self) -> String {
        match &self.element {
            Element::Variable(b) | Element::Array(b) | Element::Object(b) | Element::StringObject(b) => {
                b.name.clone()
            }
            Element::ObjectProperty {
                object, property, ..
            } => format!("{}.{}", object.name, property),
            Element::Parameter {
                object, parameter, ..
            } => {
                let property = self
                    .description
                    .split_once('.')
                    .map_or(parameter.name(), |(_, p)| p);
                format!("{}.{}", object.name, property)
            }
            Element::ArrayElement { array, row, col } => {
                format!("{}({}, {})", array.name, row.description, col.description)
            }
            _ => self.description.clone(),
        }
    }

    /// Re-resolve every object binding by name.
    pub fn rebind(&mut self, store: &ObjectStore) -> Result<(), WrapperError> {
        match &mut self.element {
            Element::Variable(b) | Element::Array(b) | Element::Object(b) | Element::StringObject(b) => {
                b.handle = Some(store.require(&b.name)?);
            }
            Element::ObjectProperty { object, .. } | Element::Parameter { object, .. } => {
                object.handle = Some(store.require(&object.name)?);
            }
            Element::ArrayElement { array, row, col } => {
                array.handle = Some(store.require(&array.name)?);
                row.rebind(store)?;
                col.rebind(store)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn mismatch(&self, expected: &'static str) -> WrapperError {
        WrapperError::TypeMismatch {
            description: self.description.clone(),
            expected,
            found: self.value_type().name(),
        }
    }

    fn index(&self, store: &ObjectStore) -> Result<usize, WrapperError> {
        let value = self.evaluate_real(store)?;
        if value < 1.0 || value.fract() != 0.0 {
            return Err(WrapperError::BadIndex {
                description: self.description.clone(),
                value,
            });
        }
        Ok(value as usize - 1)
    }

    pub fn evaluate_real(&self, store: &ObjectStore) -> Result<f64, WrapperError> {
        match &self.element {
            Element::Number(v) => Ok(*v),
            Element::Variable(b) => match store.get(b.handle()?)? {
                MissionObject::Variable(v) => Ok(v.value),
                other => Err(wrong_kind(&b.name, "Variable", other)),
            },
            Element::ArrayElement { array, row, col } => {
                let (r, c) = (row.index(store)?, col.index(store)?);
                Ok(array_ref(store, array)?.get(r, c)?)
            }
            Element::ObjectProperty {
                object, property, ..
            } => store
                .get(object.handle()?)?
                .property(property)?
                .as_real()
                .ok_or_else(|| self.mismatch("Real")),
            Element::Parameter {
                object,
                parameter,
                reference,
            } => {
                let sc = store.spacecraft(object.handle()?)?;
                parameter
                    .evaluate(sc, reference.as_ref())
                    .ok_or_else(|| WrapperError::NoReferenceEpoch(self.description.clone()))
            }
            Element::BodyProperty { body, field } => {
                let body = store.solar_system().require(body)?;
                Ok(match field {
                    BodyField::Mu => body.mu_km3_s2,
                    BodyField::Radius => body.radius_km,
                })
            }
            _ => Err(self.mismatch("Real")),
        }
    }

    pub fn evaluate_integer(&self, store: &ObjectStore) -> Result<i64, WrapperError> {
        if let Element::ObjectProperty {
            object, property, ..
        } = &self.element
        {
            if let PropertyValue::Integer(v) = store.get(object.handle()?)?.property(property)? {
                return Ok(v);
            }
        }
        let value = self.evaluate_real(store)?;
        if value.fract() != 0.0 {
            return Err(self.mismatch("Integer"));
        }
        Ok(value as i64)
    }

    pub fn evaluate_string(&self, store: &ObjectStore) -> Result<String, WrapperError> {
        match &self.element {
            Element::StringLiteral(s) => Ok(s.clone()),
            Element::StringObject(b) => match store.get(b.handle()?)? {
                MissionObject::String(s) => Ok(s.value.clone()),
                other => Err(wrong_kind(&b.name, "String", other)),
            },
            Element::ObjectProperty {
                object, property, ..
            } => match store.get(object.handle()?)?.property(property)? {
                PropertyValue::Text(s) => Ok(s),
                _ => Err(self.mismatch("String")),
            },
            _ => Err(self.mismatch("String")),
        }
    }

    pub fn evaluate_on_off(&self, store: &ObjectStore) -> Result<bool, WrapperError> {
        match &self.element {
            Element::OnOff(v) => Ok(*v),
            Element::ObjectProperty {
                object, property, ..
            } => match store.get(object.handle()?)?.property(property)? {
                PropertyValue::OnOff(v) => Ok(v),
                _ => Err(self.mismatch("OnOff")),
            },
            _ => Err(self.mismatch("OnOff")),
        }
    }

    pub fn evaluate_boolean(&self, store: &ObjectStore) -> Result<bool, WrapperError> {
        match &self.element {
            Element::Boolean(v) => Ok(*v),
            Element::ObjectProperty {
                object, property, ..
            } => match store.get(object.handle()?)?.property(property)? {
                PropertyValue::Boolean(v) => Ok(v),
                _ => Err(self.mismatch("Boolean")),
            },
            _ => Err(self.mismatch("Boolean")),
        }
    }

    pub fn evaluate_object<'s>(&self, store: &'s ObjectStore) -> Result<&'s MissionObject, WrapperError> {
        match &self.element {
            Element::Object(b) => Ok(store.get(b.handle()?)?),
            _ => Err(self.mismatch("Object")),
        }
    }

    pub fn evaluate_array<'s>(&self, store: &'s ObjectStore) -> Result<&'s Array, WrapperError> {
        match &self.element {
            Element::Array(b) => array_ref(store, b),
            _ => Err(self.mismatch("Array")),
        }
    }

    pub fn set_real(&self, store: &mut ObjectStore, value: f64) -> Result<(), WrapperError> {
        match &self.element {
            Element::Variable(b) => match store.get_mut(b.handle()?)? {
                MissionObject::Variable(v) => {
                    v.value = value;
                    Ok(())
                }
                other => Err(wrong_kind(&b.name, "Variable", other)),
            },
            Element::ArrayElement { array, row, col } => {
                let (r, c) = (row.index(store)?, col.index(store)?);
                match store.get_mut(array.handle()?)? {
                    MissionObject::Array(a) => Ok(a.set(r, c, value)?),
                    other => Err(wrong_kind(&array.name, "Array", other)),
                }
            }
            Element::ObjectProperty {
                object,
                property,
                value_type,
            } => {
                let typed = match value_type {
                    ValueType::Integer if value.fract() == 0.0 => PropertyValue::Integer(value as i64),
                    ValueType::Real | ValueType::Integer => PropertyValue::Real(value),
                    _ => return Err(self.mismatch("Real")),
                };
                Ok(store.get_mut(object.handle()?)?.set_property(property, typed)?)
            }
            Element::Parameter {
                object, parameter, ..
            } if parameter.is_settable() => Ok(store
                .get_mut(object.handle()?)?
                .set_property(parameter.name(), PropertyValue::Real(value))?),
            _ => Err(WrapperError::ReadOnly(self.description.clone())),
        }
    }

    pub fn set_string(&self, store: &mut ObjectStore, value: &str) -> Result<(), WrapperError> {
        match &self.element {
            Element::StringObject(b) => match store.get_mut(b.handle()?)? {
                MissionObject::String(s) => {
                    s.value = value.to_string();
                    Ok(())
                }
                other => Err(wrong_kind(&b.name, "String", other)),
            },
            Element::ObjectProperty {
                object,
                property,
                value_type: ValueType::String,
            } => Ok(store
                .get_mut(object.handle()?)?
                .set_property(property, PropertyValue::Text(value.to_string()))?),
            _ => Err(WrapperError::ReadOnly(self.description.clone())),
        }
    }

    pub fn set_on_off(&self, store: &mut ObjectStore, value: bool) -> Result<(), WrapperError> {
        self.set_flag(store, PropertyValue::OnOff(value), ValueType::OnOff)
    }

    pub fn set_boolean(&self, store: &mut ObjectStore, value: bool) -> Result<(), WrapperError> {
        self.set_flag(store, PropertyValue::Boolean(value), ValueType::Boolean)
    }

    fn set_flag(
        &self,
        store: &mut ObjectStore,
        value: PropertyValue,
        expected: ValueType,
    ) -> Result<(), WrapperError> {
        match &self.element {
            Element::ObjectProperty {
                object,
                property,
                value_type,
            } if *value_type == expected => {
                Ok(store.get_mut(object.handle()?)?.set_property(property, value)?)
            }
            _ => Err(WrapperError::ReadOnly(self.description.clone())),
        }
    }

    /// Copy `value` into the bound object, keeping the target's name.
    pub fn set_object(&self, store: &mut ObjectStore, value: &MissionObject) -> Result<(), WrapperError> {
        match &self.element {
            Element::Object(b) => Ok(store.get_mut(b.handle()?)?.copy_from(value)?),
            _ => Err(self.mismatch("Object")),
        }
    }

    pub fn set_array(&self, store: &mut ObjectStore, value: &Array) -> Result<(), WrapperError> {
        let Element::Array(b) = &self.element else {
            return Err(self.mismatch("Array"));
        };
        match store.get_mut(b.handle()?)? {
            MissionObject::Array(a) if a.rows == value.rows && a.cols == value.cols => {
                a.data.clone_from(&value.data);
                Ok(())
            }
            MissionObject::Array(a) => Err(WrapperError::IncompatibleAssignment {
                lhs: format!("{} ({}x{})", b.name, a.rows, a.cols),
                lhs_type: "Array",
                rhs: format!("{} ({}x{})", value.name, value.rows, value.cols),
                rhs_type: "Array",
            }),
            other => Err(wrong_kind(&b.name, "Array", other)),
        }
    }

    /// Run the owner-side action tied to the element about to be written.
    pub fn take_required_action(&self, store: &mut ObjectStore) -> Result<(), WrapperError> {
        let (handle, property) = match &self.element {
            Element::ObjectProperty {
                object, property, ..
            } => (object.handle()?, property.as_str()),
            Element::Parameter {
                object, parameter, ..
            } => (object.handle()?, parameter.name()),
            Element::Object(b) => (b.handle()?, "Epoch"),
            _ => return Ok(()),
        };
        store.get_mut(handle)?.take_required_action(property);
        Ok(())
    }

    /// Assign `rhs` to `lhs`, applying the coercion rules between element types.
    pub fn set_value(
        lhs: &ElementWrapper,
        rhs: &ElementWrapper,
        store: &mut ObjectStore,
    ) -> Result<(), WrapperError> {
        use ValueType as T;
        let incompatible = || WrapperError::IncompatibleAssignment {
            lhs: lhs.description.clone(),
            lhs_type: lhs.value_type().name(),
            rhs: rhs.description.clone(),
            rhs_type: rhs.value_type().name(),
        };
        match (lhs.value_type(), rhs.value_type()) {
            (T::Real, T::Real | T::Integer) | (T::Integer, T::Real | T::Integer) => {
                let value = if lhs.value_type() == T::Integer {
                    rhs.evaluate_integer(store)? as f64
                } else {
                    rhs.evaluate_real(store)?
                };
                lhs.take_required_action(store)?;
                lhs.set_real(store, value)
            }
            (T::String, rhs_type) => {
                let text = match rhs_type {
                    T::String => rhs.evaluate_string(store)?,
                    T::Real => format_real(rhs.evaluate_real(store)?),
                    T::Integer => rhs.evaluate_integer(store)?.to_string(),
                    T::Object => rhs.evaluate_object(store)?.name().to_string(),
                    T::OnOff => {
                        let on = rhs.evaluate_on_off(store)?;
                        String::from(if on { "On" } else { "Off" })
                    }
                    T::Boolean => rhs.evaluate_boolean(store)?.to_string(),
                    T::Array => return Err(incompatible()),
                };
                lhs.take_required_action(store)?;
                lhs.set_string(store, &text)
            }
            (T::OnOff, T::OnOff) => {
                let value = rhs.evaluate_on_off(store)?;
                lhs.take_required_action(store)?;
                lhs.set_on_off(store, value)
            }
            (T::Boolean, T::Boolean) => {
                let value = rhs.evaluate_boolean(store)?;
                lhs.take_required_action(store)?;
                lhs.set_boolean(store, value)
            }
            (T::Object, T::Object) => {
                let value = rhs.evaluate_object(store)?.clone();
                lhs.take_required_action(store)?;
                lhs.set_object(store, &value)
            }
            (T::Array, T::Array) => {
                let value = rhs.evaluate_array(store)?.clone();
                lhs.set_array(store, &value)
            }
            _ => Err(incompatible()),
        }
    }
}

impl fmt::Display for ElementWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

fn array_ref<'s>(store: &'s ObjectStore, binding: &Binding) -> Result<&'s Array, WrapperError> {
    match store.get(binding.handle()?)? {
        MissionObject::Array(a) => Ok(a),
        other => Err(wrong_kind(&binding.name, "Array", other)),
    }
}

fn wrong_kind(name: &str, expected: &'static str, found: &MissionObject) -> WrapperError {
    ObjectError::WrongKind {
        name: name.to_string(),
        expected,
        found: found.type_name(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcs_objects::{Spacecraft, StringObject, Variable};

    fn store() -> ObjectStore {
        let mut store = ObjectStore::default();
        store
            .add(MissionObject::Spacecraft(Spacecraft::new("Sat")))
            .unwrap();
        store
            .add(MissionObject::Variable(Variable::new("x", 2.0)))
            .unwrap();
        let mut m = Array::new("M", 2, 3);
        m.set(1, 2, 9.0).unwrap();
        store.add(MissionObject::Array(m)).unwrap();
        store
            .add(MissionObject::String(StringObject {
                name: "label".into(),
                value: "start".into(),
                global: false,
            }))
            .unwrap();
        store
    }

    #[test]
    fn bare_names_resolve_by_object_kind() {
        let store = store();
        let kinds: Vec<_> = ["x", "M", "label", "Sat", "M(2, 3)", "Sat.SMA", "Earth.Mu", "3.5"]
            .iter()
            .map(|d| ElementWrapper::create(d, &store).unwrap().kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                WrapperKind::Variable,
                WrapperKind::Array,
                WrapperKind::StringObject,
                WrapperKind::Object,
                WrapperKind::ArrayElement,
                WrapperKind::Parameter,
                WrapperKind::BodyProperty,
                WrapperKind::Number,
            ]
        );
    }

    #[test]
    fn array_elements_use_one_based_indices() {
        let store = store();
        let w = ElementWrapper::create("M(x, 3)", &store).unwrap();
        assert_eq!(w.evaluate_real(&store).unwrap(), 9.0);
        let bad = ElementWrapper::create("M(0, 1)", &store).unwrap();
        assert!(matches!(
            bad.evaluate_real(&store),
            Err(WrapperError::BadIndex { .. })
        ));
    }

    #[test]
    fn wrong_variant_is_a_type_error() {
        let store = store();
        let w = ElementWrapper::create("M", &store).unwrap();
        assert!(matches!(
            w.evaluate_real(&store),
            Err(WrapperError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn unknown_names_fail_at_creation() {
        let store = store();
        assert!(matches!(
            ElementWrapper::create("Nope.X", &store),
            Err(WrapperError::Object(ObjectError::NotFound(_)))
        ));
    }

    #[test]
    fn real_to_string_uses_formatted_value() {
        let mut store = store();
        let lhs = ElementWrapper::create("label", &store).unwrap();
        let rhs = ElementWrapper::create("x", &store).unwrap();
        ElementWrapper::set_value(&lhs, &rhs, &mut store).unwrap();
        assert_eq!(lhs.evaluate_string(&store).unwrap(), "2.0");
    }

    #[test]
    fn matrix_to_scalar_is_rejected() {
        let mut store = store();
        let lhs = ElementWrapper::create("x", &store).unwrap();
        let rhs = ElementWrapper::create("M", &store).unwrap();
        assert!(matches!(
            ElementWrapper::set_value(&lhs, &rhs, &mut store),
            Err(WrapperError::IncompatibleAssignment { .. })
        ));
    }

    #[test]
    fn string_to_object_is_rejected() {
        let mut store = store();
        let lhs = ElementWrapper::create("Sat", &store).unwrap();
        let rhs = ElementWrapper::create("'Sat'", &store).unwrap();
        assert!(ElementWrapper::set_value(&lhs, &rhs, &mut store).is_err());
    }

    #[test]
    fn assigning_state_clears_last_stop_tag() {
        let mut store = store();
        let handle = store.require("Sat").unwrap();
        store.spacecraft_mut(handle).unwrap().last_stop_triggered = Some("StopOnSat.TA".into());
        let lhs = ElementWrapper::create("Sat.X", &store).unwrap();
        let rhs = ElementWrapper::create("7200", &store).unwrap();
        ElementWrapper::set_value(&lhs, &rhs, &mut store).unwrap();
        let sc = store.spacecraft(handle).unwrap();
        assert_eq!(sc.state[0], 7_200.0);
        assert!(sc.last_stop_triggered.is_none());
    }

    #[test]
    fn renamed_wrapper_is_unbound_until_rebound() {
        let mut store = store();
        let mut w = ElementWrapper::create("Sat.RMAG", &store).unwrap();
        assert!(w.rename_object("Sat", "Probe"));
        assert_eq!(w.description(), "Probe.RMAG");
        assert!(matches!(
            w.evaluate_real(&store),
            Err(WrapperError::Unbound(_))
        ));
        store.rename("Sat", "Probe").unwrap();
        w.rebind(&store).unwrap();
        assert!(w.evaluate_real(&store).unwrap() > 7_000.0);
    }
}

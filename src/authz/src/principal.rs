//! Permission extraction from authenticated principals
//!
//! A principal exposes two things to the authorizer: the permissions it holds
//! and a structural view used to resolve `${user.…}` placeholders. Both
//! keyed mappings and structured records are supported; records go through
//! serde so any `Serialize` struct with a `Permissions` field works.

use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Field or key holding the permissions granted to a principal
pub const PERMISSIONS_FIELD: &str = "Permissions";

/// Failures while reading a principal's permissions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("principal cannot be nil")]
    NilPrincipal,

    #[error("unsupported principal type: {0}")]
    UnsupportedPrincipalType(&'static str),

    #[error("principal is not representable as a record: {0}")]
    NotARecord(String),

    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(&'static str),

    #[error("field 'Permissions' not found")]
    FieldNotFound,

    #[error("field 'Permissions' cannot be nil")]
    NilPermissions,

    #[error("field 'Permissions' is not a sequence, found {0}")]
    NotASequence(&'static str),

    #[error("field 'Permissions' element {index} is not a string, found {kind}")]
    ElementNotString { index: usize, kind: &'static str },
}

/// An authenticated caller
pub trait Principal {
    /// Held permissions, in grant order
    fn permissions(&self) -> Result<Vec<String>, PermissionError>;

    /// Structural view of the principal for expression rendering
    fn attributes(&self) -> Cow<'_, Value>;
}

/// Read the permissions held by a principal
///
/// Nothing is cached: each call performs a fresh extraction.
pub fn extract_permissions<P: Principal + ?Sized>(
    principal: &P,
) -> Result<Vec<String>, PermissionError> {
    principal.permissions()
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn permissions_from_field(field: &Value) -> Result<Vec<String>, PermissionError> {
    let items = match field {
        Value::Null => return Err(PermissionError::NilPermissions),
        Value::Array(items) => items,
        other => return Err(PermissionError::NotASequence(kind_of(other))),
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::String(permission) => Ok(permission.clone()),
            other => Err(PermissionError::ElementNotString {
                index,
                kind: kind_of(other),
            }),
        })
        .collect()
}

/// Keyed mapping or record view: the `Permissions` entry of an object
impl Principal for Value {
    fn permissions(&self) -> Result<Vec<String>, PermissionError> {
        match self {
            Value::Null => Err(PermissionError::NilPrincipal),
            Value::Object(fields) => {
                let field = fields
                    .get(PERMISSIONS_FIELD)
                    .ok_or(PermissionError::FieldNotFound)?;
                permissions_from_field(field)
            }
            other => Err(PermissionError::UnsupportedPrincipalType(kind_of(other))),
        }
    }

    fn attributes(&self) -> Cow<'_, Value> {
        Cow::Borrowed(self)
    }
}

macro_rules! impl_map_principal {
    ($map:ident) => {
        impl Principal for $map<String, Vec<String>> {
            fn permissions(&self) -> Result<Vec<String>, PermissionError> {
                self.get(PERMISSIONS_FIELD)
                    .cloned()
                    .ok_or(PermissionError::FieldNotFound)
            }

            fn attributes(&self) -> Cow<'_, Value> {
                Cow::Owned(Value::Object(
                    self.iter()
                        .map(|(key, values)| (key.clone(), Value::from(values.clone())))
                        .collect(),
                ))
            }
        }
    };
}

impl_map_principal!(HashMap);
impl_map_principal!(BTreeMap);

/// Structured record principal
///
/// Wraps any serializable struct. The struct is serialized once on
/// construction; its `Permissions` field (use `#[serde(rename)]` or
/// `rename_all = "PascalCase"`) must serialize to a list of strings. An
/// `Option` field that is `None` reports [`PermissionError::NilPermissions`].
#[derive(Debug, Clone)]
pub struct Record<T> {
    inner: T,
    view: Value,
}

impl<T: Serialize> Record<T> {
    /// Wrap a record, capturing its structural view
    ///
    /// A record that serializes as a map must be keyed by strings;
    /// otherwise [`PermissionError::UnsupportedKeyType`] is returned.
    pub fn new(inner: T) -> Result<Self, PermissionError> {
        key_shape::check(&inner)?;
        let view = serde_json::to_value(&inner)
            .map_err(|e| PermissionError::NotARecord(e.to_string()))?;
        Ok(Self { inner, view })
    }
}

impl<T> Record<T> {
    /// The wrapped record
    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> Principal for Record<T> {
    fn permissions(&self) -> Result<Vec<String>, PermissionError> {
        match &self.view {
            Value::Object(_) => self.view.permissions(),
            Value::Null => Err(PermissionError::NilPrincipal),
            other => Err(PermissionError::UnsupportedPrincipalType(kind_of(other))),
        }
    }

    fn attributes(&self) -> Cow<'_, Value> {
        Cow::Borrowed(&self.view)
    }
}

/// One level of indirection: an absent principal
impl<P: Principal> Principal for Option<P> {
    fn permissions(&self) -> Result<Vec<String>, PermissionError> {
        match self {
            Some(principal) => principal.permissions(),
            None => Err(PermissionError::NilPrincipal),
        }
    }

    fn attributes(&self) -> Cow<'_, Value> {
        match self {
            Some(principal) => principal.attributes(),
            None => Cow::Owned(Value::Null),
        }
    }
}

impl<P: Principal + ?Sized> Principal for &P {
    fn permissions(&self) -> Result<Vec<String>, PermissionError> {
        (**self).permissions()
    }

    fn attributes(&self) -> Cow<'_, Value> {
        (**self).attributes()
    }
}

impl<P: Principal + ?Sized> Principal for Box<P> {
    fn permissions(&self) -> Result<Vec<String>, PermissionError> {
        (**self).permissions()
    }

    fn attributes(&self) -> Cow<'_, Value> {
        (**self).attributes()
    }
}

impl<P: Principal + ?Sized> Principal for Arc<P> {
    fn permissions(&self) -> Result<Vec<String>, PermissionError> {
        (**self).permissions()
    }

    fn attributes(&self) -> Cow<'_, Value> {
        (**self).attributes()
    }
}

/// Map key inspection ahead of serde_json, which would stringify integer keys
mod key_shape {
    use super::PermissionError;
    use serde::ser::{self, Impossible, Serialize, SerializeMap, Serializer};
    use std::fmt;

    #[derive(Debug)]
    enum Shape {
        /// Not a map at the top level, nothing to check
        NotAMap,
        /// Map key of the named kind
        Key(&'static str),
        /// The value's own `Serialize` impl failed
        Custom(String),
    }

    impl fmt::Display for Shape {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Shape::NotAMap => f.write_str("not a map"),
                Shape::Key(kind) => write!(f, "{} key", kind),
                Shape::Custom(msg) => f.write_str(msg),
            }
        }
    }

    impl std::error::Error for Shape {}

    impl ser::Error for Shape {
        fn custom<M: fmt::Display>(msg: M) -> Self {
            Shape::Custom(msg.to_string())
        }
    }

    /// Fail when `value` serializes as a map with non-string keys
    pub(super) fn check<T: Serialize + ?Sized>(value: &T) -> Result<(), PermissionError> {
        match value.serialize(Outer) {
            Err(Shape::Key(kind)) => Err(PermissionError::UnsupportedKeyType(kind)),
            _ => Ok(()),
        }
    }

    macro_rules! scalars {
        ($result:expr; $($method:ident: $ty:ty => $kind:expr),* $(,)?) => {
            $(
                fn $method(self, _v: $ty) -> Result<(), Shape> {
                    $result($kind)
                }
            )*
        };
    }

    macro_rules! compound {
        ($result:expr) => {
            fn serialize_none(self) -> Result<(), Shape> {
                $result("null")
            }

            fn serialize_unit(self) -> Result<(), Shape> {
                $result("null")
            }

            fn serialize_unit_struct(self, _name: &'static str) -> Result<(), Shape> {
                $result("unit struct")
            }

            fn serialize_unit_variant(
                self,
                _name: &'static str,
                _index: u32,
                _variant: &'static str,
            ) -> Result<(), Shape> {
                $result("enum")
            }

            fn serialize_newtype_variant<V: Serialize + ?Sized>(
                self,
                _name: &'static str,
                _index: u32,
                _variant: &'static str,
                _value: &V,
            ) -> Result<(), Shape> {
                $result("enum")
            }

            fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Shape> {
                $result("sequence")
            }

            fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Shape> {
                $result("tuple")
            }

            fn serialize_tuple_struct(
                self,
                _name: &'static str,
                _len: usize,
            ) -> Result<Self::SerializeTupleStruct, Shape> {
                $result("tuple struct")
            }

            fn serialize_tuple_variant(
                self,
                _name: &'static str,
                _index: u32,
                _variant: &'static str,
                _len: usize,
            ) -> Result<Self::SerializeTupleVariant, Shape> {
                $result("enum")
            }

            fn serialize_struct(
                self,
                _name: &'static str,
                _len: usize,
            ) -> Result<Self::SerializeStruct, Shape> {
                $result("struct")
            }

            fn serialize_struct_variant(
                self,
                _name: &'static str,
                _index: u32,
                _variant: &'static str,
                _len: usize,
            ) -> Result<Self::SerializeStructVariant, Shape> {
                $result("enum")
            }
        };
    }

    fn not_a_map<T>(_kind: &'static str) -> Result<T, Shape> {
        Err(Shape::NotAMap)
    }

    fn bad_key<T>(kind: &'static str) -> Result<T, Shape> {
        Err(Shape::Key(kind))
    }

    /// Top-level value: only maps are inspected
    struct Outer;

    impl Serializer for Outer {
        type Ok = ();
        type Error = Shape;
        type SerializeSeq = Impossible<(), Shape>;
        type SerializeTuple = Impossible<(), Shape>;
        type SerializeTupleStruct = Impossible<(), Shape>;
        type SerializeTupleVariant = Impossible<(), Shape>;
        type SerializeMap = Keys;
        type SerializeStruct = Impossible<(), Shape>;
        type SerializeStructVariant = Impossible<(), Shape>;

        scalars!(not_a_map;
            serialize_bool: bool => "bool",
            serialize_i8: i8 => "integer",
            serialize_i16: i16 => "integer",
            serialize_i32: i32 => "integer",
            serialize_i64: i64 => "integer",
            serialize_u8: u8 => "integer",
            serialize_u16: u16 => "integer",
            serialize_u32: u32 => "integer",
            serialize_u64: u64 => "integer",
            serialize_f32: f32 => "float",
            serialize_f64: f64 => "float",
            serialize_char: char => "char",
            serialize_str: &str => "string",
            serialize_bytes: &[u8] => "bytes",
        );

        compound!(not_a_map);

        fn serialize_some<V: Serialize + ?Sized>(self, value: &V) -> Result<(), Shape> {
            value.serialize(self)
        }

        fn serialize_newtype_struct<V: Serialize + ?Sized>(
            self,
            _name: &'static str,
            value: &V,
        ) -> Result<(), Shape> {
            value.serialize(self)
        }

        fn serialize_map(self, _len: Option<usize>) -> Result<Keys, Shape> {
            Ok(Keys)
        }
    }

    /// Map entries: every key must be a string
    struct Keys;

    impl SerializeMap for Keys {
        type Ok = ();
        type Error = Shape;

        fn serialize_key<K: Serialize + ?Sized>(&mut self, key: &K) -> Result<(), Shape> {
            key.serialize(Key)
        }

        fn serialize_value<V: Serialize + ?Sized>(&mut self, _value: &V) -> Result<(), Shape> {
            Ok(())
        }

        fn end(self) -> Result<(), Shape> {
            Ok(())
        }
    }

    /// A single map key
    struct Key;

    impl Serializer for Key {
        type Ok = ();
        type Error = Shape;
        type SerializeSeq = Impossible<(), Shape>;
        type SerializeTuple = Impossible<(), Shape>;
        type SerializeTupleStruct = Impossible<(), Shape>;
        type SerializeTupleVariant = Impossible<(), Shape>;
        type SerializeMap = Impossible<(), Shape>;
        type SerializeStruct = Impossible<(), Shape>;
        type SerializeStructVariant = Impossible<(), Shape>;

        scalars!(bad_key;
            serialize_bool: bool => "bool",
            serialize_i8: i8 => "integer",
            serialize_i16: i16 => "integer",
            serialize_i32: i32 => "integer",
            serialize_i64: i64 => "integer",
            serialize_u8: u8 => "integer",
            serialize_u16: u16 => "integer",
            serialize_u32: u32 => "integer",
            serialize_u64: u64 => "integer",
            serialize_f32: f32 => "float",
            serialize_f64: f64 => "float",
            serialize_bytes: &[u8] => "bytes",
        );

        compound!(bad_key);

        fn serialize_char(self, _v: char) -> Result<(), Shape> {
            Ok(())
        }

        fn serialize_str(self, _v: &str) -> Result<(), Shape> {
            Ok(())
        }

        fn serialize_some<V: Serialize + ?Sized>(self, _value: &V) -> Result<(), Shape> {
            bad_key("option")
        }

        fn serialize_newtype_struct<V: Serialize + ?Sized>(
            self,
            _name: &'static str,
            value: &V,
        ) -> Result<(), Shape> {
            value.serialize(self)
        }

        fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Shape> {
            bad_key("map")
        }
    }
}

//! Snapshot serialization
//!
//! Payloads are compact JSON: camelCase field names, enumerations by symbolic
//! name, numbers in locale-independent shortest round-trip form and the
//! body-index pixels as a base64 string. Maps are ordered, so the same
//! snapshot always produces byte-identical payloads.

use serde::ser::{self, Serialize, Serializer};
use std::fmt::Display;

use crate::types::{Payload, Snapshot};
use crate::{MotionError, Result};

/// Render one snapshot into its wire payload.
///
/// A non-finite number anywhere in the snapshot cannot be represented in JSON
/// and yields [`MotionError::Serialization`], which the pipeline treats as fatal.
pub fn serialize_snapshot(snapshot: &Snapshot) -> Result<Payload> {
    let bytes = serde_json::to_vec(&Finite(snapshot)).map_err(|e| {
        let message = e.to_string();
        MotionError::serialization(message.trim_start_matches('.'))
    })?;
    Ok(Payload::from(bytes))
}

/// Serializes the wrapped value, failing on the first NaN or infinity.
///
/// serde_json writes non-finite floats as `null`. Wrapping the serializer
/// itself catches every float field, including ones added later. The error
/// names the offending path, e.g. `bodies[0].lean.x`.
struct Finite<'a, T: ?Sized>(&'a T);

impl<T: ?Sized + Serialize> Serialize for Finite<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(FiniteSerializer(serializer))
    }
}

fn check_finite<E: ser::Error>(value: f64) -> std::result::Result<(), E> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(E::custom(format_args!(" is not a finite number ({value})")))
    }
}

fn prefixed<E: ser::Error>(segment: impl Display, err: E) -> E {
    E::custom(format_args!("{segment}{err}"))
}

// Only rendered on the error path.
fn key_text<K: ?Sized + Serialize>(key: &K) -> String {
    match serde_json::to_value(key) {
        Ok(serde_json::Value::String(text)) => text,
        Ok(other) => other.to_string(),
        Err(_) => "?".to_string(),
    }
}

struct FiniteSerializer<S>(S);

macro_rules! forward {
    ($($method:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method(self, v: $ty) -> std::result::Result<S::Ok, S::Error> {
                self.0.$method(v)
            }
        )*
    };
}

impl<S: Serializer> Serializer for FiniteSerializer<S> {
    type Ok = S::Ok;
    type Error = S::Error;
    type SerializeSeq = Compound<S::SerializeSeq>;
    type SerializeTuple = Compound<S::SerializeTuple>;
    type SerializeTupleStruct = Compound<S::SerializeTupleStruct>;
    type SerializeTupleVariant = Compound<S::SerializeTupleVariant>;
    type SerializeMap = Compound<S::SerializeMap>;
    type SerializeStruct = Compound<S::SerializeStruct>;
    type SerializeStructVariant = Compound<S::SerializeStructVariant>;

    forward! {
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_i128(i128),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_u128(u128),
        serialize_char(char),
        serialize_str(&str),
        serialize_bytes(&[u8]),
        serialize_unit_struct(&'static str),
    }

    fn serialize_f32(self, v: f32) -> std::result::Result<S::Ok, S::Error> {
        check_finite::<S::Error>(f64::from(v))?;
        self.0.serialize_f32(v)
    }

    fn serialize_f64(self, v: f64) -> std::result::Result<S::Ok, S::Error> {
        check_finite::<S::Error>(v)?;
        self.0.serialize_f64(v)
    }

    fn serialize_none(self) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize_none()
    }

    fn serialize_some<T: ?Sized + Serialize>(
        self,
        value: &T,
    ) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize_some(&Finite(value))
    }

    fn serialize_unit(self) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        index: u32,
        variant: &'static str,
    ) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize_unit_variant(name, index, variant)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        value: &T,
    ) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize_newtype_struct(name, &Finite(value))
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        index: u32,
        variant: &'static str,
        value: &T,
    ) -> std::result::Result<S::Ok, S::Error> {
        self.0
            .serialize_newtype_variant(name, index, variant, &Finite(value))
            .map_err(|e| prefixed(format_args!(".{variant}"), e))
    }

    fn serialize_seq(self, len: Option<usize>) -> std::result::Result<Self::SerializeSeq, S::Error> {
        self.0.serialize_seq(len).map(Compound::new)
    }

    fn serialize_tuple(self, len: usize) -> std::result::Result<Self::SerializeTuple, S::Error> {
        self.0.serialize_tuple(len).map(Compound::new)
    }

    fn serialize_tuple_struct(
        self,
        name: &'static str,
        len: usize,
    ) -> std::result::Result<Self::SerializeTupleStruct, S::Error> {
        self.0.serialize_tuple_struct(name, len).map(Compound::new)
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        index: u32,
        variant: &'static str,
        len: usize,
    ) -> std::result::Result<Self::SerializeTupleVariant, S::Error> {
        self.0.serialize_tuple_variant(name, index, variant, len).map(Compound::new)
    }

    fn serialize_map(self, len: Option<usize>) -> std::result::Result<Self::SerializeMap, S::Error> {
        self.0.serialize_map(len).map(Compound::new)
    }

    fn serialize_struct(
        self,
        name: &'static str,
        len: usize,
    ) -> std::result::Result<Self::SerializeStruct, S::Error> {
        self.0.serialize_struct(name, len).map(Compound::new)
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        index: u32,
        variant: &'static str,
        len: usize,
    ) -> std::result::Result<Self::SerializeStructVariant, S::Error> {
        self.0.serialize_struct_variant(name, index, variant, len).map(Compound::new)
    }

    fn is_human_readable(&self) -> bool {
        self.0.is_human_readable()
    }
}

/// Compound state of the wrapped serializer, counting positional elements.
struct Compound<C> {
    inner: C,
    index: usize,
}

impl<C> Compound<C> {
    fn new(inner: C) -> Self {
        Self { inner, index: 0 }
    }

    fn next_index(&mut self) -> usize {
        let index = self.index;
        self.index += 1;
        index
    }
}

macro_rules! positional {
    ($trait:ident, $method:ident) => {
        impl<C: ser::$trait> ser::$trait for Compound<C> {
            type Ok = C::Ok;
            type Error = C::Error;

            fn $method<T: ?Sized + Serialize>(
                &mut self,
                value: &T,
            ) -> std::result::Result<(), C::Error> {
                let index = self.next_index();
                self.inner.$method(&Finite(value)).map_err(|e| prefixed(format_args!("[{index}]"), e))
            }

            fn end(self) -> std::result::Result<C::Ok, C::Error> {
                self.inner.end()
            }
        }
    };
}

positional!(SerializeSeq, serialize_element);
positional!(SerializeTuple, serialize_element);
positional!(SerializeTupleStruct, serialize_field);
positional!(SerializeTupleVariant, serialize_field);

macro_rules! named {
    ($trait:ident) => {
        impl<C: ser::$trait> ser::$trait for Compound<C> {
            type Ok = C::Ok;
            type Error = C::Error;

            fn serialize_field<T: ?Sized + Serialize>(
                &mut self,
                key: &'static str,
                value: &T,
            ) -> std::result::Result<(), C::Error> {
                self.inner
                    .serialize_field(key, &Finite(value))
                    .map_err(|e| prefixed(format_args!(".{key}"), e))
            }

            fn skip_field(&mut self, key: &'static str) -> std::result::Result<(), C::Error> {
                self.inner.skip_field(key)
            }

            fn end(self) -> std::result::Result<C::Ok, C::Error> {
                self.inner.end()
            }
        }
    };
}

named!(SerializeStruct);
named!(SerializeStructVariant);

impl<C: ser::SerializeMap> ser::SerializeMap for Compound<C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> std::result::Result<(), C::Error> {
        self.inner.serialize_key(&Finite(key))
    }

    fn serialize_value<T: ?Sized + Serialize>(
        &mut self,
        value: &T,
    ) -> std::result::Result<(), C::Error> {
        self.inner.serialize_value(&Finite(value))
    }

    fn serialize_entry<K, V>(&mut self, key: &K, value: &V) -> std::result::Result<(), C::Error>
    where
        K: ?Sized + Serialize,
        V: ?Sized + Serialize,
    {
        self.inner
            .serialize_entry(&Finite(key), &Finite(value))
            .map_err(|e| prefixed(format_args!(".{}", key_text(key)), e))
    }

    fn end(self) -> std::result::Result<C::Ok, C::Error> {
        self.inner.end()
    }
}

use serde::{
    de::{self, value::Error as FieldsError, Visitor},
    forward_to_deserialize_any, Deserialize, Deserializer,
};
use serde_json::Value;

/// Naming convention for stored event type names and payload fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Casing {
    /// Type names and fields are stored exactly as Rust spells them.
    #[default]
    Default,
    /// `membersJoined`, with the event's fields in camelCase.
    CamelCase,
    /// `members_joined`, with the event's fields in snake_case.
    SnakeCase,
}

/// Converts between in-memory payloads and what is stored.
///
/// Only the event's own fields are renamed. Nested values, map keys and keys
/// that are not one of `fields` are stored as serde writes them, so reading
/// back uses the same `fields` to invert the renaming exactly.
pub trait Serializer: Send + Sync {
    /// Stored type name for an event's short name.
    fn type_name(&self, short_name: &str) -> String;

    /// Stored key for one of an event's fields.
    fn field_name(&self, field: &str) -> String;

    fn to_payload(&self, fields: &[&str], value: Value) -> Value {
        rename_fields(value, |key| fields.contains(&key).then(|| self.field_name(key)))
    }

    fn from_payload(&self, fields: &[&str], value: Value) -> Value {
        rename_fields(value, |key| {
            fields
                .iter()
                .find(|field| self.field_name(field) == key)
                .map(|field| field.to_string())
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer {
    casing: Casing,
}

impl JsonSerializer {
    pub fn new(casing: Casing) -> Self {
        Self { casing }
    }

    pub fn casing(&self) -> Casing {
        self.casing
    }
}

impl Serializer for JsonSerializer {
    fn type_name(&self, short_name: &str) -> String {
        match self.casing {
            Casing::Default => short_name.to_owned(),
            Casing::CamelCase => lower_first(short_name),
            Casing::SnakeCase => to_snake_case(short_name),
        }
    }

    fn field_name(&self, field: &str) -> String {
        match self.casing {
            Casing::Default => field.to_owned(),
            Casing::CamelCase => to_camel_case(field),
            Casing::SnakeCase => to_snake_case(field),
        }
    }
}

fn rename_fields(value: Value, rename: impl Fn(&str) -> Option<String>) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .map(|(key, value)| (rename(&key).unwrap_or(key), value))
                .collect(),
        ),
        value => value,
    }
}

/// Field names `T` deserializes from, as serde derive declares them.
///
/// Empty for anything that is not a plain struct (enums, newtypes,
/// flattened or hand written impls); those payloads are stored unrenamed.
pub fn payload_fields<T: for<'de> Deserialize<'de>>() -> &'static [&'static str] {
    let mut fields = None;
    let _ = T::deserialize(FieldNames(&mut fields));

    fields.unwrap_or(&[])
}

/// Deserializer that only records the field list of a struct request.
struct FieldNames<'a>(&'a mut Option<&'static [&'static str]>);

impl<'de> Deserializer<'de> for FieldNames<'_> {
    type Error = FieldsError;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        Err(de::Error::custom("not a struct"))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        *self.0 = Some(fields);

        Err(de::Error::custom("fields recorded"))
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map enum identifier ignored_any
    }
}

fn lower_first(value: &str) -> String {
    let mut chars = value.chars();

    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `first_name` and `FirstName` both become `firstName`.
pub fn to_camel_case(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut upper_next = false;

    for c in value.chars() {
        if c == '_' {
            upper_next = !result.is_empty();
            continue;
        }

        if upper_next {
            result.extend(c.to_uppercase());
            upper_next = false;
        } else {
            result.push(c);
        }
    }

    lower_first(&result)
}

/// `MembersJoined` becomes `members_joined`, `HTTPServer` becomes `http_server`.
pub fn to_snake_case(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut result = String::with_capacity(value.len() + 4);

    for (index, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let previous = index.checked_sub(1).and_then(|i| chars.get(i));
            let next = chars.get(index + 1);
            let boundary = match previous {
                Some(p) if *p == '_' => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };

            if boundary {
                result.push('_');
            }

            result.extend(c.to_lowercase());
        } else {
            result.push(*c);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_casing() {
        assert_eq!(to_snake_case("MembersJoined"), "members_joined");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_camel_case("first_name"), "firstName");
        assert_eq!(to_camel_case("MembersJoined"), "membersJoined");
        assert_eq!(lower_first("Quest"), "quest");
    }

    #[derive(Deserialize)]
    #[allow(dead_code)]
    struct Address {
        address_line_1: String,
        a_b_c: i32,
    }

    #[test]
    fn reads_struct_fields() {
        assert_eq!(payload_fields::<Address>(), &["address_line_1", "a_b_c"]);
        assert!(payload_fields::<Vec<String>>().is_empty());
        assert!(payload_fields::<std::collections::HashMap<String, i32>>().is_empty());
    }

    #[test]
    fn camel_case_renames_only_listed_fields() {
        let serializer = JsonSerializer::new(Casing::CamelCase);
        let fields = ["address_line_1", "a_b_c", "tags"];
        let payload = serde_json::json!({
            "address_line_1": "x",
            "a_b_c": 1,
            "tags": { "user_id": 2 },
            "extra_key": true
        });

        let stored = serializer.to_payload(&fields, payload.clone());

        assert_eq!(
            stored,
            serde_json::json!({
                "addressLine1": "x",
                "aBC": 1,
                "tags": { "user_id": 2 },
                "extra_key": true
            })
        );
        assert_eq!(serializer.from_payload(&fields, stored), payload);
    }
}

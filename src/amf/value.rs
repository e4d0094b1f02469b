//! AMF0 value types
//!
//! Objects keep their properties in wire order. Command bodies rely on
//! positional access (name, transaction id, command object, ...), so a map
//! would lose information the session layer needs.

/// A single AMF0 value
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// IEEE 754 double (0x00)
    Number(f64),

    /// Boolean (0x01)
    Boolean(bool),

    /// UTF-8 string (0x02, or 0x0C when longer than 0xFFFF bytes)
    String(String),

    /// Null (0x05). Undefined (0x06) and Unsupported (0x0D) also decode here.
    Null,

    /// Anonymous object (0x03)
    Object(AmfObject),

    /// Associative array (0x08); the count hint is not kept
    EcmaArray(AmfObject),

    /// Dense array (0x0A)
    StrictArray(Vec<AmfValue>),

    /// Date (0x0B): milliseconds since the epoch plus a timezone offset
    Date { millis: f64, utc_offset: i16 },

    /// XML document (0x0F)
    Xml(String),

    /// Object with a class name (0x10)
    TypedObject {
        class_name: String,
        properties: AmfObject,
    },
}

impl AmfValue {
    /// Try to get this value as a string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get the properties of an object-like value
    ///
    /// Plain objects, ECMA arrays and typed objects all qualify.
    pub fn as_object(&self) -> Option<&AmfObject> {
        match self {
            AmfValue::Object(o) => Some(o),
            AmfValue::EcmaArray(o) => Some(o),
            AmfValue::TypedObject { properties, .. } => Some(properties),
            _ => None,
        }
    }

    /// Try to get this value as a strict array
    pub fn as_array(&self) -> Option<&[AmfValue]> {
        match self {
            AmfValue::StrictArray(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AmfValue::Null)
    }

    /// Look up a named property of an object-like value
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.as_object()?.get(key)
    }

    /// Get a string property from an object value
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Get a number property from an object value
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }
}

impl Default for AmfValue {
    fn default() -> Self {
        AmfValue::Null
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Number(v)
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        AmfValue::Number(v as f64)
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}

impl From<AmfObject> for AmfValue {
    fn from(v: AmfObject) -> Self {
        AmfValue::Object(v)
    }
}

impl<V: Into<AmfValue>> From<Vec<V>> for AmfValue {
    fn from(v: Vec<V>) -> Self {
        AmfValue::StrictArray(v.into_iter().map(Into::into).collect())
    }
}

/// A property of an object: a value with an optional name
///
/// Top-level command and data bodies are decoded as nameless properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: Option<String>,
    pub value: AmfValue,
}

impl Property {
    pub fn named(name: impl Into<String>, value: impl Into<AmfValue>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
        }
    }

    pub fn unnamed(value: impl Into<AmfValue>) -> Self {
        Self {
            name: None,
            value: value.into(),
        }
    }
}

/// Key for [`AmfObject::get_property`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyKey<'a> {
    Index(usize),
    Name(&'a str),
}

/// Ordered property list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmfObject {
    properties: Vec<Property>,
}

impl AmfObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a property, named or not
    pub fn push(&mut self, property: Property) {
        self.properties.push(property);
    }

    /// Append a named property
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AmfValue>) {
        self.properties.push(Property::named(name, value));
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AmfValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Positional or by-name lookup
    ///
    /// Name lookup returns the first property with a matching name.
    pub fn get_property(&self, key: PropertyKey<'_>) -> Option<&Property> {
        match key {
            PropertyKey::Index(i) => self.properties.get(i),
            PropertyKey::Name(name) => self
                .properties
                .iter()
                .find(|p| p.name.as_deref() == Some(name)),
        }
    }

    /// Value at a position
    pub fn at(&self, index: usize) -> Option<&AmfValue> {
        self.get_property(PropertyKey::Index(index)).map(|p| &p.value)
    }

    /// Value of the first property with this name
    pub fn get(&self, name: &str) -> Option<&AmfValue> {
        self.get_property(PropertyKey::Name(name)).map(|p| &p.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.properties.iter()
    }

    /// Consume the object, returning its values in order
    pub fn into_values(self) -> impl Iterator<Item = AmfValue> {
        self.properties.into_iter().map(|p| p.value)
    }
}

impl FromIterator<Property> for AmfObject {
    fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Self {
        Self {
            properties: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a AmfObject {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        let s = AmfValue::String("test".into());
        assert_eq!(s.as_str(), Some("test"));
        assert_eq!(s.as_number(), None);

        let n = AmfValue::Number(42.0);
        assert_eq!(n.as_number(), Some(42.0));
        assert_eq!(n.as_bool(), None);

        let o = AmfValue::Object(AmfObject::new().with("key", "value"));
        assert_eq!(o.get_string("key"), Some("value"));
        assert_eq!(o.get_number("key"), None);
        assert!(o.as_array().is_none());
    }

    #[test]
    fn test_get_property_by_index_and_name() {
        let mut obj = AmfObject::new();
        obj.push(Property::unnamed("play"));
        obj.push(Property::unnamed(3.0));
        obj.insert("code", "NetStream.Play.Start");

        assert_eq!(obj.len(), 3);
        assert_eq!(obj.at(0).and_then(AmfValue::as_str), Some("play"));
        assert_eq!(obj.at(1).and_then(AmfValue::as_number), Some(3.0));
        assert!(obj.at(3).is_none());

        let prop = obj.get_property(PropertyKey::Name("code")).unwrap();
        assert_eq!(prop.name.as_deref(), Some("code"));
        assert!(obj.get_property(PropertyKey::Name("level")).is_none());
    }

    #[test]
    fn test_name_lookup_returns_first_match() {
        let obj = AmfObject::new().with("k", 1.0).with("k", 2.0);
        assert_eq!(obj.get("k"), Some(&AmfValue::Number(1.0)));
    }

    #[test]
    fn test_order_is_preserved() {
        let obj = AmfObject::new().with("b", 1.0).with("a", 2.0).with("c", 3.0);
        let names: Vec<_> = obj.iter().filter_map(|p| p.name.as_deref()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_as_object_covers_object_like_values() {
        let props = AmfObject::new().with("x", 10.0);

        assert!(AmfValue::Object(props.clone()).as_object().is_some());
        assert!(AmfValue::EcmaArray(props.clone()).as_object().is_some());

        let typed = AmfValue::TypedObject {
            class_name: "Point".into(),
            properties: props,
        };
        assert_eq!(typed.get_number("x"), Some(10.0));

        assert!(AmfValue::Null.get("x").is_none());
        assert!(AmfValue::StrictArray(vec![]).as_object().is_none());
    }

    #[test]
    fn test_from_conversions() {
        let v: AmfValue = "test".into();
        assert!(matches!(v, AmfValue::String(_)));

        let v: AmfValue = 42u32.into();
        assert_eq!(v, AmfValue::Number(42.0));

        let v: AmfValue = vec![1.0, 2.0].into();
        assert_eq!(v.as_array().map(<[AmfValue]>::len), Some(2));

        let v: AmfValue = AmfObject::new().with("a", true).into();
        assert_eq!(v.get("a").and_then(AmfValue::as_bool), Some(true));
    }

    #[test]
    fn test_default_is_null() {
        assert!(AmfValue::default().is_null());
    }

    #[test]
    fn test_into_values() {
        let obj: AmfObject = vec![Property::unnamed("a"), Property::named("n", 1.0)]
            .into_iter()
            .collect();
        let values: Vec<_> = obj.into_values().collect();
        assert_eq!(values, vec![AmfValue::from("a"), AmfValue::Number(1.0)]);
    }
}

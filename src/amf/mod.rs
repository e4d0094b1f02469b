//! AMF0 (Action Message Format) implementation
//!
//! AMF0 is Adobe's binary serialization format used in RTMP for encoding
//! command parameters and metadata. Values are kept in an ordered tree so
//! positional access into command bodies stays cheap.

pub mod amf0;
pub mod value;

pub use amf0::{decode_object, decode_prop, decode_strict_array, Amf0Decoder, Amf0Encoder};
pub use value::{AmfObject, AmfValue, Property, PropertyKey};

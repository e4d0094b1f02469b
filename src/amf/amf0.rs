//! AMF0 encoder and decoder
//!
//! AMF0 is the original Action Message Format used in Flash/RTMP.
//! Reference: AMF0 File Format Specification (amf0-file-format-specification.pdf)
//!
//! Type Markers:
//! ```text
//! 0x00 - Number (IEEE 754 double)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (key-value pairs until 0x000009)
//! 0x04 - MovieClip (reserved, rejected)
//! 0x05 - Null
//! 0x06 - Undefined (decoded as Null)
//! 0x07 - Reference (rejected)
//! 0x08 - ECMA Array (count hint + object body)
//! 0x09 - Object End (0x000009 sequence)
//! 0x0A - Strict Array (dense array)
//! 0x0B - Date (double + timezone)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! 0x0D - Unsupported (decoded as Null)
//! 0x0E - RecordSet (reserved, rejected)
//! 0x0F - XML Document
//! 0x10 - Typed Object (class name + properties)
//! 0x11 - AVM+ (rejected)
//! ```
//!
//! Decoding works on borrowed slices and reports how many bytes were
//! consumed; every string is copied out, so decoded values never borrow the
//! input. Any malformed or truncated input is an error.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::value::{AmfObject, AmfValue, Property};
use crate::error::AmfError;

// AMF0 type markers
const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_MOVIECLIP: u8 = 0x04;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_REFERENCE: u8 = 0x07;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;
const MARKER_UNSUPPORTED: u8 = 0x0D;
const MARKER_RECORDSET: u8 = 0x0E;
const MARKER_XML_DOCUMENT: u8 = 0x0F;
const MARKER_TYPED_OBJECT: u8 = 0x10;
const MARKER_AVMPLUS: u8 = 0x11;

/// Empty name followed by the object-end marker
const OBJECT_END: [u8; 3] = [0x00, 0x00, MARKER_OBJECT_END];

/// Maximum nesting depth for objects/arrays (prevent stack overflow)
const MAX_NESTING_DEPTH: usize = 64;

/// AMF0 decoder over a borrowed buffer
pub struct Amf0Decoder<'a> {
    buf: &'a [u8],
    start_len: usize,
    depth: usize,
}

impl<'a> Amf0Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            start_len: buf.len(),
            depth: 0,
        }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.start_len - self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Decode a single value (marker + payload)
    pub fn decode(&mut self) -> Result<AmfValue, AmfError> {
        if self.buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(AmfError::NestingTooDeep);
        }

        let marker = self.buf.get_u8();
        let result = self.decode_value(marker);
        self.depth -= 1;
        result
    }

    /// Decode one property: an optional 16-bit-length name, then a value
    pub fn decode_property(&mut self, decode_name: bool) -> Result<Property, AmfError> {
        let name = if decode_name {
            Some(self.read_utf8()?)
        } else {
            None
        };
        let value = self.decode()?;
        Ok(Property { name, value })
    }

    /// Decode the properties of an object body
    ///
    /// Named bodies must be closed by the object-end sequence, which is
    /// consumed. Nameless bodies (top-level command and data payloads) have
    /// no end sequence and run to the end of input.
    pub fn decode_object_body(&mut self, decode_name: bool) -> Result<AmfObject, AmfError> {
        let mut object = AmfObject::new();
        loop {
            if decode_name {
                if self.buf.starts_with(&OBJECT_END) {
                    self.buf.advance(OBJECT_END.len());
                    break;
                }
                if self.buf.is_empty() {
                    return Err(AmfError::UnexpectedEof);
                }
            } else if self.buf.is_empty() {
                break;
            }
            object.push(self.decode_property(decode_name)?);
        }
        Ok(object)
    }

    /// Decode a 32-bit element count followed by that many values
    pub fn decode_strict_array_body(&mut self) -> Result<Vec<AmfValue>, AmfError> {
        let count = self.read_u32()? as usize;
        // Every element needs at least its marker byte
        if count > self.buf.len() {
            return Err(AmfError::UnexpectedEof);
        }

        let mut elements = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            elements.push(self.decode()?);
        }
        Ok(elements)
    }

    /// Decode values until the buffer is exhausted
    pub fn decode_all(&mut self) -> Result<Vec<AmfValue>, AmfError> {
        let mut values = Vec::new();
        while !self.buf.is_empty() {
            values.push(self.decode()?);
        }
        Ok(values)
    }

    fn decode_value(&mut self, marker: u8) -> Result<AmfValue, AmfError> {
        match marker {
            MARKER_NUMBER => Ok(AmfValue::Number(self.read_f64()?)),
            MARKER_BOOLEAN => Ok(AmfValue::Boolean(self.read_u8()? != 0)),
            MARKER_STRING => Ok(AmfValue::String(self.read_utf8()?)),
            MARKER_OBJECT => Ok(AmfValue::Object(self.decode_object_body(true)?)),
            MARKER_NULL | MARKER_UNDEFINED | MARKER_UNSUPPORTED => Ok(AmfValue::Null),
            MARKER_ECMA_ARRAY => {
                // Count hint, often wrong in the wild
                self.read_u32()?;
                Ok(AmfValue::EcmaArray(self.decode_object_body(true)?))
            }
            MARKER_STRICT_ARRAY => Ok(AmfValue::StrictArray(self.decode_strict_array_body()?)),
            MARKER_DATE => {
                let millis = self.read_f64()?;
                let utc_offset = self.read_i16()?;
                Ok(AmfValue::Date { millis, utc_offset })
            }
            MARKER_LONG_STRING => Ok(AmfValue::String(self.read_utf8_long()?)),
            MARKER_XML_DOCUMENT => Ok(AmfValue::Xml(self.read_utf8_long()?)),
            MARKER_TYPED_OBJECT => {
                let class_name = self.read_utf8()?;
                let properties = self.decode_object_body(true)?;
                Ok(AmfValue::TypedObject {
                    class_name,
                    properties,
                })
            }
            MARKER_OBJECT_END => Err(AmfError::InvalidObjectEnd),
            MARKER_MOVIECLIP | MARKER_REFERENCE | MARKER_RECORDSET | MARKER_AVMPLUS => {
                Err(AmfError::UnsupportedMarker(marker))
            }
            _ => Err(AmfError::UnknownMarker(marker)),
        }
    }

    fn ensure(&self, n: usize) -> Result<(), AmfError> {
        if self.buf.remaining() < n {
            Err(AmfError::UnexpectedEof)
        } else {
            Ok(())
        }
    }

    fn read_u8(&mut self) -> Result<u8, AmfError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    fn read_i16(&mut self) -> Result<i16, AmfError> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    fn read_u32(&mut self) -> Result<u32, AmfError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    fn read_f64(&mut self) -> Result<f64, AmfError> {
        self.ensure(8)?;
        Ok(self.buf.get_f64())
    }

    /// Read UTF-8 string with 16-bit length prefix
    fn read_utf8(&mut self) -> Result<String, AmfError> {
        self.ensure(2)?;
        let len = self.buf.get_u16() as usize;
        self.read_str(len)
    }

    /// Read UTF-8 string with 32-bit length prefix
    fn read_utf8_long(&mut self) -> Result<String, AmfError> {
        let len = self.read_u32()? as usize;
        self.read_str(len)
    }

    fn read_str(&mut self, len: usize) -> Result<String, AmfError> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        let s = std::str::from_utf8(head).map_err(|_| AmfError::InvalidUtf8)?;
        self.buf = tail;
        Ok(s.to_owned())
    }
}

/// AMF0 encoder
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Create encoder with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Get the encoded bytes and reset encoder
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Get current encoded length
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if encoder is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Encode a single AMF0 value
    pub fn encode(&mut self, value: &AmfValue) {
        match value {
            AmfValue::Null => {
                self.buf.put_u8(MARKER_NULL);
            }
            AmfValue::Boolean(b) => {
                self.buf.put_u8(MARKER_BOOLEAN);
                self.buf.put_u8(u8::from(*b));
            }
            AmfValue::Number(n) => {
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*n);
            }
            AmfValue::String(s) => {
                if s.len() > 0xFFFF {
                    self.buf.put_u8(MARKER_LONG_STRING);
                    self.buf.put_u32(s.len() as u32);
                } else {
                    self.buf.put_u8(MARKER_STRING);
                    self.buf.put_u16(s.len() as u16);
                }
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::Object(props) => {
                self.buf.put_u8(MARKER_OBJECT);
                self.encode_object_body(props);
            }
            AmfValue::EcmaArray(props) => {
                self.buf.put_u8(MARKER_ECMA_ARRAY);
                self.buf.put_u32(props.len() as u32);
                self.encode_object_body(props);
            }
            AmfValue::StrictArray(elements) => {
                self.buf.put_u8(MARKER_STRICT_ARRAY);
                self.buf.put_u32(elements.len() as u32);
                for elem in elements {
                    self.encode(elem);
                }
            }
            AmfValue::Date { millis, utc_offset } => {
                self.buf.put_u8(MARKER_DATE);
                self.buf.put_f64(*millis);
                self.buf.put_i16(*utc_offset);
            }
            AmfValue::Xml(s) => {
                self.buf.put_u8(MARKER_XML_DOCUMENT);
                self.buf.put_u32(s.len() as u32);
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::TypedObject {
                class_name,
                properties,
            } => {
                self.buf.put_u8(MARKER_TYPED_OBJECT);
                self.write_utf8(class_name);
                self.encode_object_body(properties);
            }
        }
    }

    /// Encode a property: its bare name (if any) followed by the value
    pub fn encode_property(&mut self, property: &Property) {
        if let Some(name) = &property.name {
            self.write_utf8(name);
        }
        self.encode(&property.value);
    }

    /// Encode multiple values back to back
    pub fn encode_all(&mut self, values: &[AmfValue]) {
        for value in values {
            self.encode(value);
        }
    }

    fn encode_object_body(&mut self, props: &AmfObject) {
        for prop in props {
            // Inside an object every property carries a name, even if empty
            self.write_utf8(prop.name.as_deref().unwrap_or(""));
            self.encode(&prop.value);
        }
        self.buf.put_slice(&OBJECT_END);
    }

    /// Write UTF-8 string with 16-bit length prefix (no type marker)
    ///
    /// Property and class names are limited to 65535 bytes. Longer names are
    /// cut at the last character boundary that fits.
    fn write_utf8(&mut self, s: &str) {
        let mut len = s.len().min(0xFFFF);
        while !s.is_char_boundary(len) {
            len -= 1;
        }
        self.buf.put_u16(len as u16);
        self.buf.put_slice(&s.as_bytes()[..len]);
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode one property from the front of `buf`
///
/// Returns the property and the number of bytes it occupied.
pub fn decode_prop(buf: &[u8], decode_name: bool) -> Result<(Property, usize), AmfError> {
    let mut decoder = Amf0Decoder::new(buf);
    let prop = decoder.decode_property(decode_name)?;
    Ok((prop, decoder.position()))
}

/// Decode an object body (no leading marker) from the front of `buf`
pub fn decode_object(buf: &[u8], decode_name: bool) -> Result<(AmfObject, usize), AmfError> {
    let mut decoder = Amf0Decoder::new(buf);
    let object = decoder.decode_object_body(decode_name)?;
    Ok((object, decoder.position()))
}

/// Decode a strict array body (count + elements, no leading marker)
pub fn decode_strict_array(buf: &[u8]) -> Result<(Vec<AmfValue>, usize), AmfError> {
    let mut decoder = Amf0Decoder::new(buf);
    let elements = decoder.decode_strict_array_body()?;
    Ok((elements, decoder.position()))
}

/// Convenience function to encode a single value
pub fn encode(value: &AmfValue) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(value);
    encoder.finish()
}

/// Convenience function to encode multiple values
pub fn encode_all(values: &[AmfValue]) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values);
    encoder.finish()
}

/// Convenience function to decode a single value
pub fn decode(data: &[u8]) -> Result<AmfValue, AmfError> {
    Amf0Decoder::new(data).decode()
}

/// Convenience function to decode all values
pub fn decode_all(data: &[u8]) -> Result<Vec<AmfValue>, AmfError> {
    Amf0Decoder::new(data).decode_all()
}

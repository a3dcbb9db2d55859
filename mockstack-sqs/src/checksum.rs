//! Checksums clients verify against SQS responses

use std::collections::HashMap;

use base64::Engine;
use md5::{Digest, Md5};
use sha2::Sha256;

use crate::queue::MessageAttributeValue;

/// Lowercase hex MD5, the format of `MD5OfMessageBody`
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Lowercase hex SHA-256, used as the content-based deduplication id
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// MD5 over message attributes in the canonical SQS encoding.
///
/// Names are sorted; each attribute contributes its length-prefixed name,
/// length-prefixed data type, a transport byte (1 string, 2 binary) and the
/// length-prefixed value. Returns `None` for an empty map.
pub fn md5_of_message_attributes(attrs: &HashMap<String, MessageAttributeValue>) -> Option<String> {
    if attrs.is_empty() {
        return None;
    }

    let mut names: Vec<&String> = attrs.keys().collect();
    names.sort();

    let mut buf: Vec<u8> = Vec::new();
    for name in names {
        let attr = &attrs[name];
        push_length_prefixed(&mut buf, name.as_bytes());
        push_length_prefixed(&mut buf, attr.data_type.as_bytes());

        if attr.is_binary() {
            buf.push(2);
            let decoded = attr
                .binary_value
                .as_deref()
                .and_then(|v| base64::engine::general_purpose::STANDARD.decode(v).ok())
                .unwrap_or_default();
            push_length_prefixed(&mut buf, &decoded);
        } else {
            buf.push(1);
            let value = attr.string_value.as_deref().unwrap_or_default();
            push_length_prefixed(&mut buf, value.as_bytes());
        }
    }

    Some(md5_hex(&buf))
}

fn push_length_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_of_body() {
        assert_eq!(md5_hex(b"hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_sha256_dedup_id() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_empty_attributes_have_no_md5() {
        assert_eq!(md5_of_message_attributes(&HashMap::new()), None);
    }

    #[test]
    fn test_attribute_md5_ignores_insertion_order() {
        let mut a = HashMap::new();
        a.insert("b".to_string(), MessageAttributeValue::string("2"));
        a.insert("a".to_string(), MessageAttributeValue::number("1"));

        let mut b = HashMap::new();
        b.insert("a".to_string(), MessageAttributeValue::number("1"));
        b.insert("b".to_string(), MessageAttributeValue::string("2"));

        assert_eq!(md5_of_message_attributes(&a), md5_of_message_attributes(&b));
    }

    #[test]
    fn test_attribute_md5_matches_manual_encoding() {
        let mut attrs = HashMap::new();
        attrs.insert("k".to_string(), MessageAttributeValue::string("v"));

        let mut expected = Vec::new();
        expected.extend_from_slice(&1u32.to_be_bytes());
        expected.extend_from_slice(b"k");
        expected.extend_from_slice(&6u32.to_be_bytes());
        expected.extend_from_slice(b"String");
        expected.push(1);
        expected.extend_from_slice(&1u32.to_be_bytes());
        expected.extend_from_slice(b"v");

        assert_eq!(md5_of_message_attributes(&attrs), Some(md5_hex(&expected)));
    }

    #[test]
    fn test_binary_attribute_uses_decoded_bytes() {
        let mut attrs = HashMap::new();
        attrs.insert(
            "bin".to_string(),
            MessageAttributeValue::binary(base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3])),
        );

        let mut expected = Vec::new();
        expected.extend_from_slice(&3u32.to_be_bytes());
        expected.extend_from_slice(b"bin");
        expected.extend_from_slice(&6u32.to_be_bytes());
        expected.extend_from_slice(b"Binary");
        expected.push(2);
        expected.extend_from_slice(&3u32.to_be_bytes());
        expected.extend_from_slice(&[1, 2, 3]);

        assert_eq!(md5_of_message_attributes(&attrs), Some(md5_hex(&expected)));
    }
}

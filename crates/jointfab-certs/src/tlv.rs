//! Compact certificate encoding.
//!
//! A flat run of elements, each `tag (1 byte) | length (2 bytes LE) | value`,
//! in a fixed order. Distinguished names nest the same element format, one
//! element per attribute, with the attribute code as the tag and the value
//! as a little-endian integer.

use crate::cert::{Certificate, DistinguishedName, DnAttribute};
use crate::{CertError, MAX_COMPACT_CERT_LENGTH, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

const TAG_SERIAL: u8 = 0x01;
const TAG_ISSUER: u8 = 0x02;
const TAG_NOT_BEFORE: u8 = 0x03;
const TAG_NOT_AFTER: u8 = 0x04;
const TAG_SUBJECT: u8 = 0x05;
const TAG_PUBLIC_KEY: u8 = 0x06;
const TAG_SIGNATURE: u8 = 0x07;

fn push_element(out: &mut Vec<u8>, tag: u8, value: &[u8]) {
    out.push(tag);
    // Values are bounded by the certificate size limit.
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(value);
}

fn encode_dn(dn: &DistinguishedName) -> Vec<u8> {
    let mut out = Vec::new();
    for attribute in dn.attributes() {
        let value = attribute.value().to_le_bytes();
        let width = DnAttribute::width(attribute.code());
        push_element(&mut out, attribute.code(), &value[..width]);
    }
    out
}

pub(crate) fn encode(cert: &Certificate) -> Result<Vec<u8>, CertError> {
    let mut out = Vec::with_capacity(256);
    push_element(&mut out, TAG_SERIAL, &cert.serial.to_le_bytes());
    push_element(&mut out, TAG_ISSUER, &encode_dn(&cert.issuer));
    push_element(&mut out, TAG_NOT_BEFORE, &cert.not_before.to_le_bytes());
    push_element(&mut out, TAG_NOT_AFTER, &cert.not_after.to_le_bytes());
    push_element(&mut out, TAG_SUBJECT, &encode_dn(&cert.subject));
    push_element(&mut out, TAG_PUBLIC_KEY, &cert.public_key);
    push_element(&mut out, TAG_SIGNATURE, &cert.signature);

    if out.len() > MAX_COMPACT_CERT_LENGTH {
        return Err(CertError::TooLarge {
            len: out.len(),
            max: MAX_COMPACT_CERT_LENGTH,
        });
    }
    Ok(out)
}

struct Reader<'a> {
    input: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input }
    }

    fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    /// Reads the next element, returning its tag and value.
    fn next_element(&mut self) -> Result<(u8, &'a [u8]), CertError> {
        if self.input.len() < 3 {
            return Err(CertError::Truncated);
        }
        let tag = self.input[0];
        let len = usize::from(u16::from_le_bytes([self.input[1], self.input[2]]));
        let rest = &self.input[3..];
        if rest.len() < len {
            return Err(CertError::Truncated);
        }
        let (value, rest) = rest.split_at(len);
        self.input = rest;
        Ok((tag, value))
    }

    fn expect(&mut self, expected: u8) -> Result<&'a [u8], CertError> {
        let (found, value) = self.next_element()?;
        if found != expected {
            return Err(CertError::UnexpectedTag { expected, found });
        }
        Ok(value)
    }

    fn expect_array<const N: usize>(&mut self, tag: u8) -> Result<[u8; N], CertError> {
        self.expect(tag)?
            .try_into()
            .map_err(|_| CertError::Malformed("fixed-width field has wrong length"))
    }
}

fn decode_dn(bytes: &[u8]) -> Result<DistinguishedName, CertError> {
    let mut reader = Reader::new(bytes);
    let mut dn = DistinguishedName::new();
    while !reader.is_empty() {
        let (code, value) = reader.next_element()?;
        if value.len() != DnAttribute::width(code) {
            return Err(CertError::Malformed("DN attribute has wrong width"));
        }
        let mut raw = [0u8; 8];
        raw[..value.len()].copy_from_slice(value);
        dn.push(DnAttribute::from_code(code, u64::from_le_bytes(raw))?);
    }
    Ok(dn)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Certificate, CertError> {
    if bytes.len() > MAX_COMPACT_CERT_LENGTH {
        return Err(CertError::TooLarge {
            len: bytes.len(),
            max: MAX_COMPACT_CERT_LENGTH,
        });
    }
    let mut reader = Reader::new(bytes);
    let serial = u64::from_le_bytes(reader.expect_array(TAG_SERIAL)?);
    let issuer = decode_dn(reader.expect(TAG_ISSUER)?)?;
    let not_before = u32::from_le_bytes(reader.expect_array(TAG_NOT_BEFORE)?);
    let not_after = u32::from_le_bytes(reader.expect_array(TAG_NOT_AFTER)?);
    let subject = decode_dn(reader.expect(TAG_SUBJECT)?)?;
    let public_key: [u8; PUBLIC_KEY_LENGTH] = reader.expect_array(TAG_PUBLIC_KEY)?;
    let signature: [u8; SIGNATURE_LENGTH] = reader.expect_array(TAG_SIGNATURE)?;
    if !reader.is_empty() {
        return Err(CertError::TrailingData);
    }

    Ok(Certificate {
        serial,
        issuer,
        not_before,
        not_after,
        subject,
        public_key,
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jointfab_types::{CaseAuthTag, FabricId, NodeId};

    fn cert() -> Certificate {
        Certificate {
            serial: 0x0102_0304_0506_0708,
            issuer: DistinguishedName::new().with(DnAttribute::IcaId(3)),
            not_before: 10,
            not_after: 0,
            subject: DistinguishedName::new()
                .with(DnAttribute::NodeId(NodeId(0xAA)))
                .with(DnAttribute::FabricId(FabricId(0xBB)))
                .with(DnAttribute::CaseAuthTag(CaseAuthTag(0x0001_0001))),
            public_key: [7; PUBLIC_KEY_LENGTH],
            signature: [9; SIGNATURE_LENGTH],
        }
    }

    #[test]
    fn layout_starts_with_little_endian_serial() {
        let bytes = encode(&cert()).expect("encode");
        assert_eq!(&bytes[..3], &[TAG_SERIAL, 8, 0]);
        assert_eq!(&bytes[3..11], &0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(decode(&bytes).expect("decode"), cert());
    }

    #[test]
    fn truncated_input_rejected() {
        let bytes = encode(&cert()).expect("encode");
        assert_eq!(decode(&bytes[..bytes.len() - 1]), Err(CertError::Truncated));
        assert_eq!(decode(&[]), Err(CertError::Truncated));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = encode(&cert()).expect("encode");
        bytes.extend_from_slice(&[0x08, 0, 0]);
        assert_eq!(decode(&bytes), Err(CertError::TrailingData));
    }

    #[test]
    fn out_of_order_element_rejected() {
        let mut bytes = encode(&cert()).expect("encode");
        bytes[0] = TAG_ISSUER;
        assert_eq!(
            decode(&bytes),
            Err(CertError::UnexpectedTag {
                expected: TAG_SERIAL,
                found: TAG_ISSUER
            })
        );
    }

    #[test]
    fn oversized_input_rejected() {
        let bytes = vec![0u8; MAX_COMPACT_CERT_LENGTH + 1];
        assert!(matches!(decode(&bytes), Err(CertError::TooLarge { .. })));
    }
}

//! X.509 (DER) certificate encoding on top of `x509-cert`.
//!
//! Certificates use a fixed Ed25519 profile with no extensions. Each DN
//! attribute is one RDN whose type is `1.3.6.1.4.1.37244.1.<code>` and whose
//! value is a UTF8String of upper-case hex: 16 digits, or 8 for CASE
//! authenticated tags. Times before 2050 are UTCTime, later ones
//! GeneralizedTime; "no expiration" is `99991231235959Z`.

use std::time::Duration;

use x509_cert::der::asn1::{BitString, GeneralizedTime, ObjectIdentifier, SetOfVec, UtcTime};
use x509_cert::der::{Any, DateTime, Decode, Encode, Tag, Tagged};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::{Time, Validity};
use x509_cert::{TbsCertificate, Version};

use crate::cert::{Certificate, DistinguishedName, DnAttribute};
use crate::{CertError, MAX_DER_CERT_LENGTH, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

const ID_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");
const DN_ARC: &str = "1.3.6.1.4.1.37244.1";
const UTC_TIME_LAST_YEAR: u16 = 2049;

fn ed25519() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: ID_ED25519,
        parameters: None,
    }
}

fn no_expiration() -> Result<DateTime, CertError> {
    Ok(DateTime::new(9999, 12, 31, 23, 59, 59)?)
}

fn encode_time(secs: u32) -> Result<Time, CertError> {
    let at = DateTime::from_unix_duration(Duration::from_secs(u64::from(secs)))?;
    Ok(if at.year() <= UTC_TIME_LAST_YEAR {
        Time::UtcTime(UtcTime::from_date_time(at)?)
    } else {
        Time::GeneralTime(GeneralizedTime::from_date_time(at))
    })
}

fn decode_time(time: &Time) -> Result<u32, CertError> {
    u32::try_from(time.to_unix_duration().as_secs())
        .map_err(|_| CertError::Malformed("time beyond the 32-bit range"))
}

fn encode_name(dn: &DistinguishedName) -> Result<Name, CertError> {
    let mut rdns = Vec::with_capacity(dn.attributes().len());
    for attribute in dn.attributes() {
        let oid = ObjectIdentifier::new(&format!("{DN_ARC}.{}", attribute.code()))
            .map_err(|_| CertError::Malformed("DN attribute OID"))?;
        let width = DnAttribute::width(attribute.code());
        let value = attribute.value().to_be_bytes();
        let text = hex::encode_upper(&value[8 - width..]);
        let atv = AttributeTypeAndValue {
            oid,
            value: Any::new(Tag::Utf8String, text.into_bytes())?,
        };
        rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?));
    }
    Ok(RdnSequence(rdns))
}

fn decode_name(name: &Name) -> Result<DistinguishedName, CertError> {
    let mut dn = DistinguishedName::new();
    for rdn in name.0.iter() {
        let [atv] = rdn.0.as_slice() else {
            return Err(CertError::UnsupportedFormat("multi-valued RDN"));
        };
        let oid = atv.oid.to_string();
        let code = oid
            .strip_prefix(DN_ARC)
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(|arc| arc.parse::<u8>().ok())
            .ok_or(CertError::UnsupportedFormat("DN attribute outside known arc"))?;
        if atv.value.tag() != Tag::Utf8String {
            return Err(CertError::Malformed("DN value is not a UTF8String"));
        }
        let raw = hex::decode(atv.value.value())
            .map_err(|_| CertError::Malformed("DN value is not hex"))?;
        if raw.len() != DnAttribute::width(code) {
            return Err(CertError::Malformed("DN value has wrong width"));
        }
        let value = raw.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
        dn.push(DnAttribute::from_code(code, value)?);
    }
    Ok(dn)
}

fn decode_serial(serial: &SerialNumber) -> Result<u64, CertError> {
    let bytes = serial.as_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    let significant = &bytes[first..];
    if significant.len() > 8 {
        return Err(CertError::Malformed("serial number exceeds 64 bits"));
    }
    Ok(significant
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

fn tbs_certificate(cert: &Certificate) -> Result<TbsCertificate, CertError> {
    let not_after = match cert.not_after {
        0 => Time::GeneralTime(GeneralizedTime::from_date_time(no_expiration()?)),
        secs => encode_time(secs)?,
    };
    Ok(TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&cert.serial.to_be_bytes())?,
        signature: ed25519(),
        issuer: encode_name(&cert.issuer)?,
        validity: Validity {
            not_before: encode_time(cert.not_before)?,
            not_after,
        },
        subject: encode_name(&cert.subject)?,
        subject_public_key_info: SubjectPublicKeyInfoOwned {
            algorithm: ed25519(),
            subject_public_key: BitString::from_bytes(&cert.public_key)?,
        },
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    })
}

/// DER encoding of the to-be-signed portion. This is the signed message.
pub(crate) fn encode_tbs(cert: &Certificate) -> Result<Vec<u8>, CertError> {
    Ok(tbs_certificate(cert)?.to_der()?)
}

pub(crate) fn encode(cert: &Certificate) -> Result<Vec<u8>, CertError> {
    let x509 = x509_cert::Certificate {
        tbs_certificate: tbs_certificate(cert)?,
        signature_algorithm: ed25519(),
        signature: BitString::from_bytes(&cert.signature)?,
    };
    let out = x509.to_der()?;
    if out.len() > MAX_DER_CERT_LENGTH {
        return Err(CertError::TooLarge {
            len: out.len(),
            max: MAX_DER_CERT_LENGTH,
        });
    }
    Ok(out)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Certificate, CertError> {
    if bytes.len() > MAX_DER_CERT_LENGTH {
        return Err(CertError::TooLarge {
            len: bytes.len(),
            max: MAX_DER_CERT_LENGTH,
        });
    }
    let x509 = x509_cert::Certificate::from_der(bytes)?;
    let tbs = &x509.tbs_certificate;

    if tbs.version != Version::V3 {
        return Err(CertError::UnsupportedFormat("certificate version is not v3"));
    }
    if x509.signature_algorithm.oid != ID_ED25519
        || tbs.signature.oid != ID_ED25519
        || tbs.subject_public_key_info.algorithm.oid != ID_ED25519
    {
        return Err(CertError::UnsupportedFormat("signature algorithm is not Ed25519"));
    }
    if tbs.extensions.is_some() || tbs.issuer_unique_id.is_some() || tbs.subject_unique_id.is_some()
    {
        return Err(CertError::UnsupportedFormat("unexpected optional certificate fields"));
    }

    let not_after = if tbs.validity.not_after.to_date_time() == no_expiration()? {
        0
    } else {
        decode_time(&tbs.validity.not_after)?
    };

    let public_key: [u8; PUBLIC_KEY_LENGTH] = tbs
        .subject_public_key_info
        .subject_public_key
        .as_bytes()
        .and_then(|bits| bits.try_into().ok())
        .ok_or(CertError::Malformed("public key has wrong length"))?;
    let signature: [u8; SIGNATURE_LENGTH] = x509
        .signature
        .as_bytes()
        .and_then(|bits| bits.try_into().ok())
        .ok_or(CertError::Malformed("signature has wrong length"))?;

    Ok(Certificate {
        serial: decode_serial(&tbs.serial_number)?,
        issuer: decode_name(&tbs.issuer)?,
        not_before: decode_time(&tbs.validity.not_before)?,
        not_after,
        subject: decode_name(&tbs.subject)?,
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
            serial: 0x80,
            issuer: DistinguishedName::new()
                .with(DnAttribute::RootCaId(1))
                .with(DnAttribute::FabricId(FabricId(0xFAB0_0001))),
            not_before: 1_700_000_000,
            not_after: 0,
            subject: DistinguishedName::new()
                .with(DnAttribute::NodeId(NodeId(0x0011_2233_4455_6677)))
                .with(DnAttribute::FabricId(FabricId(0xFAB0_0001)))
                .with(DnAttribute::CaseAuthTag(CaseAuthTag(0xABCD_0001))),
            public_key: [0x42; PUBLIC_KEY_LENGTH],
            signature: [0x24; SIGNATURE_LENGTH],
        }
    }

    #[test]
    fn dn_values_are_hex_text() {
        let der = encode(&cert()).expect("encode");
        let needle = b"0011223344556677";
        assert!(der.windows(needle.len()).any(|w| w == needle));
        let cat = b"ABCD0001";
        assert!(der.windows(cat.len()).any(|w| w == cat));
        assert_eq!(decode(&der).expect("decode"), cert());
    }

    #[test]
    fn parses_as_standard_x509() {
        let der = encode(&cert()).expect("encode");
        let x509 = x509_cert::Certificate::from_der(&der).expect("x509");
        assert_eq!(x509.tbs_certificate.subject.0.len(), 3);
        assert_eq!(x509.signature_algorithm.oid, ID_ED25519);
        assert!(matches!(
            x509.tbs_certificate.validity.not_after,
            Time::GeneralTime(_)
        ));
        assert!(matches!(
            x509.tbs_certificate.validity.not_before,
            Time::UtcTime(_)
        ));
    }

    #[test]
    fn late_expiry_uses_generalized_time() {
        let mut late = cert();
        late.not_after = u32::MAX;
        let der = encode(&late).expect("encode");
        let x509 = x509_cert::Certificate::from_der(&der).expect("x509");
        assert!(matches!(
            x509.tbs_certificate.validity.not_after,
            Time::GeneralTime(_)
        ));
        assert_eq!(decode(&der).expect("decode").not_after, u32::MAX);
    }

    #[test]
    fn foreign_dn_oid_rejected() {
        let mut x509 = x509_cert::Certificate::from_der(&encode(&cert()).expect("encode"))
            .expect("x509");
        let common_name = AttributeTypeAndValue {
            oid: ObjectIdentifier::new_unwrap("2.5.4.3"),
            value: Any::new(Tag::Utf8String, b"lamp".to_vec()).expect("any"),
        };
        x509.tbs_certificate
            .subject
            .0
            .push(RelativeDistinguishedName(
                SetOfVec::try_from(vec![common_name]).expect("set"),
            ));
        let der = x509.to_der().expect("encode");
        assert_eq!(
            decode(&der),
            Err(CertError::UnsupportedFormat("DN attribute outside known arc"))
        );
    }

    #[test]
    fn truncated_der_rejected() {
        let der = encode(&cert()).expect("encode");
        assert!(matches!(decode(&der[..der.len() - 10]), Err(CertError::Der(_))));
    }
}

//! Subject Alternative Name extension parsing
//!
//! The extension is walked field by field instead of going through a full
//! X.509 decoder so that certificates with unusual entries are still usable.
//!
//! ```text
//! SubjectAltName ::= GeneralNames
//! GeneralNames   ::= SEQUENCE SIZE (1..MAX) OF GeneralName
//! GeneralName    ::= CHOICE {
//!      rfc822Name   [1] IA5String,
//!      dNSName      [2] IA5String,
//!      iPAddress    [7] OCTET STRING,
//!      ... }
//! ```

use super::CertError;

/// OID of the subjectAltName extension (2.5.29.17)
pub const SUBJECT_ALT_NAME_OID: &str = "2.5.29.17";

const TAG_RFC822_NAME: u8 = 1;
const TAG_DNS_NAME: u8 = 2;
const TAG_IP_ADDRESS: u8 = 7;

/// Names found in a SAN extension
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubjectAltNames {
    pub dns_names: Vec<String>,
    pub email_addresses: Vec<String>,
    pub ip_addresses: Vec<Vec<u8>>,
}

/// Parse the raw value of a subjectAltName extension
pub fn parse_san_extension(value: &[u8]) -> Result<SubjectAltNames, CertError> {
    let (tag, body, rest) = read_tlv(value)?;
    if !rest.is_empty() {
        return Err(CertError::MalformedSan(
            "trailing data after X.509 extension".to_string(),
        ));
    }
    // universal, constructed SEQUENCE
    if tag != 0x30 {
        return Err(CertError::MalformedSan("bad SAN sequence".to_string()));
    }

    let mut names = SubjectAltNames::default();
    let mut rest = body;
    while !rest.is_empty() {
        let (tag, value, next) = read_tlv(rest)?;
        rest = next;

        match tag & 0x1f {
            TAG_RFC822_NAME => names
                .email_addresses
                .push(String::from_utf8_lossy(value).into_owned()),
            TAG_DNS_NAME => names
                .dns_names
                .push(String::from_utf8_lossy(value).into_owned()),
            TAG_IP_ADDRESS => match value.len() {
                4 | 16 => names.ip_addresses.push(value.to_vec()),
                n => {
                    return Err(CertError::MalformedSan(format!(
                        "certificate contained IP address of length {}",
                        n
                    )));
                }
            },
            _ => {}
        }
    }

    Ok(names)
}

/// Read one DER tag-length-value, returning (tag, value, remaining input)
fn read_tlv(input: &[u8]) -> Result<(u8, &[u8], &[u8]), CertError> {
    let truncated = || CertError::MalformedSan("truncated DER element".to_string());

    let (&tag, rest) = input.split_first().ok_or_else(truncated)?;
    if tag & 0x1f == 0x1f {
        return Err(CertError::MalformedSan(
            "high tag number form is not supported".to_string(),
        ));
    }

    let (&first, mut rest) = rest.split_first().ok_or_else(truncated)?;
    let len = if first & 0x80 == 0 {
        first as usize
    } else {
        let octets = (first & 0x7f) as usize;
        if octets == 0 || octets > std::mem::size_of::<usize>() || rest.len() < octets {
            return Err(CertError::MalformedSan("invalid DER length".to_string()));
        }
        let (len_bytes, tail) = rest.split_at(octets);
        rest = tail;
        len_bytes
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize)
    };

    if rest.len() < len {
        return Err(truncated());
    }
    let (value, rest) = rest.split_at(len);
    Ok((tag, value, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: u8, value: &[u8]) -> Vec<u8> {
        let mut out = vec![tag, value.len() as u8];
        out.extend_from_slice(value);
        out
    }

    fn sequence(items: &[Vec<u8>]) -> Vec<u8> {
        element(0x30, &items.concat())
    }

    #[test]
    fn test_parse_dns_email_and_ip() {
        let ext = sequence(&[
            element(0x82, b"example.com"),
            element(0x81, b"admin@example.com"),
            element(0x87, &[10, 0, 0, 1]),
            element(0x82, b"www.example.com"),
        ]);
        let names = parse_san_extension(&ext).unwrap();
        assert_eq!(names.dns_names, vec!["example.com", "www.example.com"]);
        assert_eq!(names.email_addresses, vec!["admin@example.com"]);
        assert_eq!(names.ip_addresses, vec![vec![10, 0, 0, 1]]);
    }

    #[test]
    fn test_ipv6_address_accepted() {
        let ext = sequence(&[element(0x87, &[0u8; 16])]);
        let names = parse_san_extension(&ext).unwrap();
        assert_eq!(names.ip_addresses.len(), 1);
    }

    #[test]
    fn test_bad_ip_length_is_malformed() {
        let ext = sequence(&[element(0x87, &[1, 2, 3, 4, 5])]);
        assert!(matches!(
            parse_san_extension(&ext),
            Err(CertError::MalformedSan(_))
        ));
    }

    #[test]
    fn test_other_tags_are_ignored() {
        let ext = sequence(&[
            element(0x86, b"https://example.com"),
            element(0x82, b"example.com"),
        ]);
        let names = parse_san_extension(&ext).unwrap();
        assert_eq!(names.dns_names, vec!["example.com"]);
        assert!(names.email_addresses.is_empty());
    }

    #[test]
    fn test_trailing_data_is_rejected() {
        let mut ext = sequence(&[element(0x82, b"example.com")]);
        ext.push(0x00);
        assert!(matches!(
            parse_san_extension(&ext),
            Err(CertError::MalformedSan(_))
        ));
    }

    #[test]
    fn test_non_sequence_is_rejected() {
        let ext = element(0x31, &element(0x82, b"example.com"));
        assert!(parse_san_extension(&ext).is_err());
    }

    #[test]
    fn test_truncated_element_is_rejected() {
        let ext = vec![0x30, 0x05, 0x82, 0x09, b'a'];
        assert!(parse_san_extension(&ext).is_err());
    }

    #[test]
    fn test_long_form_length() {
        let long_name = "a".repeat(200);
        let mut dns = vec![0x82, 0x81, 200];
        dns.extend_from_slice(long_name.as_bytes());
        let mut ext = vec![0x30, 0x81, dns.len() as u8];
        ext.extend_from_slice(&dns);

        let names = parse_san_extension(&ext).unwrap();
        assert_eq!(names.dns_names, vec![long_name]);
    }
}

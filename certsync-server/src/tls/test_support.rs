//! Certificate fixtures for unit tests

use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DistinguishedName, DnType, IsCa, Issuer,
    KeyPair, KeyUsagePurpose,
};

const AIA_OID: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 1, 1];

pub struct CertFixture {
    pub cert_pem: String,
    pub key_pem: String,
    pub der: Vec<u8>,
}

pub struct CaFixture {
    pub cert_pem: String,
    pub key_pem: String,
    pub der: Vec<u8>,
    pub issuer: Issuer<'static, KeyPair>,
}

fn leaf_params(cn: &str, sans: &[&str]) -> CertificateParams {
    let sans: Vec<String> = sans.iter().map(|s| s.to_string()).collect();
    let mut params = CertificateParams::new(sans).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    params
}

fn ca_params(cn: &str) -> CertificateParams {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params
}

/// DER encoding of an AuthorityInfoAccess extension with one caIssuers URL
pub fn aia_extension(ca_issuers_url: &str) -> CustomExtension {
    // id-ad-caIssuers 1.3.6.1.5.5.7.48.2
    let method = [0x06, 0x08, 0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x02];
    let mut location = vec![0x86, ca_issuers_url.len() as u8];
    location.extend_from_slice(ca_issuers_url.as_bytes());

    let mut description = vec![0x30, (method.len() + location.len()) as u8];
    description.extend_from_slice(&method);
    description.extend_from_slice(&location);

    let mut content = vec![0x30, description.len() as u8];
    content.extend_from_slice(&description);
    CustomExtension::from_oid_content(AIA_OID, content)
}

impl CertFixture {
    pub fn self_signed(cn: &str, sans: &[&str]) -> Self {
        let key = KeyPair::generate().unwrap();
        let cert = leaf_params(cn, sans).self_signed(&key).unwrap();
        Self {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
            der: cert.der().to_vec(),
        }
    }
}

pub fn generate_ca(cn: &str) -> CaFixture {
    let key = KeyPair::generate().unwrap();
    let params = ca_params(cn);
    let cert = params.self_signed(&key).unwrap();
    CaFixture {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
        der: cert.der().to_vec(),
        issuer: Issuer::new(params, key),
    }
}

/// Intermediate CA signed by `parent`, optionally pointing at the parent
/// through an AIA caIssuers URL
pub fn generate_intermediate(parent: &CaFixture, cn: &str, aia_url: Option<&str>) -> CaFixture {
    let key = KeyPair::generate().unwrap();
    let mut params = ca_params(cn);
    if let Some(url) = aia_url {
        params.custom_extensions.push(aia_extension(url));
    }
    let cert = params.signed_by(&key, &parent.issuer).unwrap();
    CaFixture {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
        der: cert.der().to_vec(),
        issuer: Issuer::new(params, key),
    }
}

pub fn generate_leaf(ca: &CaFixture, cn: &str, sans: &[&str]) -> CertFixture {
    generate_leaf_with_aia(ca, cn, sans, None)
}

pub fn generate_leaf_with_aia(
    ca: &CaFixture,
    cn: &str,
    sans: &[&str],
    aia_url: Option<&str>,
) -> CertFixture {
    let key = KeyPair::generate().unwrap();
    let mut params = leaf_params(cn, sans);
    if let Some(url) = aia_url {
        params.custom_extensions.push(aia_extension(url));
    }
    let cert = params.signed_by(&key, &ca.issuer).unwrap();
    CertFixture {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
        der: cert.der().to_vec(),
    }
}

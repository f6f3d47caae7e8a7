//! X.509 certificates and the fields the console cares about.

use chrono::{DateTime, Utc};
use serde::Serialize;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use crate::{Error, Result};

const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Key usage bits relevant to VPN certificates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[allow(missing_docs)]
pub struct KeyUsage {
    pub digital_signature: bool,
    pub key_encipherment: bool,
    pub key_cert_sign: bool,
    pub crl_sign: bool,
}

/// Extended key usage purposes relevant to mutual TLS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[allow(missing_docs)]
pub struct ExtendedKeyUsage {
    pub server_auth: bool,
    pub client_auth: bool,
}

/// Parsed view of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateInfo {
    /// Lowercase hex, no leading zero octets.
    pub serial: String,
    /// Subject CN, empty if absent.
    pub subject_common_name: String,
    /// Issuer CN, empty if absent.
    pub issuer_common_name: String,
    /// DNS entries of the subject alternative name extension.
    pub dns_names: Vec<String>,
    /// Start of validity.
    pub not_before: DateTime<Utc>,
    /// End of validity.
    pub not_after: DateTime<Utc>,
    /// Key usage extension, all false if absent.
    pub key_usage: KeyUsage,
    /// Extended key usage extension, all false if absent.
    pub extended_key_usage: ExtendedKeyUsage,
    /// `BasicConstraints` CA flag.
    pub is_ca: bool,
}

/// A DER certificate together with its parsed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    info: CertificateInfo,
}

impl Certificate {
    /// Parse a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the bytes are not exactly one X.509
    /// certificate.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self> {
        let der = der.into();
        let info = {
            let cert = parse(&der)?;
            extract_info(&cert)?
        };
        Ok(Self { der, info })
    }

    /// Decode a PEM `CERTIFICATE` block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for malformed PEM, any other label, or a body
    /// that is not X.509.
    pub fn from_pem(input: &str) -> Result<Self> {
        let block = pem::parse(input).map_err(|e| Error::parse(format!("invalid PEM: {e}")))?;
        if block.tag() != CERTIFICATE_LABEL {
            return Err(Error::parse(format!(
                "expected a {CERTIFICATE_LABEL} block, found {}",
                block.tag()
            )));
        }
        Self::from_der(block.into_contents())
    }

    /// PEM-encode under the `CERTIFICATE` label.
    #[must_use]
    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new(CERTIFICATE_LABEL, self.der.clone()))
    }

    /// DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Parsed fields.
    #[must_use]
    pub fn info(&self) -> &CertificateInfo {
        &self.info
    }

    pub(crate) fn parsed(&self) -> Result<X509Certificate<'_>> {
        parse(&self.der)
    }
}

fn parse(der: &[u8]) -> Result<X509Certificate<'_>> {
    let (rest, cert) = X509Certificate::from_der(der)
        .map_err(|e| Error::parse(format!("invalid X.509 certificate: {e}")))?;
    if !rest.is_empty() {
        return Err(Error::parse("trailing data after certificate"));
    }
    Ok(cert)
}

fn extract_info(cert: &X509Certificate<'_>) -> Result<CertificateInfo> {
    let bad_ext =
        |e: x509_parser::error::X509Error| Error::parse(format!("malformed extension: {e}"));

    let key_usage = cert
        .key_usage()
        .map_err(bad_ext)?
        .map(|ext| KeyUsage {
            digital_signature: ext.value.digital_signature(),
            key_encipherment: ext.value.key_encipherment(),
            key_cert_sign: ext.value.key_cert_sign(),
            crl_sign: ext.value.crl_sign(),
        })
        .unwrap_or_default();

    let extended_key_usage = cert
        .extended_key_usage()
        .map_err(bad_ext)?
        .map(|ext| ExtendedKeyUsage {
            server_auth: ext.value.server_auth,
            client_auth: ext.value.client_auth,
        })
        .unwrap_or_default();

    let is_ca = cert
        .basic_constraints()
        .map_err(bad_ext)?
        .is_some_and(|ext| ext.value.ca);

    let dns_names = cert
        .subject_alternative_name()
        .map_err(bad_ext)?
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some((*dns).to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let validity = cert.validity();

    Ok(CertificateInfo {
        serial: serial_hex(cert.raw_serial()),
        subject_common_name: common_name(cert.subject()),
        issuer_common_name: common_name(cert.issuer()),
        dns_names,
        not_before: to_utc(validity.not_before.timestamp())?,
        not_after: to_utc(validity.not_after.timestamp())?,
        key_usage,
        extended_key_usage,
        is_ca,
    })
}

fn common_name(name: &x509_parser::x509::X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn serial_hex(raw: &[u8]) -> String {
    let skip = raw.iter().take_while(|b| **b == 0).count();
    let significant = &raw[skip..];
    if significant.is_empty() {
        "00".to_string()
    } else {
        hex::encode(significant)
    }
}

fn to_utc(timestamp: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| Error::parse(format!("certificate time out of range: {timestamp}")))
}

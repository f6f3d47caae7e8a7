//! Root CA and leaf certificate issuance.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rcgen::string::Ia5String;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, Issuer, KeyUsagePurpose, PublicKeyData, SanType, SerialNumber,
};
use rustls_pki_types::CertificateDer;
use time::{Month, OffsetDateTime};
use tracing::{debug, info};

use super::certificate::Certificate;
use super::keys::{self, PrivateKey};
use crate::random::{self, SecureRandom};
use crate::{Error, Result};

/// Subject CN of the root certificate.
pub const CA_COMMON_NAME: &str = "ca";

/// Root validity in calendar years.
const CA_VALIDITY_YEARS: i32 = 10;

/// Serial entropy in bytes (128 bits).
const SERIAL_BYTES: usize = 16;

/// Role of a leaf certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    /// VPN server (`serverAuth`).
    Server,
    /// VPN client (`clientAuth`).
    Client,
}

impl LeafKind {
    fn purpose(self) -> ExtendedKeyUsagePurpose {
        match self {
            Self::Server => ExtendedKeyUsagePurpose::ServerAuth,
            Self::Client => ExtendedKeyUsagePurpose::ClientAuth,
        }
    }
}

impl std::fmt::Display for LeafKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Client => f.write_str("client"),
        }
    }
}

/// A certificate with its private key.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    /// Issued certificate.
    pub certificate: Certificate,
    /// Key certified by `certificate`.
    pub private_key: PrivateKey,
}

impl IssuedCredential {
    /// Write `<stem>.crt` and `<stem>.key` under `dir`, creating it if needed.
    ///
    /// Existing files are never replaced. On unix the key file is created
    /// with mode 0600.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `stem` is not a plain file name or
    /// either file already exists, and [`Error::Io`] if the directory or
    /// either file cannot be written.
    pub fn write_to_dir(&self, dir: &Path, stem: &str) -> Result<()> {
        if stem.is_empty() || stem.contains(['/', '\\']) || stem == "." || stem == ".." {
            return Err(Error::Validation(format!("invalid file stem '{stem}'")));
        }
        let cert_path = dir.join(format!("{stem}.crt"));
        let key_path = dir.join(format!("{stem}.key"));
        for path in [&cert_path, &key_path] {
            if path.exists() {
                return Err(already_exists(path));
            }
        }

        fs::create_dir_all(dir)?;
        write_new(&key_path, &self.private_key.to_pem(), 0o600)?;
        write_new(&cert_path, &self.certificate.to_pem(), 0o644)?;
        debug!(dir = %dir.display(), stem, "Wrote credential");
        Ok(())
    }

    /// Read `<stem>.crt` and `<stem>.key` from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] for unreadable files and [`Error::Parse`] for
    /// malformed contents.
    pub fn load_from_dir(dir: &Path, stem: &str) -> Result<Self> {
        let cert_pem = fs::read_to_string(dir.join(format!("{stem}.crt")))?;
        let key_pem = fs::read_to_string(dir.join(format!("{stem}.key")))?;
        Ok(Self {
            certificate: Certificate::from_pem(&cert_pem)?,
            private_key: PrivateKey::from_pem(&key_pem)?,
        })
    }
}

fn already_exists(path: &Path) -> Error {
    Error::Validation(format!(
        "{} already exists, refusing to overwrite",
        path.display()
    ))
}

/// Create `path` exclusively and write `contents` to it.
fn write_new(
    path: &Path,
    contents: &str,
    #[cfg_attr(not(unix), allow(unused_variables))] mode: u32,
) -> Result<()> {
    use std::io::{ErrorKind, Write};

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }

    let mut file = options.open(path).map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => already_exists(path),
        _ => Error::Io(e),
    })?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

/// Issues the VPN's root and leaf certificates.
///
/// Holds no state besides the randomness source for serial numbers; every
/// operation either returns a complete artifact or an error.
pub struct CertificateAuthority {
    rng: Arc<dyn SecureRandom>,
}

impl CertificateAuthority {
    /// Create an authority drawing serial numbers from `rng`.
    #[must_use]
    pub fn new(rng: Arc<dyn SecureRandom>) -> Self {
        Self { rng }
    }

    /// See [`keys::generate_key_pair`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] for an unsupported size or a generation failure.
    pub fn generate_key_pair(&self, bits: u32) -> Result<PrivateKey> {
        keys::generate_key_pair(bits)
    }

    /// Self-sign a root certificate (`CN=ca`) with `key`, valid for ten
    /// calendar years from now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if the serial cannot be drawn or signing
    /// fails.
    pub fn issue_root_ca(&self, key: &PrivateKey) -> Result<Certificate> {
        let (not_before, not_after) = root_validity(OffsetDateTime::now_utc())?;

        let mut params = CertificateParams::default();
        params.distinguished_name = common_name_dn(CA_COMMON_NAME);
        params.serial_number = Some(self.serial()?);
        params.not_before = not_before;
        params.not_after = not_after;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
        ];

        let signed = params
            .self_signed(&key.key_pair()?)
            .map_err(|e| Error::crypto(format!("CA self-signing failed: {e}")))?;
        let certificate = Certificate::from_der(signed.der().to_vec())?;

        info!(
            serial = %certificate.info().serial,
            not_after = %certificate.info().not_after,
            "Issued root CA"
        );
        Ok(certificate)
    }

    /// Issue a server or client certificate for `common_name`, signed by the
    /// CA and expiring together with it.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for an empty or non-ASCII name, or a CA
    ///   certificate that is not a CA or has expired
    /// - [`Error::Crypto`] if `ca_key` does not belong to `ca_cert`, the
    ///   serial cannot be drawn, or signing fails
    pub fn issue_leaf(
        &self,
        kind: LeafKind,
        common_name: &str,
        leaf_key: &PrivateKey,
        ca_cert: &Certificate,
        ca_key: &PrivateKey,
    ) -> Result<Certificate> {
        let ca_info = ca_cert.info();
        if !ca_info.is_ca {
            return Err(Error::Validation(format!(
                "'{}' is not a CA certificate",
                ca_info.subject_common_name
            )));
        }
        if ca_info.not_after <= Utc::now() {
            return Err(Error::Validation(format!(
                "CA certificate expired at {}",
                ca_info.not_after
            )));
        }

        let ca_key_pair = ca_key.key_pair()?;
        let ca_x509 = ca_cert.parsed()?;
        if ca_key_pair.der_bytes() != &*ca_x509.public_key().subject_public_key.data {
            return Err(Error::crypto("CA key does not match CA certificate"));
        }

        if common_name.is_empty() {
            return Err(Error::Validation("common name must not be empty".into()));
        }
        let dns = Ia5String::try_from(common_name)
            .map_err(|e| Error::Validation(format!("invalid common name '{common_name}': {e}")))?;

        let mut params = CertificateParams::default();
        params.distinguished_name = common_name_dn(common_name);
        params.subject_alt_names = vec![SanType::DnsName(dns)];
        params.serial_number = Some(self.serial()?);
        params.not_before = truncate_to_seconds(OffsetDateTime::now_utc())?;
        params.not_after = to_offset(ca_info.not_after)?;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![kind.purpose()];

        let ca_der = CertificateDer::from(ca_cert.der());
        let issuer = Issuer::from_ca_cert_der(&ca_der, ca_key_pair)
            .map_err(|e| Error::crypto(format!("cannot use CA certificate as issuer: {e}")))?;

        let signed = params
            .signed_by(&leaf_key.key_pair()?, &issuer)
            .map_err(|e| Error::crypto(format!("leaf signing failed: {e}")))?;
        let certificate = Certificate::from_der(signed.der().to_vec())?;

        verify_issued_by(&certificate, ca_cert)?;

        info!(
            kind = %kind,
            common_name,
            serial = %certificate.info().serial,
            "Issued leaf certificate"
        );
        Ok(certificate)
    }

    /// Generate a key and a root certificate for it.
    ///
    /// # Errors
    ///
    /// See [`generate_key_pair`](Self::generate_key_pair) and
    /// [`issue_root_ca`](Self::issue_root_ca).
    pub fn init_ca(&self, bits: u32) -> Result<IssuedCredential> {
        let private_key = self.generate_key_pair(bits)?;
        let certificate = self.issue_root_ca(&private_key)?;
        Ok(IssuedCredential {
            certificate,
            private_key,
        })
    }

    /// Generate a key and a leaf certificate for it under `ca`.
    ///
    /// # Errors
    ///
    /// See [`generate_key_pair`](Self::generate_key_pair) and
    /// [`issue_leaf`](Self::issue_leaf).
    pub fn issue_credential(
        &self,
        kind: LeafKind,
        common_name: &str,
        bits: u32,
        ca: &IssuedCredential,
    ) -> Result<IssuedCredential> {
        let private_key = self.generate_key_pair(bits)?;
        let certificate =
            self.issue_leaf(kind, common_name, &private_key, &ca.certificate, &ca.private_key)?;
        Ok(IssuedCredential {
            certificate,
            private_key,
        })
    }

    /// Issue a credential under the CA stored in `ca_dir` and write it to
    /// `out_dir` as `<common_name>.crt` and `<common_name>.key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the files would replace the CA's own
    /// (`common_name` is `ca` and `out_dir` is `ca_dir`) or any existing
    /// file, plus everything [`issue_credential`](Self::issue_credential)
    /// and [`IssuedCredential::load_from_dir`] return.
    pub fn issue_to_dir(
        &self,
        kind: LeafKind,
        common_name: &str,
        bits: u32,
        ca_dir: &Path,
        out_dir: &Path,
    ) -> Result<IssuedCredential> {
        if common_name == CA_COMMON_NAME && same_dir(ca_dir, out_dir) {
            return Err(Error::Validation(format!(
                "common name '{common_name}' would overwrite the CA in {}",
                ca_dir.display()
            )));
        }
        for ext in ["crt", "key"] {
            let path = out_dir.join(format!("{common_name}.{ext}"));
            if path.exists() {
                return Err(already_exists(&path));
            }
        }

        let ca = IssuedCredential::load_from_dir(ca_dir, CA_COMMON_NAME)?;
        let issued = self.issue_credential(kind, common_name, bits, &ca)?;
        issued.write_to_dir(out_dir, common_name)?;
        Ok(issued)
    }

    fn serial(&self) -> Result<SerialNumber> {
        let bytes: [u8; SERIAL_BYTES] = random::nonzero_bytes(self.rng.as_ref())?;
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        Ok(SerialNumber::from_slice(&bytes[skip..]))
    }
}

/// Check that `leaf` was issued and signed by `ca`.
///
/// # Errors
///
/// Returns [`Error::Crypto`] if `ca` is not a CA, the issuer name does not
/// match the CA subject, or the signature does not verify.
pub fn verify_issued_by(leaf: &Certificate, ca: &Certificate) -> Result<()> {
    if !ca.info().is_ca {
        return Err(Error::crypto("issuer certificate is not a CA"));
    }

    let leaf_x509 = leaf.parsed()?;
    let ca_x509 = ca.parsed()?;

    if leaf_x509.issuer().as_raw() != ca_x509.subject().as_raw() {
        return Err(Error::crypto(format!(
            "issuer '{}' does not match CA subject '{}'",
            leaf.info().issuer_common_name,
            ca.info().subject_common_name
        )));
    }

    leaf_x509
        .verify_signature(Some(ca_x509.public_key()))
        .map_err(|e| Error::crypto(format!("signature verification failed: {e}")))
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn common_name_dn(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn
}

/// `[now, now + 10 years]`, truncated to whole seconds.
fn root_validity(now: OffsetDateTime) -> Result<(OffsetDateTime, OffsetDateTime)> {
    let not_before = truncate_to_seconds(now)?;
    let not_after = add_years(not_before, CA_VALIDITY_YEARS)?;
    Ok((not_before, not_after))
}

/// Calendar-year addition; Feb 29 lands on Mar 1 in a non-leap target year.
fn add_years(at: OffsetDateTime, years: i32) -> Result<OffsetDateTime> {
    let out_of_range =
        |e: time::error::ComponentRange| Error::crypto(format!("validity out of range: {e}"));
    let year = at.year() + years;

    match at.replace_year(year) {
        Ok(shifted) => Ok(shifted),
        Err(_) if at.month() == Month::February && at.day() == 29 => {
            let feb_28 = at.replace_day(28).map_err(out_of_range)?;
            let shifted = feb_28.replace_year(year).map_err(out_of_range)?;
            shifted
                .checked_add(time::Duration::days(1))
                .ok_or_else(|| Error::crypto("validity out of range"))
        }
        Err(e) => Err(out_of_range(e)),
    }
}

fn truncate_to_seconds(at: OffsetDateTime) -> Result<OffsetDateTime> {
    at.replace_nanosecond(0)
        .map_err(|e| Error::crypto(format!("invalid timestamp: {e}")))
}

fn to_offset(at: DateTime<Utc>) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| Error::crypto(format!("invalid timestamp: {e}")))
}

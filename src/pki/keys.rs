//! RSA private keys: generation and PEM encoding.
//!
//! Keys are held as PKCS#8 DER and written under the `PRIVATE KEY` label.
//! Decoding also accepts PKCS#1 (`RSA PRIVATE KEY`) and blocks whose label
//! disagrees with their contents, as produced by older tooling.

use std::fmt;

use pkcs8::PrivateKeyInfo;
use pkcs8::der::Encode;
use rcgen::{KeyPair, PKCS_RSA_SHA256, RsaKeySize};
use rustls_pki_types::PrivatePkcs8KeyDer;

use crate::{Error, Result};

/// RSA modulus sizes accepted by [`generate_key_pair`].
pub const SUPPORTED_KEY_BITS: [u32; 3] = [2048, 3072, 4096];

/// Default RSA modulus size.
pub const DEFAULT_KEY_BITS: u32 = 2048;

const PKCS8_LABEL: &str = "PRIVATE KEY";
const PKCS1_LABEL: &str = "RSA PRIVATE KEY";

/// An RSA private key, signing with SHA-256.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    pkcs8: Vec<u8>,
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// Generate a fresh RSA key of `bits` bits.
///
/// Uses the crypto provider's own CSPRNG.
///
/// # Errors
///
/// Returns [`Error::Crypto`] for an unsupported size or a generation failure.
pub fn generate_key_pair(bits: u32) -> Result<PrivateKey> {
    let size = match bits {
        2048 => RsaKeySize::_2048,
        3072 => RsaKeySize::_3072,
        4096 => RsaKeySize::_4096,
        other => {
            return Err(Error::crypto(format!(
                "unsupported RSA key size {other}, expected one of {SUPPORTED_KEY_BITS:?}"
            )));
        }
    };

    let key_pair = KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, size)
        .map_err(|e| Error::crypto(format!("RSA key generation failed: {e}")))?;

    Ok(PrivateKey {
        pkcs8: key_pair.serialize_der(),
    })
}

impl PrivateKey {
    /// Build from PKCS#8 DER, checking that it holds a usable RSA key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the bytes are not a PKCS#8 RSA key.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        key_pair_from_pkcs8(der)?;
        Ok(Self {
            pkcs8: der.to_vec(),
        })
    }

    /// Decode a PEM private key.
    ///
    /// The label picks which encoding is tried first; the other is tried
    /// next, so a PKCS#8 body under `RSA PRIVATE KEY` still loads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for malformed PEM, an unexpected label, or a
    /// body that is neither PKCS#8 nor PKCS#1 RSA.
    pub fn from_pem(input: &str) -> Result<Self> {
        let block = pem::parse(input).map_err(|e| Error::parse(format!("invalid PEM: {e}")))?;
        let body = block.contents();

        let pkcs8_first = match block.tag() {
            PKCS8_LABEL => true,
            PKCS1_LABEL => false,
            other => {
                return Err(Error::parse(format!(
                    "expected a {PKCS8_LABEL} or {PKCS1_LABEL} block, found {other}"
                )));
            }
        };

        let as_pkcs8 = || Self::from_pkcs8_der(body);
        let as_pkcs1 = || pkcs1_to_pkcs8(body).and_then(|der| Self::from_pkcs8_der(&der));

        let decoded = if pkcs8_first {
            as_pkcs8().or_else(|_| as_pkcs1())
        } else {
            as_pkcs1().or_else(|_| as_pkcs8())
        };

        decoded.map_err(|_| Error::parse("private key is neither PKCS#8 nor PKCS#1 RSA"))
    }

    /// PEM-encode as PKCS#8 under the `PRIVATE KEY` label.
    #[must_use]
    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new(PKCS8_LABEL, self.pkcs8.clone()))
    }

    /// PKCS#8 DER encoding.
    #[must_use]
    pub fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8
    }

    /// Fresh signing handle for rcgen.
    pub(crate) fn key_pair(&self) -> Result<KeyPair> {
        key_pair_from_pkcs8(&self.pkcs8)
    }
}

fn key_pair_from_pkcs8(der: &[u8]) -> Result<KeyPair> {
    KeyPair::from_pkcs8_der_and_sign_algo(&PrivatePkcs8KeyDer::from(der), &PKCS_RSA_SHA256)
        .map_err(|e| Error::parse(format!("not a PKCS#8 RSA key: {e}")))
}

/// Wrap a PKCS#1 `RSAPrivateKey` in a PKCS#8 `PrivateKeyInfo`.
fn pkcs1_to_pkcs8(pkcs1_der: &[u8]) -> Result<Vec<u8>> {
    pkcs1::RsaPrivateKey::try_from(pkcs1_der)
        .map_err(|e| Error::parse(format!("not a PKCS#1 RSA key: {e}")))?;
    PrivateKeyInfo::new(pkcs1::ALGORITHM_ID, pkcs1_der)
        .to_der()
        .map_err(|e| Error::parse(format!("cannot wrap PKCS#1 key: {e}")))
}

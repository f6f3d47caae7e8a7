//! Minimal certificate authority for mutual-TLS VPN authentication.
//!
//! # Architecture
//!
//! ```text
//! generate_key_pair ──► issue_root_ca ──► ca.crt / ca.key
//!                                            │
//! generate_key_pair ──► issue_leaf(Server | Client) ──► <cn>.crt / <cn>.key
//!                                            │
//!                                  verify_issued_by (before return)
//! ```
//!
//! # Modules
//!
//! - [`keys`]: RSA key generation and PKCS#8/PKCS#1 PEM handling
//! - [`certificate`]: X.509 parsing into [`CertificateInfo`]
//! - [`authority`]: root and leaf issuance, chain verification, file output
//!
//! Every operation returns a complete artifact or an error. There is no
//! revocation and no serial registry; serials are 128 random bits.

pub mod authority;
pub mod certificate;
pub mod keys;

pub use authority::{
    CA_COMMON_NAME, CertificateAuthority, IssuedCredential, LeafKind, verify_issued_by,
};
pub use certificate::{Certificate, CertificateInfo, ExtendedKeyUsage, KeyUsage};
pub use keys::{DEFAULT_KEY_BITS, PrivateKey, SUPPORTED_KEY_BITS, generate_key_pair};

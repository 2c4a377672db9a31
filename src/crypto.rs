//! Raw signature primitives
//!
//! Verification and production of the COSE signature families over
//! DER-encoded key material: ECDSA over the NIST curves, RSA-PSS,
//! RSASSA-PKCS1-v1_5 and Ed25519. Public keys arrive as SubjectPublicKeyInfo
//! DER, private keys as PKCS#8 DER. ECDSA signatures are converted between
//! the ASN.1 wire form and the fixed-width P1363 form the curve crates use.

use der::{asn1::ObjectIdentifier, Decode, Encode};
use sha2::{Digest, Sha256, Sha384, Sha512};
use signature::{Signer as _, Verifier as _};
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::Certificate;

use crate::error::{Error, Result};

const OID_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const OID_RSASSA_PSS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.10");
const OID_SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const OID_SHA384_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const OID_SHA512_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
const OID_ECDSA_WITH_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const OID_ECDSA_WITH_SHA384: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const OID_ECDSA_WITH_SHA512: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");
const OID_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

/// Signature algorithm families supported on the COSE wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlg {
    /// ECDSA over P-256 with SHA-256
    Es256,
    /// ECDSA over P-384 with SHA-384
    Es384,
    /// ECDSA over P-521 with SHA-512
    Es512,
    /// RSA-PSS with SHA-256
    Ps256,
    /// RSA-PSS with SHA-384
    Ps384,
    /// RSA-PSS with SHA-512
    Ps512,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    Rs256,
    /// RSASSA-PKCS1-v1_5 with SHA-384
    Rs384,
    /// RSASSA-PKCS1-v1_5 with SHA-512
    Rs512,
    /// Ed25519
    Ed25519,
}

impl SigningAlg {
    /// Map a COSE algorithm identifier to a signing family
    pub fn from_cose(alg: i64) -> Option<Self> {
        match alg {
            -7 => Some(Self::Es256),
            -35 => Some(Self::Es384),
            -36 => Some(Self::Es512),
            -37 => Some(Self::Ps256),
            -38 => Some(Self::Ps384),
            -39 => Some(Self::Ps512),
            -257 => Some(Self::Rs256),
            -258 => Some(Self::Rs384),
            -259 => Some(Self::Rs512),
            -8 => Some(Self::Ed25519),
            _ => None,
        }
    }

    /// The COSE algorithm identifier for this family
    pub fn to_cose(&self) -> i64 {
        match self {
            Self::Es256 => -7,
            Self::Es384 => -35,
            Self::Es512 => -36,
            Self::Ps256 => -37,
            Self::Ps384 => -38,
            Self::Ps512 => -39,
            Self::Rs256 => -257,
            Self::Rs384 => -258,
            Self::Rs512 => -259,
            Self::Ed25519 => -8,
        }
    }

    /// Parse the lowercase C2PA algorithm name
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "es256" => Ok(Self::Es256),
            "es384" => Ok(Self::Es384),
            "es512" => Ok(Self::Es512),
            "ps256" => Ok(Self::Ps256),
            "ps384" => Ok(Self::Ps384),
            "ps512" => Ok(Self::Ps512),
            "rs256" => Ok(Self::Rs256),
            "rs384" => Ok(Self::Rs384),
            "rs512" => Ok(Self::Rs512),
            "ed25519" => Ok(Self::Ed25519),
            other => Err(Error::SigningAlgUnsupported(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Es256 => "es256",
            Self::Es384 => "es384",
            Self::Es512 => "es512",
            Self::Ps256 => "ps256",
            Self::Ps384 => "ps384",
            Self::Ps512 => "ps512",
            Self::Rs256 => "rs256",
            Self::Rs384 => "rs384",
            Self::Rs512 => "rs512",
            Self::Ed25519 => "ed25519",
        }
    }

    /// Upper bound on the wire signature size, used for placeholder sizing
    pub fn max_signature_len(&self) -> usize {
        match self {
            // DER adds at most 8 bytes of framing over 2 field elements
            Self::Es256 => 72,
            Self::Es384 => 104,
            Self::Es512 => 141,
            // 4096-bit modulus upper bound
            Self::Ps256 | Self::Ps384 | Self::Ps512 => 512,
            Self::Rs256 | Self::Rs384 | Self::Rs512 => 512,
            Self::Ed25519 => 64,
        }
    }
}

impl std::fmt::Display for SigningAlg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn digest_for(alg: SigningAlg, data: &[u8]) -> Vec<u8> {
    match alg {
        SigningAlg::Ps256 | SigningAlg::Rs256 => Sha256::digest(data).to_vec(),
        SigningAlg::Ps384 | SigningAlg::Rs384 => Sha384::digest(data).to_vec(),
        SigningAlg::Ps512 | SigningAlg::Rs512 => Sha512::digest(data).to_vec(),
        // ECDSA and Ed25519 hash internally
        _ => data.to_vec(),
    }
}

/// Rewrite an `id-RSASSA-PSS` SubjectPublicKeyInfo to `rsaEncryption`
///
/// Generic RSA key import rejects the PSS OID; the key material itself is
/// identical, only the algorithm identifier differs.
pub fn normalize_rsa_spki(spki_der: &[u8]) -> Result<Vec<u8>> {
    let spki = SubjectPublicKeyInfoOwned::from_der(spki_der)
        .map_err(|e| Error::Signature(format!("bad SubjectPublicKeyInfo: {e}")))?;

    if spki.algorithm.oid != OID_RSASSA_PSS {
        return Ok(spki_der.to_vec());
    }

    let rewritten = SubjectPublicKeyInfoOwned {
        algorithm: spki::AlgorithmIdentifierOwned {
            oid: OID_RSA_ENCRYPTION,
            parameters: Some(der::Any::from(der::asn1::Null)),
        },
        subject_public_key: spki.subject_public_key,
    };
    rewritten
        .to_der()
        .map_err(|e| Error::Signature(format!("cannot re-encode SubjectPublicKeyInfo: {e}")))
}

// ECDSA helpers are generated per curve: the curve crates share the same
// trait surface but distinct signature types.
macro_rules! ecdsa_ops {
    ($curve:ident) => {
        mod $curve {
            use super::*;
            use ::$curve::ecdsa::{Signature, SigningKey, VerifyingKey};
            use ::signature::{Signer, Verifier};
            use pkcs8::DecodePrivateKey;
            use spki::DecodePublicKey;

            pub fn verify(spki_der: &[u8], data: &[u8], sig: &[u8]) -> Result<bool> {
                let key = VerifyingKey::from_public_key_der(spki_der)
                    .map_err(|e| Error::Signature(format!("bad EC public key: {e}")))?;
                let sig = match Signature::from_der(sig) {
                    Ok(sig) => sig,
                    // COSE emitters that predate the ASN.1 convention used
                    // fixed-width P1363; accept both
                    Err(_) => Signature::from_slice(sig)
                        .map_err(|e| Error::Signature(format!("bad ECDSA signature: {e}")))?,
                };
                Ok(key.verify(data, &sig).is_ok())
            }

            pub fn sign(pkcs8_der: &[u8], data: &[u8]) -> Result<Vec<u8>> {
                let key = SigningKey::from_pkcs8_der(pkcs8_der)
                    .map_err(|e| Error::Signature(format!("bad EC private key: {e}")))?;
                let sig: Signature = key.sign(data);
                Ok(sig.to_der().as_bytes().to_vec())
            }

            pub fn der_to_p1363(sig: &[u8]) -> Result<Vec<u8>> {
                let sig = Signature::from_der(sig)
                    .map_err(|e| Error::Signature(format!("bad DER signature: {e}")))?;
                Ok(sig.to_bytes().to_vec())
            }

            pub fn p1363_to_der(sig: &[u8]) -> Result<Vec<u8>> {
                let sig = Signature::from_slice(sig)
                    .map_err(|e| Error::Signature(format!("bad P1363 signature: {e}")))?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
        }
    };
}

ecdsa_ops!(p256);
ecdsa_ops!(p384);
ecdsa_ops!(p521);

/// Convert an ASN.1 ECDSA signature to fixed-width P1363 for `alg`'s curve
pub fn ecdsa_der_to_p1363(sig: &[u8], alg: SigningAlg) -> Result<Vec<u8>> {
    match alg {
        SigningAlg::Es256 => p256::der_to_p1363(sig),
        SigningAlg::Es384 => p384::der_to_p1363(sig),
        SigningAlg::Es512 => p521::der_to_p1363(sig),
        other => Err(Error::SigningAlgUnsupported(other.as_str().to_string())),
    }
}

/// Convert a fixed-width P1363 ECDSA signature to ASN.1 for `alg`'s curve
pub fn ecdsa_p1363_to_der(sig: &[u8], alg: SigningAlg) -> Result<Vec<u8>> {
    match alg {
        SigningAlg::Es256 => p256::p1363_to_der(sig),
        SigningAlg::Es384 => p384::p1363_to_der(sig),
        SigningAlg::Es512 => p521::p1363_to_der(sig),
        other => Err(Error::SigningAlgUnsupported(other.as_str().to_string())),
    }
}

fn rsa_public_key(spki_der: &[u8]) -> Result<rsa::RsaPublicKey> {
    use rsa::pkcs8::DecodePublicKey;
    let normalized = normalize_rsa_spki(spki_der)?;
    rsa::RsaPublicKey::from_public_key_der(&normalized)
        .map_err(|e| Error::Signature(format!("bad RSA public key: {e}")))
}

fn rsa_private_key(pkcs8_der: &[u8]) -> Result<rsa::RsaPrivateKey> {
    use rsa::pkcs8::DecodePrivateKey;
    rsa::RsaPrivateKey::from_pkcs8_der(pkcs8_der)
        .map_err(|e| Error::Signature(format!("bad RSA private key: {e}")))
}

/// Verify a raw signature over `data`
///
/// Returns `Ok(false)` when the key material is usable but the signature
/// does not match; structural problems (unparsable keys or signatures of
/// impossible shape) are errors.
pub fn verify_raw_signature(
    alg: SigningAlg,
    spki_der: &[u8],
    data: &[u8],
    sig: &[u8],
) -> Result<bool> {
    match alg {
        SigningAlg::Es256 => p256::verify(spki_der, data, sig),
        SigningAlg::Es384 => p384::verify(spki_der, data, sig),
        SigningAlg::Es512 => p521::verify(spki_der, data, sig),
        SigningAlg::Ps256 => {
            let key = rsa_public_key(spki_der)?;
            let digest = digest_for(alg, data);
            Ok(key
                .verify(rsa::Pss::new::<Sha256>(), &digest, sig)
                .is_ok())
        }
        SigningAlg::Ps384 => {
            let key = rsa_public_key(spki_der)?;
            let digest = digest_for(alg, data);
            Ok(key
                .verify(rsa::Pss::new::<Sha384>(), &digest, sig)
                .is_ok())
        }
        SigningAlg::Ps512 => {
            let key = rsa_public_key(spki_der)?;
            let digest = digest_for(alg, data);
            Ok(key
                .verify(rsa::Pss::new::<Sha512>(), &digest, sig)
                .is_ok())
        }
        SigningAlg::Rs256 => {
            let key = rsa_public_key(spki_der)?;
            let digest = digest_for(alg, data);
            Ok(key
                .verify(rsa::Pkcs1v15Sign::new::<Sha256>(), &digest, sig)
                .is_ok())
        }
        SigningAlg::Rs384 => {
            let key = rsa_public_key(spki_der)?;
            let digest = digest_for(alg, data);
            Ok(key
                .verify(rsa::Pkcs1v15Sign::new::<Sha384>(), &digest, sig)
                .is_ok())
        }
        SigningAlg::Rs512 => {
            let key = rsa_public_key(spki_der)?;
            let digest = digest_for(alg, data);
            Ok(key
                .verify(rsa::Pkcs1v15Sign::new::<Sha512>(), &digest, sig)
                .is_ok())
        }
        SigningAlg::Ed25519 => {
            use spki::DecodePublicKey;
            let key = ed25519_dalek::VerifyingKey::from_public_key_der(spki_der)
                .map_err(|e| Error::Signature(format!("bad Ed25519 public key: {e}")))?;
            let sig = ed25519_dalek::Signature::try_from(sig)
                .map_err(|e| Error::Signature(format!("bad Ed25519 signature: {e}")))?;
            Ok(key.verify(data, &sig).is_ok())
        }
    }
}

/// Produce a raw signature over `data` with a PKCS#8 private key
///
/// ECDSA output is ASN.1 (the wire form); Ed25519 and RSA pass through
/// unmodified.
pub fn sign_raw(alg: SigningAlg, pkcs8_der: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    match alg {
        SigningAlg::Es256 => p256::sign(pkcs8_der, data),
        SigningAlg::Es384 => p384::sign(pkcs8_der, data),
        SigningAlg::Es512 => p521::sign(pkcs8_der, data),
        SigningAlg::Ps256 => {
            let key = rsa_private_key(pkcs8_der)?;
            let digest = digest_for(alg, data);
            key.sign_with_rng(&mut rand::rngs::OsRng, rsa::Pss::new::<Sha256>(), &digest)
                .map_err(|e| Error::Signature(format!("PSS signing failed: {e}")))
        }
        SigningAlg::Ps384 => {
            let key = rsa_private_key(pkcs8_der)?;
            let digest = digest_for(alg, data);
            key.sign_with_rng(&mut rand::rngs::OsRng, rsa::Pss::new::<Sha384>(), &digest)
                .map_err(|e| Error::Signature(format!("PSS signing failed: {e}")))
        }
        SigningAlg::Ps512 => {
            let key = rsa_private_key(pkcs8_der)?;
            let digest = digest_for(alg, data);
            key.sign_with_rng(&mut rand::rngs::OsRng, rsa::Pss::new::<Sha512>(), &digest)
                .map_err(|e| Error::Signature(format!("PSS signing failed: {e}")))
        }
        SigningAlg::Rs256 => {
            let key = rsa_private_key(pkcs8_der)?;
            let digest = digest_for(alg, data);
            key.sign(rsa::Pkcs1v15Sign::new::<Sha256>(), &digest)
                .map_err(|e| Error::Signature(format!("PKCS#1 signing failed: {e}")))
        }
        SigningAlg::Rs384 => {
            let key = rsa_private_key(pkcs8_der)?;
            let digest = digest_for(alg, data);
            key.sign(rsa::Pkcs1v15Sign::new::<Sha384>(), &digest)
                .map_err(|e| Error::Signature(format!("PKCS#1 signing failed: {e}")))
        }
        SigningAlg::Rs512 => {
            let key = rsa_private_key(pkcs8_der)?;
            let digest = digest_for(alg, data);
            key.sign(rsa::Pkcs1v15Sign::new::<Sha512>(), &digest)
                .map_err(|e| Error::Signature(format!("PKCS#1 signing failed: {e}")))
        }
        SigningAlg::Ed25519 => {
            use pkcs8::DecodePrivateKey;
            let key = ed25519_dalek::SigningKey::from_pkcs8_der(pkcs8_der)
                .map_err(|e| Error::Signature(format!("bad Ed25519 private key: {e}")))?;
            Ok(key.sign(data).to_bytes().to_vec())
        }
    }
}

/// Parsed facts about one signing credential
#[derive(Debug, Clone)]
pub struct CredentialInfo {
    /// SubjectPublicKeyInfo DER of the credential's key
    pub spki_der: Vec<u8>,

    /// Validity window when the credential is a full X.509 certificate
    pub not_before: Option<std::time::SystemTime>,
    pub not_after: Option<std::time::SystemTime>,

    /// Whether the credential was a full certificate (false: bare SPKI,
    /// accepted for development keys)
    pub is_certificate: bool,
}

impl CredentialInfo {
    /// Whether `when` falls inside the certificate validity window
    ///
    /// Bare SPKI credentials carry no window and always pass.
    pub fn valid_at(&self, when: std::time::SystemTime) -> bool {
        match (self.not_before, self.not_after) {
            (Some(begin), Some(end)) => when >= begin && when <= end,
            _ => true,
        }
    }
}

/// Parse one x5chain entry: an X.509 certificate or a bare SPKI
pub fn parse_credential(der_bytes: &[u8]) -> Result<CredentialInfo> {
    if let Ok(cert) = Certificate::from_der(der_bytes) {
        let spki_der = cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::Signature(format!("cannot encode certificate key: {e}")))?;
        let validity = &cert.tbs_certificate.validity;
        return Ok(CredentialInfo {
            spki_der,
            not_before: Some(validity.not_before.to_system_time()),
            not_after: Some(validity.not_after.to_system_time()),
            is_certificate: true,
        });
    }

    // Development credentials embed the SubjectPublicKeyInfo directly
    if SubjectPublicKeyInfoOwned::from_der(der_bytes).is_ok() {
        return Ok(CredentialInfo {
            spki_der: der_bytes.to_vec(),
            not_before: None,
            not_after: None,
            is_certificate: false,
        });
    }

    Err(Error::Signature(
        "x5chain entry is neither a certificate nor a public key".to_string(),
    ))
}

fn chain_signature_algs(oid: &ObjectIdentifier) -> Vec<SigningAlg> {
    if *oid == OID_ECDSA_WITH_SHA256 {
        vec![SigningAlg::Es256]
    } else if *oid == OID_ECDSA_WITH_SHA384 {
        vec![SigningAlg::Es384]
    } else if *oid == OID_ECDSA_WITH_SHA512 {
        vec![SigningAlg::Es512]
    } else if *oid == OID_SHA256_WITH_RSA {
        vec![SigningAlg::Rs256]
    } else if *oid == OID_SHA384_WITH_RSA {
        vec![SigningAlg::Rs384]
    } else if *oid == OID_SHA512_WITH_RSA {
        vec![SigningAlg::Rs512]
    } else if *oid == OID_RSASSA_PSS {
        // PSS parameters name the hash; trying each family is cheaper than
        // parsing RSASSA-PSS-params
        vec![SigningAlg::Ps256, SigningAlg::Ps384, SigningAlg::Ps512]
    } else if *oid == OID_ED25519 {
        vec![SigningAlg::Ed25519]
    } else {
        Vec::new()
    }
}

/// Verify that each certificate in the chain is signed by its successor
///
/// The chain is leaf-first. A single-entry chain (or a chain of bare SPKI
/// development credentials) has nothing to check and passes. Trust-list
/// policy is out of scope; this only establishes internal consistency.
pub fn verify_cert_chain(chain: &[Vec<u8>]) -> Result<bool> {
    for pair in chain.windows(2) {
        let subject = match Certificate::from_der(&pair[0]) {
            Ok(cert) => cert,
            Err(_) => continue,
        };
        let issuer = parse_credential(&pair[1])?;

        let tbs = subject
            .tbs_certificate
            .to_der()
            .map_err(|e| Error::Signature(format!("cannot encode tbsCertificate: {e}")))?;
        let sig = subject
            .signature
            .as_bytes()
            .ok_or_else(|| Error::Signature("certificate signature is not octet-aligned".to_string()))?;

        let candidates = chain_signature_algs(&subject.signature_algorithm.oid);
        if candidates.is_empty() {
            return Ok(false);
        }
        let mut verified = false;
        for alg in candidates {
            if verify_raw_signature(alg, &issuer.spki_der, &tbs, sig).unwrap_or(false) {
                verified = true;
                break;
            }
        }
        if !verified {
            return Ok(false);
        }
    }
    Ok(true)
}

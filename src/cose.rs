//! COSE_Sign1 claim signatures
//!
//! The claim signature component wraps a tag-18 COSE_Sign1 with a detached
//! payload (the claim's CBOR bytes). The protected header carries the
//! algorithm and the `x5chain` certificate set; the unprotected header
//! carries the optional RFC3161 `sigTst` token and the `pad` zero-byte
//! reservation field that keeps the serialized envelope at its reserved
//! size after in-place signing.

use std::time::Duration;

use coset::{
    cbor::value::Value as CborValue,
    iana::{self, EnumI64},
    CoseSign1, CoseSign1Builder, Header, HeaderBuilder, Label, RegisteredLabelWithPrivate,
    SignatureContext, TaggedCborSerializable,
};

use crate::{
    crypto::{self, SigningAlg},
    error::{Error, Result},
    jumbf::{labels, ChildBox, SuperBox, SIGNATURE_UUID},
    status::{ValidationCode, ValidationReport},
};

/// COSE header parameter for the certificate chain (RFC 9360)
const X5CHAIN_LABEL: i64 = 33;

/// Default timeout for timestamp-authority requests
pub const DEFAULT_TIMESTAMP_TIMEOUT: Duration = Duration::from_millis(5000);

/// Base padding reserved in a fresh signature envelope
const SIGNATURE_PADDING: usize = 1024;

/// Extra reservation when a timestamp token will be added
const TIMESTAMP_ALLOWANCE: usize = 4096;

/// Supplies RFC3161 timestamp tokens during signing
///
/// The token bytes are treated as opaque; acquisition and verification are
/// external concerns. Implementations must honor the timeout and return
/// `Ok(None)` when the authority cannot be reached in time.
pub trait TimestampProvider: Send + Sync {
    /// Request a timestamp token over `message`
    fn request_timestamp(&self, message: &[u8], timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// Local signing credential: algorithm, private key and certificate chain
pub struct Signer {
    alg: SigningAlg,
    private_key_der: Vec<u8>,
    cert_chain_der: Vec<Vec<u8>>,
    timestamp_provider: Option<Box<dyn TimestampProvider>>,
    timestamp_timeout: Duration,
}

impl Signer {
    /// Create a signer from a PKCS#8 private key and a leaf-first chain of
    /// DER credentials (X.509 certificates, or bare SubjectPublicKeyInfo
    /// for development keys)
    pub fn from_keys(
        alg: SigningAlg,
        private_key_der: Vec<u8>,
        cert_chain_der: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            alg,
            private_key_der,
            cert_chain_der,
            timestamp_provider: None,
            timestamp_timeout: DEFAULT_TIMESTAMP_TIMEOUT,
        }
    }

    /// Attach an RFC3161 timestamp provider
    pub fn with_timestamp_provider(mut self, provider: Box<dyn TimestampProvider>) -> Self {
        self.timestamp_provider = Some(provider);
        self
    }

    /// Override the timestamp-request timeout
    pub fn with_timestamp_timeout(mut self, timeout: Duration) -> Self {
        self.timestamp_timeout = timeout;
        self
    }

    /// The signing algorithm
    pub fn alg(&self) -> SigningAlg {
        self.alg
    }

    fn cose_algorithm(&self) -> Result<iana::Algorithm> {
        iana::Algorithm::from_i64(self.alg.to_cose())
            .ok_or_else(|| Error::SigningAlgUnsupported(self.alg.as_str().to_string()))
    }
}

fn x5chain_value(certs: &[Vec<u8>]) -> CborValue {
    CborValue::Array(
        certs
            .iter()
            .map(|c| CborValue::Bytes(c.clone()))
            .collect(),
    )
}

fn x5chain_from_value(value: &CborValue) -> Option<Vec<Vec<u8>>> {
    match value {
        CborValue::Bytes(one) => Some(vec![one.clone()]),
        CborValue::Array(entries) => {
            let mut certs = Vec::with_capacity(entries.len());
            for entry in entries {
                certs.push(entry.as_bytes()?.clone());
            }
            Some(certs)
        }
        _ => None,
    }
}

/// Wrap a timestamp token in the C2PA `sigTst` structure:
/// `{ "tstTokens": [ { "val": token } ] }`
fn sig_tst_value(token: Vec<u8>) -> CborValue {
    CborValue::Map(vec![(
        CborValue::Text("tstTokens".to_string()),
        CborValue::Array(vec![CborValue::Map(vec![(
            CborValue::Text("val".to_string()),
            CborValue::Bytes(token),
        )])]),
    )])
}

fn sig_tst_token(value: &CborValue) -> Option<Vec<u8>> {
    let map = value.as_map()?;
    let tokens = map
        .iter()
        .find(|(k, _)| k.as_text() == Some("tstTokens"))?
        .1
        .as_array()?;
    let first = tokens.first()?.as_map()?;
    first
        .iter()
        .find(|(k, _)| k.as_text() == Some("val"))?
        .1
        .as_bytes()
        .cloned()
}

/// Find a pad value so that `size_with(pad)` hits `target` exactly
///
/// CBOR length headers grow at byte-string size boundaries, so the search
/// iterates rather than solving in one step.
pub(crate) fn fit_to_size(
    target: u64,
    mut size_with: impl FnMut(usize) -> Result<u64>,
) -> Result<usize> {
    let base = size_with(0)?;
    if base > target {
        return Err(Error::InsufficientPadding {
            needed: base - target,
            reserved: 0,
        });
    }
    if base == target {
        return Ok(0);
    }

    let mut pad = (target - base) as usize;
    for _ in 0..8 {
        let size = size_with(pad)?;
        if size == target {
            return Ok(pad);
        }
        let delta = size as i64 - target as i64;
        let next = pad as i64 - delta;
        if next <= 0 {
            break;
        }
        pad = next as usize;
    }
    Err(Error::Other(
        "cannot pad envelope to the reserved size".to_string(),
    ))
}

/// The claim signature component of a manifest
///
/// Holds either a parsed COSE_Sign1 (validation path) or a placeholder that
/// reserves space for in-place signing. The serialized envelope size is
/// fixed once measured; signing must not change it.
#[derive(Debug, Clone)]
pub struct Signature {
    /// JUMBF label, `c2pa.signature`
    pub label: String,

    cose: Option<CoseSign1>,
    padding_length: usize,
    source_box: Option<SuperBox>,
}

impl Signature {
    /// Parse a signature component from its JUMBF superbox
    pub fn from_jumbf(sb: &SuperBox) -> Result<Self> {
        let label = sb
            .label()
            .ok_or_else(|| Error::RequiredFieldMissing("signature label"))?
            .to_string();
        let cbor = sb
            .cbor_content()
            .ok_or_else(|| Error::Cose("signature box has no CBOR content".to_string()))?;
        let cose = CoseSign1::from_tagged_slice(cbor)
            .map_err(|e| Error::Cose(format!("cannot parse COSE_Sign1: {e}")))?;

        let padding_length = cose
            .unprotected
            .rest
            .iter()
            .find(|(l, _)| matches!(l, Label::Text(t) if t == "pad"))
            .and_then(|(_, v)| v.as_bytes().map(|b| b.len()))
            .unwrap_or(0);

        Ok(Self {
            label,
            cose: Some(cose),
            padding_length,
            source_box: Some(sb.clone()),
        })
    }

    /// Build an unsigned placeholder whose serialized size equals the final
    /// signed envelope
    ///
    /// The placeholder carries the real protected header (algorithm and
    /// certificate chain), a zero signature of the algorithm's maximum wire
    /// size, and a pad sized to absorb the signature and timestamp growth.
    pub fn placeholder(signer: &Signer) -> Result<Self> {
        let alg = signer.cose_algorithm()?;
        let protected = HeaderBuilder::new()
            .algorithm(alg)
            .value(X5CHAIN_LABEL, x5chain_value(&signer.cert_chain_der))
            .build();

        let mut padding = SIGNATURE_PADDING;
        if signer.timestamp_provider.is_some() {
            padding += TIMESTAMP_ALLOWANCE;
        }
        let unprotected = HeaderBuilder::new()
            .text_value("pad".to_string(), CborValue::Bytes(vec![0; padding]))
            .build();

        let cose = CoseSign1Builder::new()
            .protected(protected)
            .unprotected(unprotected)
            .signature(vec![0; signer.alg().max_signature_len()])
            .build();

        Ok(Self {
            label: labels::SIGNATURE.to_string(),
            cose: Some(cose),
            padding_length: padding,
            source_box: None,
        })
    }

    /// The current pad length in bytes
    pub fn padding_length(&self) -> usize {
        self.padding_length
    }

    /// The embedded timestamp token, when one is present
    pub fn timestamp_token(&self) -> Option<Vec<u8>> {
        let cose = self.cose.as_ref()?;
        cose.unprotected
            .rest
            .iter()
            .find(|(l, _)| matches!(l, Label::Text(t) if t == "sigTst"))
            .and_then(|(_, v)| sig_tst_token(v))
    }

    /// The x5chain credential set, leaf first
    pub fn cert_chain(&self) -> Result<Vec<Vec<u8>>> {
        let cose = self
            .cose
            .as_ref()
            .ok_or_else(|| Error::Cose("signature is empty".to_string()))?;
        let find = |header: &Header| {
            header
                .rest
                .iter()
                .find(|(l, _)| matches!(l, Label::Int(i) if *i == X5CHAIN_LABEL))
                .and_then(|(_, v)| x5chain_from_value(v))
        };
        find(&cose.protected.header)
            .or_else(|| find(&cose.unprotected))
            .ok_or_else(|| Error::Cose("no x5chain in COSE headers".to_string()))
    }

    fn wire_alg(&self) -> Result<SigningAlg> {
        let cose = self
            .cose
            .as_ref()
            .ok_or_else(|| Error::Cose("signature is empty".to_string()))?;
        match &cose.protected.header.alg {
            Some(RegisteredLabelWithPrivate::Assigned(alg)) => SigningAlg::from_cose(alg.to_i64())
                .ok_or_else(|| Error::SigningAlgUnsupported(format!("COSE alg {}", alg.to_i64()))),
            Some(RegisteredLabelWithPrivate::Text(name)) => SigningAlg::from_name(name),
            _ => Err(Error::Cose("protected header has no algorithm".to_string())),
        }
    }

    /// Serialize into the signature JUMBF superbox
    pub fn to_jumbf(&self) -> Result<SuperBox> {
        if let Some(sb) = &self.source_box {
            return Ok(sb.clone());
        }
        let cose = self
            .cose
            .as_ref()
            .ok_or_else(|| Error::Cose("signature is empty".to_string()))?;
        let bytes = cose
            .clone()
            .to_tagged_vec()
            .map_err(|e| Error::Cose(format!("cannot serialize COSE_Sign1: {e}")))?;
        let mut sb = SuperBox::new(SIGNATURE_UUID, self.label.clone());
        sb.push_child(ChildBox::Cbor(bytes));
        Ok(sb)
    }

    /// Size of the serialized signature envelope (the JUMBF superbox)
    pub fn measure_envelope(&self) -> Result<u64> {
        self.to_jumbf()?.measured_size()
    }

    /// Sign `payload` in place, keeping the envelope at its measured size
    ///
    /// The signature bytes and optional timestamp token replace padding:
    /// after signing, the envelope measures exactly what it measured before.
    /// Fails with [`Error::InsufficientPadding`] when the reservation cannot
    /// absorb the growth.
    pub fn sign(&mut self, signer: &Signer, payload: &[u8]) -> Result<()> {
        let target = self.measure_envelope()?;
        let reserved = self.padding_length as u64;

        let alg = signer.cose_algorithm()?;
        let protected = HeaderBuilder::new()
            .algorithm(alg)
            .value(X5CHAIN_LABEL, x5chain_value(&signer.cert_chain_der))
            .build();

        let shell = CoseSign1Builder::new().protected(protected).build();
        let sig_structure = coset::sig_structure_data(
            SignatureContext::CoseSign1,
            shell.protected.clone(),
            None,
            &[],
            payload,
        );
        let raw_signature = crypto::sign_raw(signer.alg(), &signer.private_key_der, &sig_structure)?;

        let timestamp = match &signer.timestamp_provider {
            Some(provider) => {
                match provider.request_timestamp(&raw_signature, signer.timestamp_timeout)? {
                    Some(token) => Some(token),
                    None => return Err(Error::TimestampUnavailable),
                }
            }
            None => None,
        };

        let mut unsigned = shell;
        unsigned.signature = raw_signature;
        if let Some(token) = timestamp {
            unsigned
                .unprotected
                .rest
                .push((Label::Text("sigTst".to_string()), sig_tst_value(token)));
        }

        let label = self.label.clone();
        let size_with = |pad: usize| -> Result<u64> {
            let mut cose = unsigned.clone();
            if pad > 0 {
                cose.unprotected
                    .rest
                    .push((Label::Text("pad".to_string()), CborValue::Bytes(vec![0; pad])));
            }
            let bytes = cose
                .to_tagged_vec()
                .map_err(|e| Error::Cose(format!("cannot serialize COSE_Sign1: {e}")))?;
            let mut sb = SuperBox::new(SIGNATURE_UUID, label.clone());
            sb.push_child(ChildBox::Cbor(bytes));
            sb.measured_size()
        };

        let pad = fit_to_size(target, size_with).map_err(|e| match e {
            Error::InsufficientPadding { needed, .. } => Error::InsufficientPadding {
                needed,
                reserved,
            },
            other => other,
        })?;

        let mut cose = unsigned;
        if pad > 0 {
            cose.unprotected
                .rest
                .push((Label::Text("pad".to_string()), CborValue::Bytes(vec![0; pad])));
        }

        tracing::debug!(
            alg = signer.alg().as_str(),
            pad,
            envelope = target,
            "claim signature produced"
        );

        self.cose = Some(cose);
        self.padding_length = pad;
        self.source_box = None;
        Ok(())
    }

    /// Verify this signature over the detached `payload`, reporting status
    /// entries under `uri`
    pub fn verify(&self, payload: &[u8], report: &mut ValidationReport, uri: &str) {
        let cose = match &self.cose {
            Some(cose) => cose,
            None => {
                report.add(
                    ValidationCode::ClaimSignatureMismatch,
                    Some(uri.to_string()),
                    "signature component is empty",
                );
                return;
            }
        };

        let alg = match self.wire_alg() {
            Ok(alg) => alg,
            Err(err) => {
                report.add(
                    ValidationCode::AlgorithmUnsupported,
                    Some(uri.to_string()),
                    err.to_string(),
                );
                return;
            }
        };

        let chain = match self.cert_chain() {
            Ok(chain) if !chain.is_empty() => chain,
            _ => {
                report.add(
                    ValidationCode::SigningCredentialInvalid,
                    Some(uri.to_string()),
                    "no signing credential in COSE headers",
                );
                return;
            }
        };

        let credential = match crypto::parse_credential(&chain[0]) {
            Ok(credential) => credential,
            Err(err) => {
                report.add(
                    ValidationCode::SigningCredentialInvalid,
                    Some(uri.to_string()),
                    err.to_string(),
                );
                return;
            }
        };

        let sig_structure = coset::sig_structure_data(
            SignatureContext::CoseSign1,
            cose.protected.clone(),
            None,
            &[],
            payload,
        );

        match crypto::verify_raw_signature(alg, &credential.spki_der, &sig_structure, &cose.signature)
        {
            Ok(true) => {
                report.add(
                    ValidationCode::ClaimSignatureValidated,
                    Some(uri.to_string()),
                    "claim signature verified",
                );
            }
            Ok(false) => {
                report.add(
                    ValidationCode::ClaimSignatureMismatch,
                    Some(uri.to_string()),
                    "claim signature does not verify",
                );
                return;
            }
            Err(err) => {
                report.add(
                    ValidationCode::SigningCredentialInvalid,
                    Some(uri.to_string()),
                    err.to_string(),
                );
                return;
            }
        }

        if credential.is_certificate {
            if credential.valid_at(std::time::SystemTime::now()) {
                report.add(
                    ValidationCode::ClaimSignatureInsideValidity,
                    Some(uri.to_string()),
                    "signing credential is inside its validity window",
                );
            } else {
                report.add(
                    ValidationCode::SigningCredentialInvalid,
                    Some(uri.to_string()),
                    "signing credential is outside its validity window",
                );
            }

            match crypto::verify_cert_chain(&chain) {
                Ok(true) => {
                    report.add(
                        ValidationCode::SigningCredentialTrusted,
                        Some(uri.to_string()),
                        "credential chain is internally consistent",
                    );
                }
                Ok(false) => {
                    report.add(
                        ValidationCode::SigningCredentialUntrusted,
                        Some(uri.to_string()),
                        "credential chain does not verify",
                    );
                }
                Err(err) => {
                    report.add(
                        ValidationCode::SigningCredentialInvalid,
                        Some(uri.to_string()),
                        err.to_string(),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkcs8::EncodePrivateKey;
    use spki::EncodePublicKey;

    fn test_signer() -> Signer {
        let sk = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let private_der = sk.to_pkcs8_der().unwrap().as_bytes().to_vec();
        let public_der = sk
            .verifying_key()
            .to_public_key_der()
            .unwrap()
            .as_bytes()
            .to_vec();
        Signer::from_keys(SigningAlg::Es256, private_der, vec![public_der])
    }

    struct FixedTimestamp(Option<Vec<u8>>);

    impl TimestampProvider for FixedTimestamp {
        fn request_timestamp(&self, _message: &[u8], _timeout: Duration) -> Result<Option<Vec<u8>>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_sign_keeps_envelope_size() {
        let signer = test_signer();
        let mut signature = Signature::placeholder(&signer).unwrap();
        let reserved = signature.measure_envelope().unwrap();

        signature.sign(&signer, b"claim payload bytes").unwrap();
        assert_eq!(signature.measure_envelope().unwrap(), reserved);
        assert!(signature.padding_length() > 0);
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let signer = test_signer();
        let mut signature = Signature::placeholder(&signer).unwrap();
        signature.sign(&signer, b"payload").unwrap();

        // reparse through JUMBF to exercise the wire path
        let sb = signature.to_jumbf().unwrap();
        let bytes = sb.to_vec().unwrap();
        let parsed = Signature::from_jumbf(&SuperBox::from_slice(&bytes).unwrap()).unwrap();

        let mut report = ValidationReport::new();
        parsed.verify(b"payload", &mut report, "self#jumbf=c2pa.signature");
        assert!(report.has_code(ValidationCode::ClaimSignatureValidated));
        assert!(report.is_valid());
    }

    #[test]
    fn test_verify_rejects_wrong_payload() {
        let signer = test_signer();
        let mut signature = Signature::placeholder(&signer).unwrap();
        signature.sign(&signer, b"payload").unwrap();

        let mut report = ValidationReport::new();
        signature.verify(b"tampered", &mut report, "self#jumbf=c2pa.signature");
        assert!(report.has_code(ValidationCode::ClaimSignatureMismatch));
        assert!(!report.is_valid());
    }

    #[test]
    fn test_timestamp_token_embedded_and_recovered() {
        let signer = test_signer()
            .with_timestamp_provider(Box::new(FixedTimestamp(Some(b"fake-tst-token".to_vec()))));
        let mut signature = Signature::placeholder(&signer).unwrap();
        let reserved = signature.measure_envelope().unwrap();

        signature.sign(&signer, b"payload").unwrap();
        assert_eq!(signature.measure_envelope().unwrap(), reserved);
        assert_eq!(signature.timestamp_token().unwrap(), b"fake-tst-token");
    }

    #[test]
    fn test_unavailable_timestamp_fails_signing() {
        let signer = test_signer().with_timestamp_provider(Box::new(FixedTimestamp(None)));
        let mut signature = Signature::placeholder(&signer).unwrap();
        let result = signature.sign(&signer, b"payload");
        assert!(matches!(result, Err(Error::TimestampUnavailable)));
    }

    #[test]
    fn test_insufficient_padding_reported() {
        // reserve without a timestamp allowance, then sign with a provider
        // whose token outgrows the pad
        let signer = test_signer();
        let mut signature = Signature::placeholder(&signer).unwrap();

        let signer = signer.with_timestamp_provider(Box::new(FixedTimestamp(Some(vec![
            0x42;
            2 * SIGNATURE_PADDING
        ]))));
        let result = signature.sign(&signer, b"payload");
        assert!(matches!(result, Err(Error::InsufficientPadding { .. })));
    }

    #[test]
    fn test_fit_to_size_handles_header_boundaries() {
        // fake envelope: 10 bytes fixed + pad bytes + cbor-like header growth
        let size_with = |pad: usize| -> Result<u64> {
            let header = if pad == 0 {
                0
            } else if pad < 24 {
                1
            } else if pad < 256 {
                2
            } else {
                3
            };
            Ok(10 + header + pad as u64)
        };

        for target in [10u64, 12, 40, 300, 1034] {
            if let Ok(pad) = fit_to_size(target, size_with) {
                assert_eq!(size_with(pad).unwrap(), target, "target {target}");
            }
        }

        // too small to reach
        assert!(matches!(
            fit_to_size(5, size_with),
            Err(Error::InsufficientPadding { .. })
        ));
    }
}

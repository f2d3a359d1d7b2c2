//! TLS configuration assembly.
//!
//! Simple requests ride on the reqwest builder's own TLS knobs. Cipher-suite
//! selection and public-key pinning need a hand-built rustls config, which is
//! then handed to reqwest wholesale. Cipher names accept both the
//! curl/OpenSSL spellings and the IANA ones; a name that resolves to nothing
//! is an error, never a silent drop.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
    ServerName, UnixTime,
};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme, SupportedCipherSuite};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::options::{TlsOptions, TlsVersion};

/// curl/OpenSSL name, IANA name, rustls suite. TLS 1.2 suites only; rustls
/// implements the ECDHE+AEAD subset.
static TLS12_SUITES: &[(&str, &str, &SupportedCipherSuite)] = &[
    (
        "ECDHE-ECDSA-AES128-GCM-SHA256",
        "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
        &rustls::crypto::ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    ),
    (
        "ECDHE-ECDSA-AES256-GCM-SHA384",
        "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
        &rustls::crypto::ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    ),
    (
        "ECDHE-RSA-AES128-GCM-SHA256",
        "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        &rustls::crypto::ring::cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    ),
    (
        "ECDHE-RSA-AES256-GCM-SHA384",
        "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        &rustls::crypto::ring::cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    ),
    (
        "ECDHE-ECDSA-CHACHA20-POLY1305",
        "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
        &rustls::crypto::ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    ),
    (
        "ECDHE-RSA-CHACHA20-POLY1305",
        "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
        &rustls::crypto::ring::cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    ),
];

static TLS13_SUITES: &[(&str, &str, &SupportedCipherSuite)] = &[
    (
        "TLS_AES_128_GCM_SHA256",
        "TLS13_AES_128_GCM_SHA256",
        &rustls::crypto::ring::cipher_suite::TLS13_AES_128_GCM_SHA256,
    ),
    (
        "TLS_AES_256_GCM_SHA384",
        "TLS13_AES_256_GCM_SHA384",
        &rustls::crypto::ring::cipher_suite::TLS13_AES_256_GCM_SHA384,
    ),
    (
        "TLS_CHACHA20_POLY1305_SHA256",
        "TLS13_CHACHA20_POLY1305_SHA256",
        &rustls::crypto::ring::cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
    ),
];

fn resolve_suites(
    names: &[String],
    table: &[(&str, &str, &'static SupportedCipherSuite)],
    field: &'static str,
) -> Result<Vec<SupportedCipherSuite>> {
    names
        .iter()
        .map(|name| {
            table
                .iter()
                .find(|(openssl, iana, _)| {
                    name.eq_ignore_ascii_case(openssl) || name.eq_ignore_ascii_case(iana)
                })
                .map(|(_, _, suite)| **suite)
                .ok_or_else(|| {
                    Error::validation(field, format!("unknown cipher suite {name:?}"))
                })
        })
        .collect()
}

pub(crate) fn resolve_tls12_suites(names: &[String]) -> Result<Vec<SupportedCipherSuite>> {
    resolve_suites(names, TLS12_SUITES, "ciphers")
}

pub(crate) fn resolve_tls13_suites(names: &[String]) -> Result<Vec<SupportedCipherSuite>> {
    resolve_suites(names, TLS13_SUITES, "tls13-ciphers")
}

/// Parse `sha256//BASE64` pin syntax into raw digests.
pub(crate) fn parse_pins(pins: &[String]) -> Result<Vec<[u8; 32]>> {
    pins.iter()
        .map(|pin| {
            let encoded = pin.strip_prefix("sha256//").ok_or_else(|| {
                Error::validation("pinnedpubkey", format!("pin must start with sha256//: {pin:?}"))
            })?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|err| {
                    Error::validation("pinnedpubkey", format!("bad base64 in {pin:?}: {err}"))
                })?;
            <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
                Error::validation(
                    "pinnedpubkey",
                    format!("pin is {} bytes, expected 32", bytes.len()),
                )
            })
        })
        .collect()
}

pub(crate) fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = fs::read(path).map_err(|err| Error::file(path, "read certificate file", err))?;
    let pems = pem::parse_many(&data).map_err(|err| {
        Error::validation("cert", format!("cannot parse {}: {err}", path.display()))
    })?;
    let certs: Vec<CertificateDer<'static>> = pems
        .iter()
        .filter(|block| block.tag() == "CERTIFICATE")
        .map(|block| CertificateDer::from(block.contents().to_vec()))
        .collect();
    if certs.is_empty() {
        return Err(Error::validation(
            "cert",
            format!("no CERTIFICATE blocks in {}", path.display()),
        ));
    }
    Ok(certs)
}

pub(crate) fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let data = fs::read(path).map_err(|err| Error::file(path, "read key file", err))?;
    let pems = pem::parse_many(&data).map_err(|err| {
        Error::validation("key", format!("cannot parse {}: {err}", path.display()))
    })?;
    for block in pems {
        let der = block.contents().to_vec();
        match block.tag() {
            "PRIVATE KEY" => return Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der))),
            "RSA PRIVATE KEY" => return Ok(PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(der))),
            "EC PRIVATE KEY" => return Ok(PrivateKeyDer::Sec1(PrivateSec1KeyDer::from(der))),
            _ => {}
        }
    }
    Err(Error::validation(
        "key",
        format!("no private key block in {}", path.display()),
    ))
}

fn protocol_versions(
    tls: &TlsOptions,
) -> Result<Vec<&'static rustls::SupportedProtocolVersion>> {
    let min = tls.min_version.unwrap_or(TlsVersion::Tls1_2);
    let max = tls.max_version.unwrap_or(TlsVersion::Tls1_3);
    if min < TlsVersion::Tls1_2 {
        // rustls starts at 1.2; curl's 1.0/1.1 selectors clamp up.
        log::warn!("TLS below 1.2 is not supported; using 1.2 as the minimum");
    }
    let mut versions = Vec::new();
    if min <= TlsVersion::Tls1_2 && max >= TlsVersion::Tls1_2 {
        versions.push(&rustls::version::TLS12);
    }
    if max >= TlsVersion::Tls1_3 {
        versions.push(&rustls::version::TLS13);
    }
    if versions.is_empty() {
        return Err(Error::validation(
            "tls-max",
            "no TLS version satisfies the min/max bounds",
        ));
    }
    Ok(versions)
}

fn root_store(tls: &TlsOptions) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    match &tls.ca_cert {
        // A custom CA bundle replaces the default roots entirely.
        Some(path) => {
            for cert in load_certs(path)? {
                roots.add(cert).map_err(|err| {
                    Error::validation("cacert", format!("rejected CA certificate: {err}"))
                })?;
            }
        }
        None => {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
    }
    Ok(roots)
}

/// Build the full rustls config for requests that need cipher selection or
/// pinning. The reqwest builder path cannot express those.
pub(crate) fn build_rustls_config(tls: &TlsOptions, http2: bool, http2_only: bool) -> Result<rustls::ClientConfig> {
    // An empty list for one protocol version keeps that version's full
    // default set, so limiting 1.2 ciphers does not lock out 1.3.
    let mut suites = Vec::new();
    if tls.ciphers.is_empty() {
        suites.extend(TLS12_SUITES.iter().map(|(_, _, suite)| **suite));
    } else {
        suites.extend(resolve_tls12_suites(&tls.ciphers)?);
    }
    if tls.tls13_ciphers.is_empty() {
        suites.extend(TLS13_SUITES.iter().map(|(_, _, suite)| **suite));
    } else {
        suites.extend(resolve_tls13_suites(&tls.tls13_ciphers)?);
    }

    let provider = Arc::new(CryptoProvider {
        cipher_suites: suites,
        ..rustls::crypto::ring::default_provider()
    });

    let versions = protocol_versions(tls)?;
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&versions)
        .map_err(|err| Error::validation("tls", format!("unusable TLS configuration: {err}")))?;

    let roots = root_store(tls)?;
    let verifier: Arc<dyn ServerCertVerifier> = {
        let webpki = WebPkiServerVerifier::builder_with_provider(Arc::new(roots.clone()), provider.clone())
            .build()
            .map_err(|err| Error::validation("cacert", format!("unusable root store: {err}")))?;
        Arc::new(PinnedVerifier {
            inner: webpki,
            pins: parse_pins(&tls.pinned_keys)?,
            insecure: tls.insecure,
            provider,
        })
    };

    let builder = builder.with_root_certificates(roots);
    let mut config = match (&tls.cert, &tls.key) {
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(load_certs(cert)?, load_private_key(key)?)
            .map_err(|err| Error::validation("cert", format!("bad client identity: {err}")))?,
        _ => builder.with_no_client_auth(),
    };
    config
        .dangerous()
        .set_certificate_verifier(verifier);

    config.alpn_protocols = if http2_only {
        vec![b"h2".to_vec()]
    } else if http2 {
        vec![b"h2".to_vec(), b"http/1.1".to_vec()]
    } else {
        vec![b"http/1.1".to_vec()]
    };

    Ok(config)
}

/// Chain verifier: WebPKI first (unless `insecure`), then the pin check.
/// A pin list with no match fails the handshake even when the chain is good.
#[derive(Debug)]
struct PinnedVerifier {
    inner: Arc<WebPkiServerVerifier>,
    pins: Vec<[u8; 32]>,
    insecure: bool,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for PinnedVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if !self.insecure {
            self.inner
                .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)?;
        }
        if !self.pins.is_empty() {
            let digest = spki_sha256(end_entity.as_ref()).ok_or_else(|| {
                rustls::Error::InvalidCertificate(rustls::CertificateError::BadEncoding)
            })?;
            if !self.pins.contains(&digest) {
                return Err(rustls::Error::InvalidCertificate(
                    rustls::CertificateError::ApplicationVerificationFailure,
                ));
            }
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        if self.insecure {
            return Ok(HandshakeSignatureValid::assertion());
        }
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        if self.insecure {
            return Ok(HandshakeSignatureValid::assertion());
        }
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// SHA-256 over the DER bytes of the certificate's SubjectPublicKeyInfo,
/// header included — the digest curl compares `--pinnedpubkey` against.
pub(crate) fn spki_sha256(cert_der: &[u8]) -> Option<[u8; 32]> {
    let spki = extract_spki(cert_der)?;
    let digest = Sha256::digest(spki);
    Some(digest.into())
}

/// Walk just enough DER to slice the SPKI element out of a certificate:
/// skip into TBSCertificate, then past version, serial, signature algorithm,
/// issuer, validity, and subject.
fn extract_spki(cert_der: &[u8]) -> Option<&[u8]> {
    let (cert_contents, _) = der_enter(cert_der, 0x30)?; // Certificate
    let (mut tbs, _) = der_enter(cert_contents, 0x30)?; // TBSCertificate

    // version is EXPLICIT [0], present only for v2/v3
    if tbs.first() == Some(&0xA0) {
        tbs = der_skip(tbs)?;
    }
    tbs = der_skip(tbs)?; // serialNumber
    tbs = der_skip(tbs)?; // signature AlgorithmIdentifier
    tbs = der_skip(tbs)?; // issuer
    tbs = der_skip(tbs)?; // validity
    tbs = der_skip(tbs)?; // subject

    let (element, _) = der_element(tbs)?;
    if element.first() == Some(&0x30) {
        Some(element)
    } else {
        None
    }
}

/// Split the next DER element (header + contents) from the rest.
fn der_element(data: &[u8]) -> Option<(&[u8], &[u8])> {
    if data.len() < 2 {
        return None;
    }
    let mut offset = 2;
    let mut length = data[1] as usize;
    if length & 0x80 != 0 {
        let count = length & 0x7F;
        if count == 0 || count > 4 || data.len() < 2 + count {
            return None;
        }
        length = 0;
        for &byte in &data[2..2 + count] {
            length = (length << 8) | byte as usize;
        }
        offset += count;
    }
    let end = offset.checked_add(length)?;
    if end > data.len() {
        return None;
    }
    Some((&data[..end], &data[end..]))
}

fn der_skip(data: &[u8]) -> Option<&[u8]> {
    der_element(data).map(|(_, rest)| rest)
}

/// Check the tag, then return (contents, rest-after-element).
fn der_enter(data: &[u8], tag: u8) -> Option<(&[u8], &[u8])> {
    if data.first() != Some(&tag) {
        return None;
    }
    let (element, rest) = der_element(data)?;
    let content_len = der_content_len(element)?;
    let header_len = element.len().checked_sub(content_len)?;
    Some((&element[header_len..], rest))
}

fn der_content_len(element: &[u8]) -> Option<usize> {
    if element.len() < 2 {
        return None;
    }
    let length = element[1] as usize;
    if length & 0x80 == 0 {
        Some(length)
    } else {
        let count = length & 0x7F;
        let mut value = 0usize;
        for &byte in element.get(2..2 + count)? {
            value = (value << 8) | byte as usize;
        }
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    #[test]
    fn cipher_names_resolve_in_both_spellings() {
        let suites = resolve_tls12_suites(&[
            "ECDHE-RSA-AES128-GCM-SHA256".to_string(),
            "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384".to_string(),
        ])
        .unwrap();
        assert_eq!(suites.len(), 2);

        let suites = resolve_tls13_suites(&["TLS_AES_128_GCM_SHA256".to_string()]).unwrap();
        assert_eq!(suites.len(), 1);
    }

    #[test]
    fn unknown_cipher_name_errors() {
        let err = resolve_tls12_suites(&["NOT-A-SUITE".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Validation { field: "ciphers", .. }));
    }

    #[test]
    fn pins_parse_and_reject() {
        use base64::engine::general_purpose::STANDARD;
        let good = format!("sha256//{}", STANDARD.encode([7u8; 32]));
        let pins = parse_pins(&[good]).unwrap();
        assert_eq!(pins, vec![[7u8; 32]]);

        assert!(parse_pins(&["md5//xxxx".to_string()]).is_err());
        assert!(parse_pins(&["sha256//@@@".to_string()]).is_err());
        let short = format!("sha256//{}", STANDARD.encode([1u8; 4]));
        assert!(parse_pins(&[short]).is_err());
    }

    // DER helpers for constructing a synthetic certificate skeleton.
    fn der(tag: u8, contents: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        let len = contents.len();
        if len < 0x80 {
            out.push(len as u8);
        } else if len <= 0xFF {
            out.push(0x81);
            out.push(len as u8);
        } else {
            out.push(0x82);
            out.push((len >> 8) as u8);
            out.push(len as u8);
        }
        out.extend_from_slice(contents);
        out
    }

    #[test]
    fn spki_extraction_walks_tbs() {
        let spki = der(0x30, &[0x06, 0x01, 0x2A, 0x03, 0x02, 0x00, 0x01]);
        let mut tbs_contents = Vec::new();
        tbs_contents.extend(der(0xA0, &[0x02, 0x01, 0x02])); // version
        tbs_contents.extend(der(0x02, &[0x01])); // serial
        tbs_contents.extend(der(0x30, &[])); // sig alg
        tbs_contents.extend(der(0x30, &[])); // issuer
        tbs_contents.extend(der(0x30, &[])); // validity
        tbs_contents.extend(der(0x30, &[])); // subject
        tbs_contents.extend(spki.clone());

        let tbs = der(0x30, &tbs_contents);
        let mut cert_contents = tbs;
        cert_contents.extend(der(0x30, &[])); // signature algorithm
        cert_contents.extend(der(0x03, &[0x00])); // signature
        let cert = der(0x30, &cert_contents);

        assert_eq!(extract_spki(&cert), Some(spki.as_slice()));
        assert_eq!(spki_sha256(&cert), Some(Sha256::digest(&spki).into()));
    }

    #[test]
    fn spki_extraction_rejects_garbage() {
        assert_eq!(extract_spki(b"not der"), None);
        assert_eq!(extract_spki(&[]), None);
    }

    #[test]
    fn version_bounds() {
        let mut tls = TlsOptions::default();
        tls.min_version = Some(TlsVersion::Tls1_2);
        tls.max_version = Some(TlsVersion::Tls1_2);
        let versions = protocol_versions(&tls).unwrap();
        assert_eq!(versions.len(), 1);

        tls.min_version = Some(TlsVersion::Tls1_3);
        tls.max_version = Some(TlsVersion::Tls1_2);
        assert!(protocol_versions(&tls).is_err());
    }
}

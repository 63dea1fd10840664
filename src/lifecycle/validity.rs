//! Certificate expiry inspection and the renewal decision

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::io::BufReader;

use crate::error::LifecycleError;

/// Decide whether a certificate expiring at `expires_at` is due for
/// renewal. True iff strictly less than `buffer_hours` of validity
/// remain at `now`; exactly `buffer_hours` remaining is not yet due.
pub fn needs_renewal(expires_at: DateTime<Utc>, now: DateTime<Utc>, buffer_hours: i64) -> bool {
    expires_at - now < Duration::hours(buffer_hours)
}

/// Parse the first certificate out of a PEM bundle into DER.
pub fn parse_certificate_der(pem: &str) -> Result<Vec<u8>, LifecycleError> {
    let mut reader = BufReader::new(pem.as_bytes());
    let cert_items = rustls_pemfile::certs(&mut reader)
        .map_err(|e| LifecycleError::CertificateParse(format!("invalid PEM: {}", e)))?;

    cert_items.into_iter().next().ok_or_else(|| {
        LifecycleError::CertificateParse("no certificate found in PEM data".to_string())
    })
}

/// Extract the expiry timestamp and covered hostnames from a PEM-encoded
/// certificate. Hostnames are the subject CN (when present) plus the SAN
/// DNS names, deduplicated.
pub fn extract_cert_info(pem: &str) -> Result<(DateTime<Utc>, Vec<String>), LifecycleError> {
    use x509_parser::parse_x509_certificate;

    let der = parse_certificate_der(pem)?;
    let (_, x509) = parse_x509_certificate(&der)
        .map_err(|e| LifecycleError::CertificateParse(format!("invalid X.509: {}", e)))?;

    let expires_at = parse_asn1_time(&x509.validity().not_after)?;

    let mut hostnames = Vec::new();
    if let Some(cn) = x509.subject().iter_common_name().next() {
        if let Ok(cn_str) = cn.as_str() {
            hostnames.push(cn_str.to_string());
        }
    }

    let san_ext = x509
        .extensions()
        .iter()
        .find(|ext| ext.oid == x509_parser::oid_registry::OID_X509_EXT_SUBJECT_ALT_NAME);

    if let Some(san) = san_ext {
        if let x509_parser::extensions::ParsedExtension::SubjectAlternativeName(san_names) =
            san.parsed_extension()
        {
            for name in &san_names.general_names {
                if let x509_parser::extensions::GeneralName::DNSName(dns) = name {
                    hostnames.push(dns.to_string());
                }
            }
        }
    }

    hostnames.sort();
    hostnames.dedup();

    Ok((expires_at, hostnames))
}

/// Expiry only, for the renewal check.
pub fn parse_expiry(pem: &str) -> Result<DateTime<Utc>, LifecycleError> {
    extract_cert_info(pem).map(|(expires_at, _)| expires_at)
}

fn parse_asn1_time(time: &x509_parser::time::ASN1Time) -> Result<DateTime<Utc>, LifecycleError> {
    let timestamp = time.timestamp();
    Utc.timestamp_opt(timestamp, 0).single().ok_or_else(|| {
        LifecycleError::CertificateParse("certificate NotAfter outside representable range".to_string())
    })
}

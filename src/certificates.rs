//! Gift certificates

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while applying gift certificates.
#[derive(Debug, Error, PartialEq)]
pub enum CertificateError {
    /// The certificate has nothing left to redeem.
    #[error("gift certificate {0} has a zero balance")]
    ZeroBalance(String),
}

/// A gift certificate presented for redemption against the cart total.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GiftCertificate {
    code: String,
}

impl GiftCertificate {
    /// Creates a certificate with the given redemption code.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        GiftCertificate { code: code.into() }
    }

    /// Returns the redemption code.
    pub fn code(&self) -> &str {
        &self.code
    }
}

/// The external balance store for gift certificates.
///
/// Queried once per applied certificate whenever the cart recomputes its
/// applied-certificate total.
pub trait GiftCertificateBalance {
    /// Returns the remaining balance of the certificate.
    fn balance(&self, certificate: &GiftCertificate) -> Decimal;
}

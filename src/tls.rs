#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsBackend {
    RustlsRing,
    RustlsAwsLcRs,
}

impl TlsBackend {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RustlsRing => "rustls-ring",
            Self::RustlsAwsLcRs => "rustls-aws-lc-rs",
        }
    }
}

impl Default for TlsBackend {
    fn default() -> Self {
        default_tls_backend()
    }
}

/// The backend used when none is chosen: ring when compiled in, otherwise aws-lc-rs.
pub const fn default_tls_backend() -> TlsBackend {
    if cfg!(feature = "tls-rustls-ring") {
        TlsBackend::RustlsRing
    } else {
        TlsBackend::RustlsAwsLcRs
    }
}

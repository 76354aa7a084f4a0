use async_trait::async_trait;
use fabric_common::identity::{Enrollment, Identity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CaError {
    #[error("Certificate authority is unreachable: {}", _0)]
    Unreachable(String),
    #[error("Registrar '{}' is not allowed to register users", _0)]
    Unauthorized(String),
    #[error("Identity '{}' is already registered", _0)]
    Duplicate(String),
    #[error("Invalid enrollment secret for '{}'", _0)]
    InvalidSecret(String),
    #[error("Certificate authority rejected the request: {}", _0)]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub enrollment_id: String,
    pub affiliation: String,
    // Identity type as understood by the CA, "client" for end users
    pub identity_type: String,
}

impl RegistrationRequest {
    pub fn client<N: Into<String>, A: Into<String>>(enrollment_id: N, affiliation: A) -> Self {
        Self {
            enrollment_id: enrollment_id.into(),
            affiliation: affiliation.into(),
            identity_type: String::from("client"),
        }
    }
}

#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    // Register a new identity, returns its enrollment secret
    async fn register(
        &self,
        request: &RegistrationRequest,
        registrar: &Identity,
    ) -> Result<String, CaError>;

    async fn enroll(&self, enrollment_id: &str, secret: &str) -> Result<Enrollment, CaError>;
}

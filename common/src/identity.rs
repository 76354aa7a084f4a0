use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};

// Key material returned by the certificate authority on enrollment
#[derive(Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub private_key_pem: String,
    pub certificate_pem: String,
}

impl Debug for Enrollment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enrollment")
            .field("certificate_pem", &self.certificate_pem)
            .finish_non_exhaustive()
    }
}

// Signing principal acting on the network.
// Never mutated once created, shared behind an Arc by the components using it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    name: String,
    affiliation: String,
    msp_id: String,
    private_key_pem: String,
    certificate_pem: String,
}

impl Identity {
    pub fn new<N: Into<String>, A: Into<String>, M: Into<String>>(
        name: N,
        affiliation: A,
        msp_id: M,
        enrollment: Enrollment,
    ) -> Self {
        Self {
            name: name.into(),
            affiliation: affiliation.into(),
            msp_id: msp_id.into(),
            private_key_pem: enrollment.private_key_pem,
            certificate_pem: enrollment.certificate_pem,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn affiliation(&self) -> &str {
        &self.affiliation
    }

    pub fn msp_id(&self) -> &str {
        &self.msp_id
    }

    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }
}

impl Debug for Identity {
    // private key is left out on purpose
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("name", &self.name)
            .field("affiliation", &self.affiliation)
            .field("msp_id", &self.msp_id)
            .finish_non_exhaustive()
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.msp_id)
    }
}

#![forbid(unsafe_code)]

use crate::roster::IdentityId;
use crate::{ContractViolation, Validate};

/// Fixed embedding dimensionality shared by every extractor implementation.
pub const FACE_EMBEDDING_DIM: usize = 64;

/// Fixed-length feature vector in the embedding metric space. Comparison is
/// Euclidean distance; lower is a better match.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceEmbedding(Vec<f32>);

impl FaceEmbedding {
    pub fn new(values: Vec<f32>) -> Result<Self, ContractViolation> {
        let v = Self(values);
        v.validate()?;
        Ok(v)
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }
}

impl Validate for FaceEmbedding {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.len() != FACE_EMBEDDING_DIM {
            return Err(ContractViolation::InvalidValue {
                field: "face_embedding",
                reason: "must have FACE_EMBEDDING_DIM values",
            });
        }
        for v in &self.0 {
            if !v.is_finite() {
                return Err(ContractViolation::NotFinite {
                    field: "face_embedding",
                });
            }
        }
        Ok(())
    }
}

/// Stored enrollment reference. Written once at registration; immutable
/// afterward (re-registration is rejected by the store).
#[derive(Debug, Clone, PartialEq)]
pub struct BiometricReference {
    pub identity_id: IdentityId,
    pub embedding: FaceEmbedding,
}

impl BiometricReference {
    pub fn v1(
        identity_id: IdentityId,
        embedding: FaceEmbedding,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            identity_id,
            embedding,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for BiometricReference {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.identity_id.validate()?;
        self.embedding.validate()?;
        Ok(())
    }
}

/// A fixed-dimension embedding vector.
///
/// Dimension is a property of the backend that produced the vector;
/// operations across mismatched dimensions return the neutral score rather
/// than erroring, so a misconfigured backend degrades scores instead of
/// failing requests.
#[derive(Clone, Debug, PartialEq)]
pub struct Embedding(Vec<f32>);

#[derive(Debug, thiserror::Error)]
#[error("Embedding byte length {0} is not a multiple of 4")]
pub struct ByteLengthError(pub usize);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }

    /// L2 magnitude.
    pub fn magnitude(&self) -> f64 {
        self.0
            .iter()
            .map(|&v| (v as f64) * (v as f64))
            .sum::<f64>()
            .sqrt()
    }

    /// Cosine similarity with another vector, clipped to [-1, 1].
    ///
    /// Returns 0 when either vector has zero magnitude or the dimensions
    /// differ.
    pub fn cosine_similarity(&self, other: &Embedding) -> f64 {
        if self.0.len() != other.0.len() {
            return 0.0;
        }

        let dot: f64 = self
            .0
            .iter()
            .zip(&other.0)
            .map(|(&a, &b)| (a as f64) * (b as f64))
            .sum();
        let mag_a = self.magnitude();
        let mag_b = other.magnitude();

        if mag_a == 0.0 || mag_b == 0.0 {
            0.0
        } else {
            (dot / (mag_a * mag_b)).clamp(-1.0, 1.0)
        }
    }

    /// A unit-length copy of this vector. The zero vector normalizes to
    /// itself.
    pub fn normalize(&self) -> Embedding {
        let mag = self.magnitude();
        if mag == 0.0 {
            return self.clone();
        }
        Embedding(self.0.iter().map(|&v| (v as f64 / mag) as f32).collect())
    }

    /// Little-endian byte serialization, 4 bytes per component.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.0.len() * 4);
        for v in &self.0 {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    /// Bit-exact inverse of `to_bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Embedding, ByteLengthError> {
        if bytes.len() % 4 != 0 {
            return Err(ByteLengthError(bytes.len()));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Embedding(values))
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

//! Backend identity and per-backend support matrices.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::descriptor::QueueDescriptor;
use crate::error::{FactoryError, TensorRole};
use crate::layer::LayerKind;
use crate::tensor::DType;

/// Names one target compute backend (e.g. `"ref"`, `"faer"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Declares, per layer kind and element type, whether a backend can execute
/// the combination.
///
/// Profiles are plain data and serialize to JSON, so backend coverage can be
/// audited and diffed without reading backend code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityProfile {
    backend: BackendId,
    supported: BTreeSet<(LayerKind, DType)>,
}

impl CapabilityProfile {
    pub fn new(backend: BackendId) -> Self {
        Self {
            backend,
            supported: BTreeSet::new(),
        }
    }

    pub fn backend(&self) -> &BackendId {
        &self.backend
    }

    /// Adds a supported (kind, dtype) pair. Builder-style.
    pub fn support(mut self, kind: LayerKind, dtype: DType) -> Self {
        self.supported.insert((kind, dtype));
        self
    }

    pub fn insert(&mut self, kind: LayerKind, dtype: DType) {
        self.supported.insert((kind, dtype));
    }

    pub fn supports(&self, kind: LayerKind, dtype: DType) -> bool {
        self.supported.contains(&(kind, dtype))
    }

    pub fn iter(&self) -> impl Iterator<Item = (LayerKind, DType)> + '_ {
        self.supported.iter().copied()
    }

    /// Validates every descriptor tensor against the profile.
    ///
    /// On the first excluded combination, returns [`FactoryError::NotSupported`]
    /// naming the offending tensor so the caller can pick another backend or
    /// fail graph compilation with a useful message.
    pub fn check(&self, kind: LayerKind, descriptor: &QueueDescriptor) -> Result<(), FactoryError> {
        let tensors = descriptor
            .inputs
            .iter()
            .enumerate()
            .map(|(index, handle)| (TensorRole::Input, index, handle))
            .chain(
                descriptor
                    .outputs
                    .iter()
                    .enumerate()
                    .map(|(index, handle)| (TensorRole::Output, index, handle)),
            );
        for (role, index, handle) in tensors {
            let dtype = handle.info().dtype();
            if !self.supports(kind, dtype) {
                return Err(FactoryError::NotSupported {
                    backend: self.backend.clone(),
                    kind,
                    dtype,
                    role,
                    index,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::LayerParams;
    use crate::tensor::{QuantizationInfo, TensorHandle, TensorInfo, TensorShape};

    fn handle(dtype: DType) -> TensorHandle {
        let mut info = TensorInfo::new(TensorShape::new([1, 3]), dtype);
        if dtype.is_quantized() {
            info = info.with_quantization(QuantizationInfo::new(1.0 / 256.0, 0));
        }
        TensorHandle::zeroed(info).unwrap()
    }

    #[test]
    fn check_names_the_offending_tensor() {
        let profile =
            CapabilityProfile::new(BackendId::from("test")).support(LayerKind::Softmax, DType::F32);

        let ok = QueueDescriptor::new(
            vec![handle(DType::F32)],
            vec![handle(DType::F32)],
            LayerParams::Softmax { beta: 1.0 },
        );
        assert!(profile.check(LayerKind::Softmax, &ok).is_ok());

        let quantized = QueueDescriptor::new(
            vec![handle(DType::QAsymmU8)],
            vec![handle(DType::QAsymmU8)],
            LayerParams::Softmax { beta: 1.0 },
        );
        match profile.check(LayerKind::Softmax, &quantized) {
            Err(FactoryError::NotSupported {
                kind,
                dtype,
                role,
                index,
                ..
            }) => {
                assert_eq!(kind, LayerKind::Softmax);
                assert_eq!(dtype, DType::QAsymmU8);
                assert_eq!(role, TensorRole::Input);
                assert_eq!(index, 0);
            }
            other => panic!("expected NotSupported, got {other:?}"),
        }
    }

    #[test]
    fn profiles_serialize_as_auditable_data() {
        let profile = CapabilityProfile::new(BackendId::from("ref"))
            .support(LayerKind::Softmax, DType::F32)
            .support(LayerKind::Softmax, DType::QAsymmU8);
        let json = serde_json::to_string(&profile).unwrap();
        let parsed: CapabilityProfile = serde_json::from_str(&json).unwrap();
        assert!(parsed.supports(LayerKind::Softmax, DType::QAsymmU8));
        assert!(!parsed.supports(LayerKind::Addition, DType::F32));
    }
}

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{DType, TensorError, TensorInfo};

/// Tagged union of element buffers, one variant per supported dtype.
///
/// `F16` values are stored as raw bit patterns; no shipped backend computes on
/// them, they exist so capability mismatches can be expressed and tested.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    Si32(Vec<i32>),
    QAsymmU8(Vec<u8>),
    F16(Vec<u16>),
}

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
            TensorData::Si32(_) => DType::Si32,
            TensorData::QAsymmU8(_) => DType::QAsymmU8,
            TensorData::F16(_) => DType::F16,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::Si32(v) => v.len(),
            TensorData::QAsymmU8(v) => v.len(),
            TensorData::F16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn zeroed(dtype: DType, count: usize) -> TensorData {
        match dtype {
            DType::F32 => TensorData::F32(vec![0.0; count]),
            DType::Si32 => TensorData::Si32(vec![0; count]),
            DType::QAsymmU8 => TensorData::QAsymmU8(vec![0; count]),
            DType::F16 => TensorData::F16(vec![0; count]),
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            TensorData::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_si32(&self) -> Option<&[i32]> {
        match self {
            TensorData::Si32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_qasymm_u8(&self) -> Option<&[u8]> {
        match self {
            TensorData::QAsymmU8(v) => Some(v),
            _ => None,
        }
    }
}

/// Shared, interior-mutable tensor buffer bound to its metadata.
///
/// Handles are cheap to clone; clones alias the same buffer. Producer
/// workloads write through one clone while consumers read through another,
/// which is also how the execution engine discovers graph edges (buffer
/// identity, see [`TensorHandle::same_buffer`]).
#[derive(Clone)]
pub struct TensorHandle {
    info: TensorInfo,
    data: Arc<RwLock<TensorData>>,
}

impl TensorHandle {
    /// Wraps an existing buffer, checking it against the metadata.
    pub fn from_data(info: TensorInfo, data: TensorData) -> Result<Self, TensorError> {
        info.validate()?;
        if data.dtype() != info.dtype() {
            return Err(TensorError::DTypeMismatch {
                expected: info.dtype(),
                actual: data.dtype(),
            });
        }
        if data.len() != info.element_count() {
            return Err(TensorError::LengthMismatch {
                expected: info.element_count(),
                actual: data.len(),
            });
        }
        Ok(Self {
            info,
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// Allocates a zero-filled buffer for the given metadata.
    pub fn zeroed(info: TensorInfo) -> Result<Self, TensorError> {
        info.validate()?;
        let data = TensorData::zeroed(info.dtype(), info.element_count());
        Ok(Self {
            info,
            data: Arc::new(RwLock::new(data)),
        })
    }

    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    pub fn read(&self) -> RwLockReadGuard<'_, TensorData> {
        self.data.read().unwrap()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, TensorData> {
        self.data.write().unwrap()
    }

    /// True when both handles alias the same underlying buffer.
    pub fn same_buffer(&self, other: &TensorHandle) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Stable identity of the underlying buffer, usable as a map key.
    pub fn buffer_id(&self) -> usize {
        Arc::as_ptr(&self.data) as usize
    }
}

impl std::fmt::Debug for TensorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorHandle")
            .field("info", &self.info)
            .field("buffer_id", &self.buffer_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorShape;

    #[test]
    fn from_data_rejects_mismatched_buffers() {
        let info = TensorInfo::new(TensorShape::new([2, 2]), DType::F32);
        let err = TensorHandle::from_data(info.clone(), TensorData::Si32(vec![0; 4]))
            .expect_err("dtype mismatch");
        assert_eq!(
            err,
            TensorError::DTypeMismatch {
                expected: DType::F32,
                actual: DType::Si32
            }
        );

        let err = TensorHandle::from_data(info, TensorData::F32(vec![0.0; 3]))
            .expect_err("length mismatch");
        assert_eq!(
            err,
            TensorError::LengthMismatch {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn clones_alias_the_same_buffer() {
        let info = TensorInfo::new(TensorShape::new([4]), DType::F32);
        let handle = TensorHandle::zeroed(info.clone()).unwrap();
        let alias = handle.clone();
        assert!(handle.same_buffer(&alias));

        *alias.write() = TensorData::F32(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(handle.read().as_f32().unwrap(), &[1.0, 2.0, 3.0, 4.0]);

        let other = TensorHandle::zeroed(info).unwrap();
        assert!(!handle.same_buffer(&other));
    }
}

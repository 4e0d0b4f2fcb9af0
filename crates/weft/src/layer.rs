//! Closed taxonomy of layer operations understood by the execution core.
//!
//! Every graph node carries exactly one [`LayerKind`]. The set is compiled in
//! and immutable at runtime; backends declare which subset they can execute
//! through their capability profiles.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies one supported layer operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum LayerKind {
    Activation,
    Addition,
    BatchNormalization,
    BatchToSpaceNd,
    Constant,
    ConvertFp16ToFp32,
    ConvertFp32ToFp16,
    Convolution2d,
    Debug,
    DepthwiseConvolution2d,
    Division,
    Equal,
    FakeQuantization,
    Floor,
    FullyConnected,
    Gather,
    Greater,
    Input,
    L2Normalization,
    Lstm,
    Maximum,
    Mean,
    MemCopy,
    Merger,
    Minimum,
    Multiplication,
    Normalization,
    Output,
    Pad,
    Permute,
    Pooling2d,
    PreCompiled,
    Reshape,
    Rsqrt,
    ResizeBilinear,
    Softmax,
    SpaceToBatchNd,
    Splitter,
    StridedSlice,
    Subtraction,
}

impl LayerKind {
    /// Every defined kind, in declaration order. Declaration order doubles as
    /// the raw wire tag accepted by [`LayerKind::from_raw`].
    pub const ALL: [LayerKind; 40] = [
        LayerKind::Activation,
        LayerKind::Addition,
        LayerKind::BatchNormalization,
        LayerKind::BatchToSpaceNd,
        LayerKind::Constant,
        LayerKind::ConvertFp16ToFp32,
        LayerKind::ConvertFp32ToFp16,
        LayerKind::Convolution2d,
        LayerKind::Debug,
        LayerKind::DepthwiseConvolution2d,
        LayerKind::Division,
        LayerKind::Equal,
        LayerKind::FakeQuantization,
        LayerKind::Floor,
        LayerKind::FullyConnected,
        LayerKind::Gather,
        LayerKind::Greater,
        LayerKind::Input,
        LayerKind::L2Normalization,
        LayerKind::Lstm,
        LayerKind::Maximum,
        LayerKind::Mean,
        LayerKind::MemCopy,
        LayerKind::Merger,
        LayerKind::Minimum,
        LayerKind::Multiplication,
        LayerKind::Normalization,
        LayerKind::Output,
        LayerKind::Pad,
        LayerKind::Permute,
        LayerKind::Pooling2d,
        LayerKind::PreCompiled,
        LayerKind::Reshape,
        LayerKind::Rsqrt,
        LayerKind::ResizeBilinear,
        LayerKind::Softmax,
        LayerKind::SpaceToBatchNd,
        LayerKind::Splitter,
        LayerKind::StridedSlice,
        LayerKind::Subtraction,
    ];

    /// Canonical human-readable name for this kind.
    ///
    /// The match has no default arm: adding a kind without a name is a
    /// compile-time error, which keeps the table exhaustive by construction.
    pub fn name(self) -> &'static str {
        match self {
            LayerKind::Activation => "Activation",
            LayerKind::Addition => "Addition",
            LayerKind::BatchNormalization => "BatchNormalization",
            LayerKind::BatchToSpaceNd => "BatchToSpaceNd",
            LayerKind::Constant => "Constant",
            LayerKind::ConvertFp16ToFp32 => "ConvertFp16ToFp32",
            LayerKind::ConvertFp32ToFp16 => "ConvertFp32ToFp16",
            LayerKind::Convolution2d => "Convolution2d",
            LayerKind::Debug => "Debug",
            LayerKind::DepthwiseConvolution2d => "DepthwiseConvolution2d",
            LayerKind::Division => "Division",
            LayerKind::Equal => "Equal",
            LayerKind::FakeQuantization => "FakeQuantization",
            LayerKind::Floor => "Floor",
            LayerKind::FullyConnected => "FullyConnected",
            LayerKind::Gather => "Gather",
            LayerKind::Greater => "Greater",
            LayerKind::Input => "Input",
            LayerKind::L2Normalization => "L2Normalization",
            LayerKind::Lstm => "Lstm",
            LayerKind::Maximum => "Maximum",
            LayerKind::Mean => "Mean",
            LayerKind::MemCopy => "MemCopy",
            LayerKind::Merger => "Merger",
            LayerKind::Minimum => "Minimum",
            LayerKind::Multiplication => "Multiplication",
            LayerKind::Normalization => "Normalization",
            LayerKind::Output => "Output",
            LayerKind::Pad => "Pad",
            LayerKind::Permute => "Permute",
            LayerKind::Pooling2d => "Pooling2d",
            LayerKind::PreCompiled => "PreCompiled",
            LayerKind::Reshape => "Reshape",
            LayerKind::Rsqrt => "Rsqrt",
            LayerKind::ResizeBilinear => "ResizeBilinear",
            LayerKind::Softmax => "Softmax",
            LayerKind::SpaceToBatchNd => "SpaceToBatchNd",
            LayerKind::Splitter => "Splitter",
            LayerKind::StridedSlice => "StridedSlice",
            LayerKind::Subtraction => "Subtraction",
        }
    }

    /// Raw wire tag for this kind.
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Decodes a raw wire tag.
    ///
    /// Tags outside the defined set yield [`UnknownLayerKind`] so callers in
    /// forward-compatible contexts (e.g. deserializing a newer graph dump) can
    /// recover instead of aborting.
    pub fn from_raw(raw: u32) -> Result<LayerKind, UnknownLayerKind> {
        Self::ALL
            .get(raw as usize)
            .copied()
            .ok_or(UnknownLayerKind { raw })
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A raw tag outside the defined [`LayerKind`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown layer kind tag {raw}")]
pub struct UnknownLayerKind {
    pub raw: u32,
}

//! tensor-gen: prepares an image file as a network input tensor.
//!
//! Decodes an image, optionally resizes it, applies the normalization
//! convention of the chosen model family and writes the tensor as
//! whitespace-separated text values.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use image::imageops::FilterType;
use log::info;

use weft::tensor::DataLayout;

/// Per-channel means subtracted by the Caffe convention, in BGR order.
const CAFFE_MEAN_BGR: [f32; 3] = [104.007, 116.669, 122.679];

#[derive(Parser, Debug)]
#[command(name = "tensor-gen")]
#[command(version, about = "Convert an image into a network input tensor", long_about = None)]
struct Args {
    /// Path of the image to convert
    #[arg(short = 'i', long = "infile", value_name = "FILE")]
    infile: PathBuf,

    /// Model family whose input convention to apply
    #[arg(short = 'f', long = "model-format")]
    model_format: ModelFormat,

    /// Path to write the tensor to; must not already exist
    #[arg(short = 'o', long = "outfile", value_name = "FILE")]
    outfile: PathBuf,

    /// Element type of the written tensor
    #[arg(short = 'z', long = "output-type", default_value = "float")]
    output_type: OutputType,

    /// Resize width; 0 keeps the image width
    #[arg(long = "new-width", default_value_t = 0)]
    new_width: u32,

    /// Resize height; 0 keeps the image height
    #[arg(long = "new-height", default_value_t = 0)]
    new_height: u32,

    /// Dimension ordering of the written tensor
    #[arg(short = 'l', long = "layout", default_value = "nhwc")]
    layout: LayoutArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModelFormat {
    Caffe,
    Tensorflow,
    Tflite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputType {
    Float,
    Int,
    Qasymm8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LayoutArg {
    Nhwc,
    Nchw,
}

impl From<LayoutArg> for DataLayout {
    fn from(layout: LayoutArg) -> Self {
        match layout {
            LayoutArg::Nhwc => DataLayout::Nhwc,
            LayoutArg::Nchw => DataLayout::Nchw,
        }
    }
}

/// Prepared tensor buffer, one variant per output type.
enum TensorValues {
    F32(Vec<f32>),
    I32(Vec<i32>),
    U8(Vec<u8>),
}

fn main() {
    env_logger::init();
    if let Err(error) = run(Args::parse()) {
        eprintln!("tensor-gen: {error:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    validate_paths(&args)?;

    let decoded = image::open(&args.infile)
        .with_context(|| format!("failed to decode image {}", args.infile.display()))?;
    let mut rgb = decoded.to_rgb8();
    if args.new_width != 0 || args.new_height != 0 {
        let width = if args.new_width == 0 {
            rgb.width()
        } else {
            args.new_width
        };
        let height = if args.new_height == 0 {
            rgb.height()
        } else {
            args.new_height
        };
        rgb = image::imageops::resize(&rgb, width, height, FilterType::Triangle);
    }
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    info!(
        "preparing {}x{} tensor for {:?} / {:?}",
        width, height, args.model_format, args.output_type
    );

    let values = prepare_tensor(rgb.as_raw(), args.model_format, args.output_type);
    let values = reorder(values, height, width, args.layout.into());

    let file = File::create(&args.outfile)
        .with_context(|| format!("failed to create {}", args.outfile.display()))?;
    write_values(BufWriter::new(file), &values)
        .with_context(|| format!("failed to write {}", args.outfile.display()))?;
    Ok(())
}

fn validate_paths(args: &Args) -> anyhow::Result<()> {
    if !args.infile.is_file() {
        bail!("input file {} does not exist", args.infile.display());
    }
    if args.outfile.exists() {
        bail!(
            "output file {} already exists, refusing to overwrite",
            args.outfile.display()
        );
    }
    if let Some(parent) = args.outfile.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            bail!("output directory {} does not exist", parent.display());
        }
    }
    Ok(())
}

/// Applies the model family's normalization to interleaved RGB bytes,
/// producing channel-interleaved (HWC) values.
fn prepare_tensor(rgb: &[u8], format: ModelFormat, output_type: OutputType) -> TensorValues {
    match output_type {
        OutputType::Float => {
            let mut values = Vec::with_capacity(rgb.len());
            for pixel in rgb.chunks_exact(3) {
                let (r, g, b) = (pixel[0] as f32, pixel[1] as f32, pixel[2] as f32);
                match format {
                    // Caffe models consume BGR with per-channel mean removed.
                    ModelFormat::Caffe => {
                        values.push(b - CAFFE_MEAN_BGR[0]);
                        values.push(g - CAFFE_MEAN_BGR[1]);
                        values.push(r - CAFFE_MEAN_BGR[2]);
                    }
                    // TensorFlow-family models consume RGB scaled to [-1, 1].
                    ModelFormat::Tensorflow | ModelFormat::Tflite => {
                        values.push(r / 127.5 - 1.0);
                        values.push(g / 127.5 - 1.0);
                        values.push(b / 127.5 - 1.0);
                    }
                }
            }
            TensorValues::F32(values)
        }
        OutputType::Int => TensorValues::I32(rgb.iter().map(|&v| v as i32).collect()),
        OutputType::Qasymm8 => TensorValues::U8(rgb.to_vec()),
    }
}

/// Reorders HWC values into the requested layout. NHWC is the storage order
/// already; NCHW gathers one plane per channel.
fn reorder(values: TensorValues, height: usize, width: usize, layout: DataLayout) -> TensorValues {
    fn to_planes<T: Copy>(values: &[T], height: usize, width: usize) -> Vec<T> {
        let mut planes = Vec::with_capacity(values.len());
        for c in 0..3 {
            for position in 0..height * width {
                planes.push(values[position * 3 + c]);
            }
        }
        planes
    }

    match layout {
        DataLayout::Nhwc => values,
        DataLayout::Nchw => match values {
            TensorValues::F32(v) => TensorValues::F32(to_planes(&v, height, width)),
            TensorValues::I32(v) => TensorValues::I32(to_planes(&v, height, width)),
            TensorValues::U8(v) => TensorValues::U8(to_planes(&v, height, width)),
        },
    }
}

fn write_values<W: Write>(mut writer: W, values: &TensorValues) -> std::io::Result<()> {
    fn write_all<W: Write, T: std::fmt::Display>(
        writer: &mut W,
        values: &[T],
    ) -> std::io::Result<()> {
        for value in values {
            write!(writer, "{value} ")?;
        }
        writer.flush()
    }
    match values {
        TensorValues::F32(v) => write_all(&mut writer, v),
        TensorValues::I32(v) => write_all(&mut writer, v),
        TensorValues::U8(v) => write_all(&mut writer, v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One red, one green, one blue pixel.
    const RGB: [u8; 9] = [255, 0, 0, 0, 255, 0, 0, 0, 255];

    #[test]
    fn caffe_float_swaps_to_bgr_and_subtracts_means() {
        let TensorValues::F32(values) = prepare_tensor(&RGB, ModelFormat::Caffe, OutputType::Float)
        else {
            panic!("expected float values");
        };
        // Red pixel: B=0, G=0, R=255.
        assert!((values[0] - (0.0 - 104.007)).abs() < 1e-4);
        assert!((values[1] - (0.0 - 116.669)).abs() < 1e-4);
        assert!((values[2] - (255.0 - 122.679)).abs() < 1e-4);
    }

    #[test]
    fn tflite_float_scales_to_unit_range() {
        let TensorValues::F32(values) =
            prepare_tensor(&RGB, ModelFormat::Tflite, OutputType::Float)
        else {
            panic!("expected float values");
        };
        assert!((values[0] - 1.0).abs() < 1e-6);
        assert!((values[1] + 1.0).abs() < 1e-6);
        assert!((values[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn qasymm8_keeps_raw_bytes() {
        let TensorValues::U8(values) =
            prepare_tensor(&RGB, ModelFormat::Caffe, OutputType::Qasymm8)
        else {
            panic!("expected u8 values");
        };
        assert_eq!(values, RGB.to_vec());
    }

    #[test]
    fn nchw_reorder_gathers_channel_planes() {
        let values = TensorValues::U8(RGB.to_vec());
        let TensorValues::U8(planes) = reorder(values, 1, 3, DataLayout::Nchw) else {
            panic!("expected u8 values");
        };
        // R plane, G plane, B plane over the three pixels.
        assert_eq!(planes, vec![255, 0, 0, 0, 255, 0, 0, 0, 255]);
    }

    #[test]
    fn values_are_written_whitespace_separated() {
        let mut out = Vec::new();
        write_values(&mut out, &TensorValues::I32(vec![1, -2, 3])).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1 -2 3 ");
    }
}

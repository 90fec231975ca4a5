//! NIfTI I/O for imaging time series
//!
//! Loads 3D/4D NIfTI files from byte arrays into a [`Dataset`] (x, y, z
//! spatial, 4th axis as time) and writes spatial maps or whole series back,
//! suitable for use in WebAssembly where filesystem access is not available.
//!
//! NIfTI stores voxels in Fortran order (x varies fastest); `Dataset` is
//! row-major with time innermost. Conversion happens here and nowhere else.

use std::io::{Cursor, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array, Axis, IxDyn};
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::dataset::{checked_len, Dataset};
use crate::error::{LocalNmfError, LocalNmfResult};

/// Time series loaded from a NIfTI file
pub struct NiftiSeries {
    /// Samples, spatial (nx, ny, nz) + time
    pub dataset: Dataset,
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Affine transformation matrix (4x4, row-major)
    pub affine: [f64; 16],
}

fn nifti_err(msg: String) -> LocalNmfError {
    LocalNmfError::Nifti(msg)
}

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Load a 3D or 4D NIfTI file from bytes
///
/// Supports both .nii and .nii.gz files (gzip is auto-detected). A 3D volume
/// becomes a series with a single time point.
pub fn load_nifti_series(bytes: &[u8]) -> LocalNmfResult<NiftiSeries> {
    let obj: InMemNiftiObject = if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes)))
            .map_err(|e| nifti_err(format!("Failed to read gzipped NIfTI: {}", e)))?
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes))
            .map_err(|e| nifti_err(format!("Failed to read NIfTI: {}", e)))?
    };

    let header = obj.header();
    let pixdim = header.pixdim;
    let voxel_size = (pixdim[1] as f64, pixdim[2] as f64, pixdim[3] as f64);
    let affine = get_affine(header);

    let array: Array<f64, IxDyn> = obj.into_volume().into_ndarray()
        .map_err(|e| nifti_err(format!("Failed to convert to ndarray: {}", e)))?;

    let array = match array.ndim() {
        3 => array.insert_axis(Axis(3)),
        4 => array,
        n => return Err(nifti_err(format!("Expected a 3D or 4D volume, got {}D", n))),
    };

    let dataset = Dataset::from_array(array)?;
    Ok(NiftiSeries { dataset, voxel_size, affine })
}

/// Get affine transformation matrix from header
fn get_affine(header: &NiftiHeader) -> [f64; 16] {
    // Prefer sform if available (sform_code > 0)
    if header.sform_code > 0 {
        let s = &header.srow_x;
        let t = &header.srow_y;
        let u = &header.srow_z;
        [
            s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64,
            t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64,
            u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ]
    } else {
        // Fall back to identity with voxel scaling
        let vsx = header.pixdim[1] as f64;
        let vsy = header.pixdim[2] as f64;
        let vsz = header.pixdim[3] as f64;
        [
            vsx, 0.0, 0.0, 0.0,
            0.0, vsy, 0.0, 0.0,
            0.0, 0.0, vsz, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }
}

/// Spatial dims padded to (nx, ny, nz)
fn pad_dims3(dims: &[usize]) -> LocalNmfResult<[usize; 3]> {
    if dims.is_empty() || dims.len() > 3 {
        return Err(nifti_err(format!("Expected 1 to 3 spatial dimensions, got {}", dims.len())));
    }
    let mut out = [1usize; 3];
    out[..dims.len()].copy_from_slice(dims);
    Ok(out)
}

/// Encode header + float32 samples. `data` is row-major `[nx, ny, nz, nt]`.
fn encode_nifti(
    data: &[f64],
    dims: [usize; 3],
    nt: usize,
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> LocalNmfResult<Vec<u8>> {
    let [nx, ny, nz] = dims;
    let (vsx, vsy, vsz) = voxel_size;

    if dims.iter().chain(std::iter::once(&nt)).any(|&n| n > i16::MAX as usize) {
        return Err(nifti_err(format!("Dimensions {:?} x {} exceed NIfTI-1 limits", dims, nt)));
    }
    let expected = checked_len(&dims, nt)?;
    if data.len() != expected {
        return Err(LocalNmfError::DataLength { expected, actual: data.len() });
    }

    // Create NIfTI-1 header (348 bytes)
    let mut header = [0u8; 348];

    // sizeof_hdr = 348
    header[0..4].copy_from_slice(&348i32.to_le_bytes());

    // dim[0..7]
    let ndim: i16 = if nt > 1 { 4 } else { 3 };
    let dim: [i16; 8] = [ndim, nx as i16, ny as i16, nz as i16, nt as i16, 1, 1, 1];
    for (i, &d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }

    // datatype = 16 (FLOAT32)
    header[70..72].copy_from_slice(&16i16.to_le_bytes());

    // bitpix = 32
    header[72..74].copy_from_slice(&32i16.to_le_bytes());

    // pixdim[0..7]
    let pixdim: [f32; 8] = [1.0, vsx as f32, vsy as f32, vsz as f32, 1.0, 1.0, 1.0, 1.0];
    for (i, &p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }

    // vox_offset = 352 (header + 4 bytes extension)
    header[108..112].copy_from_slice(&352.0f32.to_le_bytes());

    // scl_slope = 1.0
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());

    // sform_code = 1 (scanner anat)
    header[254..256].copy_from_slice(&1i16.to_le_bytes());

    // srow_x, srow_y, srow_z
    for row in 0..3 {
        for i in 0..4 {
            let offset = 280 + row * 16 + i * 4;
            header[offset..offset + 4].copy_from_slice(&(affine[row * 4 + i] as f32).to_le_bytes());
        }
    }

    // magic = "n+1\0" for NIfTI-1 single file
    header[344..348].copy_from_slice(b"n+1\0");

    let mut buffer = Vec::with_capacity(352 + data.len() * 4);
    buffer.write_all(&header).map_err(|e| nifti_err(format!("Write header failed: {}", e)))?;
    buffer.write_all(&[0u8; 4]).map_err(|e| nifti_err(format!("Write extension failed: {}", e)))?;

    // Fortran order: x fastest, time slowest
    for t in 0..nt {
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let val = data[((i * ny + j) * nz + k) * nt + t];
                    buffer.extend_from_slice(&(val as f32).to_le_bytes());
                }
            }
        }
    }

    Ok(buffer)
}

fn gzip(bytes: &[u8]) -> LocalNmfResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)
        .map_err(|e| nifti_err(format!("Gzip compression failed: {}", e)))?;
    encoder.finish()
        .map_err(|e| nifti_err(format!("Gzip finish failed: {}", e)))
}

/// Save a spatial map (row-major, 1 to 3 axes) as NIfTI bytes
///
/// Writes an uncompressed .nii file
pub fn save_nifti(
    volume: &[f64],
    dims: &[usize],
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> LocalNmfResult<Vec<u8>> {
    encode_nifti(volume, pad_dims3(dims)?, 1, voxel_size, affine)
}

/// Save a spatial map as gzipped NIfTI bytes (.nii.gz)
pub fn save_nifti_gz(
    volume: &[f64],
    dims: &[usize],
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> LocalNmfResult<Vec<u8>> {
    gzip(&save_nifti(volume, dims, voxel_size, affine)?)
}

/// Save a whole time series (e.g. a residual) as NIfTI bytes
pub fn save_nifti_series(
    dataset: &Dataset,
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> LocalNmfResult<Vec<u8>> {
    encode_nifti(dataset.as_slice(), pad_dims3(dataset.spatial_dims())?, dataset.nt(), voxel_size, affine)
}

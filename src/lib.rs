//! LocalNMF-WASM: block-local matrix factorization of imaging time series
//!
//! Decomposes a spatiotemporal dataset (D spatial axes + time) into a few
//! additive rank-1 components, each confined to a box around a known seed:
//! a spatial shape on the box times a temporal activity trace. Components are
//! refit one at a time against a shared residual.
//!
//! # Modules
//! - `dataset`: flat spatiotemporal arrays
//! - `region`: seed boxes, region cut and region add
//! - `kernels`: Gaussian initial shapes
//! - `solvers`: alternating rank-1 least squares
//! - `decomposition`: component initialization and the outer solver
//! - `utils`: SIMD vector kernels
//! - `nifti_io`: NIfTI series I/O

// Core modules
pub mod dataset;
pub mod error;
pub mod region;

// Algorithm modules
pub mod kernels;
pub mod solvers;
pub mod decomposition;
pub mod utils;

// I/O modules
pub mod nifti_io;

pub use dataset::Dataset;
pub use decomposition::{local_nmf, local_nmf_with_progress, LocalNmfOutput, LocalNmfParams, SolverStatus};
pub use error::{LocalNmfError, LocalNmfResult};
pub use region::BoundingBox;

use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);
}

#[allow(unused_macros)]
macro_rules! console_log {
    ($($t:tt)*) => (log(&format_args!($($t)*).to_string()))
}

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn to_js(e: LocalNmfError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Solver inputs unpacked from flat JS arrays
struct FlatInputs {
    dataset: Dataset,
    seeds: Vec<Vec<usize>>,
    activities: Vec<Vec<f64>>,
}

/// Unpack flat arrays: `seeds` is L x D, `activities` is L x nt, both row-major
fn unpack_inputs(
    data: &[f64],
    dims: &[u32],
    nt: usize,
    seeds: &[u32],
    activities: &[f64],
) -> LocalNmfResult<FlatInputs> {
    let dims: Vec<usize> = dims.iter().map(|&d| d as usize).collect();
    let dataset = Dataset::new(data.to_vec(), &dims, nt)?;
    let rank = dims.len();

    let n_components = seeds.len() / rank;
    if seeds.len() != n_components * rank {
        return Err(LocalNmfError::DataLength { expected: n_components * rank, actual: seeds.len() });
    }
    let expected = n_components.checked_mul(nt)
        .ok_or_else(|| LocalNmfError::ShapeOverflow { dims: vec![n_components], nt })?;
    if activities.len() != expected {
        return Err(LocalNmfError::DataLength { expected, actual: activities.len() });
    }

    let seeds = seeds.chunks_exact(rank)
        .map(|c| c.iter().map(|&x| x as usize).collect())
        .collect();
    let activities = activities.chunks_exact(nt).map(|c| c.to_vec()).collect();

    Ok(FlatInputs { dataset, seeds, activities })
}

/// Pack a solver result into a JS object
fn pack_output(out: &LocalNmfOutput) -> Result<js_sys::Object, JsValue> {
    let result = js_sys::Object::new();

    let mse = js_sys::Float64Array::from(out.mse_history.as_slice());
    js_sys::Reflect::set(&result, &"mse".into(), &mse)?;

    let shapes = js_sys::Array::new();
    for s in &out.shapes {
        shapes.push(&js_sys::Float64Array::from(s.to_vec().as_slice()));
    }
    js_sys::Reflect::set(&result, &"shapes".into(), &shapes)?;

    let activities = js_sys::Array::new();
    for a in &out.activities {
        activities.push(&js_sys::Float64Array::from(a.to_vec().as_slice()));
    }
    js_sys::Reflect::set(&result, &"activities".into(), &activities)?;

    // Boxes flattened as L x D x [lo, hi)
    let boxes: Vec<u32> = out.boxes.iter()
        .flat_map(|b| b.ranges().iter().flat_map(|&[lo, hi]| [lo as u32, hi as u32]))
        .collect();
    js_sys::Reflect::set(&result, &"boxes".into(), &js_sys::Uint32Array::from(boxes.as_slice()))?;

    js_sys::Reflect::set(&result, &"iterations".into(), &JsValue::from(out.iterations as u32))?;
    js_sys::Reflect::set(&result, &"status".into(), &JsValue::from_str(out.status.as_str()))?;

    Ok(result)
}

// ============================================================================
// WASM Exports: Local NMF
// ============================================================================

/// Block-local NMF
///
/// # Arguments
/// * `data` - Samples, row-major over (spatial axes..., time)
/// * `dims` - Spatial dimensions
/// * `nt` - Number of time points
/// * `seeds` - Component centres, L x D row-major
/// * `activities` - Initial traces, L x nt row-major
/// * `sigma` - Gaussian scale per spatial axis
/// * `non_negative` - Enforce nonnegative shapes and activities
/// * `tol` - Relative MSE change for convergence
/// * `max_iter` - Maximum outer iterations
/// * `verbose` - Log MSE per iteration to the console
///
/// # Returns
/// Object with: mse, shapes, activities, boxes, iterations, status
#[wasm_bindgen]
pub fn local_nmf_wasm(
    data: &[f64],
    dims: &[u32],
    nt: usize,
    seeds: &[u32],
    activities: &[f64],
    sigma: &[f64],
    non_negative: bool,
    tol: f64,
    max_iter: usize,
    verbose: bool,
) -> Result<js_sys::Object, JsValue> {
    console_log!("WASM local NMF: dims={:?}, nt={}, components={}, max_iter={}",
                 dims, nt, seeds.len() / dims.len().max(1), max_iter);

    let inputs = unpack_inputs(data, dims, nt, seeds, activities).map_err(to_js)?;
    let params = LocalNmfParams { non_negative, tol, max_iter, verbose, ..Default::default() };

    let out = local_nmf(&inputs.dataset, &inputs.seeds, &inputs.activities, sigma, &params)
        .map_err(to_js)?;

    if verbose {
        for (k, mse) in out.mse_history.iter().enumerate() {
            console_log!("{}: MSE = {:.3}", k, mse);
        }
    }
    console_log!("WASM local NMF complete: {} after {} iterations", out.status.as_str(), out.iterations);
    pack_output(&out)
}

/// Local NMF with progress callback
#[wasm_bindgen]
pub fn local_nmf_wasm_with_progress(
    data: &[f64],
    dims: &[u32],
    nt: usize,
    seeds: &[u32],
    activities: &[f64],
    sigma: &[f64],
    non_negative: bool,
    tol: f64,
    max_iter: usize,
    progress_callback: &js_sys::Function,
) -> Result<js_sys::Object, JsValue> {
    console_log!("WASM local NMF with progress: dims={:?}, nt={}, max_iter={}",
                 dims, nt, max_iter);

    let inputs = unpack_inputs(data, dims, nt, seeds, activities).map_err(to_js)?;
    let params = LocalNmfParams { non_negative, tol, max_iter, ..Default::default() };

    let callback = progress_callback.clone();
    let out = local_nmf_with_progress(
        &inputs.dataset, &inputs.seeds, &inputs.activities, sigma, &params, None,
        |current, total| {
            let this = JsValue::null();
            let _ = callback.call2(&this,
                &JsValue::from(current as u32),
                &JsValue::from(total as u32));
        }
    ).map_err(to_js)?;

    console_log!("WASM local NMF complete: {} after {} iterations", out.status.as_str(), out.iterations);
    pack_output(&out)
}

// ============================================================================
// WASM Exports: Utilities
// ============================================================================

/// Check if WASM module is loaded and working
#[wasm_bindgen]
pub fn wasm_health_check() -> bool {
    console_log!("LocalNMF-WASM module loaded successfully!");
    true
}

/// Get version string
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Gaussian kernel on a full grid, for visualization/debugging
#[wasm_bindgen]
pub fn gaussian_kernel_wasm(dims: &[u32], center: &[f64], sigma: &[f64]) -> Result<Vec<f64>, JsValue> {
    let dims: Vec<usize> = dims.iter().map(|&d| d as usize).collect();
    dataset::checked_len(&dims, 1).map_err(to_js)?;
    if center.len() != dims.len() || sigma.len() != dims.len() {
        return Err(JsValue::from_str("center and sigma need one entry per dimension"));
    }
    Ok(kernels::gaussian::gaussian_kernel(&dims, center, sigma))
}

// ============================================================================
// WASM Exports: NIfTI I/O
// ============================================================================

/// Load a 3D/4D NIfTI file from bytes as a time series
///
/// Returns a JS object with: data (Float64Array, row-major x, y, z, t),
/// dims (array of 3), nt, voxelSize (array), affine (array)
#[wasm_bindgen]
pub fn load_nifti_series_wasm(bytes: &[u8]) -> Result<js_sys::Object, JsValue> {
    let series = nifti_io::load_nifti_series(bytes).map_err(to_js)?;
    let ds = &series.dataset;

    let result = js_sys::Object::new();

    let data = js_sys::Float64Array::from(ds.as_slice());
    js_sys::Reflect::set(&result, &"data".into(), &data)?;

    let dims = js_sys::Array::new();
    for &d in ds.spatial_dims() {
        dims.push(&JsValue::from(d as u32));
    }
    js_sys::Reflect::set(&result, &"dims".into(), &dims)?;
    js_sys::Reflect::set(&result, &"nt".into(), &JsValue::from(ds.nt() as u32))?;

    let voxel_size = js_sys::Array::new();
    voxel_size.push(&JsValue::from(series.voxel_size.0));
    voxel_size.push(&JsValue::from(series.voxel_size.1));
    voxel_size.push(&JsValue::from(series.voxel_size.2));
    js_sys::Reflect::set(&result, &"voxelSize".into(), &voxel_size)?;

    let affine = js_sys::Float64Array::from(series.affine.as_slice());
    js_sys::Reflect::set(&result, &"affine".into(), &affine)?;

    console_log!("WASM load_nifti_series: {:?} x {}", ds.spatial_dims(), ds.nt());

    Ok(result)
}

fn affine_from_slice(affine: &[f64]) -> Result<[f64; 16], JsValue> {
    if affine.len() != 16 {
        return Err(JsValue::from_str("Affine matrix must have 16 elements"));
    }
    let mut affine_arr = [0.0f64; 16];
    affine_arr.copy_from_slice(affine);
    Ok(affine_arr)
}

/// Save a spatial map (e.g. a component footprint) as NIfTI bytes
///
/// # Arguments
/// * `data` - Map values, row-major over `dims`
/// * `dims` - 1 to 3 spatial dimensions
/// * `vsx`, `vsy`, `vsz` - Voxel sizes in mm
/// * `affine` - 4x4 affine matrix (16 elements, row-major)
#[wasm_bindgen]
pub fn save_nifti_wasm(
    data: &[f64],
    dims: &[u32],
    vsx: f64, vsy: f64, vsz: f64,
    affine: &[f64],
) -> Result<Vec<u8>, JsValue> {
    let affine = affine_from_slice(affine)?;
    let dims: Vec<usize> = dims.iter().map(|&d| d as usize).collect();

    let bytes = nifti_io::save_nifti(data, &dims, (vsx, vsy, vsz), &affine).map_err(to_js)?;

    console_log!("WASM save_nifti: {:?}, {} bytes", dims, bytes.len());
    Ok(bytes)
}

/// Save a spatial map as gzipped NIfTI bytes (.nii.gz)
#[wasm_bindgen]
pub fn save_nifti_gz_wasm(
    data: &[f64],
    dims: &[u32],
    vsx: f64, vsy: f64, vsz: f64,
    affine: &[f64],
) -> Result<Vec<u8>, JsValue> {
    let affine = affine_from_slice(affine)?;
    let dims: Vec<usize> = dims.iter().map(|&d| d as usize).collect();

    let bytes = nifti_io::save_nifti_gz(data, &dims, (vsx, vsy, vsz), &affine).map_err(to_js)?;

    console_log!("WASM save_nifti_gz: {:?}, {} bytes (compressed)", dims, bytes.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_inputs() {
        let data = vec![0.0; 4 * 5 * 3];
        let inputs = unpack_inputs(&data, &[4, 5], 3, &[1, 2, 3, 4], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();

        assert_eq!(inputs.dataset.spatial_dims(), &[4, 5]);
        assert_eq!(inputs.seeds, vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(inputs.activities, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
    }

    #[test]
    fn test_unpack_inputs_rejects_ragged() {
        let data = vec![0.0; 4 * 5 * 3];
        assert!(matches!(
            unpack_inputs(&data, &[4, 5], 3, &[1, 2, 3], &[0.0; 6]),
            Err(LocalNmfError::DataLength { .. })
        ));
        assert!(matches!(
            unpack_inputs(&data, &[4, 5], 3, &[1, 2], &[0.0; 4]),
            Err(LocalNmfError::DataLength { expected: 3, actual: 4 })
        ));
        assert_eq!(
            unpack_inputs(&data, &[], 3, &[], &[]).err(),
            Some(LocalNmfError::EmptyDataset)
        );
        // Shape product overflows instead of wrapping to an empty buffer
        assert!(matches!(
            unpack_inputs(&[], &[1 << 22, 1 << 22, 1 << 22], 1, &[0, 0, 0], &[1.0]),
            Err(LocalNmfError::ShapeOverflow { .. })
        ));
    }
}

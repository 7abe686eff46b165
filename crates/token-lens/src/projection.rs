//! PCA of per-token embeddings down to three components, rescaled to RGB.

use candle_core::{DType, Device, Tensor};
use thiserror::Error;
use tracing::warn;

/// RGB color for one token.
pub type ColorTriple = [u8; 3];

/// Color used when no meaningful projection exists.
pub const FALLBACK_GRAY: ColorTriple = [128, 128, 128];

/// Number of principal components kept (one per color channel).
const COMPONENTS: usize = 3;

/// Power iteration stops once successive estimates move less than this.
const CONVERGENCE_TOLERANCE: f64 = 1e-12;
const MAX_ITERATIONS: usize = 500;

/// Variance at or below this fraction of the total is treated as an empty
/// direction.
const VARIANCE_EPSILON: f64 = 1e-12;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Vectors have mismatched lengths: {0} vs {1}")]
    Ragged(usize, usize),

    #[error("Non-finite value encountered during PCA")]
    NonFinite,

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

/// Map every vector to a color.
///
/// Empty input, empty vectors, and fewer than three vectors get the fallback
/// gray. A numerical failure inside PCA is logged and also falls back to gray.
pub fn project(vectors: &[Vec<f32>]) -> Vec<ColorTriple> {
    if vectors.is_empty() || vectors.iter().any(Vec::is_empty) || vectors.len() < COMPONENTS {
        return vec![FALLBACK_GRAY; vectors.len()];
    }

    match try_project(vectors) {
        Ok(colors) => colors,
        Err(e) => {
            warn!("Color projection failed, using fallback gray: {}", e);
            vec![FALLBACK_GRAY; vectors.len()]
        }
    }
}

/// PCA path of [`project`], with failures surfaced.
pub fn try_project(vectors: &[Vec<f32>]) -> Result<Vec<ColorTriple>, ProjectionError> {
    let projected = principal_components(vectors, COMPONENTS)?;
    Ok(rescale(&projected))
}

/// Project `vectors` onto their top `k` principal components.
///
/// Returns one row of `k` values per input vector. Directions with no
/// variance project to 0.
pub fn principal_components(vectors: &[Vec<f32>], k: usize) -> Result<Vec<Vec<f64>>, ProjectionError> {
    let n = vectors.len();
    let d = vectors.first().map_or(0, Vec::len);

    let mut flat = Vec::with_capacity(n * d);
    for vector in vectors {
        if vector.len() != d {
            return Err(ProjectionError::Ragged(d, vector.len()));
        }
        for &value in vector {
            if !value.is_finite() {
                return Err(ProjectionError::NonFinite);
            }
            flat.push(f64::from(value));
        }
    }

    let device = Device::Cpu;
    let x = Tensor::from_vec(flat, (n, d), &device)?;
    let centered = x.broadcast_sub(&x.mean_keepdim(0)?)?;

    // Solve on whichever of the d x d covariance and the n x n Gram matrix
    // is smaller; both share their nonzero eigenvalues
    let components = if n < d {
        gram_basis(&centered, k)?
    } else {
        covariance_basis(&centered, k)?
    };

    let basis = Tensor::cat(&components, 1)?;
    let projected = centered.matmul(&basis)?.to_vec2::<f64>()?;

    if projected.iter().flatten().any(|v| !v.is_finite()) {
        return Err(ProjectionError::NonFinite);
    }

    Ok(projected)
}

/// Top `k` feature-space directions from the covariance `CᵀC`.
fn covariance_basis(centered: &Tensor, k: usize) -> Result<Vec<Tensor>, ProjectionError> {
    let covariance = centered.t()?.contiguous()?.matmul(centered)?;
    top_eigenvectors(&covariance, k)?
        .into_iter()
        .map(orient)
        .collect()
}

/// Top `k` feature-space directions from the Gram matrix `CCᵀ`.
///
/// An eigenvector `u` of `CCᵀ` maps to the covariance eigenvector `Cᵀu`.
fn gram_basis(centered: &Tensor, k: usize) -> Result<Vec<Tensor>, ProjectionError> {
    let d = centered.dim(1)?;
    let transposed = centered.t()?.contiguous()?;
    let gram = centered.matmul(&transposed)?;

    top_eigenvectors(&gram, k)?
        .into_iter()
        .map(|u| -> Result<Tensor, ProjectionError> {
            match unit(&transposed.matmul(&u)?)? {
                Some(v) => orient(v),
                None => Ok(Tensor::zeros((d, 1), DType::F64, centered.device())?),
            }
        })
        .collect()
}

/// Unit eigenvectors for the `k` largest eigenvalues of a symmetric PSD
/// matrix, found by power iteration with deflation. Directions past the
/// matrix rank come back as zero columns.
fn top_eigenvectors(matrix: &Tensor, k: usize) -> Result<Vec<Tensor>, ProjectionError> {
    let trace = diagonal(matrix)?.iter().sum::<f64>();
    if !trace.is_finite() {
        return Err(ProjectionError::NonFinite);
    }
    let floor = VARIANCE_EPSILON * trace.max(1.0);

    let mut residual = matrix.clone();
    let mut vectors = Vec::with_capacity(k);
    for _ in 0..k {
        let vector = dominant_eigenvector(&residual, floor)?;
        let eigenvalue = vector
            .t()?
            .matmul(&residual)?
            .matmul(&vector)?
            .sum_all()?
            .to_scalar::<f64>()?;
        let outer = (vector.matmul(&vector.t()?)? * eigenvalue)?;
        residual = residual.sub(&outer)?;

        // Rounding noise left after deflation is not a direction
        if eigenvalue <= floor {
            vectors.push(vector.zeros_like()?);
        } else {
            vectors.push(vector);
        }
    }

    Ok(vectors)
}

fn diagonal(matrix: &Tensor) -> Result<Vec<f64>, ProjectionError> {
    Ok(matrix
        .to_vec2::<f64>()?
        .iter()
        .enumerate()
        .map(|(i, row)| row[i])
        .collect())
}

/// Unit eigenvector for the largest eigenvalue of a symmetric PSD matrix, as
/// a `(m, 1)` column. A zero column once no diagonal entry exceeds `floor`.
fn dominant_eigenvector(matrix: &Tensor, floor: f64) -> Result<Tensor, ProjectionError> {
    let m = matrix.dim(0)?;
    let device = matrix.device();

    // Start from the column with the most variance so the start is never
    // orthogonal to everything
    let (start_index, start_variance) = diagonal(matrix)?
        .into_iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });
    if !start_variance.is_finite() {
        return Err(ProjectionError::NonFinite);
    }
    if start_variance <= floor {
        return Ok(Tensor::zeros((m, 1), DType::F64, device)?);
    }

    let Some(mut vector) = unit(&matrix.narrow(1, start_index, 1)?.contiguous()?)? else {
        return Ok(Tensor::zeros((m, 1), DType::F64, device)?);
    };

    for _ in 0..MAX_ITERATIONS {
        let Some(next) = unit(&matrix.matmul(&vector)?)? else {
            return Ok(Tensor::zeros((m, 1), DType::F64, device)?);
        };
        let delta = next.sub(&vector)?.sqr()?.sum_all()?.to_scalar::<f64>()?;
        vector = next;
        if delta < CONVERGENCE_TOLERANCE {
            break;
        }
    }

    Ok(vector)
}

/// Normalize a column to unit length; `None` if it has (near) zero length.
fn unit(column: &Tensor) -> Result<Option<Tensor>, ProjectionError> {
    let norm = column.sqr()?.sum_all()?.sqrt()?.to_scalar::<f64>()?;
    if !norm.is_finite() {
        return Err(ProjectionError::NonFinite);
    }
    if norm <= VARIANCE_EPSILON {
        return Ok(None);
    }
    Ok(Some((column / norm)?))
}

/// Flip the sign so the largest-magnitude loading is positive.
fn orient(component: Tensor) -> Result<Tensor, ProjectionError> {
    let loadings = component.flatten_all()?.to_vec1::<f64>()?;
    let dominant = loadings
        .iter()
        .copied()
        .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });

    if dominant < 0.0 {
        Ok(component.neg()?)
    } else {
        Ok(component)
    }
}

/// Rescale against one global min/max shared by all channels and tokens.
fn rescale(projected: &[Vec<f64>]) -> Vec<ColorTriple> {
    let (min, max) = projected
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;

    let scale = |value: f64| -> u8 {
        if range <= 0.0 {
            return 0;
        }
        ((value - min) / range * 255.0).round().clamp(0.0, 255.0) as u8
    };

    projected
        .iter()
        .map(|row| {
            let mut color = [0u8; 3];
            for (channel, value) in color.iter_mut().zip(row) {
                *channel = scale(*value);
            }
            color
        })
        .collect()
}

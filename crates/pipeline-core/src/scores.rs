//! Score post-processing shared by the router and the experts

use prismatic_common::{PipelineError, Result};

/// How far from 1.0 a sum may be and still be read as softmax output
const DISTRIBUTION_TOLERANCE: f32 = 1e-2;

/// Index and value of the largest score.
///
/// Ties resolve to the lowest index. NaN entries are never selected.
#[must_use]
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((i, value)),
        }
    }
    best
}

/// Whether `scores` already reads as softmax output: every value in [0, 1]
/// and a sum within tolerance of 1.
#[must_use]
pub fn is_distribution(scores: &[f32]) -> bool {
    let sum: f32 = scores.iter().sum();
    in_unit_range(scores) && (sum - 1.0).abs() <= DISTRIBUTION_TOLERANCE
}

fn in_unit_range(scores: &[f32]) -> bool {
    scores.iter().all(|v| (0.0..=1.0).contains(v))
}

/// Turn raw model output into a probability distribution.
///
/// Output already in [0, 1] (softmax or independent sigmoid heads) is
/// renormalized by its sum; anything else is treated as logits and passed
/// through a stable softmax.
///
/// # Errors
/// Returns [`PipelineError::InferenceRuntime`] for empty or non-finite output
pub fn to_distribution(mut scores: Vec<f32>) -> Result<Vec<f32>> {
    if scores.is_empty() {
        return Err(PipelineError::InferenceRuntime(
            "model produced no scores".to_string(),
        ));
    }
    if let Some(bad) = scores.iter().position(|v| !v.is_finite()) {
        return Err(PipelineError::InferenceRuntime(format!(
            "model produced non-finite score {} at index {}",
            scores[bad], bad
        )));
    }

    let sum: f32 = scores.iter().sum();
    if in_unit_range(&scores) && sum > 0.0 {
        for v in &mut scores {
            *v /= sum;
        }
        return Ok(scores);
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut total = 0.0;
    for v in &mut scores {
        *v = (*v - max).exp();
        total += *v;
    }
    for v in &mut scores {
        *v /= total;
    }
    Ok(scores)
}

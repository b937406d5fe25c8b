use thiserror::Error;

/// Token sequences of different length cannot be compared positionally
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("token count mismatch: expected {expected}, got {actual}")]
pub struct LengthMismatch {
    pub expected: usize,
    pub actual: usize,
}

fn check_len(reference: &[String], candidate: &[String]) -> Result<(), LengthMismatch> {
    if reference.len() != candidate.len() {
        return Err(LengthMismatch {
            expected: reference.len(),
            actual: candidate.len(),
        });
    }
    Ok(())
}

/// Sorted positions where `candidate` differs from `reference`
pub fn diff(reference: &[String], candidate: &[String]) -> Result<Vec<usize>, LengthMismatch> {
    check_len(reference, candidate)?;
    Ok(reference
        .iter()
        .zip(candidate)
        .enumerate()
        .filter(|(_, (r, c))| r != c)
        .map(|(i, _)| i)
        .collect())
}

/// Positions that differ and are not tolerated by `ignore_diffs`
///
/// Every position is checked so callers can report all deviations at once.
pub fn unmasked_diffs(
    reference: &[String],
    ignore_diffs: &[usize],
    candidate: &[String],
) -> Result<Vec<usize>, LengthMismatch> {
    let mut deviations = diff(reference, candidate)?;
    deviations.retain(|i| !ignore_diffs.contains(i));
    Ok(deviations)
}

/// Whether `candidate` equals `reference` outside the tolerated positions
pub fn equal(reference: &[String], ignore_diffs: &[usize], candidate: &[String]) -> bool {
    matches!(unmasked_diffs(reference, ignore_diffs, candidate), Ok(d) if d.is_empty())
}

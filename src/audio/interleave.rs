//! Planar to interleaved sample conversion.

/// Writes `left` and `right` into `dest` as `L, R, L, R, ...`.
///
/// Works on caller-provided buffers and never allocates. If the lengths
/// disagree, only the first `min(left.len(), right.len(), dest.len() / 2)`
/// frames are written and the rest of `dest` is left untouched. Returns the
/// number of frames written.
pub fn interleave(left: &[f32], right: &[f32], dest: &mut [f32]) -> usize {
    let frames = left.len().min(right.len()).min(dest.len() / 2);
    for ((frame, &l), &r) in dest
        .chunks_exact_mut(2)
        .zip(left.iter())
        .zip(right.iter())
        .take(frames)
    {
        frame[0] = l;
        frame[1] = r;
    }
    frames
}

/// Cosine similarity between two equal-length embedding vectors, in [-1, 1].
///
/// The result is NaN when either vector has zero magnitude. Callers treat an
/// empty embedding as a provider failure before ever reaching this function,
/// so the NaN case does not occur on the scoring path.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|y| y * y).sum::<f32>().sqrt();
    dot / (mag_a * mag_b)
}

/// User-facing integer closeness percentage.
///
/// Negative similarity is meaningful (semantic opposition) and is preserved,
/// not floored to zero.
pub fn closeness(similarity: f32) -> i32 {
    (similarity * 100.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let a = [0.3_f32, -1.2, 4.5, 0.01];
        let sim = cosine_similarity(&a, &a);
        assert!((sim - 1.0).abs() < 1e-6);
        assert_eq!(closeness(sim), 100);
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        let a = [1.0_f32, 2.0, -3.0];
        let b = [-1.0_f32, -2.0, 3.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 1e-6);
        assert_eq!(closeness(sim), -100);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert_eq!(sim, 0.0);
        assert_eq!(closeness(sim), 0);
    }

    #[test]
    fn aligned_unit_vectors_score_one() {
        let sim = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]);
        assert_eq!(sim, 1.0);
        assert_eq!(closeness(sim), 100);
    }

    #[test]
    fn similarity_is_scale_invariant_and_bounded() {
        let a = [0.5_f32, 2.0, -1.5, 0.25];
        let b = [2.0_f32, 8.0, -6.0, 1.0]; // 4 * a
        let sim = cosine_similarity(&a, &b);
        assert!((sim - 1.0).abs() < 1e-6);

        let c = [-3.0_f32, 0.7, 0.0, 10.0];
        let sim = cosine_similarity(&a, &c);
        assert!((-1.0..=1.0).contains(&sim));
    }

    #[test]
    fn closeness_rounds_to_nearest_and_keeps_sign() {
        assert_eq!(closeness(0.404), 40);
        assert_eq!(closeness(0.996), 100);
        assert_eq!(closeness(-0.426), -43);
        assert_eq!(closeness(0.0), 0);
    }

    #[test]
    fn zero_magnitude_is_undefined() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).is_nan());
    }
}

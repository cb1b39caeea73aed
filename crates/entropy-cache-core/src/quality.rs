//! Quick byte-level quality estimates for sanity-checking cache output.

/// Byte histogram of `data`.
fn histogram(data: &[u8]) -> [u64; 256] {
    let mut counts = [0u64; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    counts
}

/// Shannon entropy in bits per byte (max 8.0).
pub fn quick_shannon(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let n = data.len() as f64;
    let mut h = 0.0;
    for &c in &histogram(data) {
        if c > 0 {
            let p = c as f64 / n;
            h -= p * p.log2();
        }
    }
    h
}

/// Most-common-value min-entropy in bits per byte (max 8.0).
/// More conservative than Shannon.
pub fn quick_min_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let max = histogram(data).into_iter().max().unwrap_or(0);
    -(max as f64 / data.len() as f64).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(quick_shannon(&[]), 0.0);
        assert_eq!(quick_min_entropy(&[]), 0.0);
    }

    #[test]
    fn test_constant_is_zero() {
        let data = [0x42u8; 1000];
        assert!(quick_shannon(&data).abs() < 1e-9);
        assert!(quick_min_entropy(&data).abs() < 1e-9);
    }

    #[test]
    fn test_uniform_is_eight() {
        let data: Vec<u8> = (0..=255u8).cycle().take(256 * 16).collect();
        assert!((quick_shannon(&data) - 8.0).abs() < 1e-9);
        assert!((quick_min_entropy(&data) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_min_entropy_below_shannon() {
        let mut data: Vec<u8> = (0..=255u8).collect();
        data.extend_from_slice(&[0u8; 64]);
        assert!(quick_min_entropy(&data) < quick_shannon(&data));
    }
}

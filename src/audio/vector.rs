/// Divide by the Euclidean norm. A zero vector comes back unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cyclic rotation that moves element 0 to index `k`, so a profile rooted at
/// C ends up rooted at pitch class `k`.
pub fn rotate(v: &[f32], k: usize) -> Vec<f32> {
    let mut out = v.to_vec();
    if !out.is_empty() {
        let k = k % out.len();
        out.rotate_right(k);
    }
    out
}

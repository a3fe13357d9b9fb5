use crate::my_types::*;

/// Euclidean distance between two pixels.
pub fn distance_between_points(p0: &Pixel, p1: &Pixel) -> f64 {
    let dx = (p0.x - p1.x).abs() as f64;
    let dy = (p0.y - p1.y).abs() as f64;
    (dx.powi(2) + dy.powi(2)).sqrt()
}

/// Twice the signed area of the triangle (a, b, c).
pub fn cross(a: &Vector2d, b: &Vector2d, c: &Vector2d) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// True when any three of the four corners are (nearly) collinear, which
/// includes coincident corners.
pub fn is_degenerate_quad(quad: &[Vector2d; 4], eps: f64) -> bool {
    for i in 0..4 {
        let a = &quad[i];
        let b = &quad[(i + 1) % 4];
        let c = &quad[(i + 2) % 4];
        if cross(a, b, c).abs() <= eps {
            return true;
        }
    }
    false
}

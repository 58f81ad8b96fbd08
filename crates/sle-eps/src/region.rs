//! The complex-plane region a CISS solve searches.

use num_complex::Complex64;

/// Ellipse centered at `center` with horizontal radius `radius` and
/// vertical scale `vscale` (`vscale=1` gives a disk).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub center: Complex64,
    pub radius: f64,
    pub vscale: f64,
}

impl Region {
    pub fn new(center: Complex64, radius: f64, vscale: f64) -> Self {
        Self { center, radius, vscale }
    }

    pub fn disk(center: Complex64, radius: f64) -> Self {
        Self::new(center, radius, 1.0)
    }

    /// `(Re d)^2 + (Im d / vscale)^2 <= 1`, `d = (lambda - center) / radius`.
    pub fn contains(&self, lambda: Complex64) -> bool {
        let d = (lambda - self.center) / self.radius;
        let im_scaled = d.im / self.vscale;
        d.re * d.re + im_scaled * im_scaled <= 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_contains_center_and_rejects_far_points() {
        let r = Region::disk(Complex64::new(2.0, 0.0), 0.5);
        assert!(r.contains(Complex64::new(2.0, 0.0)));
        assert!(r.contains(Complex64::new(2.3, 0.0)));
        assert!(!r.contains(Complex64::new(3.0, 0.0)));
    }

    #[test]
    fn ellipse_respects_vertical_scale() {
        let r = Region::new(Complex64::new(0.0, 0.0), 1.0, 2.0);
        assert!(r.contains(Complex64::new(0.0, 1.8)));
        assert!(!r.contains(Complex64::new(0.0, 2.2)));
    }
}

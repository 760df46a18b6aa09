use wremnants_core::FourVector;

/// Transverse mass of the W-like system: the non-triggering lepton is added to the missing
/// transverse momentum, which is then paired with the triggering lepton.
pub fn mt_wlike(
    trig_pt: f64,
    trig_phi: f64,
    nontrig_pt: f64,
    nontrig_phi: f64,
    met_pt: f64,
    met_phi: f64,
) -> f64 {
    let met_x = met_pt * met_phi.cos() + nontrig_pt * nontrig_phi.cos();
    let met_y = met_pt * met_phi.sin() + nontrig_pt * nontrig_phi.sin();
    let met = met_x.hypot(met_y);
    let dphi = trig_phi - met_y.atan2(met_x);
    (2.0 * trig_pt * met * (1.0 - dphi.cos())).max(0.0).sqrt()
}

/// A massless transverse vector with the given magnitude and azimuth.
pub fn transverse(pt: f64, phi: f64) -> FourVector {
    FourVector::new(pt, 0.0, phi, 0.0)
}

/// Magnitude and azimuth of the transverse vector `(x, y)`.
pub fn polar(x: f64, y: f64) -> (f64, f64) {
    (x.hypot(y), y.atan2(x))
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_mt_wlike_back_to_back() {
        // no MET: the non-triggering lepton alone recoils against the triggering one
        let mt = mt_wlike(40.0, 0.0, 40.0, PI, 0.0, 0.0);
        assert_relative_eq!(mt, 80.0, epsilon = 1e-9);
        let mt = mt_wlike(40.0, 0.0, 30.0, PI, 10.0, PI);
        assert_relative_eq!(mt, 80.0, epsilon = 1e-9);
    }

    #[test]
    fn test_mt_wlike_collinear() {
        assert_relative_eq!(mt_wlike(40.0, 1.0, 40.0, 1.0, 0.0, 0.0), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_polar() {
        let (pt, phi) = polar(0.0, 2.0);
        assert_relative_eq!(pt, 2.0);
        assert_relative_eq!(phi, PI / 2.0);
        let v = transverse(pt, phi);
        assert_relative_eq!(v.px(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(v.py(), 2.0, epsilon = 1e-12);
    }
}

use auto_ops::impl_op_ex;
use serde::{Deserialize, Serialize};

/// Wrap an azimuthal difference into `[-π, π)`.
pub fn delta_phi(phi1: f64, phi2: f64) -> f64 {
    let mut dphi = (phi1 - phi2) % std::f64::consts::TAU;
    if dphi >= std::f64::consts::PI {
        dphi -= std::f64::consts::TAU;
    } else if dphi < -std::f64::consts::PI {
        dphi += std::f64::consts::TAU;
    }
    dphi
}

/// Angular distance in the `(η, φ)` plane.
pub fn delta_r(eta1: f64, phi1: f64, eta2: f64, phi2: f64) -> f64 {
    let deta = eta1 - eta2;
    let dphi = delta_phi(phi1, phi2);
    (deta * deta + dphi * dphi).sqrt()
}

/// A Lorentz vector stored in collider coordinates (transverse momentum, pseudorapidity,
/// azimuth, mass).
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FourVector {
    /// Transverse momentum
    pub pt: f64,
    /// Pseudorapidity
    pub eta: f64,
    /// Azimuthal angle
    pub phi: f64,
    /// Invariant mass
    pub mass: f64,
}

impl FourVector {
    /// Create a new [`FourVector`] from `(pt, eta, phi, m)`.
    pub fn new(pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        Self {
            pt,
            eta,
            phi,
            mass,
        }
    }

    /// Build a vector from Cartesian components. Spacelike inputs get a negative mass.
    pub fn from_cartesian(px: f64, py: f64, pz: f64, e: f64) -> Self {
        let pt = px.hypot(py);
        let eta = if pt > 0.0 {
            (pz / pt).asinh()
        } else if pz == 0.0 {
            0.0
        } else {
            pz.signum() * 1e10
        };
        let phi = if pt > 0.0 { py.atan2(px) } else { 0.0 };
        let m2 = e * e - px * px - py * py - pz * pz;
        let mass = m2.signum() * m2.abs().sqrt();
        Self::new(pt, eta, phi, mass)
    }

    pub fn px(&self) -> f64 {
        self.pt * self.phi.cos()
    }
    pub fn py(&self) -> f64 {
        self.pt * self.phi.sin()
    }
    pub fn pz(&self) -> f64 {
        self.pt * self.eta.sinh()
    }
    pub fn p(&self) -> f64 {
        self.pt * self.eta.cosh()
    }
    pub fn e(&self) -> f64 {
        let p = self.p();
        (p * p + self.mass * self.mass).sqrt()
    }

    /// Rapidity, `½ ln((E + pz)/(E − pz))`.
    pub fn rapidity(&self) -> f64 {
        let e = self.e();
        let pz = self.pz();
        0.5 * ((e + pz) / (e - pz)).ln()
    }

    pub fn delta_r(&self, other: &Self) -> f64 {
        delta_r(self.eta, self.phi, other.eta, other.phi)
    }

    fn add(&self, other: &Self) -> Self {
        Self::from_cartesian(
            self.px() + other.px(),
            self.py() + other.py(),
            self.pz() + other.pz(),
            self.e() + other.e(),
        )
    }
}

impl_op_ex!(+ |a: &FourVector, b: &FourVector| -> FourVector { a.add(b) });

use wremnants_core::{hist::Axis, WremError, WremResult};

/// Dilepton invariant mass bin edges, finer around the Z peak.
pub fn mll_edges() -> Vec<f64> {
    let mut edges = vec![60.0, 65.0, 70.0, 72.0, 74.0, 76.0, 78.0];
    edges.extend((80..100).map(f64::from));
    edges.extend([100.0, 102.0, 104.0, 106.0, 108.0, 110.0, 115.0, 120.0]);
    edges
}

pub fn axis_ptl() -> WremResult<Axis> {
    Axis::regular("ptl", 100, 0.0, 200.0)
}

pub fn axis_etal() -> WremResult<Axis> {
    Axis::regular("etal", 50, -2.5, 2.5)
}

/// Transverse momentum of the triggering lepton, binned from the configured `--pt` triple.
pub fn axis_pt(bins: usize, lo: f64, hi: f64) -> WremResult<Axis> {
    Axis::regular("pt", bins, lo, hi)
}

/// Validate an `(nbins, min, max)` triple given as floats, as read from the command line.
pub fn pt_binning(values: &[f64]) -> WremResult<(usize, f64, f64)> {
    let invalid = |reason: String| WremError::InvalidAxis {
        name: "pt".to_string(),
        reason,
    };
    let &[bins, lo, hi] = values else {
        return Err(invalid(format!("expected NBINS MIN MAX, got {} values", values.len())));
    };
    if !bins.is_finite() || bins.fract() != 0.0 || bins < 1.0 {
        return Err(invalid(format!("bin count {bins} is not a positive integer")));
    }
    // validates the range
    axis_pt(bins as usize, lo, hi)?;
    Ok((bins as usize, lo, hi))
}

pub fn axis_charge() -> WremResult<Axis> {
    Ok(Axis::regular("charge", 2, -2.0, 2.0)?.without_flow())
}

pub fn axis_yll() -> WremResult<Axis> {
    Axis::regular("yll", 50, -2.5, 2.5)
}

pub fn axis_ptll() -> WremResult<Axis> {
    Axis::regular("ptll", 300, 0.0, 300.0)
}

pub fn axis_mll() -> WremResult<Axis> {
    Axis::variable("mll", &mll_edges())
}

pub fn axis_lin() -> WremResult<Axis> {
    Axis::regular("lin", 5, 0.0, 5.0)
}

pub fn axis_mt() -> WremResult<Axis> {
    Ok(Axis::regular("mt", 200, 0.0, 200.0)?.with_underflow(false))
}

/// Two-bin tensor axis holding the down and up variation, in that order.
pub fn down_up_axis() -> WremResult<Axis> {
    Ok(Axis::integer("downUpVar", 0, 2)?.without_flow())
}

/// Generic tensor axis over `n` variations.
pub fn tensor_axis(n: usize) -> WremResult<Axis> {
    Ok(Axis::integer("tensor_axis_0", 0, n as i64)?.without_flow())
}

/// The axes of the histograms that enter the fit: dilepton pt, rapidity and the W-like charge.
pub fn nominal_axes() -> WremResult<Vec<Axis>> {
    Ok(vec![
        Axis::variable(
            "ptll",
            &[
                0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 25.0, 30.0, 40.0, 50.0,
                60.0, 75.0, 90.0, 150.0,
            ],
        )?
        .with_underflow(false),
        Axis::regular("yll", 20, -2.5, 2.5)?,
        axis_charge()?,
    ])
}

pub const NOMINAL_COLUMNS: [&str; 3] = ["ptll", "yll", "TrigMuon_charge"];

/// Generator-level axis for one of the supported unfolding variables.
pub fn gen_axis(name: &str) -> Option<WremResult<Axis>> {
    match name {
        "ptVGen" => Some(
            Axis::variable(
                "ptVGen",
                &[0.0, 8.0, 14.0, 20.0, 30.0, 40.0, 50.0, 60.0, 75.0, 90.0, 150.0],
            )
            .map(Axis::without_flow),
        ),
        "absYVGen" => Some(Axis::regular("absYVGen", 10, 0.0, 2.5).map(Axis::without_flow)),
        _ => None,
    }
}

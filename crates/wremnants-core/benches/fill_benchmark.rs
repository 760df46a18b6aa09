use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wremnants_core::{
    hist::{Axis, Hist},
    Column, Frame,
};

fn fill_benchmark(c: &mut Criterion) {
    let axes = vec![
        Axis::variable(
            "ptll",
            &[
                0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 25.0, 30.0, 40.0, 50.0,
                60.0, 75.0, 90.0, 150.0,
            ],
        )
        .unwrap()
        .with_underflow(false),
        Axis::regular("yll", 20, -2.5, 2.5).unwrap(),
        Axis::regular("charge", 2, -2.0, 2.0).unwrap().without_flow(),
    ];
    let coords: Vec<[f64; 3]> = (0..100_000)
        .map(|_| {
            [
                fastrand::f64() * 160.0,
                fastrand::f64() * 5.0 - 2.5,
                if fastrand::bool() { 1.0 } else { -1.0 },
            ]
        })
        .collect();
    c.bench_function("nominal fill", |b| {
        b.iter(|| {
            let mut hist = Hist::new("nominal", axes.clone()).unwrap();
            for coord in &coords {
                hist.fill(coord, 1.0).unwrap();
            }
            black_box(hist);
        });
    });
    let frame = Frame::from_columns([(
        "x",
        Column::Float(coords.iter().map(|c| c[0]).collect()),
    )])
    .unwrap();
    c.bench_function("frame filter", |b| {
        let mask: Vec<bool> = frame
            .get::<f64>("x")
            .unwrap()
            .iter()
            .map(|x| *x < 80.0)
            .collect();
        b.iter(|| black_box(frame.filter(&mask).unwrap()));
    });
}

criterion_group!(benches, fill_benchmark);
criterion_main!(benches);

use criterion::{criterion_group, Criterion};

use cortrack::correlation::match_template;
use cortrack::{BBox, Frame, Tracker, TrackerConfig};
use ndarray as nd;

fn checker(rows: usize, cols: usize) -> nd::Array2<f64> {
    nd::Array2::from_shape_fn((rows, cols), |(y, x)| 0.2 + 0.6 * ((x + y) % 2) as f64)
}

pub fn bind(c: &mut Criterion) {
    let boxes: Vec<BBox> = (0..32)
        .map(|i| {
            let x = (i % 8) as f64 * 40.0;
            let y = (i / 8) as f64 * 40.0;
            BBox::new(x, y, x + 30.0, y + 30.0)
        })
        .collect();

    let grid = boxes.clone();
    let detector = move |_: &Frame, _: f64, _: Option<&[String]>| {
        grid.iter()
            .map(|&b| ("object".to_string(), b))
            .collect::<Vec<_>>()
    };
    let mut tracker = Tracker::new(detector, TrackerConfig::default());
    let frame = Frame::Gray(nd::Array2::zeros((320, 320)));
    tracker.step(&frame);

    c.bench_function("bind 32 boxes", |b| {
        b.iter(|| tracker.bind(&boxes));
    });
}

pub fn correlation(c: &mut Criterion) {
    let image = checker(120, 160);
    let template = checker(20, 24);

    c.bench_function("match_template 160x120", |b| {
        b.iter(|| match_template(&image, &template));
    });
}

criterion_group!(benches, bind, correlation);

use criterion::{criterion_group, criterion_main, Criterion};
use dyn_stack::{DynStack, GlobalMemBuffer};
use reborrow::*;

use faktor_core::{Mat, Parallelism};
use faktor_qr::no_pivoting::compute::{qr_in_place, qr_in_place_req, QrParams};

pub fn qr(c: &mut Criterion) {
    for n in [64, 128, 256, 512, 1024] {
        let params = QrParams::default();

        c.bench_function(&format!("faktor-qr-req-{n}"), |b| {
            b.iter(|| qr_in_place_req::<f64>(n, n, false, params).unwrap())
        });

        c.bench_function(&format!("faktor-st-qr-{n}"), |b| {
            let mut mat = Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 });
            let mut tau = Mat::zeros(n, 1);
            let mut mem =
                GlobalMemBuffer::new(qr_in_place_req::<f64>(n, n, false, params).unwrap());
            let mut stack = DynStack::new(&mut mem);

            b.iter(|| {
                qr_in_place(
                    mat.as_mut(),
                    tau.as_mut().col(0),
                    None,
                    Parallelism::None,
                    stack.rb_mut(),
                    params,
                );
            })
        });

        c.bench_function(&format!("faktor-mt-qr-{n}"), |b| {
            let mut mat = Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 });
            let mut tau = Mat::zeros(n, 1);
            let mut mem =
                GlobalMemBuffer::new(qr_in_place_req::<f64>(n, n, false, params).unwrap());
            let mut stack = DynStack::new(&mut mem);

            b.iter(|| {
                qr_in_place(
                    mat.as_mut(),
                    tau.as_mut().col(0),
                    None,
                    Parallelism::Rayon(0),
                    stack.rb_mut(),
                    params,
                );
            })
        });
    }
}

criterion_group!(benches, qr);
criterion_main!(benches);

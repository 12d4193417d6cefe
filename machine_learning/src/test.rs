#![cfg(test)]

use ndarray::{Array1, Array4};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    arch::{
        Regressor, RegressorConfig, Sequential, TrainScope,
        layers::Layer,
        loss::{LossFn, Mse},
    },
    optimization::{Adam, Optimizer},
};

fn loss_of(model: &mut Sequential, params: &[f32], x: &Array4<f32>, y: &Array1<f32>) -> f32 {
    let n = y.len();
    let y_pred = model.forward(params, x.clone()).unwrap();
    let y_pred = y_pred.into_shape_with_order(n).unwrap();
    Mse.loss(y_pred.view(), y.view())
}

#[test]
fn backprop_matches_finite_differences() {
    // linear end to end so central differences are exact up to rounding
    let mut model = Sequential::new([
        Layer::conv2d(2, 3, 3, 2, 1),
        Layer::residual([Layer::conv2d(3, 3, 3, 1, 1)]),
        Layer::global_avg_pool(),
        Layer::dense((3, 1)),
    ]);

    let mut params = vec![0.0; model.size()];
    model
        .init_params(&mut StdRng::seed_from_u64(11), &mut params)
        .unwrap();

    let x = Array4::from_shape_fn((2, 2, 5, 5), |(n, c, i, j)| {
        ((n * 7 + c * 3 + i * 5 + j) % 11) as f32 / 11.0 - 0.5
    });
    let y = Array1::from(vec![0.3, -0.2]);

    let y_pred = model.forward(&params, x.clone()).unwrap();
    let y_pred = y_pred.into_shape_with_order(2).unwrap();
    let d = Mse.loss_prime(y_pred.view(), y.view());

    let mut grad = vec![0.0; model.size()];
    model
        .backward(&params, &mut grad, d.into_shape_with_order((2, 1, 1, 1)).unwrap())
        .unwrap();

    let eps = 1e-2;
    for i in 0..params.len() {
        let orig = params[i];

        params[i] = orig + eps;
        let plus = loss_of(&mut model, &params, &x, &y);
        params[i] = orig - eps;
        let minus = loss_of(&mut model, &params, &x, &y);
        params[i] = orig;

        let numeric = (plus - minus) / (2.0 * eps);
        assert!(
            (numeric - grad[i]).abs() <= 1e-3 + 1e-2 * numeric.abs(),
            "param {i}: analytic {} numeric {numeric}",
            grad[i]
        );
    }
}

#[test]
fn regressor_fits_image_brightness() {
    let config = RegressorConfig {
        in_channels: 3,
        base_channels: 8,
        stages: 1,
        image_size: 8,
    };
    let mut model = Regressor::new(config).unwrap();
    let mut params = model.init_params(&mut StdRng::seed_from_u64(42)).unwrap();
    let mut grad = vec![0.0; model.size()];
    let mut optimizer = Adam::with_weight_decay(model.size(), 1e-2, 0.0);

    let levels: Vec<f32> = (0..8).map(|i| i as f32 / 3.5 - 1.0).collect();
    let x = Array4::from_shape_fn((8, 3, 8, 8), |(n, _, _, _)| levels[n]);
    let y = Array1::from(levels.clone());

    let mean = y.mean().unwrap();
    let variance = y.mapv(|v| (v - mean).powi(2)).mean().unwrap();

    let mut loss = f32::INFINITY;
    for _ in 0..200 {
        let y_pred = model.forward(&params, x.clone()).unwrap();
        loss = Mse.loss(y_pred.view(), y.view());

        let d = Mse.loss_prime(y_pred.view(), y.view());
        model
            .backward(&params, &mut grad, d, TrainScope::Full)
            .unwrap();
        optimizer.update_params(&grad, &mut params).unwrap();
    }

    assert!(loss < 0.5 * variance, "loss {loss} variance {variance}");
}

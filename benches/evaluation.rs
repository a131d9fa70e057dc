use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use myautoml::evaluation::metrics::{average_precision_score, roc_auc_score};
use myautoml::evaluation::shap::{Explainer, TreePathExplainer};
use myautoml::evaluation::{evaluate_binary_classifier, EvaluationOptions, EvaluationSet};
use myautoml::model::{BuiltinEstimator, Estimator, EstimatorFactory};
use myautoml::optimizer::{ParamMap, ParamValue};
use myautoml::visualisation::SvgRenderer;
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

fn create_classification_data(n_rows: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
    let x = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen::<f64>() * 10.0);
    let y = x
        .rows()
        .into_iter()
        .map(|row| {
            let signal: f64 = row.iter().take(3).sum();
            if signal + rng.gen::<f64>() * 4.0 > 17.0 { 1.0 } else { 0.0 }
        })
        .collect();
    (x, y)
}

fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics");

    for n_rows in [1_000, 10_000, 100_000].iter() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let y: Array1<f64> = (0..*n_rows).map(|_| if rng.gen::<f64>() > 0.7 { 1.0 } else { 0.0 }).collect();
        let score: Array1<f64> = y.mapv(|v| (v * 0.3 + rng.gen::<f64>() * 0.7).min(1.0));

        group.bench_with_input(BenchmarkId::new("roc_auc", n_rows), &(&y, &score), |b, (y, s)| {
            b.iter(|| roc_auc_score(black_box(y), black_box(s)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("average_precision", n_rows), &(&y, &score), |b, (y, s)| {
            b.iter(|| average_precision_score(black_box(y), black_box(s)).unwrap())
        });
    }

    group.finish();
}

fn bench_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluation");
    group.sample_size(10);

    for n_rows in [1_000, 5_000].iter() {
        let (x, y) = create_classification_data(*n_rows, 8);
        let mut params = ParamMap::new();
        params.insert("n_estimators".to_string(), ParamValue::Int(20));
        let mut model = BuiltinEstimator::RandomForest.build(&params).unwrap();
        model.fit(&x, &y).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let renderer = SvgRenderer::new();

        group.bench_with_input(BenchmarkId::new("random_forest_cv5", n_rows), &(x, y), |b, (x, y)| {
            b.iter(|| {
                let mut data = vec![
                    EvaluationSet::new("train", x.clone(), y.clone()),
                    EvaluationSet::new("test", x.clone(), y.clone()),
                ];
                evaluate_binary_classifier(model.as_ref(), &mut data, dir.path(), &renderer, &EvaluationOptions::default())
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_attributions(c: &mut Criterion) {
    let mut group = c.benchmark_group("attributions");
    group.sample_size(10);

    let (x, y) = create_classification_data(2_000, 8);
    let mut model = BuiltinEstimator::RandomForest.build(&Default::default()).unwrap();
    model.fit(&x, &y).unwrap();

    group.bench_function("tree_path_2000x8", |b| {
        b.iter(|| TreePathExplainer.explain(model.as_ref(), black_box(&x)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_metrics, bench_evaluation, bench_attributions);
criterion_main!(benches);

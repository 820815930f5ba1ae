use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2, Axis};
use placefield::{
    EPS, EncodingModel, KdeConfig, PredictionMode, TrackGeometry, fit_kde_encoding_model,
    predict_kde_log_likelihood,
};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Poisson};

const N_BINS: usize = 50;
const TRACK_LENGTH: f64 = 100.0;

fn line_geometry(interior: Array1<bool>) -> TrackGeometry {
    let centers = Array2::from_shape_fn((N_BINS, 1), |(i, _)| {
        (i as f64 + 0.5) * TRACK_LENGTH / N_BINS as f64
    });
    let edges = Array1::linspace(0.0, TRACK_LENGTH, N_BINS + 1);
    let boundary = interior.mapv(|inside| !inside);
    TrackGeometry::new(centers, vec![edges], interior, boundary).expect("valid geometry")
}

fn rate_at(x: f64, center: f64) -> f64 {
    let z = (x - center) / 8.0;
    0.05 + 2.0 * (-0.5 * z * z).exp()
}

fn synthetic_session(n_time: usize, seed: u64) -> (Array2<f64>, Array2<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut position = Array2::<f64>::zeros((n_time, 1));
    let mut spikes = Array2::<f64>::zeros((n_time, 2));
    for t in 0..n_time {
        let x = TRACK_LENGTH * rng.random::<f64>();
        position[[t, 0]] = x;
        for (neuron, center) in [25.0, 75.0].into_iter().enumerate() {
            let sampler = Poisson::new(rate_at(x, center)).expect("positive rate");
            spikes[[t, neuron]] = sampler.sample(&mut rng);
        }
    }
    (position, spikes)
}

#[test]
fn place_fields_are_floored_everywhere() {
    let (position, spikes) = synthetic_session(1500, 5);
    let mut interior = Array1::from_elem(N_BINS, true);
    interior[3] = false;
    interior[44] = false;
    let geometry = line_geometry(interior.clone());
    let model = fit_kde_encoding_model(
        position.view(),
        spikes.view(),
        &geometry,
        &KdeConfig::default(),
    )
    .expect("fit succeeds");

    assert!(model.place_fields.iter().all(|&p| p >= EPS));
    for (bin, &inside) in interior.iter().enumerate() {
        if !inside {
            for neuron in 0..2 {
                assert_eq!(model.place_fields[[neuron, bin]], EPS);
            }
        }
    }
}

#[test]
fn no_spike_term_is_the_per_bin_sum_of_place_fields() {
    let (position, spikes) = synthetic_session(900, 13);
    let geometry = line_geometry(Array1::from_elem(N_BINS, true));
    let model = fit_kde_encoding_model(
        position.view(),
        spikes.view(),
        &geometry,
        &KdeConfig::default(),
    )
    .expect("fit succeeds");

    let expected = model.place_fields.sum_axis(Axis(0));
    for (a, b) in model
        .no_spike_part_log_likelihood
        .iter()
        .zip(expected.iter())
    {
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }
}

#[test]
fn local_mode_returns_a_single_column() {
    let (position, spikes) = synthetic_session(700, 19);
    let geometry = line_geometry(Array1::from_elem(N_BINS, true));
    let model = fit_kde_encoding_model(
        position.view(),
        spikes.view(),
        &geometry,
        &KdeConfig::default(),
    )
    .expect("fit succeeds");

    let local = predict_kde_log_likelihood(
        &model,
        position.view(),
        spikes.view(),
        PredictionMode::Local,
    )
    .expect("local prediction succeeds");
    assert_eq!(local.shape(), &[700, 1]);
    assert!(local.iter().all(|v| v.is_finite()));
}

#[test]
fn non_local_forces_exterior_bins_to_log_epsilon() {
    let (position, spikes) = synthetic_session(800, 29);
    let mut interior = Array1::from_elem(N_BINS, true);
    interior[0] = false;
    interior[25] = false;
    let geometry = line_geometry(interior.clone());
    let model = fit_kde_encoding_model(
        position.view(),
        spikes.view(),
        &geometry,
        &KdeConfig::default(),
    )
    .expect("fit succeeds");

    let surface = predict_kde_log_likelihood(
        &model,
        position.view(),
        spikes.view(),
        PredictionMode::NonLocal,
    )
    .expect("non-local prediction succeeds");
    assert_eq!(surface.shape(), &[800, N_BINS]);
    let invalid = EPS.ln();
    for t in 0..surface.nrows() {
        for (bin, &inside) in interior.iter().enumerate() {
            if inside {
                assert!(surface[[t, bin]].is_finite());
            } else {
                assert_eq!(surface[[t, bin]], invalid);
            }
        }
    }
}

#[test]
fn true_bin_ranks_in_the_top_decile_for_most_time_steps() {
    let (position, spikes) = synthetic_session(3000, 37);
    let geometry = line_geometry(Array1::from_elem(N_BINS, true));
    let model = EncodingModel::Kde(
        fit_kde_encoding_model(
            position.view(),
            spikes.view(),
            &geometry,
            &KdeConfig::default(),
        )
        .expect("fit succeeds"),
    );

    let surface = model
        .predict(position.view(), spikes.view(), PredictionMode::NonLocal)
        .expect("non-local prediction succeeds");

    let decile = N_BINS / 10;
    let mut hits = 0usize;
    for t in 0..surface.nrows() {
        let true_bin =
            ((position[[t, 0]] / TRACK_LENGTH * N_BINS as f64) as usize).min(N_BINS - 1);
        let reference = surface[[t, true_bin]];
        let better = surface.row(t).iter().filter(|&&v| v > reference).count();
        if better < decile {
            hits += 1;
        }
    }
    assert!(
        hits * 2 > surface.nrows(),
        "true bin in top decile for only {hits}/{} time steps",
        surface.nrows()
    );
}

#[test]
fn silent_neuron_produces_an_all_epsilon_place_field() {
    let (position, mut spikes) = synthetic_session(1000, 43);
    spikes.column_mut(0).fill(0.0);
    let geometry = line_geometry(Array1::from_elem(N_BINS, true));
    let model = fit_kde_encoding_model(
        position.view(),
        spikes.view(),
        &geometry,
        &KdeConfig::default(),
    )
    .expect("silent neuron must not break the fit");

    assert_eq!(model.marginal_models[0].n_samples(), 0);
    for bin in 0..N_BINS {
        assert_eq!(model.place_fields[[0, bin]], EPS);
    }
}

#[test]
fn block_size_does_not_change_the_fitted_model() {
    let (position, spikes) = synthetic_session(600, 59);
    let geometry = line_geometry(Array1::from_elem(N_BINS, true));

    let blocked = fit_kde_encoding_model(
        position.view(),
        spikes.view(),
        &geometry,
        &KdeConfig {
            block_size: Some(7),
            ..KdeConfig::default()
        },
    )
    .expect("fit succeeds");
    let unblocked = fit_kde_encoding_model(
        position.view(),
        spikes.view(),
        &geometry,
        &KdeConfig {
            block_size: None,
            ..KdeConfig::default()
        },
    )
    .expect("fit succeeds");

    for (a, b) in blocked
        .place_fields
        .iter()
        .zip(unblocked.place_fields.iter())
    {
        assert_eq!(a, b);
    }
}

mod common;

use std::sync::Arc;

use common::{dat, sigmoid, write_model_dir, TinyRegressor};
use loob_vision::{
    Error, Frame, InputTensor, ModelArtifacts, ModelLoadError, ModelStore, Predictor,
    Preprocessor, ShapeRole, WeightBlob,
};

fn assert_corrupt_topology(result: loob_vision::Result<impl std::fmt::Debug>) {
    match result {
        Err(Error::ModelLoad(ModelLoadError::CorruptTopology(_))) => {}
        other => panic!("expected a corrupt topology, got {other:?}"),
    }
}

#[test]
fn loads_model_directory_and_predicts_on_zero_frame() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_model_dir(dir.path(), &TinyRegressor::default().artifacts());

    let store = Arc::new(ModelStore::new());
    let artifacts = ModelArtifacts::from_dir(dir.path()).expect("read artifacts");
    let model = store.load("tiny", &artifacts).expect("load model");
    assert_eq!(model.info().name, "tiny_regressor");
    assert_eq!(model.info().input_shape, vec![Some(1), Some(128), Some(128), Some(3)]);
    assert_eq!(model.info().output_shape, vec![Some(1), Some(2)]);
    assert!(model.info().node_count > 0);
    assert!(store.get().is_ok());

    let predictor = Predictor::new(Arc::clone(&store));
    let frame = Frame::filled(128, 128, [0, 0, 0]);
    let prediction = predictor
        .predict_frame(&Preprocessor::default(), &frame)
        .expect("predict");
    assert!((0.0..=1.0).contains(&prediction.x));
    assert!((0.0..=1.0).contains(&prediction.y));
    assert_eq!(prediction.x, 0.5);
    assert_eq!(prediction.y, 0.5);
}

#[test]
fn three_unit_output_is_rejected_and_nothing_becomes_active() {
    let store = ModelStore::new();
    let artifacts = TinyRegressor {
        units: 3,
        out_bias: vec![0.0; 3],
        ..TinyRegressor::default()
    }
    .artifacts();

    let err = store.load("wide", &artifacts).unwrap_err();
    match err {
        Error::ModelLoad(ModelLoadError::ShapeMismatch {
            role,
            expected,
            actual,
        }) => {
            assert_eq!(role, ShapeRole::Output);
            assert_eq!(expected, "[*, 2]");
            assert_eq!(actual, "[1, 3]");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(store.get(), Err(Error::NoModelLoaded)));
}

#[test]
fn wrong_input_size_is_a_shape_mismatch() {
    let store = ModelStore::new();
    let artifacts = TinyRegressor {
        input_side: 64,
        ..TinyRegressor::default()
    }
    .artifacts();
    let err = store.load("small", &artifacts).unwrap_err();
    assert!(matches!(
        err,
        Error::ModelLoad(ModelLoadError::ShapeMismatch {
            role: ShapeRole::Input,
            ..
        })
    ));
}

#[test]
fn failed_load_keeps_previous_model() {
    let store = ModelStore::new();
    store
        .load("first", &TinyRegressor::with_bias([1.0, -1.0]).artifacts())
        .expect("first load");
    let before = store.info().expect("info");

    let mut broken = TinyRegressor::default().artifacts();
    broken.weights[0].bytes.truncate(200);
    let err = store.load("second", &broken).unwrap_err();
    assert!(matches!(
        err,
        Error::ModelLoad(ModelLoadError::CorruptWeights(_))
    ));

    assert_eq!(store.loaded_id().as_deref(), Some("first"));
    assert_eq!(store.info().expect("info").fingerprint, before.fingerprint);
}

#[test]
fn missing_artifacts_are_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ModelStore::new();

    let empty = ModelArtifacts::from_dir(dir.path()).expect("read empty dir");
    assert!(matches!(
        store.load("m", &empty),
        Err(Error::ModelLoad(ModelLoadError::MissingTopology))
    ));

    let mut no_tensors = TinyRegressor::default().artifacts();
    no_tensors.weights.clear();
    assert!(matches!(
        store.load("m", &no_tensors),
        Err(Error::ModelLoad(ModelLoadError::MissingWeights(_)))
    ));

    let mut renamed = TinyRegressor::default().artifacts();
    let last = renamed.weights.len() - 1;
    renamed.weights[last].name = "other.dat".to_string();
    match store.load("m", &renamed) {
        Err(Error::ModelLoad(ModelLoadError::MissingWeights(detail))) => {
            assert!(detail.contains("out_bias"), "{detail}");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(store.info().is_none());
}

#[test]
fn malformed_graphs_fail_to_load_without_panicking() {
    let store = ModelStore::new();
    store
        .load("good", &TinyRegressor::default().artifacts())
        .expect("load");
    let base = TinyRegressor::default();

    // A declared variable whose byte size does not fit in usize.
    let oversized = base.graph().replace(
        "shape = [1, 4]);",
        "shape = [4611686018427387904, 4611686018427387904]);",
    );
    assert_corrupt_topology(
        store.load("oversized", &ModelArtifacts::new(oversized.into_bytes(), base.artifacts().weights)),
    );

    // A reshape whose target size overflows during shape inference.
    let reshape = base.graph().replace(
        "shape = [1, 49152]);",
        "shape = [4611686018427387904, 4]);",
    );
    assert_corrupt_topology(
        store.load("reshape", &ModelArtifacts::new(reshape.into_bytes(), base.artifacts().weights)),
    );

    // An operation NNEF does not know.
    let unknown = "version 1.0;\n\
                   graph odd(input) -> (output)\n\
                   {\n\
                   \x20   input = external<scalar>(shape = [1, 128, 128, 3]);\n\
                   \x20   output = frobnicate(input);\n\
                   }\n";
    assert_corrupt_topology(store.load(
        "unknown",
        &ModelArtifacts::new(
            unknown.as_bytes().to_vec(),
            vec![WeightBlob::new("spare.dat", dat(&[1], &[0.0]))],
        ),
    ));

    assert_eq!(store.loaded_id().as_deref(), Some("good"));
}

#[test]
fn warm_up_failure_leaves_the_store_unchanged() {
    let store = ModelStore::new();
    store
        .load("first", &TinyRegressor::with_bias([0.5, 0.5]).artifacts())
        .expect("first load");

    let nan = TinyRegressor {
        out_bias: vec![f32::NAN, 0.0],
        activation: "linear",
        ..TinyRegressor::default()
    }
    .artifacts();
    let err = store.load("nan", &nan).unwrap_err();
    assert!(matches!(err, Error::NonFiniteOutput { .. }));
    assert_eq!(store.loaded_id().as_deref(), Some("first"));
}

#[test]
fn dispose_releases_model_and_is_idempotent() {
    let store = Arc::new(ModelStore::new());
    store
        .load("tiny", &TinyRegressor::default().artifacts())
        .expect("load");
    assert!(store.resident_bytes() > 0);

    store.dispose();
    assert_eq!(store.resident_bytes(), 0);
    assert!(matches!(store.get(), Err(Error::NoModelLoaded)));
    store.dispose();

    let predictor = Predictor::new(store);
    assert!(matches!(
        predictor.predict(InputTensor::zeros()),
        Err(Error::NoModelLoaded)
    ));
}

#[test]
fn predictions_are_deterministic_and_follow_the_bias() {
    let store = Arc::new(ModelStore::new());
    store
        .load("biased", &TinyRegressor::with_bias([2.0, -1.0]).artifacts())
        .expect("load");
    let predictor = Predictor::new(store);
    let preprocessor = Preprocessor::default();
    let frame = Frame::filled(320, 240, [12, 200, 40]);

    let a = predictor.predict_frame(&preprocessor, &frame).expect("predict");
    let b = predictor.predict_frame(&preprocessor, &frame).expect("predict");
    assert_eq!(a, b);
    assert!((a.x - sigmoid(2.0)).abs() < 1e-6);
    assert!((a.y - sigmoid(-1.0)).abs() < 1e-6);
}

#[test]
fn linear_outputs_are_clamped_and_overflow_is_rejected() {
    let store = Arc::new(ModelStore::new());
    let predictor = Predictor::new(Arc::clone(&store));

    store
        .load(
            "linear",
            &TinyRegressor {
                out_bias: vec![1.7, -0.3],
                activation: "linear",
                ..TinyRegressor::default()
            }
            .artifacts(),
        )
        .expect("load");
    let p = predictor.predict(InputTensor::zeros()).expect("predict");
    assert_eq!((p.x, p.y), (1.0, 0.0));

    // Finite on the zero warm-up input, infinite on a bright frame.
    store
        .load(
            "overflow",
            &TinyRegressor {
                out_bias: vec![0.25, 0.5],
                activation: "linear",
                kernel_fill: f32::MAX,
                ..TinyRegressor::default()
            }
            .artifacts(),
        )
        .expect("load");
    let p = predictor.predict(InputTensor::zeros()).expect("predict");
    assert_eq!((p.x, p.y), (0.25, 0.5));

    let err = predictor
        .predict_frame(&Preprocessor::default(), &Frame::filled(128, 128, [255, 255, 255]))
        .unwrap_err();
    assert!(matches!(err, Error::NonFiniteOutput { .. }));
    assert!(err.is_frame_local());
}

//! model_check - validate a regression model directory
//!
//! Loads `graph.nnef` plus its `.dat` tensor files through the model store, prints
//! the model summary and one prediction on an all-black frame as JSON.
//! Exits non-zero when the model does not load.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use loob_vision::{
    Frame, Interpolation, ModelArtifacts, ModelInfo, ModelStore, Prediction, Predictor,
    Preprocessor,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory holding graph.nnef and the .dat tensor files.
    dir: PathBuf,
    /// Id to load the model under (defaults to the directory name).
    #[arg(long)]
    id: Option<String>,
    /// Resize interpolation for the all-black check frame.
    #[arg(long, default_value = "bilinear")]
    interpolation: Interpolation,
}

#[derive(Serialize)]
struct Report {
    model: ModelInfo,
    zero_frame_prediction: Prediction,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let id = args.id.unwrap_or_else(|| {
        args.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string())
    });

    let artifacts = ModelArtifacts::from_dir(&args.dir)
        .with_context(|| format!("read model artifacts from {}", args.dir.display()))?;
    let store = Arc::new(ModelStore::new());
    let model = store
        .load(&id, &artifacts)
        .with_context(|| format!("load model '{}'", id))?;

    let predictor = Predictor::new(Arc::clone(&store));
    let black = Frame::filled(128, 128, [0, 0, 0]);
    let prediction = predictor.predict_frame(&Preprocessor::new(args.interpolation), &black)?;

    let report = Report {
        model: model.info().clone(),
        zero_frame_prediction: prediction,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    drop(model);
    store.dispose();
    Ok(())
}

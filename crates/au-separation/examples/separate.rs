//! Separate a WAV file into four stems with an ONNX model.
//!
//! Usage: `cargo run --example separate -- model.onnx input.wav out_dir`

use std::sync::Arc;
use std::time::Duration;

use au_separation::{OnnxSeparationModel, PipelineConfig, SeparationPipeline};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (model_path, input, out_dir) = match (args.next(), args.next(), args.next()) {
        (Some(m), Some(i), Some(o)) => (m, i, o),
        _ => {
            eprintln!("usage: separate <model.onnx> <input.wav> <out_dir>");
            std::process::exit(2);
        }
    };

    let model = OnnxSeparationModel::load(model_path.as_ref(), 128, 128)?;
    let pipeline = SeparationPipeline::new(Arc::new(model), PipelineConfig::default());

    let handle = pipeline.submit(input, out_dir);
    while !handle.status().is_terminal() {
        println!("progress {:5.1}%", handle.progress() * 100.0);
        std::thread::sleep(Duration::from_millis(500));
    }
    println!("finished: {:?}", handle.status());
    if let Some(message) = handle.message() {
        eprintln!("{message}");
    }
    Ok(())
}

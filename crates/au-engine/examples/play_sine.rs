//! Play a sine sweep through the full chain on the default device.
//!
//! Run with `cargo run --example play_sine`. Prints the live analysis
//! snapshot and the current EQ settings as JSON once per second.

use std::time::Duration;

use au_engine::{EngineConfig, MemorySource, PlayerEngine};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = EngineConfig::default();
    let sr = config.audio.sample_rate.as_f64();

    // Five seconds of a 220 -> 880 Hz sweep, interleaved stereo.
    let frames = (sr * 5.0) as usize;
    let mut samples = Vec::with_capacity(frames * 2);
    let mut phase = 0.0f64;
    for i in 0..frames {
        let freq = 220.0 + 660.0 * i as f64 / frames as f64;
        phase += 2.0 * std::f64::consts::PI * freq / sr;
        let s = 0.4 * phase.sin();
        samples.push(s);
        samples.push(s);
    }

    let engine = PlayerEngine::new(config);
    engine.initialize(Box::new(MemorySource::new(samples)))?;
    engine.set_band_gain(2, 6.0)?; // lift 125 Hz
    engine.set_preamp(1.2)?;
    engine.play()?;

    for _ in 0..5 {
        std::thread::sleep(Duration::from_secs(1));
        if let Some(snapshot) = engine.snapshot() {
            println!(
                "pos {:5.2}s  peak L {:.2} R {:.2}  rms {:.2}",
                engine.position_seconds(),
                snapshot.left_peak,
                snapshot.right_peak,
                snapshot.rms
            );
        }
    }
    println!("{}", serde_json::to_string_pretty(&engine.eq_settings())?);

    engine.stop()?;
    engine.destroy();
    Ok(())
}

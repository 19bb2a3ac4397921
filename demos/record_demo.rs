//! Scripted recording run against the simulated arm and camera.
//!
//! This example shows how to:
//! 1. Spawn the recorder workers
//! 2. Start, reject and save sessions without a keyboard
//! 3. Write the saved sessions as a dataset and read it back
//!
//! Run with: cargo run --example record_demo

use std::thread;
use std::time::Duration;

use demo_recorder::{
    config::Config,
    core::SessionController,
    dataset::{load_dataset, DatasetMetadata, DatasetWriter, JsonDatasetWriter},
    device::{SimulatedArm, SimulatedCamera},
    stats::create_shared_stats,
    HOTKEYS,
};

fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("Demo Recorder - Scripted Run");
    println!("============================");
    println!("{HOTKEYS}");

    let config = Config {
        period: Duration::from_millis(200),
        capture_poll: Duration::from_millis(20),
        saved_path: std::env::temp_dir().join("demo-recorder-example"),
        ..Config::default()
    };

    let stats = create_shared_stats();
    let camera = SimulatedCamera::new(64, 48).with_latency(Duration::from_millis(50));
    let mut recorder = match SessionController::spawn(&config, SimulatedArm::new(), camera, stats.clone()) {
        Ok(recorder) => recorder,
        Err(e) => {
            eprintln!("Error starting recorder: {e}");
            return;
        }
    };

    // A take the operator throws away.
    println!("b: recording for 1s, then rejecting");
    if let Err(e) = recorder.start() {
        eprintln!("Error: {e}");
        return;
    }
    thread::sleep(Duration::from_secs(1));
    if let Some(rejected) = recorder.reject() {
        println!("m: rejected {} ({} states)", rejected.id, rejected.states);
    }

    // Two takes that are kept.
    for _ in 0..2 {
        if let Err(e) = recorder.start() {
            eprintln!("Error: {e}");
            return;
        }
        thread::sleep(Duration::from_millis(1100));
        if let Some(saved) = recorder.save() {
            println!("n: saved {} with {} steps", saved.id, saved.steps);
        }
    }

    let summary = recorder.quit();
    println!("q: total demos saved: {}", summary.saved_count());

    let set = summary.into_trajectory_set("pick up the cube", DatasetMetadata::for_config(&config));
    let writer = JsonDatasetWriter::new(&config.saved_path);
    let path = match writer.persist(&set) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error writing dataset: {e}");
            return;
        }
    };
    println!("Written to {}", path.display());

    match load_dataset(&path) {
        Ok(loaded) => {
            println!();
            println!("{}", loaded.summary());
        }
        Err(e) => eprintln!("Error reading dataset back: {e}"),
    }

    println!();
    println!("{}", stats.summary());
}

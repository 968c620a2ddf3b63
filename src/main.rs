pub mod board;
pub mod config;
pub mod device;
pub mod mqtt;
pub mod weight;

use color_eyre::eyre::{eyre, Result};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::board::{BoardHandle, BoardSettings};
use crate::config::Config;
use crate::device::BalanceBoard;
use crate::mqtt::WeightPublisher;
use crate::weight::WeightScale;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = Config::load()?;

    info!("looking for a balance board");
    let board = BalanceBoard::detect().map_err(|e| eyre!("couldn't detect a board: {e}"))?;

    let battery = board
        .battery()
        .map_err(|e| eyre!("couldn't read board battery level: {e}"))?;
    info!("board battery at {battery}%");
    if battery < 10 {
        warn!("board battery is nearly empty");
    }

    let settings = BoardSettings {
        dispatcher: config.dispatcher.clone(),
        calibration: config.calibration.clone(),
    };
    let mut handle = BoardHandle::spawn(Box::new(board), settings);

    let scale = WeightScale::new(config.scale.clone());
    let publisher = WeightPublisher::connect(&config.mqtt);

    // raw stream: publish every reading as it comes
    let raw_publisher = publisher.clone();
    let raw_scale = scale.clone();
    let mut readings = handle.readings;
    tokio::spawn(async move {
        while let Some(sample) = readings.recv().await {
            let kg = raw_scale.to_kilograms(sample.total);
            if let Err(e) = raw_publisher.publish_raw(kg).await {
                warn!("couldn't publish raw reading: {e}");
            }
        }
    });

    // classified stream: resolve the occupant and announce them
    while let Some(total) = handle.weights.recv().await {
        let kg = scale.to_kilograms(total);
        let name = scale.classify(kg);
        info!("{name}: {kg:.2} kg");
        if let Err(e) = publisher.publish_occupant(name, kg).await {
            warn!("couldn't publish occupant reading: {e}");
        }
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging();
    Ok(())
}

fn setup_logging() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();
}

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{LevelFilter, info};

use magic_caster_ble::{BluestTransport, WandConfig, WandSession, logging};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(LevelFilter::Info);

    let config = match std::env::args().nth(1) {
        Some(path) => WandConfig::load_config(&path).await?,
        None => WandConfig::default(),
    };

    let transport = BluestTransport::new(config.bluetooth.clone())
        .await
        .context("opening the Bluetooth adapter")?;
    let device = transport
        .scanner()
        .find_wand(&config.bluetooth.name_prefix)
        .await?
        .ok_or_else(|| anyhow!("no wand advertising {:?} found", config.bluetooth.name_prefix))?;

    let session = WandSession::new(transport, device, config.session.clone());
    let _callback = session.register_callback(|state| {
        info!(
            "Wand state: spell {:?}, battery {}%",
            state.last_spell, state.battery_level
        );
    });

    session.update().await?;
    info!("{} ({}), RSSI {:?}", session.name(), session.address(), session.rssi());
    info!("Last spell: {:?}, battery: {}%", session.last_spell(), session.battery_level());

    tokio::time::sleep(Duration::from_secs(5)).await;
    info!("Last spell: {:?}, battery: {}%", session.last_spell(), session.battery_level());

    session.stop().await;
    info!("Session stopped ({:?})", session.connection_state());
    Ok(())
}

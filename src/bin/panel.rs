//! Two-panel demo over the in-memory transport.
//!
//! Brings up a coordinator panel and a second panel in the same session,
//! issues a few commands from each side, and prints the converged state.
//!
//! ```bash
//! RUST_LOG=info cargo run --bin panel
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use uuid::Uuid;

use intercom_panel::config::{IntercomConfig, MatrixEntry, PanelConfig, RoleRow};
use intercom_panel::directory::StaticDirectory;
use intercom_panel::panel::PanelInstance;
use intercom_panel::presentation::{NullPresentation, PanelStatus};
use intercom_panel::sync::SyncOptions;
use intercom_panel::transport::LoopbackTransport;

const INTERCOM: &str = "demo-show";

fn demo_config() -> IntercomConfig {
    let row = |listen: bool| RoleRow {
        channels: vec![
            MatrixEntry {
                channel_name: "Stage".to_string(),
                talking: false,
                listen_active: listen,
                volume: 80,
            },
            MatrixEntry {
                channel_name: "FOH".to_string(),
                talking: false,
                listen_active: false,
                volume: 100,
            },
        ],
    };
    IntercomConfig {
        channels: vec!["Stage".to_string(), "FOH".to_string()],
        roles: vec!["Director".to_string(), "A2".to_string()],
        matrix: vec![row(true), row(false)],
    }
}

async fn wait_ready(panel: &PanelInstance, name: &str) -> anyhow::Result<()> {
    for _ in 0..100 {
        if panel.status() == PanelStatus::Ready {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    anyhow::bail!("{name} never reached Ready (status: {:?})", panel.status());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let identity = Uuid::new_v4().to_string();
    let directory = Arc::new(
        StaticDirectory::new()
            .with_intercom(INTERCOM, demo_config())
            .with_identity(identity.clone()),
    );
    let transport = Arc::new(LoopbackTransport::new());
    let options = SyncOptions {
        attempts: 2,
        timeout: Duration::from_millis(100),
    };

    let mut director = PanelInstance::new(
        PanelConfig {
            companion_identity: identity.clone(),
            intercom_name: INTERCOM.to_string(),
            role_id: Some(0),
        },
        directory.clone(),
        transport.clone(),
        Arc::new(NullPresentation),
    )
    .with_sync_options(options);
    director.init().await.context("director init")?;
    wait_ready(&director, "director").await?;
    println!("director synced: volume(Stage)={}", director.volume(0));

    let mut a2 = PanelInstance::new(
        PanelConfig {
            companion_identity: identity.clone(),
            intercom_name: INTERCOM.to_string(),
            role_id: Some(1),
        },
        directory.clone(),
        transport.clone(),
        Arc::new(NullPresentation),
    )
    .with_sync_options(options);
    a2.init().await.context("a2 init")?;
    wait_ready(&a2, "a2").await?;
    println!("a2 synced from the group: volume(Stage)={}", a2.volume(0));

    // A2 opens talk on Stage; the director's panel converges.
    let dispatcher = a2.dispatcher().context("a2 dispatcher")?;
    dispatcher.toggle_talk(0).await?;
    dispatcher.set_volume(1, 120).await?; // clamped to 100 on the wire

    tokio::time::sleep(Duration::from_millis(200)).await;
    println!(
        "director sees: talking(Stage)={} volume(FOH)={}",
        director.talking(0),
        director.volume(1)
    );
    println!(
        "a2 sees:       talking(Stage)={} volume(FOH)={}",
        a2.talking(0),
        a2.volume(1)
    );

    director.destroy();
    a2.destroy();
    Ok(())
}

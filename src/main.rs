use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use proctor::audio::SpectrumAnalysis;
use proctor::kernel::event::{ViolationCounters, VoiceEvent};
use proctor::media::system::SystemMediaCapture;
use proctor::services::HttpMonitoringClient;
use proctor::session::{EnvironmentBus, SessionCallbacks};
use proctor::{Collaborators, MonitoringSessionController, ProctorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = ProctorConfig::from_env()?;
    tracing::info!("Proctor monitor starting...");

    let environment = Arc::new(EnvironmentBus::default());
    let mut deps = Collaborators::new(
        Arc::new(SystemMediaCapture::new()),
        Arc::new(SpectrumAnalysis),
        environment.clone(),
    );

    if let Some(url) = config.backend.base_url.clone() {
        let client = Arc::new(HttpMonitoringClient::new(
            url.as_str(),
            Duration::from_millis(config.backend.timeout_ms),
        ));
        deps = deps.with_uploader(client.clone()).with_records(client);
        config.session.auto_upload = true;
        config.session.auto_report = true;
        tracing::info!("Reporting to {}", url);
    }

    let callbacks = SessionCallbacks {
        on_voice: Some(Arc::new(|event: VoiceEvent| {
            tracing::warn!("Voice detected ({:.1} dB)", event.energy_db);
            Ok(())
        })),
        on_counters: Some(Arc::new(|counters: ViolationCounters| {
            tracing::info!(
                "Counters: tab {} / fullscreen {} / voice {}",
                counters.tab_switch_count,
                counters.fullscreen_exit_count,
                counters.voice_detection_count
            );
            Ok(())
        })),
        ..SessionCallbacks::default()
    };

    let mut controller = MonitoringSessionController::new(config, deps).with_callbacks(callbacks);
    let status = controller.start().await;
    for err in &status.errors {
        if status.is_monitoring {
            tracing::error!("Monitoring degraded: {}", err);
        } else {
            tracing::error!("Monitoring failed to start: {}", err);
        }
    }

    println!("Commands: hide, show, fullscreen, exit-fullscreen, status, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut heartbeat = tokio::time::interval(Duration::from_secs(30));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            _ = heartbeat.tick() => {
                let state = controller.detection_state();
                tracing::info!(
                    "Status: {:?}, energy {:.1} dB, faces {}",
                    controller.status(),
                    state.current_energy_db,
                    state.face_count
                );
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "" => {}
                    "hide" => { environment.hide(); }
                    "show" => { environment.show(); }
                    "fullscreen" => { environment.enter_fullscreen(); }
                    "exit-fullscreen" => { environment.exit_fullscreen(); }
                    "status" => {
                        println!("{:?}", controller.counters());
                        println!("{:?}", controller.telemetry_summary());
                    }
                    "quit" => break,
                    other => println!("Unknown command '{}'", other),
                }
            }
        }
    }

    controller.stop();
    tracing::info!("Final counters: {:?}", controller.counters());
    Ok(())
}

mod config;
mod input;

use clap::Parser;
use config::Config;
use event_shipper::{HttpShipper, OutcomeReceiver, Shipper, ShipperError};
use input::EventReader;
use serde_json::Value;
use session_context::{GlobalSessionContextProvider, MemorySessionStore, SessionContext, CONTEXT_PROVIDER_NAME};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SESSION_WAIT: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	dotenv::dotenv().ok();

	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_target(true)
		.with_line_number(true)
		.with_writer(std::io::stderr)
		.init();

	let config = Config::parse();
	info!("Starting telemetry sender for channel {} ({})", config.channel, config.send_to);

	let shipper = HttpShipper::new(config.shipper_options())?;
	shipper.extend_context(config.event_context());
	let printer = spawn_outcome_printer(shipper.telemetry_counter());

	let sessions = match &config.user_id {
		Some(user_id) => {
			let provider = GlobalSessionContextProvider::register(config.organization_id.clone(), Arc::new(MemorySessionStore::new()));
			provider.set_user_id(user_id.as_str())?;
			let mut session_rx = provider.watch();
			if tokio::time::timeout(SESSION_WAIT, session_rx.wait_for(Option::is_some)).await.is_err() {
				warn!("No global session available after {:?}", SESSION_WAIT);
			}
			Some(provider)
		}
		None => None,
	};
	let session_rx = sessions.as_ref().map(GlobalSessionContextProvider::watch);

	shipper.opt_in(config.opt_in);
	if !config.opt_in {
		warn!("Consent not granted, events stay buffered and are dropped on exit");
	}

	let mut reader = EventReader::open(config.input.as_deref()).await?;
	let mut reported = 0usize;

	loop {
		tokio::select! {
			result = tokio::signal::ctrl_c() => {
				match result {
					Ok(()) => info!("Received shutdown signal (Ctrl+C)"),
					Err(e) => error!("Failed to listen for shutdown signal: {}", e),
				}
				break;
			}
			next = reader.next_event() => {
				match next? {
					Some(mut event) => {
						if let Some(session) = session_rx.as_ref().and_then(current_session) {
							event.context.insert(CONTEXT_PROVIDER_NAME.to_string(), Value::String(session.global_session));
						}
						shipper.report_events(vec![event]);
						reported += 1;
					}
					None => {
						info!("End of input after {} events", reported);
						shipper.flush().await;
						break;
					}
				}
			}
		}
	}

	shipper.shutdown().await;
	if let Some(provider) = &sessions {
		provider.stop().await;
	}

	info!("{} events still buffered at exit", shipper.pending_events());
	drop(shipper);

	if let Err(e) = printer.await {
		warn!("Outcome printer failed: {}", e);
	}

	info!("Telemetry sender stopped");
	Ok(())
}

fn current_session(rx: &watch::Receiver<Option<SessionContext>>) -> Option<SessionContext> {
	rx.borrow().clone()
}

/// Prints every outcome record to stdout as one JSON line.
fn spawn_outcome_printer(mut outcomes: OutcomeReceiver) -> JoinHandle<()> {
	tokio::spawn(async move {
		loop {
			match outcomes.recv().await {
				Ok(record) => match serde_json::to_string(&record) {
					Ok(line) => println!("{line}"),
					Err(e) => warn!("Failed to encode outcome record: {}", e),
				},
				Err(ShipperError::Lagged(n)) => warn!("Outcome printer lagged, {} records dropped", n),
				Err(_) => break,
			}
		}
	})
}

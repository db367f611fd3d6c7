use clap::Parser;
use event_shipper::{EventContext, SendTo, ShipperOptions};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "Ships ndjson telemetry events", long_about = None)]
pub struct Config {
	#[arg(long, env = "TELEMETRY_CHANNEL", help = "Channel the events are streamed to")]
	pub channel: String,

	#[arg(long, env = "TELEMETRY_VERSION", default_value = env!("CARGO_PKG_VERSION"), help = "Version sent in the stack version header")]
	pub stack_version: String,

	#[arg(long, env = "TELEMETRY_SEND_TO", default_value = "staging", help = "Target environment: staging or production")]
	pub send_to: SendTo,

	#[arg(long, env = "TELEMETRY_DEBUG", help = "Ask the telemetry service to echo debug information")]
	pub debug: bool,

	#[arg(long, env = "TELEMETRY_OPT_IN", help = "Grant consent to send events")]
	pub opt_in: bool,

	#[arg(
		long,
		env = "TELEMETRY_FLUSH_INTERVAL_MS",
		default_value = "1000",
		value_parser = parse_millis,
		help = "Dispatch timer period in milliseconds"
	)]
	pub flush_interval: Duration,

	#[arg(long, env = "TELEMETRY_URL", help = "Send to this URL instead of the environment default")]
	pub url: Option<String>,

	#[arg(long, env = "TELEMETRY_CLUSTER_UUID")]
	pub cluster_uuid: Option<String>,

	#[arg(long, env = "TELEMETRY_LICENSE_ID")]
	pub license_id: Option<String>,

	#[arg(long, env = "TELEMETRY_USER_ID", help = "Derive a global session id from this user")]
	pub user_id: Option<String>,

	#[arg(long, env = "TELEMETRY_ORGANIZATION_ID")]
	pub organization_id: Option<String>,

	#[arg(long, env = "TELEMETRY_INPUT", help = "ndjson file to read events from, stdin when absent")]
	pub input: Option<PathBuf>,
}

impl Config {
	pub fn shipper_options(&self) -> ShipperOptions {
		let options = ShipperOptions::new(&self.channel, &self.stack_version)
			.send_to(self.send_to)
			.debug(self.debug)
			.flush_interval(self.flush_interval);

		match &self.url {
			Some(url) => {
				let url = url.clone();
				options.build_url(move |_| url.clone())
			}
			None => options,
		}
	}

	pub fn event_context(&self) -> EventContext {
		EventContext {
			cluster_uuid: self.cluster_uuid.clone(),
			license_id: self.license_id.clone(),
			..EventContext::default()
		}
	}
}

fn parse_millis(arg: &str) -> Result<Duration, std::num::ParseIntError> {
	Ok(Duration::from_millis(arg.parse()?))
}

use anyhow::Context;
use event_shipper::Event;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::warn;

/// One input line. Only `event_type` is required.
#[derive(Debug, Deserialize)]
struct InputEvent {
	event_type: String,
	#[serde(default)]
	timestamp: Option<String>,
	#[serde(default)]
	context: Map<String, Value>,
	#[serde(default)]
	properties: Map<String, Value>,
}

impl From<InputEvent> for Event {
	fn from(input: InputEvent) -> Self {
		let mut event = Self::new(input.event_type);
		if let Some(timestamp) = input.timestamp {
			event.timestamp = timestamp;
		}
		event.context = input.context;
		event.properties = input.properties;
		event
	}
}

/// Parses one ndjson line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<serde_json::Result<Event>> {
	let line = line.trim();
	if line.is_empty() {
		return None;
	}
	Some(serde_json::from_str::<InputEvent>(line).map(Event::from))
}

pub struct EventReader {
	lines: Lines<Box<dyn AsyncBufRead + Unpin + Send>>,
	line_number: usize,
}

impl EventReader {
	/// Reads from `path`, or stdin when no path is given.
	pub async fn open(path: Option<&Path>) -> anyhow::Result<Self> {
		let reader: Box<dyn AsyncBufRead + Unpin + Send> = match path {
			Some(path) => {
				let file = tokio::fs::File::open(path).await.with_context(|| format!("Failed to open {}", path.display()))?;
				Box::new(BufReader::new(file))
			}
			None => Box::new(BufReader::new(tokio::io::stdin())),
		};

		Ok(Self::from_reader(reader))
	}

	pub fn from_reader(reader: Box<dyn AsyncBufRead + Unpin + Send>) -> Self {
		Self {
			lines: reader.lines(),
			line_number: 0,
		}
	}

	/// Next valid event, skipping blank and malformed lines. `None` at end of input.
	pub async fn next_event(&mut self) -> anyhow::Result<Option<Event>> {
		while let Some(line) = self.lines.next_line().await.context("Failed to read input")? {
			self.line_number += 1;
			match parse_line(&line) {
				Some(Ok(event)) => return Ok(Some(event)),
				Some(Err(e)) => warn!("Skipping malformed event on line {}: {}", self.line_number, e),
				None => {}
			}
		}
		Ok(None)
	}
}

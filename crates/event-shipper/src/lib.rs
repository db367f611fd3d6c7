//! Client-side telemetry event shipper.
//!
//! Events reported by the host are buffered until the user opts in, then
//! drained on a fixed timer (or on demand via [`Shipper::flush`]) and POSTed
//! as ndjson. Every settled attempt produces one [`OutcomeRecord`] per event
//! type on the stream returned by [`Shipper::telemetry_counter`].

pub mod buffer;
pub mod config;
pub mod consent;
pub mod delivery;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod outcome;
pub mod shipper;

#[cfg(test)]
mod testing;

pub use buffer::EventBuffer;
pub use config::ShipperOptions;
pub use consent::{ConsentGate, ConsentState};
pub use delivery::{classify, encode_ndjson, Delivery, DeliveryRequest, DeliveryResponse, HttpDelivery};
pub use dispatch::DispatchState;
pub use endpoint::{build_headers, build_url, SendTo, UrlOptions};
pub use error::{DeliveryError, Result, ShipperError};
pub use event::{Event, EventContext};
pub use outcome::{Outcome, OutcomeReceiver, OutcomeRecord, OutcomeStream};
pub use shipper::{HttpShipper, Shipper, SHIPPER_NAME};

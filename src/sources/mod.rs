pub mod csv_reader;
pub mod http;
pub mod open_meteo;
pub mod retry;

pub use csv_reader::{load_observed_air_quality, ObservedCsvReader};
pub use http::{JsonTransport, ReqwestTransport, ScriptedTransport, TransportError, TransportErrorKind};
pub use open_meteo::{DateWindow, Endpoints, OpenMeteoClient};
pub use retry::{Backoff, RetryPolicy};

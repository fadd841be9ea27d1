//! Linear text classifiers: time reference, tz-context, location change.
//!
//! All three share one shape: hashed character n-gram features (range 2–5,
//! word-boundary mode) scored by a logistic binary head, with an optional
//! multinomial subtype head for positive texts. Inference is sub-millisecond
//! and allocation-light; training happens offline and ships as a JSON
//! artifact. Without an artifact, an embedded seed model keeps each
//! classifier functional.

pub mod location;
pub mod model;
pub mod time;
pub mod tz_context;

pub use location::{LocationClassifier, LocationTriggerResult};
pub use model::{ClassifierModel, LinearModel};
pub use time::TimeClassifier;
pub use tz_context::{TzContextClassifier, TzTriggerResult};

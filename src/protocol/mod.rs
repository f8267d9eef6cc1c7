//! Protocol Module
//!
//! Wire message variants plus the correlation layer that matches
//! asynchronous responses back to their originating requests.

mod correlation;
mod messages;

pub use correlation::{Correlator, DEFAULT_RESPONSE_TIMEOUT};
pub use messages::{Message, RequestHeader, ResponseEnvelope};

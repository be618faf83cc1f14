pub mod error;
pub mod guarded;
pub mod keyword;
pub mod responder;

pub use error::{ResponderError, Result};
pub use guarded::{fallback_reply, GuardedResponder, Reply};
pub use keyword::{KeywordResponder, Topic};
pub use responder::ResponseGenerator;

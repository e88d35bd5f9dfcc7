pub mod device;
pub mod dispatch;
pub mod edge;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod resilience;

pub use device::{AuthMethod, Device, Vendor};
pub use dispatch::{EventDispatcher, EventHandler};
pub use error::StreamError;
pub use event::{CanonicalEvent, EventSender, EventState, RawEvent, event_queue};
pub use lifecycle::Lifecycle;

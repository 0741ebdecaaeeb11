//! Worker primitives shared by completion sessions.
//!
//! Everything here is runtime-agnostic: sessions run producers on plain OS
//! threads and talk back to the interactive thread through a bounded
//! [`Mailbox`]. Cancellation is cooperative through [`CancelToken`], and
//! terminal events are signalled through a one-shot [`Latch`].

mod class;
mod latch;
mod mailbox;
mod panic;
mod registry;
mod spawn;
mod token;

pub use class::TaskClass;
pub use latch::Latch;
pub use mailbox::{Mailbox, MailboxReceiver, MailboxRecvError, MailboxSendError, MailboxSender};
pub use panic::panic_message;
pub use registry::{WorkerGuard, WorkerRecord, WorkerRegistry};
pub use spawn::spawn_named_thread;
pub use token::{CancelToken, GenerationClock, Interrupted};

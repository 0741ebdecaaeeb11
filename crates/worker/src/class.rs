/// Execution classes used for thread naming and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Work that runs on, or directly blocks, the interactive thread.
	Interactive,
	/// Producer work on a dedicated thread; cancellable without user impact.
	Background,
}

impl TaskClass {
	/// Stable lowercase name used in log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Background => "background",
		}
	}
}

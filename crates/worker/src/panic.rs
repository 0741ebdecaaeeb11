use std::any::Any;

/// Extracts the message from a panic payload caught with `catch_unwind`.
///
/// Returns `None` when the payload is neither `&str` nor `String`.
pub fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return Some((*msg).to_string());
	}
	payload.downcast_ref::<String>().cloned()
}

use std::any::Any;
use std::panic::{PanicHookInfo, take_hook};
use std::thread;

/// Installs a global panic hook that logs panics via `tracing`.
///
/// Panics in host check tasks are still caught by the monitor at join time.
/// The hook adds the source location, which the join error does not carry.
pub fn install() {
    let previous_hook = take_hook();

    std::panic::set_hook(Box::new(move |panic_info: &PanicHookInfo<'_>| {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let location = panic_info
                .location()
                .map(|loc| format!("{}:{}", loc.file(), loc.line()))
                .unwrap_or_else(|| "<unknown>".to_string());
            let current = thread::current();

            tracing::error!(
                target: "pingwatch::panic",
                thread = current.name().unwrap_or("<unnamed>"),
                location = %location,
                "Panic: {}",
                payload_message(panic_info.payload())
            );
        }));

        previous_hook(panic_info);
    }));
}

/// Text of a panic payload, for `panic!` with a literal or a formatted message.
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

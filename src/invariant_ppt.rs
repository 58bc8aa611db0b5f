//! Runtime invariant checks with contract-test bookkeeping
//!
//! Production code asserts invariants with [`assert_invariant!`]; every check
//! is counted per thread so a test can later prove that the invariants it
//! cares about were actually exercised, not just never violated.
//!
//! # Usage
//!
//! ```rust,ignore
//! use uvc_manager::invariant_ppt::*;
//!
//! assert_invariant!(
//!     session.bound_texture().is_some() == session.is_previewing(),
//!     "bound texture present iff previewing",
//!     "session"
//! );
//!
//! #[test]
//! fn contract_session_lifecycle() {
//!     // ... drive a device through attach/open/preview/detach ...
//!     contract_test("session lifecycle", &["bound texture present iff previewing"]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::thread_local;

thread_local! {
    static INVARIANT_LOG: RefCell<HashMap<String, u64>> = RefCell::new(HashMap::new());
}

/// Assert an invariant and record that it was checked.
///
/// Panics with the context name when the condition is false.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __assert_invariant_impl(condition: bool, message: &str, context: Option<&str>) {
    INVARIANT_LOG.with(|log| {
        *log.borrow_mut().entry(message.to_string()).or_insert(0) += 1;
    });

    if !condition {
        let ctx = context.unwrap_or("unknown");
        log::error!("invariant violated in {}: {}", ctx, message);
        panic!("INVARIANT VIOLATION [{}]: {}", ctx, message);
    }
}

/// Number of times `message` was checked on this thread
pub fn invariant_checks(message: &str) -> u64 {
    INVARIANT_LOG.with(|log| log.borrow().get(message).copied().unwrap_or(0))
}

/// Panic unless every listed invariant was checked at least once on this thread.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let missing: Vec<&str> = required_invariants
        .iter()
        .copied()
        .filter(|inv| invariant_checks(inv) == 0)
        .collect();

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: invariants never checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

/// Forget all recorded checks on this thread
pub fn clear_invariant_log() {
    INVARIANT_LOG.with(|log| log.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checks_are_counted() {
        clear_invariant_log();
        assert_invariant!(true, "counted twice");
        assert_invariant!(true, "counted twice", "test");
        assert_eq!(invariant_checks("counted twice"), 2);
        contract_test("counting", &["counted twice"]);
    }

    #[test]
    #[should_panic(expected = "INVARIANT VIOLATION [test]")]
    fn test_violation_panics() {
        assert_invariant!(false, "always false", "test");
    }

    #[test]
    #[should_panic(expected = "CONTRACT FAILURE")]
    fn test_contract_reports_unchecked() {
        clear_invariant_log();
        contract_test("missing", &["never asserted"]);
    }
}

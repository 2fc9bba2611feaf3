//! [`RepeatGuard`] – withholds an action the decision-maker keeps choosing.
//!
//! The guard keeps a rolling window of the last `threshold` action
//! fingerprints (name plus canonical JSON arguments).  Once the window is full
//! and every entry is identical, [`RepeatGuard::record`] returns `true` and the
//! caller should suppress the action instead of running it again.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use synapse_runtime::repeat_guard::RepeatGuard;
//! use synapse_types::ActionCall;
//!
//! let mut guard = RepeatGuard::new(3);
//! let call = ActionCall { name: "navigate".into(), arguments: json!({"destination": "kitchen"}) };
//!
//! assert!(!guard.record(&call));
//! assert!(!guard.record(&call));
//! assert!(guard.record(&call)); // third identical choice
//! ```

use std::collections::VecDeque;

use synapse_types::ActionCall;

pub const DEFAULT_REPEAT_THRESHOLD: usize = 3;

pub struct RepeatGuard {
    threshold: usize,
    history: VecDeque<String>,
}

impl RepeatGuard {
    /// A `threshold` of 0 disables the guard.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            history: VecDeque::with_capacity(threshold),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Record that `call` was chosen.  Returns `true` when it is the
    /// `threshold`-th identical choice in a row.
    pub fn record(&mut self, call: &ActionCall) -> bool {
        if self.threshold == 0 {
            return false;
        }
        // `serde_json::Value` objects serialize with sorted keys, so equal
        // arguments always render the same.
        self.history.push_back(format!("{}:{}", call.name, call.arguments));
        while self.history.len() > self.threshold {
            self.history.pop_front();
        }
        self.is_stuck()
    }

    pub fn is_stuck(&self) -> bool {
        if self.threshold == 0 || self.history.len() < self.threshold {
            return false;
        }
        let first = &self.history[0];
        self.history.iter().all(|f| f == first)
    }

    /// Forget everything, e.g. after the decision-maker chose to stay idle.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

impl Default for RepeatGuard {
    fn default() -> Self {
        Self::new(DEFAULT_REPEAT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, arguments: serde_json::Value) -> ActionCall {
        ActionCall {
            name: name.into(),
            arguments,
        }
    }

    #[test]
    fn varied_actions_pass() {
        let mut guard = RepeatGuard::new(3);
        assert!(!guard.record(&call("chat", json!({"message": "hi"}))));
        assert!(!guard.record(&call("navigate", json!({"destination": "kitchen"}))));
        assert!(!guard.record(&call("chat", json!({"message": "hi"}))));
    }

    #[test]
    fn different_arguments_are_different_actions() {
        let mut guard = RepeatGuard::new(2);
        assert!(!guard.record(&call("navigate", json!({"destination": "kitchen"}))));
        assert!(!guard.record(&call("navigate", json!({"destination": "store"}))));
        assert!(guard.record(&call("navigate", json!({"destination": "store"}))));
    }

    #[test]
    fn stays_stuck_until_reset() {
        let mut guard = RepeatGuard::new(3);
        let c = call("manipulate", json!({"instruction": "open gripper"}));
        guard.record(&c);
        guard.record(&c);
        assert!(guard.record(&c));
        assert!(guard.record(&c));
        guard.reset();
        assert!(!guard.record(&c));
    }

    #[test]
    fn zero_threshold_disables() {
        let mut guard = RepeatGuard::new(0);
        let c = call("chat", json!({}));
        for _ in 0..5 {
            assert!(!guard.record(&c));
        }
    }
}

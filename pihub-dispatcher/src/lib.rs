// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Translates a received text line into a synchronous handler invocation.
//!
//! A bounded table of 16 slots, each holding a `(target, action, handler)`
//! triple. `execute` tokenises a line, scans the table in slot order for the
//! first case-insensitive match, and invokes its handler while still
//! holding the table lock — the dispatcher never lets a handler run through
//! a slot that another thread is concurrently deregistering.

use std::sync::Mutex;

pub const MAX_COMMANDS: usize = 16;
pub const TARGET_MAX_LEN: usize = 31;
pub const ACTION_MAX_LEN: usize = 31;
pub const ARG_MAX_LEN: usize = 31;
pub const MAX_ARGS: usize = 10;
/// Longest line `execute` accepts, delimiter included.
pub const MAX_BUF_LEN: usize = (TARGET_MAX_LEN + 1) + (ACTION_MAX_LEN + 1) + (ARG_MAX_LEN + 1) * MAX_ARGS;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherError {
    #[error("slot id out of range or empty target/action")]
    InvalidArg,
    #[error("slot id already taken")]
    IdAlreadyTaken,
    #[error("command line is empty")]
    BufEmpty,
    #[error("command line exceeds the maximum buffer size")]
    BufTooLong,
    #[error("command line is missing its action token")]
    CmdIncomplete,
    #[error("a token exceeded its maximum field size")]
    TokenTooLong,
    #[error("more than the maximum number of arguments were supplied")]
    TooManyArgs,
    #[error("no registered command matches target/action")]
    CmdNotFound,
}

/// A handler receives the tokenised argv (not including target/action) and
/// the opaque call context forwarded by the caller of `execute`.
type Handler<C> = Box<dyn Fn(&[&str], &C) + Send + Sync>;

struct Slot<C> {
    target: String,
    action: String,
    handler: Handler<C>,
}

/// Bounded command table plus the lock that serialises registration and
/// execution against it.
pub struct Dispatcher<C> {
    slots: Mutex<[Option<Slot<C>>; MAX_COMMANDS]>,
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Dispatcher<C> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(std::array::from_fn(|_| None)),
        }
    }

    pub fn register(
        &self,
        slot_id: usize,
        target: &str,
        action: &str,
        handler: impl Fn(&[&str], &C) + Send + Sync + 'static,
    ) -> Result<(), DispatcherError> {
        if slot_id >= MAX_COMMANDS || target.is_empty() || action.is_empty() {
            return Err(DispatcherError::InvalidArg);
        }
        let mut slots = self.slots.lock().unwrap();
        if slots[slot_id].is_some() {
            return Err(DispatcherError::IdAlreadyTaken);
        }
        slots[slot_id] = Some(Slot {
            target: target.to_string(),
            action: action.to_string(),
            handler: Box::new(handler),
        });
        Ok(())
    }

    /// Deregistering an empty or out-of-range slot is a no-op.
    pub fn deregister(&self, slot_id: usize) {
        if slot_id >= MAX_COMMANDS {
            return;
        }
        self.slots.lock().unwrap()[slot_id] = None;
    }

    pub fn execute(&self, line: &str, call_ctx: &C) -> Result<(), DispatcherError> {
        let tokenised = tokenise(line)?;
        let slots = self.slots.lock().unwrap();
        for slot in slots.iter().flatten() {
            if slot.target.eq_ignore_ascii_case(tokenised.target)
                && slot.action.eq_ignore_ascii_case(tokenised.action)
            {
                (slot.handler)(&tokenised.argv, call_ctx);
                return Ok(());
            }
        }
        Err(DispatcherError::CmdNotFound)
    }
}

struct Tokenised<'a> {
    target: &'a str,
    action: &'a str,
    argv: Vec<&'a str>,
}

fn tokenise(line: &str) -> Result<Tokenised<'_>, DispatcherError> {
    if line.len() >= MAX_BUF_LEN {
        return Err(DispatcherError::BufTooLong);
    }
    let mut tokens = line.split_whitespace();

    let target = tokens.next().ok_or(DispatcherError::BufEmpty)?;
    if target.len() > TARGET_MAX_LEN {
        return Err(DispatcherError::TokenTooLong);
    }

    let action = tokens.next().ok_or(DispatcherError::CmdIncomplete)?;
    if action.len() > ACTION_MAX_LEN {
        return Err(DispatcherError::TokenTooLong);
    }

    let mut argv = Vec::with_capacity(MAX_ARGS);
    for tok in tokens {
        if tok.len() > ARG_MAX_LEN {
            return Err(DispatcherError::TokenTooLong);
        }
        if argv.len() == MAX_ARGS {
            return Err(DispatcherError::TooManyArgs);
        }
        argv.push(tok);
    }

    Ok(Tokenised { target, action, argv })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn register_rejects_out_of_range_slot_and_empty_names() {
        let d: Dispatcher<()> = Dispatcher::new();
        assert_eq!(
            d.register(16, "gpio", "set", |_, _| {}),
            Err(DispatcherError::InvalidArg)
        );
        assert_eq!(
            d.register(0, "", "set", |_, _| {}),
            Err(DispatcherError::InvalidArg)
        );
    }

    #[test]
    fn register_twice_into_the_same_slot_fails() {
        let d: Dispatcher<()> = Dispatcher::new();
        d.register(0, "gpio", "set", |_, _| {}).unwrap();
        assert_eq!(
            d.register(0, "gpio", "get", |_, _| {}),
            Err(DispatcherError::IdAlreadyTaken)
        );
    }

    #[test]
    fn deregister_of_empty_or_out_of_range_slot_is_a_no_op() {
        let d: Dispatcher<()> = Dispatcher::new();
        d.deregister(0);
        d.deregister(999);
    }

    #[test]
    fn execute_dispatches_the_lower_slot_index_on_a_tie() {
        let d: Dispatcher<AtomicUsize> = Dispatcher::new();
        d.register(5, "gpio", "set", |_, ctx| {
            ctx.store(5, Ordering::SeqCst);
        })
        .unwrap();
        d.register(1, "gpio", "set", |_, ctx| {
            ctx.store(1, Ordering::SeqCst);
        })
        .unwrap();

        let ctx = AtomicUsize::new(0);
        d.execute("gpio set 13 1", &ctx).unwrap();
        assert_eq!(ctx.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn execute_matches_case_insensitively() {
        let d: Dispatcher<AtomicUsize> = Dispatcher::new();
        d.register(0, "gpio", "set", |_, ctx| {
            ctx.store(1, Ordering::SeqCst);
        })
        .unwrap();

        let ctx = AtomicUsize::new(0);
        d.execute("GPIO SeT 13 1", &ctx).unwrap();
        assert_eq!(ctx.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn execute_reports_missing_action() {
        let d: Dispatcher<()> = Dispatcher::new();
        assert_eq!(d.execute("gpio", &()), Err(DispatcherError::CmdIncomplete));
    }

    #[test]
    fn execute_reports_empty_line() {
        let d: Dispatcher<()> = Dispatcher::new();
        assert_eq!(d.execute("   ", &()), Err(DispatcherError::BufEmpty));
    }

    #[test]
    fn execute_reports_too_many_args() {
        let d: Dispatcher<()> = Dispatcher::new();
        d.register(0, "gpio", "set", |_, _| {}).unwrap();
        let line = format!("gpio set {}", (0..=MAX_ARGS).map(|i| i.to_string()).collect::<Vec<_>>().join(" "));
        assert_eq!(d.execute(&line, &()), Err(DispatcherError::TooManyArgs));
    }

    #[test]
    fn execute_reports_token_too_long() {
        let d: Dispatcher<()> = Dispatcher::new();
        let long = "a".repeat(ARG_MAX_LEN + 1);
        assert_eq!(d.execute(&format!("gpio {long}"), &()), Err(DispatcherError::TokenTooLong));
    }

    #[test]
    fn execute_reports_cmd_not_found_when_nothing_matches() {
        let d: Dispatcher<()> = Dispatcher::new();
        d.register(0, "gpio", "set", |_, _| {}).unwrap();
        assert_eq!(d.execute("sensor list", &()), Err(DispatcherError::CmdNotFound));
    }

    #[test]
    fn execute_passes_the_remaining_tokens_as_argv() {
        let d: Dispatcher<Mutex<Vec<String>>> = Dispatcher::new();
        d.register(0, "gpio", "set", |argv, ctx| {
            *ctx.lock().unwrap() = argv.iter().map(|s| s.to_string()).collect();
        })
        .unwrap();

        let ctx = Mutex::new(Vec::new());
        d.execute("gpio set 13 1", &ctx).unwrap();
        assert_eq!(*ctx.lock().unwrap(), vec!["13", "1"]);
    }
}

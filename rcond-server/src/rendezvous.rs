//! Command handoff between the connection worker and the host thread.
//!
//! The worker submits one command and blocks until the host, polling from its
//! own thread, has taken the command, executed it and fulfilled the response.
//! Only one command is ever outstanding, so commands from all clients are
//! executed strictly one after another.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Slot {
    command: Option<String>,
    response: Option<String>,
    awaiting: bool,
    taken: bool,
    cancelled: bool,
}

/// The single pending-command cell shared by worker and host.
#[derive(Debug, Default)]
pub struct PendingCommand {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl PendingCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `command` and blocks until it is fulfilled.
    ///
    /// Returns `None` without waiting if the cell has been cancelled, or as
    /// soon as it is cancelled while waiting.
    pub fn submit(&self, command: String) -> Option<String> {
        let mut slot = self.slot.lock();
        if slot.cancelled {
            return None;
        }

        slot.command = Some(command);
        slot.response = None;
        slot.taken = false;
        slot.awaiting = true;

        while slot.awaiting && !slot.cancelled {
            self.ready.wait(&mut slot);
        }

        slot.command = None;
        if slot.cancelled {
            slot.awaiting = false;
            return None;
        }
        slot.response.take()
    }

    /// Returns whether a submitted command is waiting for its response.
    pub fn is_awaiting(&self) -> bool {
        let slot = self.slot.lock();
        slot.awaiting && !slot.cancelled
    }

    /// Hands the pending command to the host. Each submission is handed out
    /// at most once.
    pub fn take_command(&self) -> Option<String> {
        let mut slot = self.slot.lock();
        if !slot.awaiting || slot.taken || slot.cancelled {
            return None;
        }
        slot.taken = true;
        slot.command.clone()
    }

    /// Stores the response and wakes the submitter. Returns `false` if no
    /// command was awaiting a response.
    pub fn fulfill(&self, response: String) -> bool {
        let mut slot = self.slot.lock();
        if !slot.awaiting || slot.cancelled {
            return false;
        }
        slot.response = Some(response);
        slot.awaiting = false;
        self.ready.notify_all();
        true
    }

    /// Releases any submitter and makes later submissions return at once.
    pub fn cancel(&self) {
        let mut slot = self.slot.lock();
        slot.cancelled = true;
        self.ready.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.slot.lock().cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_until_awaiting(pending: &PendingCommand) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !pending.is_awaiting() {
            assert!(Instant::now() < deadline, "command was never submitted");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_idle_cell() {
        let pending = PendingCommand::new();
        assert!(!pending.is_awaiting());
        assert!(pending.take_command().is_none());
        assert!(!pending.fulfill("ignored".to_string()));
    }

    #[test]
    fn test_submit_and_fulfill() {
        let pending = Arc::new(PendingCommand::new());

        let worker = {
            let pending = pending.clone();
            thread::spawn(move || pending.submit("say hi".to_string()))
        };

        wait_until_awaiting(&pending);
        assert_eq!(pending.take_command().as_deref(), Some("say hi"));
        // Handed out only once
        assert!(pending.take_command().is_none());
        assert!(pending.fulfill("done".to_string()));

        assert_eq!(worker.join().unwrap().as_deref(), Some("done"));
        assert!(!pending.is_awaiting());
    }

    #[test]
    fn test_cancel_releases_waiter() {
        let pending = Arc::new(PendingCommand::new());

        let worker = {
            let pending = pending.clone();
            thread::spawn(move || pending.submit("list".to_string()))
        };

        wait_until_awaiting(&pending);
        pending.cancel();

        assert_eq!(worker.join().unwrap(), None);
        assert!(pending.is_cancelled());
        assert!(!pending.is_awaiting());
    }

    #[test]
    fn test_submit_after_cancel_returns_immediately() {
        let pending = PendingCommand::new();
        pending.cancel();
        assert_eq!(pending.submit("list".to_string()), None);
        assert!(!pending.fulfill("late".to_string()));
    }

    #[test]
    fn test_sequential_submissions() {
        let pending = Arc::new(PendingCommand::new());

        let worker = {
            let pending = pending.clone();
            thread::spawn(move || {
                (0..3)
                    .map(|i| pending.submit(format!("cmd {}", i)))
                    .collect::<Vec<_>>()
            })
        };

        for _ in 0..3 {
            wait_until_awaiting(&pending);
            let command = loop {
                if let Some(command) = pending.take_command() {
                    break command;
                }
                thread::sleep(Duration::from_millis(1));
            };
            assert!(pending.fulfill(command.to_uppercase()));
        }

        let responses = worker.join().unwrap();
        assert_eq!(
            responses,
            vec![
                Some("CMD 0".to_string()),
                Some("CMD 1".to_string()),
                Some("CMD 2".to_string())
            ]
        );
    }
}

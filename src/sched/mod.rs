//! Cooperative Thread Scheduler
//!
//! A FIFO ready queue with explicit yield points. No preemption: a
//! thread runs until it yields, blocks on a device, or terminates. The
//! actual context switch is hardware territory and sits behind the
//! [`Dispatcher`] seam, mirroring how the memory manager drives its MMU.

use alloc::collections::VecDeque;
use core::fmt;

/// Identifies a thread to the scheduler and the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread {}", self.0)
    }
}

/// Performs the hardware context switch to a thread.
pub trait Dispatcher {
    fn dispatch(&mut self, next: ThreadId);
}

/// A point at which the caller gives the CPU away while waiting.
///
/// Device drivers poll through this instead of busy-spinning; the
/// kernel wires it to [`Scheduler::yield_now`].
pub trait Yield {
    fn yield_now(&mut self);
}

impl<F: FnMut()> Yield for F {
    fn yield_now(&mut self) {
        self()
    }
}

/// FIFO run queue.
pub struct Scheduler {
    ready: VecDeque<ThreadId>,
    current: Option<ThreadId>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            current: None,
        }
    }

    /// Hand a new thread to the scheduler.
    pub fn add(&mut self, thread: ThreadId) {
        self.ready.push_back(thread);
    }

    /// Put an unblocked thread back on the ready queue.
    pub fn resume(&mut self, thread: ThreadId) {
        self.ready.push_back(thread);
    }

    /// Give up the CPU.
    ///
    /// Dispatches the queue head if there is one and returns it; with an
    /// empty queue the caller simply keeps running. The yielding thread
    /// is not re-queued — a thread that wants the CPU back resumes
    /// itself before yielding.
    pub fn yield_now<D: Dispatcher>(&mut self, dispatcher: &mut D) -> Option<ThreadId> {
        let next = self.ready.pop_front()?;
        self.current = Some(next);
        dispatcher.dispatch(next);
        Some(next)
    }

    /// Remove a thread from the ready queue.
    ///
    /// No-op if the thread is not queued (it may be running or blocked).
    pub fn terminate(&mut self, thread: ThreadId) {
        if let Some(position) = self.ready.iter().position(|&t| t == thread) {
            self.ready.remove(position);
        }
    }

    /// The thread most recently dispatched.
    pub fn current(&self) -> Option<ThreadId> {
        self.current
    }

    /// Number of threads waiting for the CPU.
    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[derive(Default)]
    struct RecordingDispatcher {
        switches: Vec<ThreadId>,
    }

    impl Dispatcher for RecordingDispatcher {
        fn dispatch(&mut self, next: ThreadId) {
            self.switches.push(next);
        }
    }

    #[test]
    fn dispatches_in_fifo_order() {
        let mut sched = Scheduler::new();
        let mut disp = RecordingDispatcher::default();

        sched.add(ThreadId(1));
        sched.add(ThreadId(2));
        sched.resume(ThreadId(3));

        assert_eq!(sched.yield_now(&mut disp), Some(ThreadId(1)));
        assert_eq!(sched.yield_now(&mut disp), Some(ThreadId(2)));
        assert_eq!(sched.yield_now(&mut disp), Some(ThreadId(3)));
        assert_eq!(disp.switches, [ThreadId(1), ThreadId(2), ThreadId(3)]);
        assert_eq!(sched.current(), Some(ThreadId(3)));
    }

    #[test]
    fn empty_queue_keeps_the_caller_running() {
        let mut sched = Scheduler::new();
        let mut disp = RecordingDispatcher::default();

        assert_eq!(sched.yield_now(&mut disp), None);
        assert!(disp.switches.is_empty());
        assert_eq!(sched.current(), None);
    }

    #[test]
    fn terminate_removes_a_queued_thread() {
        let mut sched = Scheduler::new();
        let mut disp = RecordingDispatcher::default();

        sched.add(ThreadId(1));
        sched.add(ThreadId(2));
        sched.add(ThreadId(3));
        sched.terminate(ThreadId(2));
        // Terminating something unknown changes nothing.
        sched.terminate(ThreadId(9));

        assert_eq!(sched.yield_now(&mut disp), Some(ThreadId(1)));
        assert_eq!(sched.yield_now(&mut disp), Some(ThreadId(3)));
        assert_eq!(sched.yield_now(&mut disp), None);
    }

    #[test]
    fn a_thread_can_resume_itself_before_yielding() {
        let mut sched = Scheduler::new();
        let mut disp = RecordingDispatcher::default();

        sched.add(ThreadId(7));
        sched.yield_now(&mut disp);

        // Polling pattern: re-queue, then give the CPU away.
        sched.resume(ThreadId(7));
        assert_eq!(sched.yield_now(&mut disp), Some(ThreadId(7)));
    }
}

//! # Cooperative Scheduler
//!
//! Drives one resumable task per entity in small steps under a frame budget.
//! A task is an explicit state machine: it keeps its position in its own
//! fields and reports what should happen next as a [`Step`].
//!
//! ```text
//! Continue  next step now, if budget remains
//! Hold      yield; resume at the same point next tick
//! Wait      yield; retry the same step next tick (blocked on the provider)
//! Delay     this item is blocked; the task moved on to the next one
//! Complete  the task committed its results
//! Cancel    abort; nothing the task staged becomes current
//! ```
//!
//! No threads are involved. The budget is checked between steps, never
//! inside one, so a step must be small.

use std::time::{Duration, Instant};

/// Signal a task returns after each step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    /// Proceed immediately if budget remains.
    Continue,
    /// Yield this tick, resume at the same point.
    Hold,
    /// Yield this tick, retry the same step (external dependency pending).
    Wait,
    /// The current sub-item is blocked and was deferred; proceed.
    Delay,
    /// Finished and committed.
    Complete,
    /// Abort the whole task.
    Cancel,
}

/// A resumable unit of work driven by a [`Scheduler`].
pub trait Task {
    /// State handed to every step.
    type Context<'a>;
    /// What a completed task hands back.
    type Output;
    /// Failure reported when a task cancels itself.
    type Error;

    /// Performs one bounded unit of work.
    fn step(&mut self, ctx: &mut Self::Context<'_>) -> Step;

    /// Releases everything staged. Must be idempotent.
    fn cancel(&mut self);

    /// The result of a task that returned [`Step::Complete`].
    fn take_output(&mut self) -> Option<Self::Output>;

    /// The reason the task returned [`Step::Cancel`], if it failed.
    fn take_error(&mut self) -> Option<Self::Error>;
}

/// Per-frame work allowance.
///
/// Combines an optional wall-clock deadline with a step allowance. Tests
/// use step-only budgets so results do not depend on timing.
#[derive(Clone, Copy, Debug)]
pub struct FrameBudget {
    deadline: Option<Instant>,
    steps_left: u32,
    steps_used: u32,
}

impl FrameBudget {
    /// No limit at all.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            deadline: None,
            steps_left: u32::MAX,
            steps_used: 0,
        }
    }

    /// A budget of `steps` steps and no deadline.
    #[must_use]
    pub const fn steps(steps: u32) -> Self {
        Self {
            deadline: None,
            steps_left: steps,
            steps_used: 0,
        }
    }

    /// A wall-clock budget starting now.
    #[must_use]
    pub fn from_duration(budget: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + budget),
            steps_left: u32::MAX,
            steps_used: 0,
        }
    }

    /// A sub-budget sharing this deadline, capped at `max_steps`.
    #[must_use]
    pub fn slice(&self, max_steps: u32) -> Self {
        Self {
            deadline: self.deadline,
            steps_left: self.steps_left.min(max_steps),
            steps_used: 0,
        }
    }

    /// Charges the steps a sub-budget used to this budget.
    pub fn charge(&mut self, slice: &Self) {
        self.steps_left = self.steps_left.saturating_sub(slice.steps_used);
        self.steps_used = self.steps_used.saturating_add(slice.steps_used);
    }

    /// Checks whether no further step may run.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.steps_left == 0 || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Records one step.
    pub fn consume(&mut self) {
        self.steps_left = self.steps_left.saturating_sub(1);
        self.steps_used = self.steps_used.saturating_add(1);
    }

    /// Steps taken against this budget.
    #[must_use]
    pub const fn steps_used(&self) -> u32 {
        self.steps_used
    }
}

impl Default for FrameBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Result of one [`Scheduler::run`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome<O, E> {
    /// No task active.
    Idle,
    /// Budget exhausted or the task held; it resumes next tick.
    Yielded,
    /// The task is blocked on an external dependency.
    Waiting,
    /// The task committed and was retired.
    Completed(Option<O>),
    /// The task cancelled itself; `Some` carries its failure.
    Cancelled(Option<E>),
}

/// Scheduling counters for one entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Steps executed.
    pub steps: u64,
    /// Yields caused by `Hold` or an exhausted budget.
    pub holds: u64,
    /// Ticks spent in `Wait`.
    pub waits: u64,
    /// Items deferred with `Delay`.
    pub delays: u64,
    /// Tasks started.
    pub started: u64,
    /// Tasks completed.
    pub completed: u64,
    /// Tasks cancelled, by themselves or by preemption.
    pub cancelled: u64,
    /// Tasks preempted by a newer one.
    pub preempted: u64,
}

/// Runs at most one task at a time.
#[derive(Debug)]
pub struct Scheduler<T> {
    active: Option<T>,
    stats: SchedulerStats,
}

impl<T: Task> Scheduler<T> {
    /// Creates an idle scheduler.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: None,
            stats: SchedulerStats {
                steps: 0,
                holds: 0,
                waits: 0,
                delays: 0,
                started: 0,
                completed: 0,
                cancelled: 0,
                preempted: 0,
            },
        }
    }

    /// Installs `task`. An already active task is cancelled first.
    pub fn start(&mut self, task: T) {
        if let Some(mut previous) = self.active.take() {
            tracing::warn!("Task started while another is active; cancelling the active task");
            previous.cancel();
            self.stats.cancelled += 1;
            self.stats.preempted += 1;
        }
        self.stats.started += 1;
        self.active = Some(task);
    }

    /// Cancels the active task, if any. Idempotent.
    ///
    /// Returns `true` if a task was cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.active.take() {
            Some(mut task) => {
                task.cancel();
                self.stats.cancelled += 1;
                true
            }
            None => false,
        }
    }

    /// Steps the active task until it yields, finishes or `budget` runs out.
    pub fn run(
        &mut self,
        ctx: &mut T::Context<'_>,
        budget: &mut FrameBudget,
    ) -> RunOutcome<T::Output, T::Error> {
        let Some(task) = self.active.as_mut() else {
            return RunOutcome::Idle;
        };

        loop {
            if budget.is_exhausted() {
                self.stats.holds += 1;
                tracing::trace!("Frame budget exhausted after {} steps", budget.steps_used());
                return RunOutcome::Yielded;
            }
            budget.consume();
            self.stats.steps += 1;

            match task.step(ctx) {
                Step::Continue => {}
                Step::Delay => self.stats.delays += 1,
                Step::Hold => {
                    self.stats.holds += 1;
                    return RunOutcome::Yielded;
                }
                Step::Wait => {
                    self.stats.waits += 1;
                    return RunOutcome::Waiting;
                }
                Step::Complete => {
                    let output = task.take_output();
                    self.stats.completed += 1;
                    self.active = None;
                    return RunOutcome::Completed(output);
                }
                Step::Cancel => {
                    let error = task.take_error();
                    task.cancel();
                    self.stats.cancelled += 1;
                    self.active = None;
                    return RunOutcome::Cancelled(error);
                }
            }
        }
    }

    /// Checks whether a task is active.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// The active task.
    #[inline]
    #[must_use]
    pub const fn active(&self) -> Option<&T> {
        self.active.as_ref()
    }

    /// Scheduling counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &SchedulerStats {
        &self.stats
    }
}

impl<T: Task> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plays back a fixed script of steps, logging into the context.
    struct Scripted {
        script: Vec<Step>,
        cursor: usize,
        staged: Vec<u32>,
        error: Option<&'static str>,
    }

    impl Scripted {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script,
                cursor: 0,
                staged: Vec::new(),
                error: None,
            }
        }
    }

    impl Task for Scripted {
        type Context<'a> = Vec<usize>;
        type Output = usize;
        type Error = &'static str;

        fn step(&mut self, ctx: &mut Vec<usize>) -> Step {
            let step = self.script.get(self.cursor).copied().unwrap_or(Step::Complete);
            ctx.push(self.cursor);
            self.staged.push(1);
            // Wait retries the same position.
            if step != Step::Wait {
                self.cursor += 1;
            }
            if step == Step::Cancel {
                self.error = Some("scripted failure");
            }
            step
        }

        fn cancel(&mut self) {
            self.staged.clear();
        }

        fn take_output(&mut self) -> Option<usize> {
            Some(self.cursor)
        }

        fn take_error(&mut self) -> Option<&'static str> {
            self.error.take()
        }
    }

    #[test]
    fn test_runs_to_completion() {
        let mut scheduler = Scheduler::new();
        scheduler.start(Scripted::new(vec![Step::Continue, Step::Delay, Step::Complete]));

        let mut log = Vec::new();
        let outcome = scheduler.run(&mut log, &mut FrameBudget::unlimited());
        assert_eq!(outcome, RunOutcome::Completed(Some(3)));
        assert_eq!(log, vec![0, 1, 2]);
        assert!(!scheduler.is_active());
        assert_eq!(scheduler.stats().delays, 1);
        assert_eq!(scheduler.stats().completed, 1);
    }

    #[test]
    fn test_budget_preserves_position() {
        let mut scheduler = Scheduler::new();
        scheduler.start(Scripted::new(vec![Step::Continue; 5]));

        let mut log = Vec::new();
        assert_eq!(
            scheduler.run(&mut log, &mut FrameBudget::steps(2)),
            RunOutcome::Yielded
        );
        assert_eq!(log, vec![0, 1]);

        assert_eq!(
            scheduler.run(&mut log, &mut FrameBudget::steps(2)),
            RunOutcome::Yielded
        );
        assert_eq!(log, vec![0, 1, 2, 3]);

        assert_eq!(
            scheduler.run(&mut log, &mut FrameBudget::unlimited()),
            RunOutcome::Completed(Some(6))
        );
    }

    #[test]
    fn test_wait_retries_same_step() {
        let mut scheduler = Scheduler::new();
        scheduler.start(Scripted::new(vec![Step::Wait]));

        let mut log = Vec::new();
        for _ in 0..3 {
            assert_eq!(
                scheduler.run(&mut log, &mut FrameBudget::unlimited()),
                RunOutcome::Waiting
            );
        }
        assert_eq!(log, vec![0, 0, 0]);
        assert_eq!(scheduler.stats().waits, 3);
    }

    #[test]
    fn test_hold_yields() {
        let mut scheduler = Scheduler::new();
        scheduler.start(Scripted::new(vec![Step::Hold, Step::Complete]));

        let mut log = Vec::new();
        assert_eq!(
            scheduler.run(&mut log, &mut FrameBudget::unlimited()),
            RunOutcome::Yielded
        );
        assert_eq!(
            scheduler.run(&mut log, &mut FrameBudget::unlimited()),
            RunOutcome::Completed(Some(2))
        );
    }

    #[test]
    fn test_cancel_reports_error() {
        let mut scheduler = Scheduler::new();
        scheduler.start(Scripted::new(vec![Step::Continue, Step::Cancel]));

        let mut log = Vec::new();
        assert_eq!(
            scheduler.run(&mut log, &mut FrameBudget::unlimited()),
            RunOutcome::Cancelled(Some("scripted failure"))
        );
        assert!(!scheduler.is_active());
        assert_eq!(scheduler.stats().cancelled, 1);
    }

    #[test]
    fn test_start_preempts_active() {
        let mut scheduler = Scheduler::new();
        scheduler.start(Scripted::new(vec![Step::Hold; 3]));
        let mut log = Vec::new();
        let _ = scheduler.run(&mut log, &mut FrameBudget::unlimited());

        scheduler.start(Scripted::new(vec![Step::Complete]));
        assert_eq!(scheduler.stats().preempted, 1);
        assert_eq!(scheduler.active().map(|task| task.cursor), Some(0));

        assert!(scheduler.cancel());
        assert!(!scheduler.cancel());
        assert_eq!(scheduler.run(&mut log, &mut FrameBudget::unlimited()), RunOutcome::Idle);
    }

    #[test]
    fn test_slice_charges_parent() {
        let mut frame = FrameBudget::steps(10);
        let mut slice = frame.slice(4);
        while !slice.is_exhausted() {
            slice.consume();
        }
        frame.charge(&slice);
        assert_eq!(slice.steps_used(), 4);
        assert_eq!(frame.steps_used(), 4);
        assert!(!frame.is_exhausted());

        let mut tight = frame.slice(100);
        for _ in 0..6 {
            tight.consume();
        }
        assert!(tight.is_exhausted());
    }
}

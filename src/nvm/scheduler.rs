//! Round-robin job scheduler
//!
//! Owns the pool of active jobs and drives one pass per tick: exclusive
//! jobs run to completion on their turn, concurrent jobs advance one
//! lockstep pass. Within a pass, one job's agents are never reordered
//! relative to each other.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::agent::World;
use crate::workspace::Workspace;

use super::context::ExecEnv;
use super::error::{Failure, RunResult};
use super::job::{ChildRequest, ConcurrentJob, ExclusiveJob, JobState};

/// Identifier of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

enum ScheduledJob {
    Exclusive(ExclusiveJob),
    Concurrent(ConcurrentJob),
}

struct JobSlot {
    id: JobId,
    job: ScheduledJob,
    /// Concurrent job and context index to release when this job is
    /// reaped.
    parent: Option<(JobId, usize)>,
}

/// The job owner and round-robin driver.
pub struct JobScheduler {
    slots: Vec<JobSlot>,
    next_id: u64,
    halted: Arc<AtomicBool>,
}

impl JobScheduler {
    /// Empty scheduler.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            next_id: 0,
            halted: Arc::new(AtomicBool::new(false)),
        }
    }

    fn allocate_id(&mut self) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Schedule an exclusive job.
    pub fn submit_exclusive(&mut self, job: ExclusiveJob) -> JobId {
        let id = self.allocate_id();
        self.slots.push(JobSlot {
            id,
            job: ScheduledJob::Exclusive(job),
            parent: None,
        });
        id
    }

    /// Schedule a concurrent job.
    pub fn submit_concurrent(&mut self, job: ConcurrentJob) -> JobId {
        let id = self.allocate_id();
        self.slots.push(JobSlot {
            id,
            job: ScheduledJob::Concurrent(job),
            parent: None,
        });
        id
    }

    /// Current state of a job, if it has not been reaped.
    pub fn job_state(&self, id: JobId) -> Option<JobState> {
        self.slots.iter().find(|s| s.id == id).map(|s| match &s.job {
            ScheduledJob::Exclusive(j) => j.state(),
            ScheduledJob::Concurrent(j) => j.state(),
        })
    }

    /// Mutable access to a scheduled concurrent job (dynamic agent joins).
    pub fn concurrent_mut(&mut self, id: JobId) -> Option<&mut ConcurrentJob> {
        self.slots
            .iter_mut()
            .find(|s| s.id == id)
            .and_then(|s| match &mut s.job {
                ScheduledJob::Concurrent(j) => Some(j),
                ScheduledJob::Exclusive(_) => None,
            })
    }

    /// Request a cooperative stop; the job finishes on its own next turn.
    pub fn request_stop(&mut self, id: JobId) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.id == id) {
            match &mut slot.job {
                ScheduledJob::Exclusive(j) => j.request_stop(),
                ScheduledJob::Concurrent(j) => j.request_stop(),
            }
        }
    }

    /// Cancel a job from outside; it is reaped at the end of the next
    /// tick without taking another turn.
    pub fn remove(&mut self, id: JobId) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.id == id) {
            match &mut slot.job {
                ScheduledJob::Exclusive(j) => j.remove(),
                ScheduledJob::Concurrent(j) => j.remove(),
            }
        }
    }

    /// Shared halt flag; contexts observe it between instructions.
    pub fn halt_handle(&self) -> Arc<AtomicBool> {
        self.halted.clone()
    }

    /// Request user cancellation of everything currently running.
    pub fn request_halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    /// Clear the halt flag before resuming scheduling.
    pub fn clear_halt(&self) {
        self.halted.store(false, Ordering::Release);
    }

    /// Whether any job still has unfinished work.
    pub fn has_work(&self) -> bool {
        self.slots.iter().any(|s| {
            matches!(
                match &s.job {
                    ScheduledJob::Exclusive(j) => j.state(),
                    ScheduledJob::Concurrent(j) => j.state(),
                },
                JobState::Running
            )
        })
    }

    /// Number of jobs not yet reaped.
    pub fn pending_count(&self) -> usize {
        self.slots.len()
    }

    /// Drive one round-robin pass over the jobs present at the start of
    /// the tick. Child jobs spawned during the pass run from the next
    /// tick. Finished and removed jobs are reaped at the end of the pass,
    /// releasing any contexts waiting on them; reaping happens even when a
    /// failure escapes, so a failing agent never leaves a parent waiting
    /// forever. The host breathes once per pass.
    pub fn tick(&mut self, world: &mut World, workspace: &dyn Workspace) -> RunResult<()> {
        let halted = self.halted.clone();
        let count = self.slots.len();
        let mut first_failure: Option<Failure> = None;

        for index in 0..count {
            let mut env = ExecEnv::new(world, workspace, &halted);
            let slot = &mut self.slots[index];
            let parent_id = slot.id;
            let mut spawned: Vec<ChildRequest> = Vec::new();
            let outcome = match &mut slot.job {
                ScheduledJob::Exclusive(job) => job.run(&mut env),
                ScheduledJob::Concurrent(job) => match job.step(&mut env) {
                    Ok(children) => {
                        spawned = children;
                        Ok(())
                    }
                    Err(failure) => Err(failure),
                },
            };
            match outcome {
                Ok(()) => {
                    for child in spawned {
                        let spawner = child.parent_context;
                        if let Err(failure) = self.spawn_child(parent_id, child) {
                            self.abort_spawner(parent_id, spawner);
                            first_failure = Some(failure);
                            break;
                        }
                    }
                }
                Err(failure) => first_failure = Some(failure),
            }
            if first_failure.is_some() {
                break;
            }
        }

        self.reap();
        workspace.breathe();

        match first_failure {
            None => Ok(()),
            Some(Failure::Halt) => {
                // Cancellation is not an error: tear everything down and
                // let the signal cross to the embedder untouched.
                debug!("halt observed; finishing all jobs");
                self.finish_all();
                self.reap();
                Err(Failure::Halt)
            }
            Some(failure) => Err(failure),
        }
    }

    /// A child that failed to construct would otherwise leave its spawning
    /// context waiting on a job that never existed. Release the context and
    /// finish the parent job so the end-of-tick reap can drain it.
    fn abort_spawner(&mut self, parent_id: JobId, context_index: usize) {
        if let Some(job) = self.concurrent_mut(parent_id) {
            job.release_waiting(context_index);
            job.finish();
        }
    }

    fn spawn_child(&mut self, parent_id: JobId, request: ChildRequest) -> RunResult<()> {
        let job = ConcurrentJob::from_spawn(request.spawn)?;
        let id = self.allocate_id();
        self.slots.push(JobSlot {
            id,
            job: ScheduledJob::Concurrent(job),
            parent: Some((parent_id, request.parent_context)),
        });
        Ok(())
    }

    fn finish_all(&mut self) {
        for slot in &mut self.slots {
            match &mut slot.job {
                ScheduledJob::Exclusive(j) => j.finish(),
                ScheduledJob::Concurrent(j) => j.finish(),
            }
        }
    }

    fn reap(&mut self) {
        let mut releases: Vec<(JobId, usize)> = Vec::new();
        self.slots.retain(|slot| {
            let state = match &slot.job {
                ScheduledJob::Exclusive(j) => j.state(),
                ScheduledJob::Concurrent(j) => j.state(),
            };
            if state == JobState::Running {
                true
            } else {
                if let Some(parent) = slot.parent {
                    releases.push(parent);
                }
                false
            }
        });
        for (parent_id, context_index) in releases {
            if let Some(job) = self.concurrent_mut(parent_id) {
                job.release_waiting(context_index);
            }
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentKindMask;
    use crate::nvm::context::{Context, ExecEnv};
    use crate::nvm::instruction::{Command, InstructionInfo};
    use crate::nvm::procedure::{Procedure, SourceSpan};
    use crate::workspace::{EngineConfig, HeadlessWorkspace};
    use std::sync::Arc;

    struct Finish {
        info: InstructionInfo,
    }

    impl Command for Finish {
        fn info(&self) -> &InstructionInfo {
            &self.info
        }

        fn perform(&self, ctx: &mut Context, _env: &mut ExecEnv<'_>) -> RunResult<()> {
            ctx.return_from_procedure();
            Ok(())
        }
    }

    fn trivial_procedure() -> Arc<Procedure> {
        Arc::new(Procedure::new(
            "noop",
            0,
            AgentKindMask::ALL,
            vec![Arc::new(Finish {
                info: InstructionInfo::new("END", SourceSpan::synthetic(), AgentKindMask::ALL),
            })],
            SourceSpan::synthetic(),
        ))
    }

    #[test]
    fn test_exclusive_job_reaped_after_tick() {
        let config = EngineConfig::default();
        let mut world = World::new(&config);
        world.create_turtle();
        let ws = HeadlessWorkspace::new();
        let mut scheduler = JobScheduler::new();

        let id =
            scheduler.submit_exclusive(ExclusiveJob::new(world.turtles_agentset(), trivial_procedure()));
        assert_eq!(scheduler.pending_count(), 1);

        scheduler.tick(&mut world, &ws).unwrap();
        assert_eq!(scheduler.pending_count(), 0);
        assert!(scheduler.job_state(id).is_none());
    }

    #[test]
    fn test_removed_job_takes_no_further_turn() {
        let config = EngineConfig::default();
        let mut world = World::new(&config);
        world.create_turtle();
        let ws = HeadlessWorkspace::new();
        let mut scheduler = JobScheduler::new();

        let job = ConcurrentJob::new(&world.turtles_agentset(), trivial_procedure()).unwrap();
        let id = scheduler.submit_concurrent(job);
        scheduler.remove(id);
        assert_eq!(scheduler.job_state(id), Some(JobState::Removed));

        scheduler.tick(&mut world, &ws).unwrap();
        assert!(scheduler.job_state(id).is_none());
    }
}

//! The scheduler (spec.md §4.6): a process-wide priority structure keyed by absolute due-time,
//! drained by a background tick loop.
//!
//! Grounded on the teacher's background-thread-plus-control-channel scheduler shape
//! (`crates/kernel/src/tasks/scheduler.rs`, `timer_thread.rs`), replacing MOO task/fork
//! semantics with the simpler due-time priority queue named in spec.md §4.6 — a plain
//! `BinaryHeap` keyed by due-time rather than the teacher's hierarchical timer wheel, since a
//! single best-effort 100ms tick (spec.md §4.6 "e.g. every 100 ms") has no need for wheel-level
//! amortization (SPEC_FULL.md §4.6, drop noted in DESIGN.md).

use loom_capability::CapabilityStore;
use loom_interpreter::{
    evaluate_verb_body, ExecutionContext, NullSink, OpcodeRegistry, OutboundSink,
};
use loom_repository::Repository;
use loom_values::{EntityId, Var};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Opaque handle returned by [`Scheduler::schedule`], usable with [`Scheduler::cancel`]
/// (SPEC_FULL.md §4.6 "`cancel(handle)`... exposed only as a Rust API on the scheduler
/// handle — no opcode").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ScheduleId(u64);

struct Entry {
    due_ms: i64,
    seq: u64,
    id: ScheduleId,
    entity: EntityId,
    verb_name: String,
    args: Vec<Var>,
}

impl Eq for Entry {}
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due_ms == other.due_ms && self.seq == other.seq
    }
}
impl Ord for Entry {
    /// Reversed so the `BinaryHeap` (a max-heap) pops the *earliest* due entry first, with
    /// insertion order as the tie-break (spec.md §4.6 "drains due entries").
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due_ms
            .cmp(&self.due_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

struct Queue {
    heap: BinaryHeap<Entry>,
    cancelled: HashSet<ScheduleId>,
}

/// Owns the due-time queue, and doubles as the [`loom_interpreter::SchedulerHandle`] that
/// `ExecutionContext` hands to the `schedule` opcode (spec.md §4.4 "a nested verb call
/// inherits..."; SPEC_FULL.md §4.6) so a running verb can enqueue more work on itself without
/// this crate depending back on `loom-stdlib`.
pub struct Scheduler {
    queue: Mutex<Queue>,
    next_seq: AtomicU64,
    next_id: AtomicU64,
    repository: Arc<dyn Repository>,
    capabilities: Arc<CapabilityStore>,
    registry: Arc<OpcodeRegistry>,
    default_gas: i64,
    max_stack_depth: usize,
    /// Self-reference so a scheduled verb invocation's `ExecutionContext` can be handed an
    /// `Arc<dyn SchedulerHandle>` pointing back at this same scheduler, without `tick`/
    /// `invoke` needing to take `self` by `Arc` (which would force every caller to hold one).
    self_handle: Weak<Scheduler>,
}

impl Scheduler {
    pub fn new(
        repository: Arc<dyn Repository>,
        capabilities: Arc<CapabilityStore>,
        registry: Arc<OpcodeRegistry>,
        default_gas: i64,
        max_stack_depth: usize,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Scheduler {
            queue: Mutex::new(Queue {
                heap: BinaryHeap::new(),
                cancelled: HashSet::new(),
            }),
            next_seq: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
            repository,
            capabilities,
            registry,
            default_gas,
            max_stack_depth,
            self_handle: weak.clone(),
        })
    }

    /// Enqueues `verb_name` on `entity` relative to `now + delay_ms` (spec.md §4.6 "`schedule`
    /// opcode enqueues relative to `time.now + delay`"). Returns a handle usable with
    /// [`Self::cancel`].
    pub fn schedule_at(
        &self,
        entity: EntityId,
        verb_name: String,
        args: Vec<Var>,
        delay_ms: i64,
    ) -> ScheduleId {
        let id = ScheduleId(self.next_id.fetch_add(1, AtomicOrdering::SeqCst));
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        let due_ms = now_ms() + delay_ms;
        let mut queue = self.queue.lock().unwrap();
        queue.heap.push(Entry {
            due_ms,
            seq,
            id,
            entity,
            verb_name,
            args,
        });
        id
    }

    /// Cancels a previously scheduled, not-yet-fired entry (SPEC_FULL.md §4.6). A no-op if the
    /// entry already fired or was already cancelled.
    pub fn cancel(&self, id: ScheduleId) {
        self.queue.lock().unwrap().cancelled.insert(id);
    }

    pub fn pending_count(&self) -> usize {
        let queue = self.queue.lock().unwrap();
        queue.heap.iter().filter(|e| !queue.cancelled.contains(&e.id)).count()
    }

    /// Pops and returns every entry due at or before `now`, skipping cancelled ones (spec.md
    /// §4.6 "A background loop... drains due entries").
    fn drain_due(&self) -> Vec<Entry> {
        let now = now_ms();
        let mut queue = self.queue.lock().unwrap();
        let mut due = Vec::new();
        while let Some(top) = queue.heap.peek() {
            if top.due_ms > now {
                break;
            }
            let entry = queue.heap.pop().unwrap();
            if queue.cancelled.remove(&entry.id) {
                continue;
            }
            due.push(entry);
        }
        due
    }

    /// Fetches `entry.verb_name` on `entry.entity` by prototype walk and invokes it with a
    /// fresh context: `caller = this = entity` (spec.md §4.6 "invokes it with a fresh context
    /// (caller = `this` = the entity...)"), a default gas budget, and no connected client
    /// (`NullSink`). This context still carries `self` as the scheduler handle, so a scheduled
    /// verb can reschedule itself.
    fn invoke(&self, entry: Entry) {
        let verb = match self.repository.get_verb(entry.entity, &entry.verb_name) {
            Ok(Some(v)) => v,
            Ok(None) => {
                tracing::warn!(entity = %entry.entity, verb = %entry.verb_name, "scheduled verb not found");
                return;
            }
            Err(e) => {
                tracing::warn!(entity = %entry.entity, verb = %entry.verb_name, error = %e, "scheduled verb lookup failed");
                return;
            }
        };
        let mut ctx = ExecutionContext::new(
            entry.entity,
            entry.entity,
            entry.args,
            self.default_gas,
            self.max_stack_depth,
            self.repository.clone(),
            self.capabilities.clone(),
            self.registry.clone(),
            Arc::new(NullSink) as Arc<dyn OutboundSink>,
            self.self_handle
                .upgrade()
                .map(|s| s as Arc<dyn loom_interpreter::SchedulerHandle>),
        );
        // Failures during scheduled execution are logged; they do not terminate the
        // scheduler (spec.md §4.6).
        if let Err(e) = evaluate_verb_body(&verb.code, &mut ctx) {
            tracing::warn!(entity = %entry.entity, verb = %entry.verb_name, error = %e, "scheduled verb invocation failed");
        }
    }

    /// One tick: drain and invoke everything currently due.
    pub fn tick(&self) {
        for entry in self.drain_due() {
            self.invoke(entry);
        }
    }

    /// Runs the tick loop forever on the current Tokio task (spec.md §4.6 "A background loop,
    /// driven by a monotonic tick (e.g. every 100 ms)"). Intended to be `tokio::spawn`ed once
    /// by the daemon at startup.
    pub async fn run(self: Arc<Self>, tick_interval: Duration) {
        let mut interval = tokio::time::interval(tick_interval);
        loop {
            interval.tick().await;
            self.tick();
        }
    }
}

impl loom_interpreter::SchedulerHandle for Scheduler {
    fn schedule(&self, entity: EntityId, verb_name: String, args: Vec<Var>, delay_ms: i64) {
        self.schedule_at(entity, verb_name, args, delay_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_capability::CapabilityStore;
    use loom_interpreter::register_core_opcodes;
    use loom_repository::memory::MemoryRepository;
    use loom_repository::VerbPermissions;
    use loom_values::{EntityKind, Map};

    // The scheduler crate sits below loom-stdlib in the dependency graph (spec.md §2), so its
    // own unit tests only need the core opcodes (a bare `seq` body is enough to exercise
    // `tick`/`cancel`) — no list/object/entity families are required.
    fn scheduler() -> (Arc<Scheduler>, Arc<dyn Repository>) {
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let caps = Arc::new(CapabilityStore::new(repo.clone()));
        let mut registry = OpcodeRegistry::new();
        register_core_opcodes(&mut registry);
        let scheduler = Scheduler::new(repo.clone(), caps, Arc::new(registry), 10_000, 64);
        (scheduler, repo)
    }

    #[test]
    fn tick_invokes_a_due_verb_and_not_a_future_one() {
        let (scheduler, repo) = scheduler();
        let e = repo
            .create_entity(None, None, None, EntityKind::Item, Map::new())
            .unwrap();
        repo.add_verb(
            e.id,
            "ping",
            Var::list_from(vec![Var::str("seq")]),
            VerbPermissions::Public,
            vec![],
            e.id,
        )
        .unwrap();

        scheduler.schedule_at(e.id, "ping".to_string(), vec![], -10);
        scheduler.schedule_at(e.id, "ping".to_string(), vec![], 60_000);
        assert_eq!(scheduler.pending_count(), 2);

        scheduler.tick();
        // Only the already-due entry fired; the far-future one remains queued.
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn cancel_prevents_a_pending_entry_from_firing() {
        let (scheduler, repo) = scheduler();
        let e = repo
            .create_entity(None, None, None, EntityKind::Item, Map::new())
            .unwrap();
        repo.add_verb(
            e.id,
            "ping",
            Var::list_from(vec![Var::str("seq")]),
            VerbPermissions::Public,
            vec![],
            e.id,
        )
        .unwrap();

        let id = scheduler.schedule_at(e.id, "ping".to_string(), vec![], -10);
        scheduler.cancel(id);
        scheduler.tick();
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn missing_verb_logs_and_does_not_panic() {
        let (scheduler, repo) = scheduler();
        let e = repo
            .create_entity(None, None, None, EntityKind::Item, Map::new())
            .unwrap();
        scheduler.schedule_at(e.id, "nonexistent".to_string(), vec![], -10);
        scheduler.tick();
    }
}

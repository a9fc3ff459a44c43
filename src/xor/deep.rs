//! Hierarchical comparison on a pool of worker threads.
//!
//! A [`DeepJob`] holds one [`XorTask`] per compared layer pair. Workers pull tasks from a
//! shared cursor until the queue is exhausted or a task fails. Every worker owns its own
//! [`HierarchyCache`], so the hierarchy traversal never takes a lock. A task computes the
//! XOR once and derives every tolerance level from the previous one, then publishes one
//! result per level.
//!
//! Results are never written into the output layout by the workers. Once all workers have
//! been joined, [`DeepJob::deliver`] copies the result hierarchies into the output layout on
//! the calling thread.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
};

use strum::Display;
use tracing::{debug, info};

use crate::{
    db::{CellIndex, Instance, LayerIndex, Layout},
    xor::{
        DeepRegion, HierarchicalXor, HierarchyCache, LayerIdentity, LayerPair, PendingResult,
        ResultKey, XorContext,
    },
    Error, Result,
};

/// Life cycle of a [`DeepJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum JobState {
    /// Tasks may be added
    Idle,
    /// Workers are computing
    Running,
    /// Waiting for the workers to finish
    Draining,
    /// Results are copied into the output layout
    Delivering,
    /// All work is done
    Done,
}

/// One layer pair across the full tolerance schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XorTask {
    /// Identity of the compared layer
    pub layer: LayerIdentity,
    /// Layer indexes in both inputs
    pub pair: LayerPair,
}

/// A batch of hierarchical comparisons.
#[derive(Debug)]
pub struct DeepJob<'c, 'a> {
    ctx: &'c XorContext<'a>,
    tasks: Vec<XorTask>,
    state: JobState,
}

impl<'c, 'a> DeepJob<'c, 'a> {
    /// Creates an idle job without tasks.
    #[must_use]
    pub fn new(ctx: &'c XorContext<'a>) -> Self {
        Self {
            ctx,
            tasks: Vec::new(),
            state: JobState::Idle,
        }
    }

    /// Creates a job with one task per compared layer pair of `ctx`.
    #[must_use]
    pub fn for_context(ctx: &'c XorContext<'a>) -> Self {
        let mut job = Self::new(ctx);
        for (layer, pair) in ctx.compared_pairs() {
            job.add_task(XorTask { layer, pair });
        }
        job
    }

    /// Queues a task. Tasks added after the job started are ignored.
    pub fn add_task(&mut self, task: XorTask) {
        if self.state == JobState::Idle {
            self.tasks.push(task);
        }
    }

    /// The queued tasks.
    #[must_use]
    pub fn tasks(&self) -> &[XorTask] {
        &self.tasks
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Runs all tasks and waits for the workers.
    ///
    /// # Errors
    ///
    /// Returns the first task error; the remaining tasks are skipped. A panicking worker is
    /// reported as [`Error::WorkerFailed`].
    pub fn run(&mut self) -> Result<()> {
        if self.state != JobState::Idle {
            return Err(Error::Error(format!("job cannot run in state {}", self.state)));
        }
        self.ctx.record_missing_layers()?;

        let workers = self.ctx.threads.clamp(1, self.tasks.len().max(1));
        info!(tasks = self.tasks.len(), workers, "starting deep comparison");

        let ctx = self.ctx;
        let tasks = &self.tasks;
        let cursor = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);

        self.state = JobState::Running;
        let outcome = thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| s.spawn(|| work(ctx, tasks, &cursor, &abort)))
                .collect();
            self.state = JobState::Draining;

            let mut first_error = None;
            for handle in handles {
                let joined = handle
                    .join()
                    .map_err(|e| Error::WorkerFailed(panic_message(e.as_ref())))
                    .and_then(|r| r);
                match joined {
                    Ok(done) => debug!(done, "worker finished"),
                    Err(e) => {
                        abort.store(true, Ordering::Release);
                        first_error.get_or_insert(e);
                    }
                }
            }
            first_error.map_or(Ok(()), Err)
        });

        if outcome.is_err() {
            self.state = JobState::Done;
        }
        outcome
    }

    /// Copies all non-empty results into `output`.
    ///
    /// Nothing is written without an output target in the context. The job is done afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the job has not been run or the output layout rejects a cell.
    pub fn deliver(&mut self, output: Option<&mut Layout>) -> Result<()> {
        if self.state != JobState::Draining {
            return Err(Error::Error(format!(
                "job cannot deliver in state {}",
                self.state
            )));
        }
        self.state = JobState::Delivering;
        let delivered = match (output, &self.ctx.output) {
            (Some(layout), Some(_)) => self.deliver_into(layout),
            _ => Ok(0),
        };
        self.state = JobState::Done;

        let delivered = delivered?;
        debug!(delivered, "deep results delivered");
        Ok(())
    }

    fn deliver_into(&self, layout: &mut Layout) -> Result<usize> {
        let mut delivered = 0;
        layout.start_changes();
        let written = self.ctx.results.to_vec().into_iter().try_for_each(|(_, d)| {
            let (Some(PendingResult::Deep(region)), Some(layer), Some(top)) =
                (&d.pending_region, d.layer_output, d.top_cell)
            else {
                return Ok(());
            };
            if region.is_empty() {
                return Ok(());
            }
            delivered += 1;
            insert_deep_region(layout, top, layer, region)
        });
        layout.end_changes();
        written.map(|()| delivered)
    }
}

/// Worker loop: process tasks until the queue is empty or the job aborts.
fn work(
    ctx: &XorContext<'_>,
    tasks: &[XorTask],
    cursor: &AtomicUsize,
    abort: &AtomicBool,
) -> Result<usize> {
    let mut cache = HierarchyCache::new();
    let mut done = 0;
    while !abort.load(Ordering::Acquire) {
        let Some(task) = tasks.get(cursor.fetch_add(1, Ordering::AcqRel)) else {
            break;
        };
        if let Err(e) = process(ctx, task, &mut cache) {
            abort.store(true, Ordering::Release);
            return Err(e);
        }
        done += 1;
    }
    Ok(done)
}

fn process(ctx: &XorContext<'_>, task: &XorTask, cache: &mut HierarchyCache) -> Result<()> {
    let mut current = HierarchicalXor::new(ctx.a, ctx.b, task.pair.a, task.pair.b, cache)
        .run(ctx.top_a, ctx.top_b);
    let keep = ctx.keeps_geometry() || ctx.output.is_some();

    // each level is derived from the previous one
    for (index, tolerance) in ctx.tolerances.iter() {
        let half = ctx.tolerances.half(index);
        if half > 0 {
            current = current.opened(half);
        }

        let key = ResultKey::new(index, task.layer.clone());
        let mut descriptor = ctx.descriptor(&key, &task.pair);
        descriptor.shape_count = current.hier_count();
        descriptor.flat_shape_count = current.flat_count();
        if keep {
            descriptor.pending_region = Some(PendingResult::Deep(current.clone()));
        }
        debug!(
            layer = %task.layer,
            tolerance,
            hier = descriptor.shape_count,
            flat = descriptor.flat_shape_count,
            "deep result"
        );
        ctx.results.publish(key, descriptor)?;
    }
    Ok(())
}

/// Recreates the cells of `region` below `top`; the region's top cell maps to `top` itself.
fn insert_deep_region(
    layout: &mut Layout,
    top: CellIndex,
    layer: LayerIndex,
    region: &DeepRegion,
) -> Result<()> {
    let mut created: HashMap<usize, CellIndex> = HashMap::new();
    created.insert(region.top(), top);
    fill_cell(layout, layer, region, region.top(), &mut created)
}

fn fill_cell(
    layout: &mut Layout,
    layer: LayerIndex,
    region: &DeepRegion,
    index: usize,
    created: &mut HashMap<usize, CellIndex>,
) -> Result<()> {
    let (Some(cell), Some(target)) = (region.cells().get(index), created.get(&index).copied())
    else {
        return Ok(());
    };
    for rect in cell.region.rects() {
        layout.insert(target, layer, *rect)?;
    }
    for instance in &cell.instances {
        let child = match created.get(&instance.cell) {
            Some(child) => *child,
            None => {
                let name = region
                    .cells()
                    .get(instance.cell)
                    .map_or("XOR", |c| c.name.as_str());
                let child = layout.add_cell(&layout.unique_cell_name(name))?;
                created.insert(instance.cell, child);
                fill_cell(layout, layer, region, instance.cell, created)?;
                child
            }
        };
        layout.insert_instance(target, Instance::new(child, instance.trans))?;
    }
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(missing_docs, clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(clippy::module_name_repetitions)]

//! `PacketPipeline`: an ordered, lock-free-dispatch chain of frame processors with bounded
//! recirculation (§4.3).

use concurrency::{Arc, Mutex};
use net::packet::{Direction, PacketBuffer};
use tracectl::LevelFilter;
use tracectl::trace_target;
use tracing::error;

trace_target!(LevelFilter::INFO, &["pipeline"]);

/// Maximum number of processors a single pipeline may hold.
pub const MAX_PROCESSORS: usize = 64;

/// Maximum number of times a single originally-injected frame may recirculate before being
/// dropped.
pub const MAX_RECIRCULATION_DEPTH: u32 = 16;

/// Opaque handle to a registered processor, returned by [`PacketPipeline::register`].
pub type ProcessorHandle = id::Id<Registration>;

/// Marker type `ProcessorHandle` is parameterized over; never constructed.
pub struct Registration;

/// What a processor decided to do with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorAction {
    /// Continue to the next processor in priority order (the default outcome).
    Forward,
    /// Stop processing; the frame is dropped and the pipeline's drop counter increments.
    Drop,
    /// Stop processing without counting the frame as dropped (e.g. it was queued elsewhere).
    Consume,
    /// Restart processing from the first processor in priority order.
    Recirculate,
}

/// The final disposition of a call to [`PacketPipeline::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every processor returned `Forward`; the frame reached the end of the chain.
    Forwarded,
    /// A processor returned `Drop`, or recirculation depth was exceeded.
    Dropped,
    /// A processor returned `Consume`.
    Consumed,
}

/// A single frame-processing stage. Implementors may hold internal state (e.g. counters or
/// references to shared engines) behind their own synchronization.
pub trait Processor: Send {
    /// Human-readable name, used in logging.
    fn name(&self) -> &str;

    /// Inspect and possibly mutate `frame`, returning how the pipeline should proceed.
    fn process(&mut self, frame: &mut PacketBuffer) -> ProcessorAction;
}

/// Errors raised by `PacketPipeline` registration operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// The pipeline already holds [`MAX_PROCESSORS`] registrations.
    #[error("pipeline is full: at most {MAX_PROCESSORS} processors may be registered")]
    Full,
    /// The given handle does not correspond to a currently-registered processor.
    #[error("no processor registered under this handle")]
    UnknownHandle,
}

struct Entry {
    priority: i32,
    handle: ProcessorHandle,
    processor: Arc<Mutex<dyn Processor>>,
}

#[derive(Default)]
struct Stats {
    dropped: u64,
    consumed: u64,
    forwarded: u64,
    recirculation_exceeded: u64,
}

/// Ordered chain of processors, dispatched in ascending priority order with bounded
/// recirculation. Registration/unregistration are serialized by a lock; `process` snapshots the
/// registration list under that lock, then releases it before invoking any processor, so
/// processors may freely re-enter the pipeline (e.g. to `inject` a derived frame).
pub struct PacketPipeline {
    entries: Arc<Mutex<Vec<Entry>>>,
    stats: Arc<Mutex<Stats>>,
}

impl Default for PacketPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketPipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(Stats::default())),
        }
    }

    /// Register a processor at the given priority (lower runs earlier). Ties break by
    /// registration order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Full`] if [`MAX_PROCESSORS`] registrations already exist.
    pub fn register(
        &self,
        priority: i32,
        processor: impl Processor + 'static,
    ) -> Result<ProcessorHandle, PipelineError> {
        let mut entries = self.entries.lock();
        if entries.len() >= MAX_PROCESSORS {
            return Err(PipelineError::Full);
        }
        let handle = ProcessorHandle::new();
        let pos = entries.partition_point(|e| e.priority <= priority);
        entries.insert(
            pos,
            Entry {
                priority,
                handle,
                processor: Arc::new(Mutex::new(processor)),
            },
        );
        Ok(handle)
    }

    /// Remove a previously-registered processor.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownHandle`] if `handle` is not currently registered.
    pub fn unregister(&self, handle: ProcessorHandle) -> Result<(), PipelineError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.handle != handle);
        if entries.len() == before {
            return Err(PipelineError::UnknownHandle);
        }
        Ok(())
    }

    /// Number of processors currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if no processors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<Mutex<dyn Processor>>> {
        self.entries.lock().iter().map(|e| Arc::clone(&e.processor)).collect()
    }

    /// Run `frame` through the registered processors in priority order, honoring
    /// drop/consume/recirculate semantics and the bounded recirculation depth.
    pub fn process(&self, frame: &mut PacketBuffer) -> PipelineOutcome {
        let mut depth: u32 = 0;
        loop {
            let snapshot = self.snapshot();
            let mut recirculate = false;
            let mut stop = None;
            for processor in &snapshot {
                match processor.lock().process(frame) {
                    ProcessorAction::Forward => {}
                    ProcessorAction::Drop => {
                        stop = Some(PipelineOutcome::Dropped);
                        break;
                    }
                    ProcessorAction::Consume => {
                        stop = Some(PipelineOutcome::Consumed);
                        break;
                    }
                    ProcessorAction::Recirculate => {
                        recirculate = true;
                        break;
                    }
                }
            }
            if let Some(outcome) = stop {
                let mut stats = self.stats.lock();
                match outcome {
                    PipelineOutcome::Dropped => stats.dropped += 1,
                    PipelineOutcome::Consumed => stats.consumed += 1,
                    PipelineOutcome::Forwarded => {}
                }
                return outcome;
            }
            if recirculate {
                depth += 1;
                if depth > MAX_RECIRCULATION_DEPTH {
                    error!("frame exceeded recirculation depth {MAX_RECIRCULATION_DEPTH}; dropping");
                    self.stats.lock().recirculation_exceeded += 1;
                    self.stats.lock().dropped += 1;
                    return PipelineOutcome::Dropped;
                }
                continue;
            }
            self.stats.lock().forwarded += 1;
            return PipelineOutcome::Forwarded;
        }
    }

    /// Inject a frame as though originated by the switch core itself: sets
    /// `direction = Internal` and runs it through [`Self::process`].
    pub fn inject(&self, frame: &mut PacketBuffer) -> PipelineOutcome {
        frame.meta_mut().direction = Direction::Internal;
        self.process(frame)
    }

    /// Deliver a frame received on `ingress_port`: sets `direction = Rx` and the ingress port,
    /// then runs it through [`Self::process`].
    pub fn receive(&self, frame: &mut PacketBuffer, ingress_port: u16) -> PipelineOutcome {
        frame.meta_mut().direction = Direction::Rx;
        frame.meta_mut().ingress_port = Some(u32::from(ingress_port));
        self.process(frame)
    }

    /// Total frames dropped (by a processor or by recirculation-depth exhaustion).
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.stats.lock().dropped
    }

    /// Total frames consumed.
    #[must_use]
    pub fn consumed_count(&self) -> u64 {
        self.stats.lock().consumed
    }

    /// Total frames that reached the end of the chain.
    #[must_use]
    pub fn forwarded_count(&self) -> u64 {
        self.stats.lock().forwarded
    }

    /// Total frames dropped specifically due to exceeding the recirculation depth.
    #[must_use]
    pub fn recirculation_exceeded_count(&self) -> u64 {
        self.stats.lock().recirculation_exceeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingProcessor {
        name: &'static str,
        action: ProcessorAction,
        calls: u32,
    }

    impl Processor for CountingProcessor {
        fn name(&self) -> &str {
            self.name
        }

        fn process(&mut self, _frame: &mut PacketBuffer) -> ProcessorAction {
            self.calls += 1;
            self.action
        }
    }

    struct RecirculateOnceThenForward {
        fired: bool,
    }

    impl Processor for RecirculateOnceThenForward {
        fn name(&self) -> &str {
            "recirculate-once"
        }

        fn process(&mut self, _frame: &mut PacketBuffer) -> ProcessorAction {
            if self.fired {
                ProcessorAction::Forward
            } else {
                self.fired = true;
                ProcessorAction::Recirculate
            }
        }
    }

    struct AlwaysRecirculate;

    impl Processor for AlwaysRecirculate {
        fn name(&self) -> &str {
            "always-recirculate"
        }

        fn process(&mut self, _frame: &mut PacketBuffer) -> ProcessorAction {
            ProcessorAction::Recirculate
        }
    }

    #[test]
    fn empty_pipeline_forwards() {
        let pipeline = PacketPipeline::new();
        let mut frame = PacketBuffer::allocate(64);
        assert_eq!(pipeline.process(&mut frame), PipelineOutcome::Forwarded);
        assert_eq!(pipeline.forwarded_count(), 1);
    }

    #[test]
    fn processors_run_in_priority_order() {
        let pipeline = PacketPipeline::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        struct Recorder {
            order: Arc<Mutex<Vec<&'static str>>>,
            tag: &'static str,
        }
        impl Processor for Recorder {
            fn name(&self) -> &str {
                self.tag
            }
            fn process(&mut self, _frame: &mut PacketBuffer) -> ProcessorAction {
                self.order.lock().push(self.tag);
                ProcessorAction::Forward
            }
        }
        pipeline
            .register(
                10,
                Recorder {
                    order: Arc::clone(&order),
                    tag: "second",
                },
            )
            .unwrap();
        pipeline
            .register(
                1,
                Recorder {
                    order: Arc::clone(&order),
                    tag: "first",
                },
            )
            .unwrap();
        let mut frame = PacketBuffer::allocate(64);
        pipeline.process(&mut frame);
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn drop_stops_processing_and_counts() {
        let pipeline = PacketPipeline::new();
        pipeline
            .register(
                1,
                CountingProcessor {
                    name: "dropper",
                    action: ProcessorAction::Drop,
                    calls: 0,
                },
            )
            .unwrap();
        pipeline
            .register(
                2,
                CountingProcessor {
                    name: "never-called",
                    action: ProcessorAction::Forward,
                    calls: 0,
                },
            )
            .unwrap();
        let mut frame = PacketBuffer::allocate(64);
        assert_eq!(pipeline.process(&mut frame), PipelineOutcome::Dropped);
        assert_eq!(pipeline.dropped_count(), 1);
    }

    #[test]
    fn consume_stops_processing_without_drop_count() {
        let pipeline = PacketPipeline::new();
        pipeline
            .register(
                1,
                CountingProcessor {
                    name: "consumer",
                    action: ProcessorAction::Consume,
                    calls: 0,
                },
            )
            .unwrap();
        let mut frame = PacketBuffer::allocate(64);
        assert_eq!(pipeline.process(&mut frame), PipelineOutcome::Consumed);
        assert_eq!(pipeline.consumed_count(), 1);
        assert_eq!(pipeline.dropped_count(), 0);
    }

    #[test]
    fn recirculate_restarts_from_first_processor() {
        let pipeline = PacketPipeline::new();
        pipeline.register(1, RecirculateOnceThenForward { fired: false }).unwrap();
        let mut frame = PacketBuffer::allocate(64);
        assert_eq!(pipeline.process(&mut frame), PipelineOutcome::Forwarded);
    }

    #[test]
    fn recirculation_depth_is_bounded() {
        let pipeline = PacketPipeline::new();
        pipeline.register(1, AlwaysRecirculate).unwrap();
        let mut frame = PacketBuffer::allocate(64);
        assert_eq!(pipeline.process(&mut frame), PipelineOutcome::Dropped);
        assert_eq!(pipeline.recirculation_exceeded_count(), 1);
    }

    #[test]
    fn registration_is_capped_at_max_processors() {
        let pipeline = PacketPipeline::new();
        for i in 0..MAX_PROCESSORS {
            pipeline
                .register(
                    i as i32,
                    CountingProcessor {
                        name: "filler",
                        action: ProcessorAction::Forward,
                        calls: 0,
                    },
                )
                .unwrap();
        }
        assert_eq!(
            pipeline.register(1000, CountingProcessor { name: "overflow", action: ProcessorAction::Forward, calls: 0 }),
            Err(PipelineError::Full)
        );
    }

    #[test]
    fn unregister_removes_processor() {
        let pipeline = PacketPipeline::new();
        let handle = pipeline
            .register(
                1,
                CountingProcessor {
                    name: "one",
                    action: ProcessorAction::Forward,
                    calls: 0,
                },
            )
            .unwrap();
        assert_eq!(pipeline.len(), 1);
        pipeline.unregister(handle).unwrap();
        assert_eq!(pipeline.len(), 0);
    }

    #[test]
    fn unregister_unknown_handle_errors() {
        let pipeline = PacketPipeline::new();
        assert!(matches!(
            pipeline.unregister(ProcessorHandle::new()),
            Err(PipelineError::UnknownHandle)
        ));
    }
}

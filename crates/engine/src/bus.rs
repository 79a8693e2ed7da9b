// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus: ordered fan-out from every component to every sink
//!
//! A single dispatcher task consumes the ingress channel, so consumers
//! observe events in ingress order. Each sink gets its own bounded
//! queue drained by its own worker; a slow sink therefore cannot stall
//! the run or the other sinks. When a queue is full its oldest
//! non-essential event is evicted first: state transitions are never
//! dropped, and in the all-essential corner case the queue grows past
//! its cap instead.
//!
//! `stream_activity` is additionally throttled for sinks that ask for
//! it: within a one-second window per step only the most recent
//! activity is forwarded (most-recent-wins). Unthrottled sinks (NDJSON)
//! receive every event.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use wave_core::{Clock, Event, PipelineId, StepId, StepState};

/// Ingress capacity; essential publishes block when full, so nothing
/// essential is ever lost.
const INGRESS_CAPACITY: usize = 256;

/// Per-sink queue capacity before non-essential eviction starts.
const SINK_QUEUE_CAPACITY: usize = 64;

/// Throttle window for `stream_activity` coalescing.
const THROTTLE_WINDOW: Duration = Duration::from_secs(1);

/// Heartbeat period for sinks that opt in.
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

/// A consumer of the run's event stream.
pub trait EventSink: Send + 'static {
    fn emit(&mut self, event: &Event);

    /// Coalesce `stream_activity` to at most one per step per second.
    fn throttle_stream(&self) -> bool {
        false
    }

    /// Receive a `heartbeat` event every 30 seconds.
    fn wants_heartbeat(&self) -> bool {
        false
    }
}

/// Behavior flags captured from a sink at registration.
#[derive(Debug, Clone, Copy)]
pub struct SinkConfig {
    pub throttle_stream: bool,
    pub wants_heartbeat: bool,
}

struct SinkQueue {
    events: Mutex<VecDeque<Event>>,
    notify: Notify,
    closed: AtomicBool,
}

impl SinkQueue {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Enqueue, evicting the oldest non-essential event on overflow.
    fn push(&self, event: Event) {
        {
            let mut events = self.events.lock();
            if events.len() >= SINK_QUEUE_CAPACITY {
                if let Some(pos) = events.iter().position(|e| !e.is_essential()) {
                    events.remove(pos);
                }
            }
            events.push_back(event);
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    async fn drain(self: Arc<Self>, mut sink: Box<dyn EventSink>) {
        loop {
            let next = self.events.lock().pop_front();
            match next {
                Some(event) => sink.emit(&event),
                None => {
                    if self.closed.load(Ordering::Acquire) {
                        break;
                    }
                    self.notify.notified().await;
                }
            }
        }
    }
}

struct SinkHandle {
    queue: Arc<SinkQueue>,
    config: SinkConfig,
    worker: JoinHandle<()>,
}

/// Publisher handle for the run's event stream.
///
/// Cheap to clone; the dispatcher shuts down once every clone is
/// dropped and the ingress channel drains.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<Event>,
}

impl EventBus {
    /// Start the bus for one run and hand back the dispatcher handle.
    ///
    /// Await the handle after dropping every publisher clone: it
    /// resolves when all sinks have drained.
    pub fn start<C: Clock>(
        pipeline_id: PipelineId,
        clock: C,
        sinks: Vec<Box<dyn EventSink>>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(INGRESS_CAPACITY);

        let handles: Vec<SinkHandle> = sinks
            .into_iter()
            .map(|sink| {
                let config = SinkConfig {
                    throttle_stream: sink.throttle_stream(),
                    wants_heartbeat: sink.wants_heartbeat(),
                };
                let queue = SinkQueue::new();
                let worker = tokio::spawn(Arc::clone(&queue).drain(sink));
                SinkHandle {
                    queue,
                    config,
                    worker,
                }
            })
            .collect();

        let dispatcher = tokio::spawn(dispatch(pipeline_id, clock, rx, handles));
        (Self { tx }, dispatcher)
    }

    /// Publish an event.
    ///
    /// Essential events (state transitions) apply backpressure when the
    /// ingress channel is full; informational events are dropped instead.
    pub async fn publish(&self, event: Event) {
        if event.is_essential() {
            let _ = self.tx.send(event).await;
        } else {
            let _ = self.tx.try_send(event);
        }
    }
}

async fn dispatch<C: Clock>(
    pipeline_id: PipelineId,
    clock: C,
    mut rx: mpsc::Receiver<Event>,
    sinks: Vec<SinkHandle>,
) {
    let start = tokio::time::Instant::now();
    let mut throttle_tick =
        tokio::time::interval_at(start + THROTTLE_WINDOW, THROTTLE_WINDOW);
    let mut heartbeat_tick =
        tokio::time::interval_at(start + HEARTBEAT_PERIOD, HEARTBEAT_PERIOD);

    // Most recent stream_activity per step, awaiting the next window
    // flush to throttled sinks.
    let mut pending: HashMap<Option<StepId>, Event> = HashMap::new();
    let has_throttled = sinks.iter().any(|s| s.config.throttle_stream);

    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(event) => route(&sinks, &mut pending, event, has_throttled),
                None => break,
            },
            _ = throttle_tick.tick() => flush_pending(&sinks, &mut pending),
            _ = heartbeat_tick.tick() => {
                let heartbeat =
                    Event::pipeline(clock.now(), pipeline_id.clone(), StepState::Heartbeat);
                for sink in sinks.iter().filter(|s| s.config.wants_heartbeat) {
                    sink.queue.push(heartbeat.clone());
                }
            }
        }
    }

    // Shutdown: flush coalesced activity, then let sinks drain.
    flush_pending(&sinks, &mut pending);
    for sink in &sinks {
        sink.queue.close();
    }
    for sink in sinks {
        let _ = sink.worker.await;
    }
}

fn route(
    sinks: &[SinkHandle],
    pending: &mut HashMap<Option<StepId>, Event>,
    event: Event,
    has_throttled: bool,
) {
    if event.state == StepState::StreamActivity {
        for sink in sinks.iter().filter(|s| !s.config.throttle_stream) {
            sink.queue.push(event.clone());
        }
        if has_throttled {
            // Most-recent-wins within the window
            pending.insert(event.step_id.clone(), event);
        }
    } else {
        for sink in sinks {
            sink.queue.push(event.clone());
        }
    }
}

fn flush_pending(sinks: &[SinkHandle], pending: &mut HashMap<Option<StepId>, Event>) {
    if pending.is_empty() {
        return;
    }
    for (_, event) in pending.drain() {
        for sink in sinks.iter().filter(|s| s.config.throttle_stream) {
            sink.queue.push(event.clone());
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;

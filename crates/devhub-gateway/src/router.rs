//! Request router and correlation table
//!
//! Every dispatch is send-now/receive-later: the router hands envelopes to a
//! worker pool (so one slow plugin connection cannot stall request
//! acceptance), records a pending entry keyed by correlation id, and
//! finalizes that entry exactly once — either when the expected number of
//! replies has arrived or when the deadline sweeper fires, whichever claims
//! the entry first. The claim is the `HashMap::remove` under the pending
//! lock; there is no second finalization path.
//!
//! Deadlines live in one min-heap polled by a single sweep task. No
//! per-request timers.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use devhub_core::{DispatchEnvelope, GatewayError, GatewayRequest, GatewayResponse, GatewayResult};

use crate::registry::PluginHandle;

/// How a pending request turns collected replies into the caller's response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizePolicy {
    /// One destination; the reply (or its absence) is the response
    Single,
    /// Fan-out; collected partials are aggregated, timeout included
    Aggregate,
    /// No reply expected; the caller is answered at dispatch time
    FireAndForget,
}

/// Router tuning knobs
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Dispatch worker count
    pub workers: usize,
    /// Bounded depth of the dispatch queue
    pub queue_depth: usize,
    /// Deadline applied when the caller does not specify one
    pub default_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 64,
            default_timeout: Duration::from_secs(30),
        }
    }
}

/// One outstanding request. Lives in the pending map from dispatch until
/// its single finalization.
struct PendingRequest {
    remaining: usize,
    partials: Vec<Value>,
    failures: usize,
    policy: FinalizePolicy,
    sink: oneshot::Sender<GatewayResponse>,
    /// Kept for best-effort cancellation toward the plugins on timeout
    destinations: Vec<PluginHandle>,
}

struct DispatchJob {
    plugin: PluginHandle,
    envelope: DispatchEnvelope,
}

struct RouterInner {
    pending: Mutex<HashMap<u64, PendingRequest>>,
    deadlines: Mutex<BinaryHeap<Reverse<(Instant, u64)>>>,
    deadline_changed: Notify,
    next_id: AtomicU64,
}

impl RouterInner {
    /// Record one reply (Some) or one delivery failure (None) and finalize
    /// when the expected count reaches zero. Unknown ids — never issued or
    /// already finalized — are dropped silently.
    fn complete(&self, correlation_id: u64, payload: Option<Value>) {
        let finished = {
            let mut pending = self.pending.lock();
            let Some(entry) = pending.get_mut(&correlation_id) else {
                debug!(%correlation_id, "Dropping reply for unknown or finalized request");
                return;
            };
            match payload {
                Some(p) => entry.partials.push(p),
                None => entry.failures += 1,
            }
            entry.remaining -= 1;
            if entry.remaining == 0 {
                pending.remove(&correlation_id)
            } else {
                None
            }
        };
        if let Some(entry) = finished {
            Self::finalize(correlation_id, entry);
        }
    }

    /// Deadline fired. If the entry is still pending it is claimed and
    /// finalized with whatever accumulated; otherwise the replies won the
    /// race and there is nothing to do.
    fn fire_timeout(&self, correlation_id: u64) {
        let Some(entry) = self.pending.lock().remove(&correlation_id) else {
            return;
        };
        debug!(
            %correlation_id,
            collected = entry.partials.len(),
            outstanding = entry.remaining,
            "Request deadline expired"
        );
        // Cancellation toward the plugins is advisory; the caller's result
        // does not wait for it.
        for plugin in &entry.destinations {
            let conn = Arc::clone(&plugin.connection);
            tokio::spawn(async move { conn.cancel(correlation_id).await });
        }
        let response = match entry.policy {
            FinalizePolicy::Aggregate => GatewayResponse::aggregate(entry.partials),
            FinalizePolicy::Single | FinalizePolicy::FireAndForget => {
                GatewayResponse::error(&GatewayError::Timeout)
            }
        };
        let _ = entry.sink.send(response);
    }

    fn finalize(correlation_id: u64, entry: PendingRequest) {
        let failures = entry.failures;
        let response = match entry.policy {
            FinalizePolicy::Aggregate => GatewayResponse::aggregate(entry.partials),
            FinalizePolicy::Single | FinalizePolicy::FireAndForget => {
                match entry.partials.into_iter().next() {
                    Some(p) => GatewayResponse::ok(p),
                    None => {
                        let dest = entry
                            .destinations
                            .first()
                            .map(|d| d.descriptor.id.clone())
                            .unwrap_or_default();
                        GatewayResponse::error(&GatewayError::NotConnected(dest))
                    }
                }
            }
        };
        debug!(%correlation_id, failures, "Finalized request");
        let _ = entry.sink.send(response);
    }
}

/// Dispatches requests to plugins and correlates their eventual replies
pub struct RequestRouter {
    inner: Arc<RouterInner>,
    dispatch_tx: mpsc::Sender<DispatchJob>,
    config: RouterConfig,
    tasks: Vec<JoinHandle<()>>,
}

impl RequestRouter {
    /// Spawns the worker pool and the deadline sweeper; must be called
    /// within a Tokio runtime.
    pub fn new(config: RouterConfig) -> Self {
        let inner = Arc::new(RouterInner {
            pending: Mutex::new(HashMap::new()),
            deadlines: Mutex::new(BinaryHeap::new()),
            deadline_changed: Notify::new(),
            next_id: AtomicU64::new(1),
        });

        let (dispatch_tx, dispatch_rx) = mpsc::channel::<DispatchJob>(config.queue_depth.max(1));
        let dispatch_rx = Arc::new(tokio::sync::Mutex::new(dispatch_rx));

        let mut tasks = Vec::with_capacity(config.workers + 1);
        for _ in 0..config.workers.max(1) {
            let rx = Arc::clone(&dispatch_rx);
            let inner = Arc::clone(&inner);
            tasks.push(tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    let correlation_id = job.envelope.correlation_id;
                    let plugin_id = job.plugin.descriptor.id.clone();
                    if let Err(e) = job.plugin.connection.send(job.envelope).await {
                        warn!(%plugin_id, %correlation_id, error = %e, "Dispatch send failed");
                        if correlation_id != 0 {
                            inner.complete(correlation_id, None);
                        }
                    }
                }
            }));
        }

        tasks.push(Self::spawn_sweeper(Arc::clone(&inner)));

        Self {
            inner,
            dispatch_tx,
            config,
            tasks,
        }
    }

    fn spawn_sweeper(inner: Arc<RouterInner>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                enum Next {
                    Idle,
                    Due(u64),
                    At(Instant),
                }
                let next = {
                    let mut deadlines = inner.deadlines.lock();
                    match deadlines.peek() {
                        None => Next::Idle,
                        Some(&Reverse((at, id))) => {
                            if at <= Instant::now() {
                                deadlines.pop();
                                Next::Due(id)
                            } else {
                                Next::At(at)
                            }
                        }
                    }
                };
                match next {
                    Next::Due(id) => inner.fire_timeout(id),
                    Next::Idle => inner.deadline_changed.notified().await,
                    Next::At(at) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(at) => {}
                            _ = inner.deadline_changed.notified() => {}
                        }
                    }
                }
            }
        })
    }

    pub fn default_timeout(&self) -> Duration {
        self.config.default_timeout
    }

    /// Dispatch `request` to `destinations` under one fresh correlation id.
    ///
    /// Returns the correlation id and the receiver that resolves with the
    /// finalized response. The expected reply count is the destination
    /// count; fire-and-forget requests are answered immediately and carry
    /// correlation id 0 on the wire.
    pub async fn dispatch(
        &self,
        request: &GatewayRequest,
        destinations: Vec<PluginHandle>,
        timeout: Duration,
        policy: FinalizePolicy,
    ) -> GatewayResult<(u64, oneshot::Receiver<GatewayResponse>)> {
        let (sink, receiver) = oneshot::channel();

        if policy == FinalizePolicy::FireAndForget {
            for plugin in destinations {
                let envelope = Self::envelope_for(request, 0, &plugin);
                self.enqueue(DispatchJob { plugin, envelope }).await?;
            }
            let _ = sink.send(GatewayResponse::ok(Value::Null));
            return Ok((0, receiver));
        }

        if destinations.is_empty() {
            // Nothing to wait for: a fan-out over zero plugins is an empty
            // aggregate; a single-target dispatch with no target is a miss.
            let response = match policy {
                FinalizePolicy::Aggregate => GatewayResponse::aggregate(Vec::new()),
                _ => return Err(GatewayError::PluginNotFound(request.capability.clone())),
            };
            let _ = sink.send(response);
            return Ok((0, receiver));
        }

        let correlation_id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + timeout;

        {
            let mut pending = self.inner.pending.lock();
            pending.insert(
                correlation_id,
                PendingRequest {
                    remaining: destinations.len(),
                    partials: Vec::new(),
                    failures: 0,
                    policy,
                    sink,
                    destinations: destinations.clone(),
                },
            );
        }
        {
            let mut deadlines = self.inner.deadlines.lock();
            deadlines.push(Reverse((deadline, correlation_id)));
        }
        self.inner.deadline_changed.notify_one();

        debug!(
            %correlation_id,
            capability = %request.capability,
            destinations = destinations.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Dispatching request"
        );

        for plugin in destinations {
            let envelope = Self::envelope_for(request, correlation_id, &plugin);
            self.enqueue(DispatchJob { plugin, envelope }).await?;
        }

        Ok((correlation_id, receiver))
    }

    async fn enqueue(&self, job: DispatchJob) -> GatewayResult<()> {
        self.dispatch_tx
            .send(job)
            .await
            .map_err(|_| GatewayError::Internal("dispatch workers are gone".into()))
    }

    fn envelope_for(request: &GatewayRequest, correlation_id: u64, plugin: &PluginHandle) -> DispatchEnvelope {
        DispatchEnvelope {
            correlation_id,
            capability: request.capability.clone(),
            interface: request.interface.clone(),
            attribute: request.attribute.clone(),
            service_id: Some(plugin.descriptor.id.clone()),
            payload: request.payload.clone(),
        }
    }

    /// Plugin callback: a reply arrived for `correlation_id`. Late or
    /// duplicate replies are dropped silently.
    pub fn on_reply(&self, correlation_id: u64, payload: Value) {
        self.inner.complete(correlation_id, Some(payload));
    }

    /// Number of requests currently in flight (diagnostic surface)
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

impl Drop for RequestRouter {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

//! The rate-limited request dispatcher.
//!
//! Each route group gets a worker task that owns a FIFO queue of pending
//! requests. A worker handles one request at a time: it waits for its route
//! window, then for the shared global window, then sends. A throttle response
//! keeps the request at the head of the queue, so nothing behind it overtakes
//! it.
//!
//! Routes the remote service reports under the same `x-ratelimit-bucket`
//! (and the same major parameter) draw from one shared window. A worker whose
//! queue stays empty past the idle timeout, with its window reset, removes
//! itself.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigError, DispatcherConfig};
use crate::error::{DispatchError, DispatchResult};
use crate::headers::RateLimitHeaders;
use crate::limiter::WindowLimiter;
use crate::request::{Request, Response};
use crate::route::{major_parameter, Route};
use crate::transport::HttpTransport;

/// A request waiting in a bucket queue.
struct PendingRequest {
    request: Request,
    reply: oneshot::Sender<DispatchResult<Response>>,
    attempts: u32,
}

impl PendingRequest {
    fn complete(self, result: DispatchResult<Response>) {
        // The caller may have given up (deadline elapsed).
        let _ = self.reply.send(result);
    }
}

struct BucketHandle {
    queue: mpsc::UnboundedSender<PendingRequest>,
    join: JoinHandle<()>,
}

/// Route group to worker. Queue senders never leave this map.
type BucketMap = Arc<Mutex<HashMap<String, BucketHandle>>>;

/// Remote bucket key to the window its routes share.
type SharedWindows = Arc<Mutex<HashMap<String, WindowLimiter>>>;

struct Inner {
    config: DispatcherConfig,
    transport: Arc<dyn HttpTransport>,
    global: WindowLimiter,
    buckets: BucketMap,
    shared: SharedWindows,
    shutdown: CancellationToken,
}

/// Serializes outbound REST calls through per-route and global rate limits.
///
/// Cloning is cheap; clones share buckets and workers.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .field("closed", &self.inner.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher sending through `transport`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: DispatcherConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let global = WindowLimiter::new(config.global_limit, config.global_window);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                transport,
                global,
                buckets: Arc::new(Mutex::new(HashMap::new())),
                shared: Arc::new(Mutex::new(HashMap::new())),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Executes `request` in the bucket named `group`.
    ///
    /// Applies the configured request timeout, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is rejected, retries are exhausted,
    /// the deadline elapses, or the dispatcher is shut down.
    pub async fn execute(
        &self,
        group: impl Into<String>,
        request: Request,
    ) -> DispatchResult<Response> {
        match self.inner.config.request_timeout {
            Some(deadline) => self.execute_with_deadline(group, request, deadline).await,
            None => self.submit(group.into(), request).await,
        }
    }

    /// Executes `request` and gives up waiting after `deadline`.
    ///
    /// A request that is already in flight when the deadline elapses is not
    /// cancelled; its response is discarded.
    ///
    /// # Errors
    ///
    /// Same as [`Dispatcher::execute`], plus [`DispatchError::Timeout`].
    pub async fn execute_with_deadline(
        &self,
        group: impl Into<String>,
        request: Request,
        deadline: Duration,
    ) -> DispatchResult<Response> {
        tokio::time::timeout(deadline, self.submit(group.into(), request))
            .await
            .map_err(|_| DispatchError::Timeout { waited: deadline })?
    }

    /// Executes the request described by `route` with no body.
    ///
    /// # Errors
    ///
    /// Same as [`Dispatcher::execute`].
    pub async fn execute_route(&self, route: &Route) -> DispatchResult<Response> {
        self.execute(route.group(), route.request()).await
    }

    /// Stops every bucket worker.
    ///
    /// Queued requests fail with [`DispatchError::DispatcherClosed`], and so
    /// does every later call.
    pub async fn shutdown(&self) {
        let workers: Vec<(String, JoinHandle<()>)> = {
            let mut buckets = self.inner.buckets.lock().await;
            self.inner.shutdown.cancel();
            buckets
                .drain()
                .map(|(group, handle)| (group, handle.join))
                .collect()
        };
        self.inner.shared.lock().await.clear();

        info!(buckets = workers.len(), "Dispatcher shutting down");
        for (group, join) in workers {
            if let Err(e) = join.await {
                warn!(route = %group, error = %e, "Bucket worker ended abnormally");
            }
        }
    }

    /// Returns true once [`Dispatcher::shutdown`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Returns the number of live route buckets.
    pub async fn bucket_count(&self) -> usize {
        self.inner.buckets.lock().await.len()
    }

    /// Returns the number of remote buckets shared by known routes.
    pub async fn shared_window_count(&self) -> usize {
        self.inner.shared.lock().await.len()
    }

    async fn submit(&self, group: String, request: Request) -> DispatchResult<Response> {
        let (reply, response) = oneshot::channel();
        self.enqueue(
            group,
            PendingRequest {
                request,
                reply,
                attempts: 0,
            },
        )
        .await?;

        response
            .await
            .map_err(|_| DispatchError::DispatcherClosed)?
    }

    /// Queues `pending` for `group`, spawning the group's worker on first use.
    ///
    /// The send happens under the map lock, so a worker that retires under the
    /// same lock never strands a request.
    async fn enqueue(&self, group: String, pending: PendingRequest) -> DispatchResult<()> {
        let mut buckets = self.inner.buckets.lock().await;
        if self.inner.shutdown.is_cancelled() {
            return Err(DispatchError::DispatcherClosed);
        }

        let handle = buckets
            .entry(group.clone())
            .or_insert_with(|| self.spawn_worker(&group));
        if let Err(mpsc::error::SendError(pending)) = handle.queue.send(pending) {
            warn!(route = %group, "Bucket worker ended, replacing it");
            let handle = self.spawn_worker(&group);
            handle
                .queue
                .send(pending)
                .map_err(|_| DispatchError::DispatcherClosed)?;
            buckets.insert(group, handle);
        }
        Ok(())
    }

    fn spawn_worker(&self, group: &str) -> BucketHandle {
        debug!(route = %group, "Creating route bucket");
        let (queue, rx) = mpsc::unbounded_channel();
        let config = &self.inner.config;
        let worker = BucketWorker {
            group: group.to_string(),
            window: WindowLimiter::new(config.route_limit, config.route_window),
            remote_bucket: None,
            queue: rx,
            config: config.clone(),
            transport: Arc::clone(&self.inner.transport),
            global: self.inner.global.clone(),
            buckets: Arc::clone(&self.inner.buckets),
            shared: Arc::clone(&self.inner.shared),
            shutdown: self.inner.shutdown.clone(),
        };
        BucketHandle {
            queue,
            join: tokio::spawn(worker.run()),
        }
    }
}

/// Owns one route queue and serves it in order.
struct BucketWorker {
    group: String,
    window: WindowLimiter,
    /// Key of the shared window adopted from `x-ratelimit-bucket`.
    remote_bucket: Option<String>,
    queue: mpsc::UnboundedReceiver<PendingRequest>,
    config: DispatcherConfig,
    transport: Arc<dyn HttpTransport>,
    global: WindowLimiter,
    buckets: BucketMap,
    shared: SharedWindows,
    shutdown: CancellationToken,
}

impl BucketWorker {
    #[instrument(name = "bucket", skip_all, fields(route = %self.group))]
    async fn run(mut self) {
        let idle = self.config.bucket_idle_timeout;
        loop {
            let pending = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                next = self.queue.recv() => match next {
                    Some(pending) => pending,
                    None => break,
                },
                () = sleep(idle) => {
                    if self.retire().await {
                        return;
                    }
                    continue;
                }
            };
            if self.process(pending).await.is_break() {
                break;
            }
        }

        self.queue.close();
        let mut drained = 0usize;
        while let Ok(pending) = self.queue.try_recv() {
            pending.complete(Err(DispatchError::DispatcherClosed));
            drained += 1;
        }
        debug!(drained, "Bucket worker stopped");
    }

    /// Removes this worker from the dispatcher if its queue is empty and its
    /// window has reset. Returns true if it did.
    async fn retire(&mut self) -> bool {
        if self.window.is_open().await {
            return false;
        }
        {
            let mut buckets = self.buckets.lock().await;
            if !self.queue.is_empty() {
                return false;
            }
            buckets.remove(&self.group);
        }
        self.release_shared_window().await;
        debug!("Idle route bucket retired");
        true
    }

    /// Joins the shared window for the remote bucket named in `headers`.
    async fn adopt_remote_bucket(&mut self, headers: &RateLimitHeaders) {
        let Some(hash) = headers.bucket.as_deref() else {
            return;
        };
        let key = match major_parameter(&self.group) {
            Some((resource, id)) => format!("{hash}:{resource}/{id}"),
            None => hash.to_string(),
        };
        if self.remote_bucket.as_deref() == Some(key.as_str()) {
            return;
        }
        self.release_shared_window().await;

        let window = {
            let mut shared = self.shared.lock().await;
            shared
                .entry(key.clone())
                .or_insert_with(|| self.window.clone())
                .clone()
        };
        if !window.same_window(&self.window) {
            debug!(bucket = %key, "Route joins a shared remote bucket");
        }
        self.window = window;
        self.remote_bucket = Some(key);
    }

    async fn release_shared_window(&mut self) {
        let Some(key) = self.remote_bucket.take() else {
            return;
        };
        let mut shared = self.shared.lock().await;
        // Held only by the map and this worker.
        if shared.get(&key).is_some_and(|window| window.holders() <= 2) {
            shared.remove(&key);
        }
    }

    /// Drives one request to completion. Breaks if shutdown interrupts it.
    async fn process(&mut self, mut pending: PendingRequest) -> ControlFlow<()> {
        loop {
            if pending.reply.is_closed() {
                debug!(attempts = pending.attempts, "Caller gave up, dropping request");
                return ControlFlow::Continue(());
            }

            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    pending.complete(Err(DispatchError::DispatcherClosed));
                    return ControlFlow::Break(());
                }
                () = self.window.acquire() => {}
            }
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    pending.complete(Err(DispatchError::DispatcherClosed));
                    return ControlFlow::Break(());
                }
                () = self.global.acquire() => {}
            }

            pending.attempts += 1;
            let failure = match self.transport.send(&pending.request).await {
                Ok(response) => {
                    let headers = RateLimitHeaders::parse(&response.headers);
                    self.adopt_remote_bucket(&headers).await;

                    if response.status == StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = headers.throttle_delay(self.config.default_retry_after);
                        if headers.global {
                            self.global.throttle(retry_after).await;
                        } else {
                            self.window.throttle(retry_after).await;
                        }
                        warn!(
                            attempts = pending.attempts,
                            retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                            global = headers.global,
                            "Throttled by remote"
                        );
                        if pending.attempts >= self.config.max_attempts {
                            pending.complete(Err(DispatchError::Throttled {
                                route: self.group.clone(),
                                retry_after,
                            }));
                            return ControlFlow::Continue(());
                        }
                        continue;
                    }

                    self.window.apply_headers(&headers).await;

                    if response.status.is_server_error() {
                        format!("server error {}", response.status)
                    } else if response.status.is_client_error() {
                        pending.complete(Err(DispatchError::Http {
                            route: self.group.clone(),
                            status: response.status,
                            body: response.body,
                        }));
                        return ControlFlow::Continue(());
                    } else {
                        pending.complete(Ok(response));
                        return ControlFlow::Continue(());
                    }
                }
                Err(e) => e.message,
            };

            let attempts = pending.attempts;
            if attempts >= self.config.max_attempts {
                warn!(attempts, reason = %failure, "Request failed");
                pending.complete(Err(DispatchError::RequestFailed {
                    route: self.group.clone(),
                    attempts,
                    reason: failure,
                }));
                return ControlFlow::Continue(());
            }

            let backoff = self.config.backoff(attempts);
            debug!(
                attempts,
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                reason = %failure,
                "Transient failure, retrying"
            );
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    pending.complete(Err(DispatchError::DispatcherClosed));
                    return ControlFlow::Break(());
                }
                () = sleep(backoff) => {}
            }
        }
    }
}

//! Concurrent fan-out of one query to its eligible engines.
//!
//! Every engine call runs on its own task. A coordinator task forwards
//! completions downstream in arrival order, reports each one to the ban
//! tracker, and closes the stream when every engine has reported or the
//! global deadline elapses, whichever comes first.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{FutureExt, Stream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ban::BanTracker;
use crate::config::DEADLINE_CEILING;
use crate::error::{EngineFailure, FailureKind, SearchError};
use crate::registry::{EngineRegistry, RegisteredEngine};
use crate::types::{DispatchOutcome, EngineStatus, Query, ResultItem};

/// One engine's completion as seen downstream.
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    pub outcome: DispatchOutcome,
    /// Items delivered by the engine, with `engine` set to its name.
    pub items: Vec<ResultItem>,
    /// 0-based position of this event in the stream.
    pub arrival: usize,
}

/// Events of a single dispatch, in arrival order.
///
/// Every eligible engine yields exactly one event. The stream ends when all
/// engines have reported or the deadline has elapsed.
#[derive(Debug)]
pub struct DispatchStream {
    rx: mpsc::Receiver<DispatchEvent>,
    engines: Vec<String>,
    deadline: Duration,
}

impl DispatchStream {
    /// Next event, or `None` once the dispatch is complete.
    pub async fn next_event(&mut self) -> Option<DispatchEvent> {
        self.rx.recv().await
    }

    /// Every eligible engine, suspended ones included, in configuration order.
    pub fn engines(&self) -> &[String] {
        &self.engines
    }

    /// Global deadline this dispatch runs under.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

impl Stream for DispatchStream {
    type Item = DispatchEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

struct Completion {
    slot: usize,
    outcome: DispatchOutcome,
    items: Vec<ResultItem>,
}

/// Fans queries out to engines from a shared registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<EngineRegistry>,
    bans: Arc<BanTracker>,
}

impl Dispatcher {
    pub fn new(registry: Arc<EngineRegistry>, bans: Arc<BanTracker>) -> Self {
        Self { registry, bans }
    }

    /// Start dispatching `query` and return the stream of completions.
    ///
    /// Must be called from within a tokio runtime. Engine calls start
    /// immediately, before the stream is polled.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::NoEligibleEngines`] when no enabled engine
    /// serves the query.
    pub fn dispatch(&self, query: &Query, deadline: Duration) -> Result<DispatchStream, SearchError> {
        let selected = self.registry.select(query);
        if selected.is_empty() {
            return Err(SearchError::NoEligibleEngines {
                categories: query.categories.clone(),
            });
        }

        let started = Instant::now();
        let deadline_at = started
            .checked_add(deadline)
            .or_else(|| started.checked_add(DEADLINE_CEILING))
            .unwrap_or(started);
        let engines: Vec<String> = selected.iter().map(|e| e.name().to_string()).collect();
        let (suspended, runnable): (Vec<_>, Vec<_>) = selected
            .into_iter()
            .partition(|e| self.bans.is_suspended(e.name(), started));

        tracing::debug!(
            eligible = engines.len(),
            suspended = suspended.len(),
            deadline_ms = deadline.as_millis() as u64,
            "dispatching query"
        );

        // One event per engine, so sends never wait on a slow consumer.
        let (out_tx, out_rx) = mpsc::channel(engines.len());
        let (done_tx, done_rx) = mpsc::channel(runnable.len().max(1));
        let cancel = CancellationToken::new();
        let query = Arc::new(query.clone());

        for (slot, engine) in runnable.iter().enumerate() {
            let engine = Arc::clone(engine);
            let query = Arc::clone(&query);
            let done_tx = done_tx.clone();
            let token = cancel.child_token();
            tokio::spawn(async move {
                let call = call_engine(&engine, &query, deadline_at);
                let completion = tokio::select! {
                    () = token.cancelled() => return,
                    completion = call => completion,
                };
                let (outcome, items) = completion;
                // The coordinator may already be gone after the deadline.
                let _ = done_tx
                    .send(Completion {
                        slot,
                        outcome,
                        items,
                    })
                    .await;
            });
        }
        drop(done_tx);

        let coordinator = Coordinator {
            bans: Arc::clone(&self.bans),
            runnable: runnable.iter().map(|e| e.name().to_string()).collect(),
            suspended: suspended.iter().map(|e| e.name().to_string()).collect(),
            started,
            deadline_at,
            cancel,
        };
        tokio::spawn(coordinator.run(done_rx, out_tx));

        Ok(DispatchStream {
            rx: out_rx,
            engines,
            deadline,
        })
    }
}

struct Coordinator {
    bans: Arc<BanTracker>,
    runnable: Vec<String>,
    suspended: Vec<String>,
    started: Instant,
    deadline_at: Instant,
    cancel: CancellationToken,
}

impl Coordinator {
    async fn run(
        self,
        mut done_rx: mpsc::Receiver<Completion>,
        out_tx: mpsc::Sender<DispatchEvent>,
    ) {
        let mut arrival = 0;
        for engine in &self.suspended {
            tracing::debug!(engine = %engine, "engine suspended, not called");
            let event = DispatchEvent {
                outcome: DispatchOutcome::suspended(engine.clone()),
                items: Vec::new(),
                arrival,
            };
            arrival += 1;
            if out_tx.send(event).await.is_err() {
                self.cancel.cancel();
                return;
            }
        }

        let mut reported = vec![false; self.runnable.len()];
        let deadline = tokio::time::sleep_until(self.deadline_at);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                completion = done_rx.recv() => {
                    let Some(Completion { slot, outcome, mut items }) = completion else {
                        break;
                    };
                    reported[slot] = true;
                    self.bans.record_outcome(&outcome.engine, outcome.status);
                    for item in &mut items {
                        item.engine.clone_from(&outcome.engine);
                    }
                    let event = DispatchEvent { outcome, items, arrival };
                    arrival += 1;
                    if out_tx.send(event).await.is_err() {
                        tracing::debug!("dispatch consumer dropped, cancelling engine calls");
                        self.cancel.cancel();
                        return;
                    }
                }
                () = &mut deadline => {
                    self.cancel.cancel();
                    let elapsed = self.deadline_at - self.started;
                    for (slot, engine) in self.runnable.iter().enumerate() {
                        if reported[slot] {
                            continue;
                        }
                        tracing::warn!(
                            engine = %engine,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "engine missed the global deadline"
                        );
                        self.bans.record_outcome(engine, EngineStatus::Timeout);
                        let event = DispatchEvent {
                            outcome: DispatchOutcome::deadline_exceeded(engine.clone(), elapsed),
                            items: Vec::new(),
                            arrival,
                        };
                        arrival += 1;
                        if out_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    break;
                }
            }
        }
    }
}

/// Run one engine call to completion, converting every failure mode into
/// an outcome.
async fn call_engine(
    engine: &RegisteredEngine,
    query: &Query,
    deadline_at: Instant,
) -> (DispatchOutcome, Vec<ResultItem>) {
    let started = Instant::now();
    let remaining = deadline_at.saturating_duration_since(started);
    let budget = engine.timeout.min(remaining);
    let bounded_by_deadline = remaining < engine.timeout;

    let call = async {
        let _permit = engine.pool.acquire(budget).await?;
        engine.adapter.fetch(query, budget).await
    };
    let result = match AssertUnwindSafe(tokio::time::timeout(budget, call))
        .catch_unwind()
        .await
    {
        Ok(Ok(result)) => result,
        Ok(Err(_elapsed)) => Err(EngineFailure::timeout(format!(
            "no response within {} ms",
            budget.as_millis()
        ))),
        Err(panic) => Err(EngineFailure::new(
            FailureKind::Panicked,
            panic_message(panic.as_ref()),
        )),
    };
    let elapsed = started.elapsed();

    match result {
        Err(failure) if failure.kind == FailureKind::Timeout && bounded_by_deadline => {
            tracing::warn!(
                engine = %engine.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                "engine missed the global deadline"
            );
            (DispatchOutcome::deadline_exceeded(engine.name(), elapsed), Vec::new())
        }
        Ok(items) => {
            tracing::debug!(
                engine = %engine.name(),
                count = items.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "engine responded"
            );
            let count = items.len();
            (DispatchOutcome::ok(engine.name(), elapsed, count), items)
        }
        Err(failure) => {
            tracing::warn!(
                engine = %engine.name(),
                kind = %failure.kind,
                error = %failure.message,
                elapsed_ms = elapsed.as_millis() as u64,
                "engine call failed"
            );
            (
                DispatchOutcome::failed(engine.name(), failure.kind, elapsed, failure.message),
                Vec::new(),
            )
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("adapter panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("adapter panicked: {message}")
    } else {
        "adapter panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ban::BanPolicy;
    use crate::engine::EngineAdapter;
    use crate::registry::Engine;
    use async_trait::async_trait;

    enum Behaviour {
        Items(usize),
        Fail(FailureKind),
        Sleep(Duration),
        Panic,
    }

    struct ScriptedEngine(Behaviour);

    #[async_trait]
    impl EngineAdapter for ScriptedEngine {
        async fn fetch(
            &self,
            _query: &Query,
            _timeout: Duration,
        ) -> Result<Vec<ResultItem>, EngineFailure> {
            match &self.0 {
                Behaviour::Items(n) => Ok((0..*n)
                    .map(|i| ResultItem::new(format!("https://example.com/{i}"), format!("Item {i}")))
                    .collect()),
                Behaviour::Fail(kind) => Err(EngineFailure::new(*kind, "scripted failure")),
                Behaviour::Sleep(d) => {
                    tokio::time::sleep(*d).await;
                    Ok(vec![ResultItem::new("https://slow.example", "Slow")])
                }
                Behaviour::Panic => panic!("scripted panic"),
            }
        }
    }

    fn dispatcher(engines: Vec<(&str, Behaviour)>) -> (Dispatcher, Arc<BanTracker>) {
        let builder = engines.into_iter().fold(
            EngineRegistry::builder().category("general"),
            |builder, (name, behaviour)| {
                builder.register(
                    Engine::new(name, name)
                        .with_categories(["general"])
                        .with_timeout(Duration::from_secs(2)),
                    Arc::new(ScriptedEngine(behaviour)),
                )
            },
        );
        let registry = Arc::new(builder.build().expect("registry"));
        let bans = Arc::new(BanTracker::new(BanPolicy::default()));
        (Dispatcher::new(registry, Arc::clone(&bans)), bans)
    }

    async fn drain(mut stream: DispatchStream) -> Vec<DispatchEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            events.push(event);
        }
        events
    }

    fn find<'a>(events: &'a [DispatchEvent], engine: &str) -> &'a DispatchEvent {
        events
            .iter()
            .find(|e| e.outcome.engine == engine)
            .unwrap_or_else(|| panic!("no event for {engine}"))
    }

    #[tokio::test(start_paused = true)]
    async fn every_engine_reports_once() {
        let (dispatcher, _) = dispatcher(vec![
            ("a", Behaviour::Items(2)),
            ("b", Behaviour::Fail(FailureKind::ParseError)),
            ("c", Behaviour::Items(0)),
        ]);
        let stream = dispatcher
            .dispatch(&Query::new("q"), Duration::from_secs(5))
            .expect("dispatch");
        assert_eq!(stream.engines(), &["a", "b", "c"]);
        let events = drain(stream).await;
        assert_eq!(events.len(), 3);
        let arrivals: Vec<usize> = events.iter().map(|e| e.arrival).collect();
        assert_eq!(arrivals, vec![0, 1, 2]);

        let a = find(&events, "a");
        assert_eq!(a.outcome.status, EngineStatus::Ok);
        assert_eq!(a.items.len(), 2);
        assert!(a.items.iter().all(|i| i.engine == "a"));
        assert_eq!(
            find(&events, "b").outcome.status,
            EngineStatus::Error(FailureKind::ParseError)
        );
        assert_eq!(find(&events, "c").outcome.item_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_off_slow_engine() {
        let (dispatcher, bans) = dispatcher(vec![
            ("fast", Behaviour::Items(1)),
            ("slow", Behaviour::Sleep(Duration::from_millis(1500))),
        ]);
        let events = drain(
            dispatcher
                .dispatch(&Query::new("q"), Duration::from_secs(1))
                .expect("dispatch"),
        )
        .await;
        let slow = find(&events, "slow");
        assert_eq!(slow.outcome.status, EngineStatus::Timeout);
        assert!(slow.outcome.deadline_exceeded);
        assert!(slow.items.is_empty());
        assert_eq!(find(&events, "fast").outcome.status, EngineStatus::Ok);

        let state = bans
            .state("slow", crate::ban::BanReason::Timeout)
            .expect("timeout recorded");
        assert_eq!(state.failure_streak, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn engine_timeout_is_reported_as_timeout() {
        let (dispatcher, _) = dispatcher(vec![("slow", Behaviour::Sleep(Duration::from_secs(3)))]);
        let events = drain(
            dispatcher
                .dispatch(&Query::new("q"), Duration::from_secs(10))
                .expect("dispatch"),
        )
        .await;
        let slow = find(&events, "slow");
        assert_eq!(slow.outcome.status, EngineStatus::Timeout);
        assert!(!slow.outcome.deadline_exceeded);
    }

    #[tokio::test]
    async fn panicking_adapter_is_isolated() {
        let (dispatcher, _) = dispatcher(vec![("boom", Behaviour::Panic), ("ok", Behaviour::Items(1))]);
        let events = drain(
            dispatcher
                .dispatch(&Query::new("q"), Duration::from_secs(5))
                .expect("dispatch"),
        )
        .await;
        let boom = find(&events, "boom");
        assert_eq!(boom.outcome.status, EngineStatus::Error(FailureKind::Panicked));
        assert!(boom
            .outcome
            .message
            .as_deref()
            .is_some_and(|m| m.contains("scripted panic")));
        assert_eq!(find(&events, "ok").items.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn suspended_engine_is_not_called() {
        let (dispatcher, bans) = dispatcher(vec![
            ("a", Behaviour::Items(1)),
            ("c", Behaviour::Items(1)),
        ]);
        bans.record_outcome("c", EngineStatus::Error(FailureKind::TooManyRequests));
        let events = drain(
            dispatcher
                .dispatch(&Query::new("q"), Duration::from_secs(5))
                .expect("dispatch"),
        )
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].outcome.engine, "c");
        assert_eq!(events[0].outcome.status, EngineStatus::Suspended);
        assert_eq!(events[0].arrival, 0);
        assert!(events[0].items.is_empty());
    }

    #[tokio::test]
    async fn no_eligible_engines_is_an_error() {
        let (dispatcher, _) = dispatcher(vec![("a", Behaviour::Items(1))]);
        let err = dispatcher
            .dispatch(
                &Query::new("q").with_categories(["images"]),
                Duration::from_secs(1),
            )
            .unwrap_err();
        assert!(matches!(err, SearchError::NoEligibleEngines { .. }));
    }

    #[tokio::test]
    async fn failures_feed_the_ban_tracker() {
        let (dispatcher, bans) =
            dispatcher(vec![("a", Behaviour::Fail(FailureKind::Captcha))]);
        let _ = drain(
            dispatcher
                .dispatch(&Query::new("q"), Duration::from_secs(1))
                .expect("dispatch"),
        )
        .await;
        assert!(bans.is_suspended("a", Instant::now()));
    }

    #[test]
    fn panic_payloads_are_described() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "adapter panicked: static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "adapter panicked: owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(panic_message(payload.as_ref()), "adapter panicked");
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_deadline_does_not_panic() {
        let (dispatcher, _) = dispatcher(vec![("a", Behaviour::Items(1))]);
        let stream = dispatcher
            .dispatch(&Query::new("q"), Duration::from_secs(u64::MAX))
            .expect("dispatch");
        let events = drain(stream).await;
        assert_eq!(events.len(), 1);
        assert_eq!(find(&events, "a").outcome.status, EngineStatus::Ok);
    }
}

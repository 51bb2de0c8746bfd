use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::annotation::normalize;
use crate::catalog::AnnotationSource;
use crate::db::{helpers::normalize_size, Database};
use crate::engine::{LiveSnapshot, MeasurementEngine, StartRequest};
use crate::error::{QcError, QcResult};
use crate::models::{SessionContext, ToleranceOverride};
use crate::specs::{ResolveContext, SpecResolver};

use super::events::{SessionEvent, SessionEvents};
use super::persist::{ResultPersister, SaveOutcome};
use super::reconcile::merge;
use super::state::{SessionData, SessionSnapshot, SessionState};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    pub autosave_debounce: Duration,
    /// Garment side passed to the engine.
    pub side: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            autosave_debounce: Duration::from_secs(2),
            side: "front".into(),
        }
    }
}

struct SessionSlot {
    state: SessionState,
    /// Blocking error shown with the current phase.
    last_error: Option<String>,
}

impl SessionSlot {
    fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot(self.last_error.as_deref())
    }
}

struct Poller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives one operator's measurement session.
///
/// Operator commands are serialized by `operation`; the state itself lives
/// behind `slot` and every transition replaces it in one step. The live poll
/// loop and the debounced autosave run as spawned tasks that only ever touch
/// the state through `slot`.
#[derive(Clone)]
pub struct SessionController {
    slot: Arc<Mutex<SessionSlot>>,
    operation: Arc<Mutex<()>>,
    poller: Arc<Mutex<Option<Poller>>>,
    autosave_generation: Arc<AtomicU64>,
    resolver: SpecResolver,
    annotations: Arc<dyn AnnotationSource>,
    engine: Arc<dyn MeasurementEngine>,
    persister: ResultPersister,
    events: Arc<dyn SessionEvents>,
    config: SessionConfig,
}

impl SessionController {
    pub fn new(
        db: Database,
        annotations: Arc<dyn AnnotationSource>,
        engine: Arc<dyn MeasurementEngine>,
        events: Arc<dyn SessionEvents>,
        config: SessionConfig,
    ) -> Self {
        Self {
            slot: Arc::new(Mutex::new(SessionSlot {
                state: SessionState::Idle,
                last_error: None,
            })),
            operation: Arc::new(Mutex::new(())),
            poller: Arc::new(Mutex::new(None)),
            autosave_generation: Arc::new(AtomicU64::new(0)),
            resolver: SpecResolver::new(db.clone()),
            annotations,
            engine,
            persister: ResultPersister::new(db),
            events,
            config,
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.slot.lock().await.snapshot()
    }

    pub async fn list_sizes(&self, article_id: i64) -> Vec<String> {
        self.resolver.list_sizes(article_id).await
    }

    /// Binds the panel to an article instance in one size.
    pub async fn select_size(&self, context: SessionContext) -> QcResult<SessionSnapshot> {
        let _operation = self.operation.lock().await;

        if self.slot.lock().await.state.is_measuring() {
            return Err(QcError::precondition(
                "Stop the running measurement before changing size",
            ));
        }

        self.cancel_autosave();
        self.flush(false).await;

        let resolution = self
            .resolver
            .resolve(&ResolveContext {
                article: context.article.clone(),
                size: context.size.clone(),
                order_line_id: Some(context.order_line_id),
            })
            .await;

        if resolution.is_empty() {
            let err = QcError::ResolutionEmpty {
                article: context.article.to_string(),
                size: context.size.clone(),
            };
            self.transition(SessionState::Idle, Some(err.to_string())).await;
            return Err(err);
        }

        let mut data = SessionData::new(context, resolution);
        match self
            .persister
            .load(data.context.order_line_id, &data.context.size)
            .await
        {
            Ok(rows) if !rows.is_empty() => {
                log_info!(
                    "Loaded {} saved results for order line {} size {}",
                    rows.len(),
                    data.context.order_line_id,
                    data.context.size
                );
                data.apply_stored(&rows);
            }
            Ok(_) => {}
            Err(err) => log_warn!(
                "Could not load saved results for order line {}: {err}",
                data.context.order_line_id
            ),
        }

        Ok(self.transition(SessionState::SpecsResolved(data), None).await)
    }

    /// Fetches and normalizes the annotation, then starts the engine.
    pub async fn start(&self) -> QcResult<SessionSnapshot> {
        let _operation = self.operation.lock().await;

        let data = {
            let slot = self.slot.lock().await;
            match &slot.state {
                SessionState::SpecsResolved(data) | SessionState::Complete { data, .. } => {
                    data.clone()
                }
                SessionState::Idle => {
                    return Err(QcError::precondition(
                        "Select a size before starting a measurement",
                    ))
                }
                SessionState::Armed { .. } | SessionState::Running { .. } => {
                    return Err(QcError::precondition("A measurement is already running"))
                }
            }
        };
        let style = data.context.article.article_style.clone();
        // Annotations and engine runs are keyed by the canonical label.
        let size = normalize_size(&data.context.size);

        let raw = match self.annotations.fetch_annotation(&style, &size).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                return Err(self
                    .report(QcError::malformed(format!(
                        "no annotation stored for {style} size {size}"
                    )))
                    .await)
            }
            Err(err) => return Err(self.report(err).await),
        };

        let annotation = match normalize(&raw, data.specs()) {
            Ok(annotation) => annotation,
            Err(err) => return Err(self.report(err).await),
        };
        for warning in &annotation.warnings {
            log_warn!("Annotation for {style} size {size}: {warning}");
        }

        let request =
            match StartRequest::from_descriptor(&size, &style, &self.config.side, &annotation) {
                Ok(request) => request,
                Err(err) => return Err(self.report(err).await),
            };

        self.transition(
            SessionState::Armed {
                data: data.clone(),
                annotation: annotation.clone(),
            },
            None,
        )
        .await;

        if let Err(err) = self.start_engine(&request).await {
            log_error!("Measurement for {style} size {size} did not start: {err}");
            self.transition(SessionState::SpecsResolved(data), Some(err.to_string()))
                .await;
            return Err(err);
        }

        let run_id = Uuid::new_v4().to_string();
        log_info!("Measurement run {run_id} started for {style} size {size}");
        let snapshot = self
            .transition(
                SessionState::Running {
                    data,
                    annotation,
                    run_id: run_id.clone(),
                    count_mismatch_logged: false,
                },
                None,
            )
            .await;
        self.spawn_poller(run_id).await;

        Ok(snapshot)
    }

    /// Ends the running measurement and writes every result.
    pub async fn complete(&self) -> QcResult<SessionSnapshot> {
        let _operation = self.operation.lock().await;

        if !self.finish_run().await {
            return Err(QcError::precondition("No measurement is running"));
        }
        self.flush(true).await;

        Ok(self.snapshot().await)
    }

    pub async fn set_measured_value(
        &self,
        spec_id: i64,
        value: Option<String>,
    ) -> QcResult<SessionSnapshot> {
        let _operation = self.operation.lock().await;

        self.edit(|data| {
            require_spec(data, spec_id)?;
            match value.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
                Some(value) => data.values.insert(spec_id, value.to_string()),
                None => data.values.remove(&spec_id),
            };
            Ok(())
        })
        .await
    }

    pub async fn set_tolerance_override(
        &self,
        spec_id: i64,
        tolerance_plus: f64,
        tolerance_minus: f64,
    ) -> QcResult<SessionSnapshot> {
        let _operation = self.operation.lock().await;

        if !tolerance_plus.is_finite() || !tolerance_minus.is_finite() {
            return Err(QcError::precondition("Tolerances must be numbers"));
        }

        self.edit(|data| {
            require_spec(data, spec_id)?;
            data.overrides.insert(
                spec_id,
                ToleranceOverride {
                    spec_id,
                    tolerance_plus,
                    tolerance_minus,
                },
            );
            Ok(())
        })
        .await
    }

    pub async fn clear_tolerance_override(&self, spec_id: i64) -> QcResult<SessionSnapshot> {
        let _operation = self.operation.lock().await;

        self.edit(|data| {
            require_spec(data, spec_id)?;
            data.overrides.remove(&spec_id);
            Ok(())
        })
        .await
    }

    /// Manual save of the current values.
    pub async fn save(&self) -> QcResult<SaveOutcome> {
        let _operation = self.operation.lock().await;

        self.cancel_autosave();
        self.flush(true)
            .await
            .ok_or_else(|| QcError::precondition("There is no session to save"))
    }

    /// Moves on once every point has a value.
    pub async fn next_article(&self) -> QcResult<SessionSnapshot> {
        let _operation = self.operation.lock().await;

        {
            let slot = self.slot.lock().await;
            if let Some(data) = slot.state.data() {
                if !data.all_measured() {
                    return Err(QcError::precondition(
                        "Every measurement needs a value before moving to the next article",
                    ));
                }
            }
        }

        self.leave().await
    }

    pub async fn previous_article(&self) -> QcResult<SessionSnapshot> {
        let _operation = self.operation.lock().await;
        self.leave().await
    }

    pub async fn reset(&self) -> QcResult<SessionSnapshot> {
        let _operation = self.operation.lock().await;
        self.leave().await
    }

    /// Stops a run left going and writes pending values before exit.
    pub async fn shutdown(&self) {
        let _operation = self.operation.lock().await;

        self.finish_run().await;
        self.cancel_autosave();
        self.flush(false).await;
    }

    async fn leave(&self) -> QcResult<SessionSnapshot> {
        self.finish_run().await;
        self.cancel_autosave();
        self.flush(false).await;

        Ok(self.transition(SessionState::Idle, None).await)
    }

    async fn transition(&self, state: SessionState, error: Option<String>) -> SessionSnapshot {
        let snapshot = {
            let mut slot = self.slot.lock().await;
            slot.state = state;
            slot.last_error = error;
            slot.snapshot()
        };
        self.events
            .emit(SessionEvent::StateChanged(snapshot.clone()));
        snapshot
    }

    /// Records an error against the current phase without leaving it.
    async fn report(&self, err: QcError) -> QcError {
        let snapshot = {
            let mut slot = self.slot.lock().await;
            slot.last_error = Some(err.to_string());
            slot.snapshot()
        };
        log_warn!("{err}");
        self.events.emit(SessionEvent::StateChanged(snapshot));
        err
    }

    async fn edit<F>(&self, apply: F) -> QcResult<SessionSnapshot>
    where
        F: FnOnce(&mut SessionData) -> QcResult<()>,
    {
        let (snapshot, update) = {
            let mut slot = self.slot.lock().await;
            if slot.state.is_measuring() {
                return Err(QcError::precondition(
                    "Values and tolerances are locked while measuring",
                ));
            }
            let data = slot
                .state
                .data_mut()
                .ok_or_else(|| QcError::precondition("Select a size first"))?;
            apply(data)?;
            data.touch();
            let update = data.measurements_update();
            (slot.snapshot(), update)
        };

        self.events.emit(SessionEvent::MeasurementsUpdated(update));
        self.events
            .emit(SessionEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    async fn start_engine(&self, request: &StartRequest) -> QcResult<()> {
        match self.engine.start(request).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_engine_failure() => {
                log_warn!("Engine start failed ({err}), restarting engine for one retry");
                if let Err(restart_err) = self.engine.restart().await {
                    log_warn!("Engine restart failed: {restart_err}");
                }
                self.engine.start(request).await
            }
            Err(err) => Err(err),
        }
    }

    /// Running -> Complete. Returns `false` when nothing was running.
    async fn finish_run(&self) -> bool {
        let run_id = match self.slot.lock().await.state.run_id() {
            Some(run_id) => run_id.to_string(),
            None => return false,
        };

        self.stop_poller().await;
        self.cancel_autosave();

        match self.engine.live_results().await {
            Ok(Some(snapshot)) => {
                self.apply_live(&run_id, &snapshot).await;
            }
            Ok(None) => {}
            Err(err) => log_warn!("Final live poll for run {run_id} failed: {err}"),
        }

        if let Err(err) = self.engine.stop().await {
            log_warn!("Engine stop for run {run_id} failed, continuing: {err}");
        }

        let snapshot = {
            let mut slot = self.slot.lock().await;
            slot.state = match slot.state.take() {
                SessionState::Running {
                    data, annotation, ..
                } => SessionState::Complete { data, annotation },
                other => other,
            };
            slot.last_error = None;
            slot.snapshot()
        };
        self.events.emit(SessionEvent::StateChanged(snapshot));
        log_info!("Measurement run {run_id} complete");

        true
    }

    /// Saves through the single writer. `force` saves even when nothing
    /// changed since the last successful save.
    async fn flush(&self, force: bool) -> Option<SaveOutcome> {
        let ((context, revision), outcome) = self
            .persister
            .save_latest(|| async move {
                let slot = self.slot.lock().await;
                let Some(data) = slot.state.data() else {
                    return None;
                };
                if !force && !data.is_dirty() {
                    return None;
                }
                Some(((data.context.clone(), data.revision), data.save_batch()))
            })
            .await?;

        let snapshot = {
            let mut slot = self.slot.lock().await;
            if let Some(data) = slot
                .state
                .data_mut()
                .filter(|data| data.context.same_target(&context))
            {
                if outcome.success {
                    data.saved_revision = data.saved_revision.max(revision);
                }
                data.last_save = Some(outcome.clone());
            }
            slot.snapshot()
        };

        if let Some(error) = outcome.error.clone().filter(|_| !outcome.success) {
            log_warn!(
                "Save for order line {} size {} incomplete: {error}",
                context.order_line_id,
                context.size
            );
            self.events.emit(SessionEvent::SaveFailed(error));
        }
        self.events.emit(SessionEvent::StateChanged(snapshot));

        Some(outcome)
    }

    fn schedule_autosave(&self) {
        let generation = self.autosave_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let controller = self.clone();
        tokio::spawn(async move {
            time::sleep(controller.config.autosave_debounce).await;
            if controller.autosave_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            controller.flush(false).await;
        });
    }

    /// Supersedes any pending autosave timer. A save already writing is left
    /// to finish.
    fn cancel_autosave(&self) {
        self.autosave_generation.fetch_add(1, Ordering::SeqCst);
    }

    async fn spawn_poller(&self, run_id: String) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let controller = self.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(controller.config.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            log_debug!("Live poll loop started for run {run_id}");

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = controller.poll_once(&run_id) => {}
                }
            }

            log_debug!("Live poll loop stopped for run {run_id}");
        });

        if let Some(previous) = self.poller.lock().await.replace(Poller { cancel, handle }) {
            previous.cancel.cancel();
        }
    }

    async fn stop_poller(&self) {
        let poller = self.poller.lock().await.take();
        if let Some(Poller { cancel, handle }) = poller {
            cancel.cancel();
            if let Err(err) = handle.await {
                log_error!("Live poll loop ended abnormally: {err}");
            }
        }
    }

    async fn poll_once(&self, run_id: &str) {
        let snapshot = match self.engine.live_results().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return,
            Err(err) => {
                log_debug!("Live poll skipped: {err}");
                return;
            }
        };

        if self.apply_live(run_id, &snapshot).await {
            self.schedule_autosave();
        }
    }

    /// Merges engine readings into the running session. Returns whether any
    /// displayed value changed. Readings the engine marks as not live are
    /// left over from an earlier run and never merged.
    async fn apply_live(&self, run_id: &str, snapshot: &LiveSnapshot) -> bool {
        if !snapshot.is_live {
            log_debug!("Ignoring stale engine readings during run {run_id}");
            return false;
        }

        let update = {
            let mut slot = self.slot.lock().await;
            let SessionState::Running {
                data,
                run_id: current_run,
                count_mismatch_logged,
                ..
            } = &mut slot.state
            else {
                return false;
            };
            if current_run.as_str() != run_id {
                return false;
            }

            let expected = data.specs().len();
            let reported = snapshot.measurements.len();
            if reported > 0 && reported != expected && !*count_mismatch_logged {
                log_warn!(
                    "Engine reports {reported} measurements for {expected} specifications ({} size {})",
                    data.context.article.article_style,
                    data.context.size
                );
                *count_mismatch_logged = true;
            }

            let (values, changed) = merge(data.specs(), &data.values, &snapshot.events());
            if !changed {
                return false;
            }
            data.values = values;
            data.touch();
            data.measurements_update()
        };

        self.events.emit(SessionEvent::MeasurementsUpdated(update));
        true
    }
}

fn require_spec(data: &SessionData, spec_id: i64) -> QcResult<()> {
    match data.spec(spec_id) {
        Some(_) => Ok(()),
        None => Err(QcError::precondition(format!(
            "Unknown measurement specification {spec_id}"
        ))),
    }
}

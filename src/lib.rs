pub mod annotation;
pub mod catalog;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod session;
pub mod settings;
pub mod specs;
mod utils;

pub use error::{QcError, QcResult};

#[cfg(feature = "desktop")]
mod desktop {
    use std::sync::Arc;

    use log::{error, info, warn};
    use tauri::{AppHandle, Emitter, Manager, RunEvent};

    use crate::{
        catalog::HttpCatalogClient,
        db::Database,
        engine::{
            commands::{
                cancel_calibration, get_calibration_status, get_engine_status, start_calibration,
            },
            HttpEngineClient, MeasurementEngine,
        },
        session::{
            commands::{
                clear_tolerance_override, complete_measurement, get_panel_settings,
                get_session_snapshot, list_article_sizes, next_article, previous_article,
                reset_session, save_measurements, select_size, set_measured_value,
                set_panel_settings, set_tolerance_override, start_measurement,
            },
            SessionController, SessionEvent, SessionEvents,
        },
        settings::SettingsStore,
    };

    pub(crate) struct AppState {
        pub(crate) session: SessionController,
        pub(crate) engine: Arc<dyn MeasurementEngine>,
        pub(crate) settings: SettingsStore,
    }

    /// Forwards controller events to the webview.
    struct TauriEvents {
        app_handle: AppHandle,
    }

    impl SessionEvents for TauriEvents {
        fn emit(&self, event: SessionEvent) {
            let name = event.name();
            let result = match &event {
                SessionEvent::StateChanged(snapshot) => self.app_handle.emit(name, snapshot),
                SessionEvent::MeasurementsUpdated(update) => self.app_handle.emit(name, update),
                SessionEvent::SaveFailed(message) => self.app_handle.emit(name, message),
            };
            if let Err(err) = result {
                error!("Failed to emit {name}: {err}");
            }
        }
    }

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        // Initialize logging (reads RUST_LOG env var)
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();

        log::info!("MagicQC panel starting up...");

        let app = tauri::Builder::default()
            .plugin(tauri_plugin_opener::init())
            .setup(|app| {
                let result = (|| -> anyhow::Result<()> {
                    let app_data_dir = app
                        .path()
                        .app_data_dir()
                        .map_err(|err| anyhow::anyhow!(err))?;
                    std::fs::create_dir_all(&app_data_dir)?;

                    let database = Database::new(app_data_dir.join("magicqc.sqlite3"))?;

                    let settings_store = SettingsStore::new(app_data_dir.join("settings.json"))?;
                    let settings = settings_store.effective();
                    info!(
                        "Measurement engine at {}, catalog at {}",
                        settings.engine_base_url, settings.catalog_base_url
                    );

                    let engine: Arc<dyn MeasurementEngine> = Arc::new(HttpEngineClient::new(
                        &settings.engine_base_url,
                        settings.request_timeout(),
                        settings.restart_settle(),
                    )?);
                    let catalog = Arc::new(HttpCatalogClient::new(
                        &settings.catalog_base_url,
                        settings.request_timeout(),
                    )?);

                    // Stop a measurement left running when the panel last exited.
                    {
                        let engine = engine.clone();
                        tauri::async_runtime::block_on(async move {
                            match engine.status().await {
                                Ok(status) if status.running => {
                                    warn!("Engine still running from a previous session; stopping it");
                                    if let Err(err) = engine.stop().await {
                                        warn!("Failed to stop leftover measurement: {err}");
                                    }
                                }
                                Ok(_) => {}
                                Err(err) => warn!("Measurement engine not reachable at startup: {err}"),
                            }
                        });
                    }

                    let session = SessionController::new(
                        database,
                        catalog,
                        engine.clone(),
                        Arc::new(TauriEvents {
                            app_handle: app.handle().clone(),
                        }),
                        settings.session_config(),
                    );

                    app.manage(AppState {
                        session,
                        engine,
                        settings: settings_store,
                    });

                    Ok(())
                })();

                result.map_err(|err| err.into())
            })
            .invoke_handler(tauri::generate_handler![
                get_session_snapshot,
                list_article_sizes,
                select_size,
                start_measurement,
                complete_measurement,
                set_measured_value,
                set_tolerance_override,
                clear_tolerance_override,
                save_measurements,
                next_article,
                previous_article,
                reset_session,
                get_panel_settings,
                set_panel_settings,
                get_engine_status,
                get_calibration_status,
                start_calibration,
                cancel_calibration,
            ])
            .build(tauri::generate_context!())
            .expect("error while building tauri application");

        app.run(|app_handle, event| {
            if let RunEvent::Exit = event {
                let session = app_handle.state::<AppState>().session.clone();
                tauri::async_runtime::block_on(session.shutdown());
            }
        });
    }
}

#[cfg(feature = "desktop")]
pub(crate) use desktop::AppState;
#[cfg(feature = "desktop")]
pub use desktop::run;

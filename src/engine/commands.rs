use std::sync::Arc;

use tauri::State;

use crate::engine::{CalibrationStatus, EngineStatus, MeasurementEngine};

use crate::AppState;

fn engine_from_state(state: &State<'_, AppState>) -> Arc<dyn MeasurementEngine> {
    state.engine.clone()
}

#[tauri::command]
pub async fn get_engine_status(state: State<'_, AppState>) -> Result<EngineStatus, String> {
    let engine = engine_from_state(&state);
    engine.status().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_calibration_status(
    state: State<'_, AppState>,
) -> Result<CalibrationStatus, String> {
    let engine = engine_from_state(&state);
    engine.calibration_status().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn start_calibration(state: State<'_, AppState>) -> Result<(), String> {
    let engine = engine_from_state(&state);
    engine.start_calibration().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn cancel_calibration(state: State<'_, AppState>) -> Result<(), String> {
    let engine = engine_from_state(&state);
    engine.cancel_calibration().await.map_err(|e| e.to_string())
}

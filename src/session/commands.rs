use tauri::State;

use crate::{
    models::SessionContext,
    session::{SaveOutcome, SessionController, SessionSnapshot},
    settings::PanelSettings,
};

use crate::AppState;

fn controller_from_state(state: &State<'_, AppState>) -> SessionController {
    state.session.clone()
}

#[tauri::command]
pub async fn get_session_snapshot(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    Ok(controller.snapshot().await)
}

#[tauri::command]
pub async fn list_article_sizes(
    state: State<'_, AppState>,
    article_id: i64,
) -> Result<Vec<String>, String> {
    let controller = controller_from_state(&state);
    Ok(controller.list_sizes(article_id).await)
}

#[tauri::command]
pub async fn select_size(
    state: State<'_, AppState>,
    context: SessionContext,
) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller
        .select_size(context)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn start_measurement(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller.start().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn complete_measurement(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller.complete().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn set_measured_value(
    state: State<'_, AppState>,
    spec_id: i64,
    value: Option<String>,
) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller
        .set_measured_value(spec_id, value)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn set_tolerance_override(
    state: State<'_, AppState>,
    spec_id: i64,
    tolerance_plus: f64,
    tolerance_minus: f64,
) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller
        .set_tolerance_override(spec_id, tolerance_plus, tolerance_minus)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn clear_tolerance_override(
    state: State<'_, AppState>,
    spec_id: i64,
) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller
        .clear_tolerance_override(spec_id)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn save_measurements(state: State<'_, AppState>) -> Result<SaveOutcome, String> {
    let controller = controller_from_state(&state);
    controller.save().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn next_article(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller.next_article().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn previous_article(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller.previous_article().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn reset_session(state: State<'_, AppState>) -> Result<SessionSnapshot, String> {
    let controller = controller_from_state(&state);
    controller.reset().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_panel_settings(state: State<'_, AppState>) -> Result<PanelSettings, String> {
    Ok(state.settings.stored())
}

/// Takes effect on the next launch; the HTTP clients are built at startup.
#[tauri::command]
pub fn set_panel_settings(
    state: State<'_, AppState>,
    settings: PanelSettings,
) -> Result<(), String> {
    state.settings.update(settings).map_err(|e| e.to_string())
}

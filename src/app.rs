use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, post}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/auth/status", get(handlers::auth_status))
        .route("/logout", post(handlers::logout))
        .route("/go", get(handlers::go))
        .route("/setup", get(handlers::setup_page).post(handlers::setup_action))
        .route("/symptoms", get(handlers::symptoms_page))
        .route("/api/symptoms/toggle", post(handlers::toggle_symptom))
        .route("/api/symptoms/remove", post(handlers::remove_symptom))
        .route("/api/symptoms/search", get(handlers::search_symptoms))
        .route("/api/symptoms/save", post(handlers::save_symptom_log))
        .route("/wellness", get(handlers::wellness_page))
        .route("/api/wellness/quote", get(handlers::daily_quote))
        .route("/api/wellness/tips", get(handlers::health_tips))
        .route("/api/wellness/nutrition/:phase", get(handlers::nutrition))
        .route("/api/wellness/exercise/:kind", get(handlers::exercise))
        .route(
            "/api/wellness/meditation",
            get(handlers::meditation_status).post(handlers::start_meditation),
        )
        .route("/api/wellness/meditation/stop", post(handlers::stop_meditation))
        .route("/api/wellness/water", post(handlers::add_water))
        .route("/api/wellness/stats", get(handlers::wellness_stats))
        .with_state(state)
}

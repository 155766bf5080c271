use crate::api::Credentials;
use crate::errors::AppError;
use crate::gate::{FeatureRoute, route_feature};
use crate::meditation::{MeditationStatus, parse_minutes};
use crate::models::{Identity, StatsResponse};
use crate::reconcile::{Reconciled, reconcile_setup};
use crate::session::SessionSource;
use crate::state::AppState;
use crate::stats::{build_stats, today_key};
use crate::symptoms::{SymptomCategory, SymptomSelection, load_selection, save_symptoms};
use crate::ui::{render_auth_status, render_index, render_setup, render_symptoms, render_wellness};
use crate::wellness::{
    CyclePhase, ExerciseDetails, FoodItem, HealthTip, NO_NUTRITION_NOTICE, Quote, exercise_details,
    track_water,
};
use crate::wizard::{WizardContext, WizardError, collect_form_data, submit_setup};
use axum::{
    extract::{Form, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

const SETUP_PATH: &str = "/setup";
const MAIN_PAGE: &str = "/";

#[derive(Debug, Deserialize)]
pub struct GoQuery {
    #[serde(default)]
    pub target: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct ChipRequest {
    pub category: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct StartMeditation {
    #[serde(default)]
    pub minutes: Value,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct NutritionResponse {
    pub foods: &'static [FoodItem],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct WaterResponse {
    pub glasses: u64,
}

pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let identity = signed_in(&state, &headers).await;
    let auth = render_auth_status(identity.as_ref(), &state.config.login_url);
    let stats = build_stats(&*state.store.lock().await);
    Html(render_index(&auth, &stats))
}

pub async fn auth_status(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let identity = signed_in(&state, &headers).await;
    Html(render_auth_status(identity.as_ref(), &state.config.login_url))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Redirect {
    if let Err(err) = state.account.logout(&Credentials::from_headers(&headers)).await {
        warn!(error = %err, "logout could not be forwarded");
    }
    Redirect::to(MAIN_PAGE)
}

pub async fn go(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GoQuery>,
) -> Response {
    let route = route_feature(
        &state.store,
        &state.account,
        &Credentials::from_headers(&headers),
        &query.target,
        &state.config.login_url,
        state.config.gate_timeout,
    )
    .await;

    match route {
        FeatureRoute::Ignored => StatusCode::NO_CONTENT.into_response(),
        FeatureRoute::Proceed(location)
        | FeatureRoute::Signup(location)
        | FeatureRoute::Login(location) => Redirect::to(&location).into_response(),
    }
}

pub async fn setup_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let identity = match setup_identity(&state, &headers).await {
        Ok(identity) => identity,
        Err(redirect) => return redirect.into_response(),
    };

    let mut wizard = state.wizard.lock().await;
    let context = wizard_for(&mut *wizard, identity);
    Html(render_setup(context, None)).into_response()
}

pub async fn setup_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let identity = match setup_identity(&state, &headers).await {
        Ok(identity) => identity,
        Err(redirect) => return Ok(redirect.into_response()),
    };

    let (actions, fields): (Vec<_>, Vec<_>) =
        pairs.into_iter().partition(|(key, _)| key == "action");
    let action = actions.into_iter().next().map(|(_, value)| value).unwrap_or_default();
    let fields = collect_form_data(fields);

    let mut wizard = state.wizard.lock().await;
    let context = wizard_for(&mut *wizard, identity);

    let outcome = match action.as_str() {
        "next" => context.next_step(fields).map(|_| Redirect::to(SETUP_PATH)),
        "prev" => {
            context.prev_step(fields);
            Ok(Redirect::to(SETUP_PATH))
        }
        "submit" => {
            let mut store = state.store.lock().await;
            submit_setup(&mut *store, context, fields, Utc::now())
                .await
                .map(|_| Redirect::to(MAIN_PAGE))
        }
        other => return Err(AppError::bad_request(format!("unknown setup action '{other}'"))),
    };

    match outcome {
        Ok(redirect) => {
            if action == "submit" {
                *wizard = None;
            }
            Ok(redirect.into_response())
        }
        Err(err) => {
            let status = match err {
                WizardError::Storage => StatusCode::INSUFFICIENT_STORAGE,
                WizardError::MissingFields(_) | WizardError::NotFinished { .. } => {
                    StatusCode::BAD_REQUEST
                }
            };
            let page = render_setup(context, Some(&err.to_string()));
            Ok((status, Html(page)).into_response())
        }
    }
}

pub async fn symptoms_page(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let credentials = Credentials::from_headers(&headers);
    let today = today_key();
    let (identity, selection) = tokio::join!(
        state.account.probe(&credentials, state.config.auth_timeout),
        load_selection(&state.store, &state.account, &credentials, &state.catalog, &today),
    );

    let page = render_symptoms(
        &render_auth_status(identity.as_ref(), &state.config.login_url),
        &today,
        &state.catalog,
        &selection,
    );
    *state.symptoms.lock().await = selection;
    Html(page)
}

pub async fn toggle_symptom(
    State(state): State<AppState>,
    Json(request): Json<ChipRequest>,
) -> Result<Json<SymptomSelection>, AppError> {
    let chip = state
        .catalog
        .chip(&request.category, &request.value)
        .ok_or_else(|| AppError::not_found("unknown symptom"))?;

    let mut selection = state.symptoms.lock().await;
    selection.toggle(&request.category, &chip.value, &chip.label);
    Ok(Json(selection.clone()))
}

pub async fn remove_symptom(
    State(state): State<AppState>,
    Json(request): Json<ChipRequest>,
) -> Json<SymptomSelection> {
    let mut selection = state.symptoms.lock().await;
    selection.remove(&request.category, &request.value);
    Json(selection.clone())
}

pub async fn search_symptoms(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<SymptomCategory>> {
    Json(state.catalog.filter(&query.q))
}

pub async fn save_symptom_log(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<SaveResponse> {
    let selection = state.symptoms.lock().await.clone();
    let outcome = save_symptoms(
        &state.store,
        &state.account,
        &Credentials::from_headers(&headers),
        &selection,
        &today_key(),
        Utc::now(),
    )
    .await;

    info!(status = outcome.status(), count = selection.len(), "symptoms saved");
    Json(SaveResponse {
        status: outcome.status(),
        message: outcome.message().to_string(),
    })
}

pub async fn wellness_page(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let credentials = Credentials::from_headers(&headers);
    let (identity, quote, tips) = tokio::join!(
        state.account.probe(&credentials, state.config.auth_timeout),
        state.feeds.daily_quote(),
        state.feeds.health_tips(),
    );
    let stats = build_stats(&*state.store.lock().await);
    let meditation = state.meditation.lock().await.status();

    Html(render_wellness(
        &render_auth_status(identity.as_ref(), &state.config.login_url),
        &quote,
        &tips,
        &stats,
        &meditation,
    ))
}

pub async fn daily_quote(State(state): State<AppState>) -> Json<Quote> {
    Json(state.feeds.daily_quote().await)
}

pub async fn health_tips(State(state): State<AppState>) -> Json<Vec<HealthTip>> {
    Json(state.feeds.health_tips().await)
}

pub async fn nutrition(Path(phase): Path<String>) -> Json<NutritionResponse> {
    let response = match phase.parse::<CyclePhase>() {
        Ok(phase) => NutritionResponse {
            foods: phase.foods(),
            notice: None,
        },
        Err(()) => NutritionResponse {
            foods: &[],
            notice: Some(NO_NUTRITION_NOTICE),
        },
    };
    Json(response)
}

pub async fn exercise(Path(kind): Path<String>) -> Result<Json<ExerciseDetails>, AppError> {
    exercise_details(&kind)
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("unknown exercise '{kind}'")))
}

pub async fn start_meditation(
    State(state): State<AppState>,
    Json(request): Json<StartMeditation>,
) -> Result<Json<MeditationStatus>, AppError> {
    let raw = match &request.minutes {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    };
    let minutes = parse_minutes(&raw)?;

    let mut timer = state.meditation.lock().await;
    Ok(Json(timer.start(minutes, state.store.clone())))
}

pub async fn meditation_status(State(state): State<AppState>) -> Json<MeditationStatus> {
    Json(state.meditation.lock().await.status())
}

pub async fn stop_meditation(State(state): State<AppState>) -> Json<MeditationStatus> {
    let mut timer = state.meditation.lock().await;
    timer.stop();
    Json(timer.status())
}

pub async fn add_water(State(state): State<AppState>) -> Result<Json<WaterResponse>, AppError> {
    let glasses = track_water(&mut *state.store.lock().await, &today_key()).await?;
    Ok(Json(WaterResponse { glasses }))
}

pub async fn wellness_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(build_stats(&*state.store.lock().await))
}

async fn signed_in(state: &AppState, headers: &HeaderMap) -> Option<Identity> {
    state
        .account
        .probe(&Credentials::from_headers(headers), state.config.auth_timeout)
        .await
}

/// Runs reconciliation for the setup page. `Err` carries the redirect for
/// visitors who must not see the wizard.
async fn setup_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity, Redirect> {
    let outcome = reconcile_setup(
        &state.store,
        &state.account,
        &Credentials::from_headers(headers),
        state.config.auth_timeout,
    )
    .await;

    if let Some(location) = outcome.redirect(&state.config.login_url, SETUP_PATH, MAIN_PAGE) {
        return Err(Redirect::to(&location));
    }
    match outcome {
        Reconciled::NeedsSetup(identity) => Ok(identity),
        Reconciled::Anonymous | Reconciled::SetupDone(_) => Err(Redirect::to(MAIN_PAGE)),
    }
}

/// The wizard for `identity`, restarted when another account takes over.
fn wizard_for(slot: &mut Option<WizardContext>, identity: Identity) -> &mut WizardContext {
    if slot
        .as_ref()
        .is_some_and(|context| context.identity().email != identity.email)
    {
        *slot = None;
    }
    slot.get_or_insert_with(|| WizardContext::new(identity))
}

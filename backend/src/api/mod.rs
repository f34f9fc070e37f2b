use axum::Json;
use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use axum::routing::{patch, post, put};
use axum::{Router, extract::State, http::StatusCode, routing::get};

use crate::error::AppError;
use crate::models::*;
use crate::services::{BulkApprovalReport, Submission, Verdict};
use crate::state::AppState;

/// Header carrying the account id resolved by the identity provider.
pub const ACCOUNT_HEADER: &str = "x-account-id";

/// The authenticated caller.
pub struct Account(pub String);

impl<S> FromRequestParts<S> for Account
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACCOUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Account(v.to_string()))
            .ok_or(AppError::Unauthorized)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/courses", get(list_courses))
        .route("/students", post(create_profile))
        .route("/students/me", get(my_profile))
        .route("/registrations", post(submit_selection))
        .route("/registrations/validate", post(validate_selection))
        .route("/registrations/drafts", post(save_draft))
        .route("/registrations/current", get(current_registration))
        .route("/registrations/{id}", put(update_draft))
        .route("/registrations/{id}/submit", post(submit_draft))
        .route("/admin/registrations/pending", get(pending_registrations))
        .route("/admin/registrations/bulk-approve", post(bulk_approve))
        .route("/admin/registrations/{id}/approve", post(approve_registration))
        .route("/admin/registrations/{id}/reject", post(reject_registration))
        .route("/admin/users/pending", get(pending_users))
        .route("/admin/users/{id}/activate", post(activate_user))
        .route("/admin/users/{id}/reject", post(reject_user))
        .route("/admin/courses", post(add_course))
        .route("/admin/courses/{id}", patch(update_course))
        .with_state(state)
}

/// Administrative operations need an active coordinator or admin account.
async fn require_admin(state: &AppState, account: &Account) -> Result<Student, AppError> {
    let actor = state
        .store
        .get_student(&account.0)
        .await?
        .ok_or_else(|| AppError::Forbidden("unknown account".to_string()))?;
    if !actor.role.is_administrative() || !actor.is_active() {
        return Err(AppError::Forbidden(format!(
            "account {} may not perform administrative operations",
            actor.id
        )));
    }
    Ok(actor)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.store.list_courses().await?;
    Ok(StatusCode::OK)
}

async fn list_courses(State(state): State<AppState>) -> Result<Json<Vec<Course>>, AppError> {
    let courses = state.store.list_courses().await?;
    Ok(Json(courses))
}

async fn create_profile(
    State(state): State<AppState>,
    account: Account,
    Json(req): Json<NewStudentRequest>,
) -> Result<(StatusCode, Json<Student>), AppError> {
    if state.store.get_student(&account.0).await?.is_some() {
        return Err(AppError::Conflict(format!("profile {} already exists", account.0)));
    }
    let student = req.into_student(account.0)?;
    state.store.put_student(&student).await?;
    Ok((StatusCode::CREATED, Json(student)))
}

async fn my_profile(
    State(state): State<AppState>,
    account: Account,
) -> Result<Json<Student>, AppError> {
    let student = state
        .store
        .get_student(&account.0)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(student))
}

async fn validate_selection(
    State(state): State<AppState>,
    account: Account,
    Json(req): Json<SelectionRequest>,
) -> Result<Json<Verdict>, AppError> {
    let verdict = state
        .registrations
        .validate_selection(&account.0, &req.course_ids)
        .await?;
    Ok(Json(verdict))
}

async fn save_draft(
    State(state): State<AppState>,
    account: Account,
    Json(req): Json<SelectionRequest>,
) -> Result<Json<RegistrationRecord>, AppError> {
    let record = state.registrations.save_draft(&account.0, &req.course_ids).await?;
    Ok(Json(record))
}

async fn update_draft(
    State(state): State<AppState>,
    account: Account,
    Path(id): Path<String>,
    Json(req): Json<SelectionRequest>,
) -> Result<Json<RegistrationRecord>, AppError> {
    let record = state
        .registrations
        .update_draft(&account.0, &id, &req.course_ids)
        .await?;
    Ok(Json(record))
}

async fn submit_draft(
    State(state): State<AppState>,
    account: Account,
    Path(id): Path<String>,
) -> Result<Json<Submission>, AppError> {
    let submission = state.registrations.submit(&account.0, &id).await?;
    Ok(Json(submission))
}

async fn submit_selection(
    State(state): State<AppState>,
    account: Account,
    Json(req): Json<SelectionRequest>,
) -> Result<(StatusCode, Json<Submission>), AppError> {
    let submission = state
        .registrations
        .submit_selection(&account.0, &req.course_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

async fn current_registration(
    State(state): State<AppState>,
    account: Account,
) -> Result<Json<RegistrationRecord>, AppError> {
    let record = state
        .registrations
        .active_registration(&account.0)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(record))
}

async fn pending_registrations(
    State(state): State<AppState>,
    account: Account,
) -> Result<Json<Vec<RegistrationRecord>>, AppError> {
    require_admin(&state, &account).await?;
    let records = state.review.pending_registrations().await?;
    Ok(Json(records))
}

async fn approve_registration(
    State(state): State<AppState>,
    account: Account,
    Path(id): Path<String>,
) -> Result<Json<RegistrationRecord>, AppError> {
    require_admin(&state, &account).await?;
    let record = state.review.approve(&id).await?;
    Ok(Json(record))
}

async fn reject_registration(
    State(state): State<AppState>,
    account: Account,
    Path(id): Path<String>,
) -> Result<Json<RegistrationRecord>, AppError> {
    require_admin(&state, &account).await?;
    let record = state.review.reject(&id).await?;
    Ok(Json(record))
}

async fn bulk_approve(
    State(state): State<AppState>,
    account: Account,
    Json(req): Json<BulkApproveRequest>,
) -> Result<Json<BulkApprovalReport>, AppError> {
    require_admin(&state, &account).await?;
    let report = state.review.bulk_approve(&req.registration_ids).await?;
    Ok(Json(report))
}

async fn pending_users(
    State(state): State<AppState>,
    account: Account,
) -> Result<Json<Vec<Student>>, AppError> {
    require_admin(&state, &account).await?;
    let users = state.review.pending_users().await?;
    Ok(Json(users))
}

async fn activate_user(
    State(state): State<AppState>,
    account: Account,
    Path(id): Path<String>,
) -> Result<Json<Student>, AppError> {
    require_admin(&state, &account).await?;
    let student = state.review.activate_user(&id).await?;
    Ok(Json(student))
}

async fn reject_user(
    State(state): State<AppState>,
    account: Account,
    Path(id): Path<String>,
) -> Result<Json<Student>, AppError> {
    require_admin(&state, &account).await?;
    let student = state.review.reject_user(&id).await?;
    Ok(Json(student))
}

async fn add_course(
    State(state): State<AppState>,
    account: Account,
    Json(req): Json<NewCourseRequest>,
) -> Result<(StatusCode, Json<Course>), AppError> {
    require_admin(&state, &account).await?;
    let course = state.review.add_course(req).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn update_course(
    State(state): State<AppState>,
    account: Account,
    Path(id): Path<String>,
    Json(req): Json<UpdateCourseRequest>,
) -> Result<Json<Course>, AppError> {
    require_admin(&state, &account).await?;
    let course = state.review.update_course(&id, req).await?;
    Ok(Json(course))
}

//! Route handlers.
//!
//! Thin translations between the JSON surface and the store collaborators.
//! All policy (rate limiting, authentication, authorization) has already
//! run by the time these execute.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::security::authentication::token_is_well_formed;
use crate::store::{MovieDraft, TokenScope};

const ACTIVATION_TOKEN_TTL: Duration = Duration::from_secs(3 * 24 * 60 * 60);
const AUTHENTICATION_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub async fn healthcheck(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.env,
            "version": env!("CARGO_PKG_VERSION"),
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateMovie {
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    pub genres: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMovie {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<i32>,
    pub genres: Option<Vec<String>>,
}

pub async fn list_movies(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let movies = state.movies.list()?;
    Ok(Json(json!({ "movies": movies })))
}

pub async fn show_movie(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if id < 1 {
        return Err(ApiError::NotFound);
    }
    let movie = state.movies.get(id)?;
    Ok(Json(json!({ "movie": movie })))
}

pub async fn create_movie(
    State(state): State<AppState>,
    Json(input): Json<CreateMovie>,
) -> Result<impl IntoResponse, ApiError> {
    validate_movie(&input.title, input.year, input.runtime, &input.genres)?;

    let movie = state.movies.insert(MovieDraft {
        title: input.title,
        year: input.year,
        runtime: input.runtime,
        genres: input.genres,
    })?;

    let location = format!("/v1/movies/{}", movie.id);
    Ok((
        StatusCode::CREATED,
        [(axum::http::header::LOCATION, location)],
        Json(json!({ "movie": movie })),
    ))
}

pub async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateMovie>,
) -> Result<Json<Value>, ApiError> {
    if id < 1 {
        return Err(ApiError::NotFound);
    }
    let mut movie = state.movies.get(id)?;

    if let Some(title) = input.title {
        movie.title = title;
    }
    if let Some(year) = input.year {
        movie.year = year;
    }
    if let Some(runtime) = input.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = input.genres {
        movie.genres = genres;
    }
    validate_movie(&movie.title, movie.year, movie.runtime, &movie.genres)?;

    let movie = state.movies.update(movie)?;
    Ok(Json(json!({ "movie": movie })))
}

pub async fn delete_movie(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if id < 1 {
        return Err(ApiError::NotFound);
    }
    state.movies.delete(id)?;
    Ok(Json(json!({ "message": "movie successfully deleted" })))
}

#[derive(Debug, Deserialize)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Register a user and respond 202 Accepted; the welcome mail (carrying the
/// activation token) is handed to the background tracker so the response
/// never waits on delivery.
pub async fn register_user(
    State(state): State<AppState>,
    Json(input): Json<RegisterUser>,
) -> Result<impl IntoResponse, ApiError> {
    let mut problems = Vec::new();
    if input.name.trim().is_empty() {
        problems.push("name must be provided");
    }
    if !input.email.contains('@') {
        problems.push("email must be a valid email address");
    }
    if input.password.len() < 8 || input.password.len() > 72 {
        problems.push("password must be between 8 and 72 bytes long");
    }
    if !problems.is_empty() {
        return Err(ApiError::Validation(problems.join("; ")));
    }

    let user = state
        .users
        .register(input.name.trim(), &input.email, &input.password)?;
    let activation_token =
        state
            .users
            .issue_token(user.id, TokenScope::Activation, ACTIVATION_TOKEN_TTL)?;

    let mailer = state.mailer.clone();
    let recipient = user.clone();
    state.tasks.run(async move {
        if let Err(err) = mailer.send_welcome(&recipient, &activation_token) {
            tracing::error!(error = %err, user_id = recipient.id, "failed to send welcome email");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "user": user }))))
}

#[derive(Debug, Deserialize)]
pub struct ActivateUser {
    pub token: String,
}

pub async fn activate_user(
    State(state): State<AppState>,
    Json(input): Json<ActivateUser>,
) -> Result<Json<Value>, ApiError> {
    if !token_is_well_formed(&input.token) {
        return Err(ApiError::Validation(
            "token must be 26 characters long".to_string(),
        ));
    }

    let user = state.users.activate(&input.token).map_err(|err| match err {
        crate::store::StoreError::NotFound => {
            ApiError::Validation("invalid or expired activation token".to_string())
        }
        other => other.into(),
    })?;
    Ok(Json(json!({ "user": user })))
}

#[derive(Debug, Deserialize)]
pub struct CreateAuthenticationToken {
    pub email: String,
    pub password: String,
}

pub async fn create_authentication_token(
    State(state): State<AppState>,
    Json(input): Json<CreateAuthenticationToken>,
) -> Result<impl IntoResponse, ApiError> {
    if !input.email.contains('@') || input.password.is_empty() {
        return Err(ApiError::Validation(
            "email and password must be provided".to_string(),
        ));
    }

    let user = state
        .users
        .authenticate(&input.email, &input.password)?
        .ok_or(ApiError::MalformedCredentials)?;

    let token =
        state
            .users
            .issue_token(user.id, TokenScope::Authentication, AUTHENTICATION_TOKEN_TTL)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "authentication_token": { "token": token } })),
    ))
}

fn validate_movie(title: &str, year: i32, runtime: i32, genres: &[String]) -> Result<(), ApiError> {
    let mut problems = Vec::new();
    if title.trim().is_empty() {
        problems.push("title must be provided");
    }
    if title.len() > 500 {
        problems.push("title must not be more than 500 bytes long");
    }
    if year < 1888 {
        problems.push("year must be no earlier than 1888");
    }
    if runtime <= 0 {
        problems.push("runtime must be a positive integer");
    }
    if genres.is_empty() || genres.len() > 5 {
        problems.push("genres must contain between 1 and 5 entries");
    }
    let mut unique = genres.to_vec();
    unique.sort();
    unique.dedup();
    if unique.len() != genres.len() {
        problems.push("genres must not contain duplicate values");
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(problems.join("; ")))
    }
}

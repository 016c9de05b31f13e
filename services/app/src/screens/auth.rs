//! services/app/src/screens/auth.rs
//!
//! Sign in, sign up, sign out and "who am I". A successful sign in or sign up
//! stores the bearer token and invalidates the current-user query.

use saarthi_core::domain::{AuthToken, Credentials, Registration, User};
use saarthi_core::{keys, PortError, QueryOptions};
use std::io::Write;
use tokio::io::AsyncBufRead;
use tracing::info;

use super::{AppState, Console};
use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 6;

fn required(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn password(value: &str) -> Result<String, AppError> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(value.to_string())
}

pub fn credentials(username: &str, pass: &str) -> Result<Credentials, AppError> {
    Ok(Credentials {
        username: required("Username", username)?,
        password: password(pass)?,
    })
}

pub fn registration(username: &str, name: &str, pass: &str) -> Result<Registration, AppError> {
    Ok(Registration {
        username: required("Username", username)?,
        name: required("Name", name)?,
        password: password(pass)?,
    })
}

pub async fn login(state: &AppState, credentials: Credentials) -> Result<AuthToken, AppError> {
    let auth = state.auth.clone();
    let tokens = state.tokens.clone();
    let token = state
        .cache
        .mutate(
            async move {
                let token = auth.login(&credentials).await?;
                tokens.save(&token).await?;
                Ok::<_, PortError>(token)
            },
            &[keys::me()],
        )
        .await?;
    info!("signed in");
    Ok(token)
}

pub async fn register(state: &AppState, registration: Registration) -> Result<AuthToken, AppError> {
    let auth = state.auth.clone();
    let tokens = state.tokens.clone();
    let token = state
        .cache
        .mutate(
            async move {
                let token = auth.register(&registration).await?;
                tokens.save(&token).await?;
                Ok::<_, PortError>(token)
            },
            &[keys::me()],
        )
        .await?;
    info!("account created");
    Ok(token)
}

/// Signing out is local only: the token is forgotten.
pub async fn logout(state: &AppState) -> Result<(), AppError> {
    state.tokens.clear().await?;
    state.cache.invalidate(&keys::me());
    info!("signed out");
    Ok(())
}

/// The signed-in user. `None` without a token or when the server rejects it.
pub async fn current_user(state: &AppState) -> Result<Option<User>, AppError> {
    let logged_in = state.is_logged_in().await?;
    let auth = state.auth.clone();
    let mut subscription = state.cache.subscribe(
        keys::me(),
        move || {
            let auth = auth.clone();
            async move { auth.me().await }
        },
        QueryOptions::default().enabled(logged_in),
    );
    if !logged_in {
        return Ok(None);
    }

    let current = subscription.settled().await;
    match (current.data, current.error) {
        (_, Some(e)) => Err(e.into()),
        (Some(user), None) => Ok((*user).clone()),
        (None, None) => Ok(None),
    }
}

//=========================================================================================
// Terminal Commands
//=========================================================================================

async fn password_or_prompt<R, W>(
    console: &mut Console<R, W>,
    given: Option<String>,
) -> Result<String, AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    match given {
        Some(password) => Ok(password),
        None => console
            .prompt("Password:")
            .await?
            .ok_or_else(|| AppError::Validation("Password is required".to_string())),
    }
}

pub async fn run_login<R, W>(
    state: &AppState,
    console: &mut Console<R, W>,
    username: &str,
    given_password: Option<String>,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let pass = password_or_prompt(console, given_password).await?;
    login(state, credentials(username, &pass)?).await?;
    console.say("Welcome back! You have successfully signed in.")?;
    Ok(())
}

pub async fn run_register<R, W>(
    state: &AppState,
    console: &mut Console<R, W>,
    username: &str,
    name: &str,
    given_password: Option<String>,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let pass = password_or_prompt(console, given_password).await?;
    register(state, registration(username, name, &pass)?).await?;
    console.say("Welcome to Saarthi! Your account has been created successfully.")?;
    Ok(())
}

pub async fn run_logout<R, W>(state: &AppState, console: &mut Console<R, W>) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    logout(state).await?;
    console.say("Goodbye! You have been signed out successfully.")?;
    Ok(())
}

pub async fn run_whoami<R, W>(state: &AppState, console: &mut Console<R, W>) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let user = current_user(state).await?;
    let has_token = state.is_logged_in().await?;
    match user {
        Some(user) => console.say(format!("Signed in as {} (@{})", user.name, user.username))?,
        None if has_token => console.say("Your session has expired. Please sign in again.")?,
        None => console.say("Not signed in.")?,
    }
    Ok(())
}

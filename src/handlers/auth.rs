use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::db::ModelError;
use crate::error::AppResult;
use crate::forms::validator::{matches, min_chars, not_blank, Validation, EMAIL_RX};
use crate::forms::{Form, FormView};
use crate::middleware::AuthContext;
use crate::session::Session;
use crate::state::AppState;
use crate::templates::{TemplateData, LOGIN, SIGNUP};

const MIN_PASSWORD_CHARS: usize = 8;
const AFTER_LOGIN: &str = "/snippet/create";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UserSignupForm {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl UserSignupForm {
    pub fn validate(&self) -> Validation {
        let mut v = Validation::new();
        v.check_field(not_blank(&self.name), "name", "This field cannot be blank");
        v.check_field(not_blank(&self.email), "email", "This field cannot be blank");
        v.check_field(
            matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", "This field cannot be blank");
        v.check_field(
            min_chars(&self.password, MIN_PASSWORD_CHARS),
            "password",
            "This field must be at least 8 characters long",
        );
        v
    }

    // The password is never echoed back.
    fn view(&self, validation: Validation) -> FormView {
        FormView::new(
            [("name", self.name.as_str()), ("email", self.email.as_str())],
            validation,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UserLoginForm {
    pub email: String,
    pub password: String,
}

impl UserLoginForm {
    pub fn validate(&self) -> Validation {
        let mut v = Validation::new();
        v.check_field(not_blank(&self.email), "email", "This field cannot be blank");
        v.check_field(
            matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", "This field cannot be blank");
        v
    }

    fn view(&self, validation: Validation) -> FormView {
        FormView::new([("email", self.email.as_str())], validation)
    }
}

pub async fn user_signup(State(state): State<AppState>, ctx: AuthContext) -> AppResult<Response> {
    let data = TemplateData::new(&ctx);
    state.templates.render(SIGNUP, StatusCode::OK, &data)
}

pub async fn user_signup_post(
    State(state): State<AppState>,
    ctx: AuthContext,
    session: Session,
    Form(form): Form<UserSignupForm>,
) -> AppResult<Response> {
    let mut validation = form.validate();
    if !validation.valid() {
        let data = TemplateData::new(&ctx).with_form(form.view(validation));
        return state
            .templates
            .render(SIGNUP, StatusCode::UNPROCESSABLE_ENTITY, &data);
    }

    match state
        .users
        .insert_user(&form.name, &form.email, &form.password)
        .await
    {
        Ok(id) => tracing::info!(user_id = id, "user signed up"),
        Err(ModelError::DuplicateEmail) => {
            validation.add_field_error("email", "Email address is already in use");
            let data = TemplateData::new(&ctx).with_form(form.view(validation));
            return state
                .templates
                .render(SIGNUP, StatusCode::UNPROCESSABLE_ENTITY, &data);
        }
        Err(err) => return Err(err.into()),
    }

    session.put_flash("Your signup was successful. Please log in.");

    Ok(Redirect::to(crate::middleware::auth::LOGIN_PATH).into_response())
}

pub async fn user_login(State(state): State<AppState>, ctx: AuthContext) -> AppResult<Response> {
    let data = TemplateData::new(&ctx);
    state.templates.render(LOGIN, StatusCode::OK, &data)
}

pub async fn user_login_post(
    State(state): State<AppState>,
    ctx: AuthContext,
    session: Session,
    Form(form): Form<UserLoginForm>,
) -> AppResult<Response> {
    let mut validation = form.validate();
    if !validation.valid() {
        let data = TemplateData::new(&ctx).with_form(form.view(validation));
        return state
            .templates
            .render(LOGIN, StatusCode::UNPROCESSABLE_ENTITY, &data);
    }

    let id = match state.users.authenticate(&form.email, &form.password).await {
        Ok(id) => id,
        Err(ModelError::InvalidCredentials) => {
            tracing::debug!("login rejected");
            validation.add_non_field_error("Email or password is incorrect");
            let data = TemplateData::new(&ctx).with_form(form.view(validation));
            return state
                .templates
                .render(LOGIN, StatusCode::UNPROCESSABLE_ENTITY, &data);
        }
        Err(err) => return Err(err.into()),
    };

    // New privilege level, new token.
    session.renew();
    session.set_user_id(id);
    tracing::info!(user_id = id, "user logged in");

    let target = session
        .take_redirect_after_login()
        .filter(|path| path.starts_with('/') && !path.starts_with("//"))
        .unwrap_or_else(|| AFTER_LOGIN.to_string());

    Ok(Redirect::to(&target).into_response())
}

pub async fn user_logout_post(ctx: AuthContext, session: Session) -> AppResult<Response> {
    session.renew();
    session.clear_user_id();
    session.put_flash("You've been logged out successfully!");
    tracing::info!(user_id = ?ctx.user_id, "user logged out");

    Ok(Redirect::to("/").into_response())
}

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::db::ModelError;
use crate::error::{AppError, AppResult};
use crate::forms::validator::{max_chars, not_blank, permitted, Validation};
use crate::forms::{blank_as_zero, Form, FormView};
use crate::middleware::AuthContext;
use crate::session::Session;
use crate::state::AppState;
use crate::templates::{TemplateData, CREATE, HOME, VIEW};

const LATEST_LIMIT: i64 = 10;
const PERMITTED_EXPIRES: [i64; 3] = [1, 7, 365];
const DEFAULT_EXPIRES: i64 = 365;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SnippetCreateForm {
    pub title: String,
    pub content: String,
    #[serde(deserialize_with = "blank_as_zero")]
    pub expires: i64,
}

impl SnippetCreateForm {
    pub fn validate(&self) -> Validation {
        let mut v = Validation::new();
        v.check_field(not_blank(&self.title), "title", "This field cannot be blank");
        v.check_field(
            max_chars(&self.title, 100),
            "title",
            "This field cannot be more than 100 characters long",
        );
        v.check_field(not_blank(&self.content), "content", "This field cannot be blank");
        v.check_field(
            permitted(&self.expires, &PERMITTED_EXPIRES),
            "expires",
            "This field must equal 1, 7 or 365",
        );
        v
    }

    fn view(&self, validation: Validation) -> FormView {
        FormView::new(
            [
                ("title", self.title.clone()),
                ("content", self.content.clone()),
                ("expires", self.expires.to_string()),
            ],
            validation,
        )
    }
}

pub async fn home(State(state): State<AppState>, ctx: AuthContext) -> AppResult<Response> {
    let mut data = TemplateData::new(&ctx);
    data.snippets = state.snippets.latest(LATEST_LIMIT).await?;

    state.templates.render(HOME, StatusCode::OK, &data)
}

pub async fn snippet_view(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(raw_id): Path<String>,
) -> AppResult<Response> {
    let id: i64 = match raw_id.parse() {
        Ok(id) if id >= 1 => id,
        _ => return Err(AppError::NotFound),
    };

    let snippet = match state.snippets.get(id).await {
        Ok(snippet) => snippet,
        Err(ModelError::NoRecord) => return Err(AppError::NotFound),
        Err(err) => return Err(err.into()),
    };

    let mut data = TemplateData::new(&ctx);
    data.snippet = Some(snippet);

    state.templates.render(VIEW, StatusCode::OK, &data)
}

pub async fn snippet_create(State(state): State<AppState>, ctx: AuthContext) -> AppResult<Response> {
    let blank = SnippetCreateForm {
        title: String::new(),
        content: String::new(),
        expires: DEFAULT_EXPIRES,
    };
    let data = TemplateData::new(&ctx).with_form(blank.view(Validation::new()));

    state.templates.render(CREATE, StatusCode::OK, &data)
}

pub async fn snippet_create_post(
    State(state): State<AppState>,
    ctx: AuthContext,
    session: Session,
    Form(form): Form<SnippetCreateForm>,
) -> AppResult<Response> {
    let validation = form.validate();
    if !validation.valid() {
        let data = TemplateData::new(&ctx).with_form(form.view(validation));
        return state
            .templates
            .render(CREATE, StatusCode::UNPROCESSABLE_ENTITY, &data);
    }

    let id = state
        .snippets
        .insert(&form.title, &form.content, form.expires)
        .await?;
    tracing::info!(snippet_id = id, user_id = ?ctx.user_id, "snippet created");

    session.put_flash("Snippet successfully created!");

    Ok(Redirect::to(&format!("/snippet/view/{}", id)).into_response())
}

//! # Form Handling
//!
//! Urlencoded request bodies are decoded into typed form records. Decoding and
//! validation are separate steps:
//! - decoding fails only when a value cannot be coerced to its field type, which is
//!   a malformed request (400)
//! - validation runs on a decoded record and collects human-readable messages per
//!   field, which the handler shows by re-rendering the page (422)
//!
//! ## Re-rendering
//! A [`FormView`] carries what the visitor typed plus the validation result, so a
//! template can refill every input verbatim and show each field's messages.

pub mod validator;

use std::collections::HashMap;

use axum::async_trait;
use axum::extract::{FromRequest, Request};
use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::Deserialize;

use crate::error::AppError;
use self::validator::Validation;

/// `deserialize_with` for integer fields: blank input decodes as 0
///
/// Anything else that doesn't parse is a decode error, so the request gets a 400.
pub fn blank_as_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim() {
        "" => Ok(0),
        trimmed => trimmed
            .parse()
            .map_err(|_| D::Error::custom(format!("{:?} is not an integer", raw))),
    }
}

/// Extractor decoding a urlencoded body into `T`
///
/// Wraps `axum::Form`; any of its rejections becomes a 400.
#[derive(Debug, Clone)]
pub struct Form<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for Form<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Form(value) = axum::Form::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        Ok(Form(value))
    }
}

/// Submitted values and their validation result, as handed to a template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormView {
    pub values: HashMap<String, String>,
    pub validation: Validation,
    pub non_field_errors: Vec<String>,
}

impl FormView {
    pub fn new<K, V>(values: impl IntoIterator<Item = (K, V)>, validation: Validation) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let non_field_errors = validation.non_field_errors.clone();
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            validation,
            non_field_errors,
        }
    }

    /// What was submitted for `key`, or empty
    pub fn value(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    /// All messages for `key` joined into one line
    pub fn field_error(&self, key: &str) -> Option<String> {
        let errors = self.validation.errors_for(key);
        if errors.is_empty() {
            None
        } else {
            Some(errors.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, StatusCode};

    #[derive(Debug, Default, PartialEq, Deserialize)]
    #[serde(default)]
    struct Sample {
        title: String,
        #[serde(deserialize_with = "blank_as_zero")]
        expires: i64,
    }

    fn post(body: impl Into<Body>) -> Request {
        Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body.into())
            .unwrap()
    }

    async fn decode(body: &'static str) -> Result<Sample, AppError> {
        Form::<Sample>::from_request(post(body), &())
            .await
            .map(|Form(sample)| sample)
    }

    #[tokio::test]
    async fn decodes_percent_and_plus_and_ignores_unknown_fields() {
        let sample = decode("csrf_token=abc&title=Hello+World%21&expires=7").await.unwrap();
        assert_eq!(
            sample,
            Sample {
                title: "Hello World!".into(),
                expires: 7
            }
        );
    }

    #[tokio::test]
    async fn missing_or_blank_integers_decode_as_zero() {
        assert_eq!(decode("title=x&expires=").await.unwrap().expires, 0);
        assert_eq!(decode("title=x").await.unwrap().expires, 0);
        assert_eq!(decode("").await.unwrap(), Sample::default());
    }

    #[tokio::test]
    async fn uncoercible_values_are_rejected_with_400() {
        let err = decode("title=x&expires=forever").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_form_bodies_are_rejected_with_400() {
        let req = Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let err = Form::<Sample>::from_request(req, &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected_with_400() {
        let body = format!("title={}", "a".repeat(crate::middleware::csrf::MAX_FORM_BYTES + 1));

        let err = Form::<Sample>::from_request(post(body), &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn form_view_exposes_values_and_joined_errors() {
        let mut validation = Validation::new();
        validation.add_field_error("email", "This field cannot be blank");
        validation.add_field_error("email", "This field must be a valid email address");
        validation.add_non_field_error("nope");

        let view = FormView::new([("email", ""), ("name", "Bob")], validation);

        assert_eq!(view.value("name"), "Bob");
        assert_eq!(view.value("password"), "");
        assert_eq!(
            view.field_error("email").as_deref(),
            Some("This field cannot be blank This field must be a valid email address")
        );
        assert_eq!(view.field_error("name"), None);
        assert_eq!(view.non_field_errors, vec!["nope".to_string()]);
    }
}

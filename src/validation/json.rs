use axum::{
    extract::{FromRequest, Request},
    Json,
};
use garde::Validate;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// JSON body that has been deserialized and checked with `garde`.
///
/// Malformed JSON, unknown fields and failed rules all become
/// [`AppError::Validation`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    T::Context: Default,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;

        value
            .validate()
            .map_err(|report| AppError::Validation(first_error(&report)))?;

        Ok(Self(value))
    }
}

fn first_error(report: &garde::Report) -> String {
    report
        .iter()
        .next()
        .map(|(path, error)| {
            let path = path.to_string();
            if path.is_empty() {
                error.message().to_string()
            } else {
                format!("{}: {}", path, error.message())
            }
        })
        .unwrap_or_else(|| "Invalid request body".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    #[serde(deny_unknown_fields)]
    struct Probe {
        #[garde(length(min = 1))]
        name: String,
    }

    fn json_request(body: &str) -> Request {
        Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn accepts_valid_bodies() {
        let ValidatedJson(probe) = ValidatedJson::<Probe>::from_request(json_request(r#"{"name":"a"}"#), &())
            .await
            .unwrap();
        assert_eq!(probe.name, "a");
    }

    #[tokio::test]
    async fn rule_failures_name_the_field() {
        let err = ValidatedJson::<Probe>::from_request(json_request(r#"{"name":""}"#), &())
            .await
            .unwrap_err();
        match err {
            AppError::Validation(message) => assert!(message.starts_with("name")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_fields_and_bad_json_are_validation_errors() {
        for body in [r#"{"name":"a","extra":1}"#, "{not json"] {
            let err = ValidatedJson::<Probe>::from_request(json_request(body), &())
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }
}

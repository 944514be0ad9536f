//! Request input helpers. `Json`, `Path` and `Query` wrap the axum
//! extractors so their rejections render as `AppError`, which answers
//! malformed input with a JSON 400.

use axum::{
    extract::{FromRequest, FromRequestParts},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct Query<T>(pub T);

/// Patch fields: an absent key stays `None`, an explicit `null` becomes
/// `Some(None)`. Pair with `#[serde(default, deserialize_with = "nullable")]`.
pub fn nullable<'de, T, D>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

#[cfg(test)]
mod tests {
    use super::nullable;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "nullable")]
        max_sales: Option<Option<i32>>,
    }

    #[test]
    fn null_differs_from_absent() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        let cleared: Patch = serde_json::from_str(r#"{"max_sales":null}"#).unwrap();
        let set: Patch = serde_json::from_str(r#"{"max_sales":4}"#).unwrap();
        assert_eq!(absent.max_sales, None);
        assert_eq!(cleared.max_sales, Some(None));
        assert_eq!(set.max_sales, Some(Some(4)));
    }
}

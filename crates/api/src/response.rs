use serde::Serialize;

/// Success body of every JSON endpoint: `{ "data": T }`.
///
/// Errors use a different shape (`{ "error", "code" }`, see
/// [`crate::error::AppError`]), so clients can branch on the top-level key.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct Meta {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub total: Option<i64>,
}

impl Meta {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
            total: Some(total),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Machine-readable failure detail carried by every error envelope.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub detail: String,
}

/// Envelope shared by every endpoint, successful or not.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            data: Some(data),
            error: None,
            meta,
        }
    }

    pub fn error(message: impl Into<String>, error: ErrorBody) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
            data: None,
            error: Some(error),
            meta: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_omits_error_and_empty_meta() {
        let body = ApiResponse::success("OK", serde_json::json!({ "id": 1 }), None);
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["status"], "success");
        assert_eq!(value["message"], "OK");
        assert_eq!(value["data"]["id"], 1);
        assert!(value.get("error").is_none());
        assert!(value.get("meta").is_none());
    }

    #[test]
    fn error_envelope_has_no_data() {
        let body = ApiResponse::<()>::error(
            "Cart is empty",
            ErrorBody {
                code: "empty_cart".into(),
                detail: "Cart is empty".into(),
            },
        );
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["code"], "empty_cart");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn paginated_meta_is_serialized() {
        let body = ApiResponse::success("Products", Vec::<i32>::new(), Some(Meta::new(2, 10, 31)));
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["meta"]["page"], 2);
        assert_eq!(value["meta"]["per_page"], 10);
        assert_eq!(value["meta"]["total"], 31);
    }
}

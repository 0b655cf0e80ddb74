use serde::Serialize;
use utoipa::ToSchema;

/// Pagination block attached to list responses. Unset counters are
/// omitted from the wire form rather than rendered as nulls.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
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

    pub fn empty() -> Self {
        Self {
            page: None,
            per_page: None,
            total: None,
        }
    }
}

/// Envelope every endpoint answers with: a human-readable message, the
/// payload, and optional pagination meta.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_meta_serializes_without_counters() {
        let resp = ApiResponse::success("OK", serde_json::json!({}), Some(Meta::empty()));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["message"], "OK");
        assert_eq!(json["meta"], serde_json::json!({}));
    }

    #[test]
    fn absent_meta_is_omitted_entirely() {
        let resp = ApiResponse::success("OK", 1, None);
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("meta").is_none());
    }

    #[test]
    fn paginated_meta_carries_all_counters() {
        let json = serde_json::to_value(Meta::new(2, 20, 41)).unwrap();
        assert_eq!(json, serde_json::json!({ "page": 2, "per_page": 20, "total": 41 }));
    }
}

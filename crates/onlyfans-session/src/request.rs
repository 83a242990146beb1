//! Request descriptions

use serde_json::Value;
use transport::Method;

/// One logical platform call. Retries reuse the same spec and re-sign it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl RequestSpec {
    /// `path` is relative to the platform origin; a missing leading slash is
    /// added.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    /// Append a query parameter. An existing parameter of the same name is
    /// replaced.
    pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let name = name.into();
        self.query.retain(|(existing, _)| *existing != name);
        self.query.push((name, value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_gets_leading_slash() {
        assert_eq!(RequestSpec::get("api2/v2/users/me").path(), "/api2/v2/users/me");
        assert_eq!(RequestSpec::get("/api2/v2/users/me").path(), "/api2/v2/users/me");
    }

    #[test]
    fn with_query_replaces_same_name() {
        let spec = RequestSpec::get("/x")
            .with_query("limit", 10)
            .with_query("offset", 0)
            .with_query("offset", 50);
        assert_eq!(
            spec.query(),
            &[
                ("limit".to_string(), "10".to_string()),
                ("offset".to_string(), "50".to_string())
            ]
        );
        assert_eq!(spec.query_param("offset"), Some("50"));
        assert_eq!(spec.query_param("missing"), None);
    }

    #[test]
    fn post_carries_body() {
        let spec = RequestSpec::post("/api2/v2/chats/1/messages", serde_json::json!({"text": "hi"}));
        assert_eq!(spec.method(), &Method::POST);
        assert_eq!(spec.body().unwrap()["text"], "hi");
    }
}

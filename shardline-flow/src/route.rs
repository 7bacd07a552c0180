//! Routes and route groups.
//!
//! The remote service rate limits per route *template*, except that the ids
//! of a few top-level resources ("major parameters") split a template into
//! separate buckets. `GET /channels/1/messages/9` and
//! `GET /channels/1/messages/10` share a bucket; the same call on channel 2
//! does not.

use http::Method;
use serde::Serialize;

use crate::request::Request;

/// Path segments whose following id is a major parameter.
const MAJOR_PARAMETERS: [&str; 3] = ["channels", "guilds", "webhooks"];

/// An API route: method plus concrete path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    method: Method,
    path: String,
}

impl Route {
    /// Creates a route.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    /// A `GET` route.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A `POST` route.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// A `PATCH` route.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// A `PUT` route.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// A `DELETE` route.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Returns the method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the concrete path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the route group naming this route's rate-limit bucket.
    ///
    /// Minor ids are replaced by `:id`, reaction emoji by `:reaction`, and
    /// the query string is dropped.
    #[must_use]
    pub fn group(&self) -> String {
        let path = self.path.split('?').next().unwrap_or_default();
        let mut template = String::with_capacity(path.len());
        let mut previous = "";
        let mut after_reactions = false;

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            template.push('/');
            if after_reactions {
                template.push_str(":reaction");
                // Everything below a reaction shares the reaction bucket.
                break;
            }
            let is_id = segment.bytes().all(|b| b.is_ascii_digit());
            if is_id && !MAJOR_PARAMETERS.contains(&previous) {
                template.push_str(":id");
            } else {
                template.push_str(segment);
            }
            after_reactions = segment == "reactions";
            previous = segment;
        }

        if template.is_empty() {
            template.push('/');
        }
        format!("{} {template}", self.method)
    }

    /// Builds a body-less request for this route.
    #[must_use]
    pub fn request(&self) -> Request {
        Request::new(self.method.clone(), self.path.clone())
    }

    /// Builds a request for this route with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn request_json<T: Serialize>(&self, body: &T) -> serde_json::Result<Request> {
        self.request().with_json(body)
    }
}

/// Returns the major parameter of a route group as `(resource, id)`.
///
/// `GET /channels/1/messages/:id` yields `("channels", "1")`.
#[must_use]
pub fn major_parameter(group: &str) -> Option<(&str, &str)> {
    let path = group.split_once(' ').map_or(group, |(_, path)| path);
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if MAJOR_PARAMETERS.contains(&segment) {
            return segments
                .next()
                .filter(|id| id.bytes().all(|b| b.is_ascii_digit()))
                .map(|id| (segment, id));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_ids_collapse() {
        let a = Route::get("/channels/1/messages/9").group();
        let b = Route::get("/channels/1/messages/10").group();
        assert_eq!(a, b);
        assert_eq!(a, "GET /channels/1/messages/:id");
    }

    #[test]
    fn test_major_ids_split() {
        let a = Route::get("/channels/1/messages").group();
        let b = Route::get("/channels/2/messages").group();
        assert_ne!(a, b);
    }

    #[test]
    fn test_method_splits() {
        let get = Route::get("/guilds/5/members/7").group();
        let delete = Route::delete("/guilds/5/members/7").group();
        assert_ne!(get, delete);
        assert_eq!(delete, "DELETE /guilds/5/members/:id");
    }

    #[test]
    fn test_reactions_share_bucket() {
        let a = Route::put("/channels/1/messages/2/reactions/%F0%9F%91%8D/@me").group();
        let b = Route::put("/channels/1/messages/3/reactions/abc/@me").group();
        assert_eq!(a, b);
        assert_eq!(a, "PUT /channels/1/messages/:id/reactions/:reaction");
    }

    #[test]
    fn test_query_ignored() {
        assert_eq!(
            Route::get("/guilds/5/members?limit=1000").group(),
            "GET /guilds/5/members"
        );
    }

    #[test]
    fn test_major_parameter() {
        let group = Route::get("/channels/1/messages/9").group();
        assert_eq!(major_parameter(&group), Some(("channels", "1")));
        assert_eq!(major_parameter("PATCH /guilds/5/members/:id"), Some(("guilds", "5")));
        assert_eq!(major_parameter("GET /users/:id"), None);
        assert_eq!(major_parameter("POST /guilds"), None);
    }

    #[test]
    fn test_request_carries_path() {
        let request = Route::patch("/channels/3").request();
        assert_eq!(request.method, Method::PATCH);
        assert_eq!(request.path, "/channels/3");
        assert!(request.body.is_none());
    }
}

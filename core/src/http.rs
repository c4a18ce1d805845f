//! HTTP request and response types exchanged with a `Transport`.
//!
//! # Design
//! Requests and responses are plain data. `MlHttpClient` builds an
//! `HttpRequest`, a transport executes it and returns an `HttpResponse`
//! whose body has already been drained, so the pooled connection is free
//! again before the caller sees the response. Decoders take responses by
//! value, which means a body can only be consumed once.

use std::fmt;

use uuid::Uuid;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const AUTHORIZATION: &str = "Authorization";
pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

/// The ML server signals "still processing" with this status.
pub const NOT_FOUND: u16 = 404;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
///
/// Built by the `MlHttpClient::build_*` methods. Always carries exactly one
/// `Content-Type` and one `Authorization` header.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    /// First header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The body text when this is a JSON request.
    pub fn json_body(&self) -> Option<&str> {
        match &self.body {
            Some(RequestBody::Json(json)) => Some(json),
            _ => None,
        }
    }

    pub fn multipart_body(&self) -> Option<&MultipartForm> {
        match &self.body {
            Some(RequestBody::Multipart(form)) => Some(form),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(String),
    Multipart(MultipartForm),
}

/// An HTTP response described as plain data. The body is already fully read.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_not_found(&self) -> bool {
        self.status == NOT_FOUND
    }
}

/// One field of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        content_type: String,
        bytes: Vec<u8>,
    },
}

impl Part {
    pub fn name(&self) -> &str {
        match self {
            Part::Text { name, .. } | Part::File { name, .. } => name,
        }
    }
}

/// An ordered `multipart/form-data` body with its own random boundary.
#[derive(Debug, Clone)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        Self {
            boundary: format!("ml-client-{}", Uuid::new_v4().simple()),
            parts: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.parts.push(Part::Text {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Adds a text field only when `value` is present.
    pub fn optional_text(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.text(name, value),
            None => self,
        }
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        self.parts.push(Part::File {
            name: name.to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            bytes,
        });
        self
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value of the first text field called `name`.
    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            Part::Text { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            match part {
                Part::Text { name, value } => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"\r\n\
                             Content-Type: text/plain; charset=UTF-8\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(value.as_bytes());
                }
                Part::File {
                    name,
                    filename,
                    content_type,
                    bytes,
                } => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                             Content-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(bytes);
                }
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let req = HttpRequest {
            method: HttpMethod::Get,
            url: "http://localhost/api".to_string(),
            headers: vec![("Content-Type".to_string(), APPLICATION_JSON.to_string())],
            body: None,
        };
        assert_eq!(req.header("content-type"), Some(APPLICATION_JSON));
        assert_eq!(req.header("authorization"), None);
    }

    #[test]
    fn boundaries_differ_between_forms() {
        assert_ne!(MultipartForm::new().boundary(), MultipartForm::new().boundary());
    }

    #[test]
    fn optional_text_skips_absent_values() {
        let form = MultipartForm::new()
            .text("description", "d")
            .optional_text("datasetName", None)
            .optional_text("version", Some("1.0"));
        let names: Vec<&str> = form.parts().iter().map(Part::name).collect();
        assert_eq!(names, ["description", "version"]);
        assert_eq!(form.text_value("version"), Some("1.0"));
        assert_eq!(form.text_value("datasetName"), None);
    }

    #[test]
    fn encode_writes_text_and_file_parts() {
        let form = MultipartForm::new()
            .text("dataFormat", "CSV")
            .file("file", "data.csv", APPLICATION_OCTET_STREAM, b"a,b\n1,2\n".to_vec());
        let encoded = String::from_utf8(form.encode()).unwrap();
        let boundary = form.boundary();

        assert!(encoded.starts_with(&format!("--{boundary}\r\n")));
        assert!(encoded.contains("Content-Disposition: form-data; name=\"dataFormat\"\r\n"));
        assert!(encoded.contains("\r\n\r\nCSV\r\n"));
        assert!(encoded.contains("name=\"file\"; filename=\"data.csv\"\r\nContent-Type: application/octet-stream"));
        assert!(encoded.contains("\r\n\r\na,b\n1,2\n\r\n"));
        assert!(encoded.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn content_type_names_the_boundary() {
        let form = MultipartForm::new();
        assert_eq!(
            form.content_type(),
            format!("multipart/form-data; boundary={}", form.boundary())
        );
    }
}

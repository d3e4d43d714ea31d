use bytes::Bytes;
use reqwest::multipart;

/// Request payload, owned so every retry attempt can rebuild the wire body.
#[derive(Clone, Debug)]
pub(crate) enum Payload {
    Empty,
    Json(serde_json::Value),
    Multipart(Multipart),
}

/// Owned multipart form description.
///
/// `reqwest::multipart::Form` is single-use, so the client keeps the parts
/// and builds a fresh form for each attempt (retries, refresh resubmission).
#[derive(Clone, Debug, Default)]
pub struct Multipart {
    parts: Vec<Part>,
}

#[derive(Clone, Debug)]
enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: String,
        data: Bytes,
    },
}

impl Multipart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(Part::File {
            name: name.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            data: data.into(),
        });
        self
    }

    /// Builds a single-use `reqwest` form from the owned parts.
    pub(crate) fn to_form(&self) -> Result<multipart::Form, String> {
        let mut form = multipart::Form::new();
        for part in &self.parts {
            form = match part {
                Part::Text { name, value } => form.text(name.clone(), value.clone()),
                Part::File {
                    name,
                    file_name,
                    mime,
                    data,
                } => {
                    let file = multipart::Part::bytes(data.to_vec())
                        .file_name(file_name.clone())
                        .mime_str(mime)
                        .map_err(|err| format!("invalid mime type '{mime}': {err}"))?;
                    form.part(name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::Multipart;

    #[test]
    fn form_can_be_rebuilt_for_every_attempt() {
        let parts = Multipart::new()
            .text("title", "Intro to Rust")
            .file("thumbnail", "cover.png", "image/png", &b"\x89PNG"[..]);

        assert!(parts.to_form().is_ok());
        assert!(parts.to_form().is_ok());
    }

    #[test]
    fn invalid_mime_type_is_reported() {
        let parts = Multipart::new().file("f", "a.bin", "not a mime", &b"x"[..]);
        let err = parts.to_form().expect_err("mime must be rejected");
        assert!(err.contains("not a mime"));
    }
}

//! `multipart/form-data` request bodies.

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
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
    fn name(&self) -> &str {
        match self {
            Self::Text { name, .. } | Self::File { name, .. } => name,
        }
    }
}

/// Ordered multipart form; fields are encoded in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
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
        Self::with_boundary(&format!("----hoard{}", Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: &str) -> Self {
        Self {
            boundary: boundary.to_owned(),
            parts: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.parts.push(Part::Text {
            name: name.to_owned(),
            value: value.to_owned(),
        });
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        self.parts.push(Part::File {
            name: name.to_owned(),
            filename: filename.to_owned(),
            content_type: content_type.to_owned(),
            bytes,
        });
        self
    }

    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            Part::Text { name: field, value } if field == name => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn file_bytes(&self, name: &str) -> Option<&[u8]> {
        self.parts.iter().find_map(|part| match part {
            Part::File {
                name: field, bytes, ..
            } if field == name => Some(bytes.as_slice()),
            _ => None,
        })
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.parts.iter().map(Part::name).collect()
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(b"--");
            out.extend_from_slice(self.boundary.as_bytes());
            out.extend_from_slice(b"\r\n");
            match part {
                Part::Text { name, value } => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                            escape_quoted(name)
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
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                            escape_quoted(name),
                            escape_quoted(filename),
                            content_type
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(bytes);
                }
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"--");
        out.extend_from_slice(self.boundary.as_bytes());
        out.extend_from_slice(b"--\r\n");
        out
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "%22")
        .replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::MultipartForm;

    #[test]
    fn encodes_text_and_file_parts_in_order() {
        let form = MultipartForm::with_boundary("XYZ")
            .text("txid", "t1")
            .file("attachment", "blob", "application/octet-stream", b"\x00\x01".to_vec());
        assert_eq!(form.content_type(), "multipart/form-data; boundary=XYZ");
        assert_eq!(form.field_names(), vec!["txid", "attachment"]);

        let mut expected = b"--XYZ\r\nContent-Disposition: form-data; name=\"txid\"\r\n\r\nt1\r\n".to_vec();
        expected.extend_from_slice(
            b"--XYZ\r\nContent-Disposition: form-data; name=\"attachment\"; filename=\"blob\"\r\nContent-Type: application/octet-stream\r\n\r\n\x00\x01\r\n--XYZ--\r\n",
        );
        assert_eq!(form.encode(), expected);
    }

    #[test]
    fn generated_boundaries_differ() {
        assert_ne!(MultipartForm::new().content_type(), MultipartForm::new().content_type());
    }

    #[test]
    fn lookup_helpers() {
        let form = MultipartForm::new().text("ext", "png").file("document", "blob", "text/html", b"<p>".to_vec());
        assert_eq!(form.text_value("ext"), Some("png"));
        assert_eq!(form.file_bytes("document"), Some(&b"<p>"[..]));
        assert!(form.text_value("missing").is_none());
    }
}

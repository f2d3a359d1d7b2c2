//! Buffered multipart/form-data assembly.
//!
//! The whole body is built into one buffer before the first send so retries
//! replay byte-identical content, boundary included. File parts open their
//! file here, not at parse time.

use std::fs;

use rand::Rng;

use crate::convert::file_name_of;
use crate::error::{Error, Result};
use crate::options::Part;

pub(crate) struct MultipartBody {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub(crate) fn assemble(parts: &[Part]) -> Result<MultipartBody> {
    assemble_with_boundary(parts, &generate_boundary())
}

fn generate_boundary() -> String {
    let tail: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("------------------------{tail}")
}

pub(crate) fn assemble_with_boundary(parts: &[Part], boundary: &str) -> Result<MultipartBody> {
    let mut bytes = Vec::new();
    for part in parts {
        bytes.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match part {
            Part::Text { name, value } => {
                bytes.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                bytes.extend_from_slice(value.as_bytes());
            }
            Part::File { name, path, content_type, file_name } => {
                let file_name = file_name.clone().unwrap_or_else(|| file_name_of(path));
                let content_type = content_type.clone().unwrap_or_else(|| {
                    mime_guess::from_path(path).first_or_octet_stream().to_string()
                });
                bytes.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                let contents =
                    fs::read(path).map_err(|err| Error::file(path, "read form file", err))?;
                bytes.extend_from_slice(&contents);
            }
        }
        bytes.extend_from_slice(b"\r\n");
    }
    bytes.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    Ok(MultipartBody {
        content_type: format!("multipart/form-data; boundary={boundary}"),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn text_parts_have_stable_layout() {
        let parts = vec![
            Part::Text { name: "a".into(), value: "1".into() },
            Part::Text { name: "b".into(), value: "two".into() },
        ];
        let body = assemble_with_boundary(&parts, "XYZ").unwrap();
        assert_eq!(body.content_type, "multipart/form-data; boundary=XYZ");
        let text = String::from_utf8(body.bytes).unwrap();
        assert_eq!(
            text,
            "--XYZ\r\n\
             Content-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n\
             --XYZ\r\n\
             Content-Disposition: form-data; name=\"b\"\r\n\r\ntwo\r\n\
             --XYZ--\r\n"
        );
    }

    #[test]
    fn file_parts_embed_contents_and_type() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(b"{\"k\":1}").unwrap();
        let parts = vec![Part::File {
            name: "payload".into(),
            path: file.path().to_path_buf(),
            content_type: None,
            file_name: Some("data.json".into()),
        }];
        let body = assemble_with_boundary(&parts, "B").unwrap();
        let text = String::from_utf8(body.bytes).unwrap();
        assert!(text.contains("name=\"payload\"; filename=\"data.json\""));
        assert!(text.contains("Content-Type: application/json"));
        assert!(text.contains("{\"k\":1}"));
    }

    #[test]
    fn assembly_is_deterministic_for_a_boundary() {
        let parts = vec![Part::Text { name: "x".into(), value: "y".into() }];
        let one = assemble_with_boundary(&parts, "Q").unwrap();
        let two = assemble_with_boundary(&parts, "Q").unwrap();
        assert_eq!(one.bytes, two.bytes);
    }

    #[test]
    fn missing_file_is_a_file_error() {
        let parts = vec![Part::File {
            name: "f".into(),
            path: "/definitely/not/here.bin".into(),
            content_type: None,
            file_name: None,
        }];
        assert!(matches!(assemble(&parts), Err(Error::File { .. })));
    }

    #[test]
    fn generated_boundaries_differ() {
        assert_ne!(generate_boundary(), generate_boundary());
    }
}

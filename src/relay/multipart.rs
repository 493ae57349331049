//! Minimal `multipart/form-data` reader for frame uploads.

use anyhow::{anyhow, Result};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, PartialEq, Eq)]
pub struct Part<'a> {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: &'a [u8],
}

/// Boundary parameter of a multipart Content-Type header.
pub fn boundary(content_type: &str) -> Option<String> {
    let (mime, params) = content_type.split_once(';')?;
    if !mime.trim().eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

pub fn parse<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<Part<'a>>> {
    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();
    let mut parts = Vec::new();
    let mut cursor =
        find(body, delimiter, 0).ok_or_else(|| anyhow!("multipart boundary not found"))?;

    loop {
        cursor += delimiter.len();
        if body[cursor..].starts_with(b"--") {
            break;
        }
        if body[cursor..].starts_with(b"\r\n") {
            cursor += 2;
        }
        let head_end = find(body, b"\r\n\r\n", cursor)
            .ok_or_else(|| anyhow!("multipart part headers not terminated"))?;
        let head = String::from_utf8_lossy(&body[cursor..head_end]).to_string();
        let data_start = head_end + 4;

        let mut closing = b"\r\n".to_vec();
        closing.extend_from_slice(delimiter);
        let data_end = find(body, &closing, data_start)
            .ok_or_else(|| anyhow!("multipart part not terminated"))?;

        if let Some(part) = part_from_head(&head, &body[data_start..data_end]) {
            parts.push(part);
        }
        cursor = data_end + 2;
    }
    Ok(parts)
}

/// First part named `name`.
pub fn field<'a>(body: &'a [u8], boundary: &str, name: &str) -> Result<Option<Part<'a>>> {
    Ok(parse(body, boundary)?.into_iter().find(|part| part.name == name))
}

fn part_from_head<'a>(head: &str, data: &'a [u8]) -> Option<Part<'a>> {
    static PARAM_RE: OnceLock<Regex> = OnceLock::new();
    let re = PARAM_RE.get_or_init(|| {
        Regex::new(r#"\b(name|filename)="([^"]*)""#).expect("disposition pattern is valid")
    });

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;
    for line in head.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("content-disposition") {
            for caps in re.captures_iter(value) {
                match &caps[1] {
                    "name" => name = Some(caps[2].to_string()),
                    _ => filename = Some(caps[2].to_string()),
                }
            }
        } else if key.trim().eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_string());
        }
    }
    Some(Part {
        name: name?,
        filename,
        content_type,
        data,
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            let disposition = match filename {
                Some(file) => format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/jpeg\r\n\r\n",
                    name, file
                ),
                None => format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name),
            };
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
        body
    }

    #[test]
    fn boundary_from_header() {
        assert_eq!(
            boundary("multipart/form-data; boundary=----WebKitFormBoundaryX1"),
            Some("----WebKitFormBoundaryX1".to_string())
        );
        assert_eq!(
            boundary("multipart/form-data; charset=utf-8; boundary=\"abc\""),
            Some("abc".to_string())
        );
        assert_eq!(boundary("application/json"), None);
    }

    #[test]
    fn finds_binary_frame_field() {
        let jpeg: &[u8] = &[0xFF, 0xD8, b'\r', b'\n', b'-', 0xFF, 0xD9];
        let body = form(
            "XyZ",
            &[("note", None, &b"hello"[..]), ("frame", Some("blob"), jpeg)],
        );
        let part = field(&body, "XyZ", "frame").unwrap().unwrap();
        assert_eq!(part.data, jpeg);
        assert_eq!(part.filename.as_deref(), Some("blob"));
        assert_eq!(part.content_type.as_deref(), Some("image/jpeg"));

        let parts = parse(&body, "XyZ").unwrap();
        assert_eq!(parts[0].name, "note");
        assert_eq!(parts[0].data, b"hello");
    }

    #[test]
    fn missing_field_and_broken_bodies() {
        let body = form("b", &[("other", None, &b"x"[..])]);
        assert!(field(&body, "b", "frame").unwrap().is_none());
        assert!(parse(b"no boundary here", "b").is_err());
        assert!(parse(b"--b\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nunterminated", "b").is_err());
    }
}

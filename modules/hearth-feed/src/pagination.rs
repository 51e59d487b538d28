//! Offset pagination. A page token is the base64 of the next offset.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use hearth_common::HearthError;

pub fn encode_page_token(offset: usize) -> String {
    BASE64.encode(offset.to_string())
}

/// Decode a page token. Negative or non-numeric offsets are a client fault.
pub fn decode_page_token(token: &str) -> Result<usize, HearthError> {
    let invalid = || HearthError::BadRequest {
        error: "Invalid page token".to_string(),
        message: "pageToken must be the base64 of a non-negative integer".to_string(),
    };

    let bytes = BASE64.decode(token).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    let offset: i64 = text.trim().parse().map_err(|_| invalid())?;
    if offset < 0 {
        return Err(invalid());
    }
    Ok(offset as usize)
}

/// One page of items plus the token for the next page, if any.
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

pub fn paginate<T>(mut items: Vec<T>, offset: usize, page_size: usize) -> Page<T> {
    let total = items.len();
    if offset >= total {
        return Page {
            items: Vec::new(),
            next_page_token: None,
        };
    }

    let end = (offset + page_size).min(total);
    let page: Vec<T> = items.drain(offset..end).collect();
    let next_page_token = if end < total {
        Some(encode_page_token(end))
    } else {
        None
    };

    Page {
        items: page,
        next_page_token,
    }
}
